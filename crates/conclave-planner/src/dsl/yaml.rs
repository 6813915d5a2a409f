//! YAML → `OpDag` parser for named relational workflows.
//!
//! Every step names its output relation; later steps refer to earlier ones
//! by that name.
//!
//! Example:
//! ```yaml
//! config:
//!   hybrid_joins: false
//! steps:
//!   - op: create
//!     name: in1
//!     stored_with: [1]
//!     columns:
//!       - { name: a, type: INTEGER, coll_set: [1] }
//!       - { name: b, type: INTEGER }
//!   - op: project
//!     name: proj1
//!     input: in1
//!     columns: [a]
//!   - op: join
//!     name: joined
//!     left: proj1
//!     right: proj2
//!     left_on: [a]
//!     right_on: [a]
//!   - op: collect
//!     input: joined
//!     party: 1
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use conclave_core::config::CompilerConfig;
use conclave_core::dag::OpDag;
use conclave_core::id::{NodeId, PartyId};
use conclave_core::op::{Aggregator, FilterOp};
use conclave_core::schema::{parties, ScalarType};

use crate::builder::{self, ColumnDef, OperandSpec};
use crate::error::{PlanError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workflow {
    #[serde(default)]
    pub config: Option<CompilerConfig>,
    pub steps: Vec<Step>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "op")]
pub enum Step {
    Create {
        name: String,
        stored_with: Vec<u64>,
        columns: Vec<ColumnSpec>,
    },
    Project {
        name: String,
        input: String,
        columns: Vec<String>,
    },
    Distinct {
        name: String,
        input: String,
        columns: Vec<String>,
    },
    Aggregate {
        name: String,
        input: String,
        group: Vec<String>,
        over: String,
        aggregator: String,
        #[serde(rename = "as")]
        out_col: String,
    },
    SortBy {
        name: String,
        input: String,
        column: String,
    },
    Filter {
        name: String,
        input: String,
        column: String,
        operator: String,
        #[serde(default)]
        expr: String,
    },
    Multiply {
        name: String,
        input: String,
        target: String,
        operands: Vec<OperandDef>,
    },
    Divide {
        name: String,
        input: String,
        target: String,
        operands: Vec<OperandDef>,
    },
    Join {
        name: String,
        left: String,
        right: String,
        left_on: Vec<String>,
        right_on: Vec<String>,
    },
    Concat {
        name: String,
        inputs: Vec<String>,
        #[serde(default)]
        columns: Option<Vec<String>>,
    },
    Index {
        name: String,
        input: String,
        #[serde(default)]
        column: Option<String>,
    },
    Shuffle {
        name: String,
        input: String,
    },
    Collect {
        input: String,
        party: u64,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub type_tag: String,
    #[serde(default)]
    pub coll_set: Vec<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OperandDef {
    Int(i64),
    Float(f64),
    Column(String),
}

impl From<&OperandDef> for OperandSpec {
    fn from(def: &OperandDef) -> Self {
        match def {
            OperandDef::Int(v) => OperandSpec::Int(*v),
            OperandDef::Float(v) => OperandSpec::Float(*v),
            OperandDef::Column(c) => OperandSpec::Col(c.clone()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ParsedWorkflow {
    pub dag: OpDag,
    pub config: CompilerConfig,
    /// Output relation name → node producing it.
    pub nodes: BTreeMap<String, NodeId>,
}

impl ParsedWorkflow {
    pub fn node(&self, name: &str) -> Option<NodeId> {
        self.nodes.get(name).copied()
    }
}

struct Scope {
    nodes: BTreeMap<String, NodeId>,
}

impl Scope {
    fn lookup(&self, step: &str, input: &str) -> Result<NodeId> {
        self.nodes
            .get(input)
            .copied()
            .ok_or_else(|| PlanError::UnknownInput {
                step: step.to_string(),
                input: input.to_string(),
            })
    }

    fn bind(&mut self, name: &str, id: NodeId) -> Result<()> {
        if self.nodes.insert(name.to_string(), id).is_some() {
            return Err(PlanError::DuplicateName(name.to_string()));
        }
        Ok(())
    }
}

fn strs(v: &[String]) -> Vec<&str> {
    v.iter().map(String::as_str).collect()
}

fn column_defs(specs: &[ColumnSpec]) -> Result<Vec<ColumnDef>> {
    specs
        .iter()
        .map(|s| {
            let type_tag: ScalarType = s.type_tag.parse()?;
            Ok(ColumnDef::new(&s.name, type_tag).with_coll_set(parties(s.coll_set.iter().copied())))
        })
        .collect()
}

/// Parse a YAML workflow and build its graph.
pub fn parse_yaml_workflow(yaml_src: &str) -> Result<ParsedWorkflow> {
    let doc: Workflow = serde_yaml::from_str(yaml_src)?;
    let config = doc.config.unwrap_or_default();
    config.validate()?;

    let mut dag = OpDag::new();
    let mut scope = Scope {
        nodes: BTreeMap::new(),
    };

    for step in &doc.steps {
        match step {
            Step::Create {
                name,
                stored_with,
                columns,
            } => {
                let defs = column_defs(columns)?;
                let id = builder::create(&mut dag, name, &defs, parties(stored_with.iter().copied()))?;
                scope.bind(name, id)?;
            }
            Step::Project {
                name,
                input,
                columns,
            } => {
                let parent = scope.lookup(name, input)?;
                let id = builder::project(&mut dag, parent, name, &strs(columns))?;
                scope.bind(name, id)?;
            }
            Step::Distinct {
                name,
                input,
                columns,
            } => {
                let parent = scope.lookup(name, input)?;
                let id = builder::distinct(&mut dag, parent, name, &strs(columns))?;
                scope.bind(name, id)?;
            }
            Step::Aggregate {
                name,
                input,
                group,
                over,
                aggregator,
                out_col,
            } => {
                let parent = scope.lookup(name, input)?;
                let aggregator: Aggregator = aggregator.parse()?;
                let id = builder::aggregate(&mut dag, parent, name, &strs(group), over, aggregator, out_col)?;
                scope.bind(name, id)?;
            }
            Step::SortBy {
                name,
                input,
                column,
            } => {
                let parent = scope.lookup(name, input)?;
                let id = builder::sort_by(&mut dag, parent, name, column)?;
                scope.bind(name, id)?;
            }
            Step::Filter {
                name,
                input,
                column,
                operator,
                expr,
            } => {
                let parent = scope.lookup(name, input)?;
                let operator: FilterOp = operator.parse()?;
                let id = builder::filter(&mut dag, parent, name, column, operator, expr)?;
                scope.bind(name, id)?;
            }
            Step::Multiply {
                name,
                input,
                target,
                operands,
            } => {
                let parent = scope.lookup(name, input)?;
                let operands: Vec<OperandSpec> = operands.iter().map(OperandSpec::from).collect();
                let id = builder::multiply(&mut dag, parent, name, target, &operands)?;
                scope.bind(name, id)?;
            }
            Step::Divide {
                name,
                input,
                target,
                operands,
            } => {
                let parent = scope.lookup(name, input)?;
                let operands: Vec<OperandSpec> = operands.iter().map(OperandSpec::from).collect();
                let id = builder::divide(&mut dag, parent, name, target, &operands)?;
                scope.bind(name, id)?;
            }
            Step::Join {
                name,
                left,
                right,
                left_on,
                right_on,
            } => {
                let l = scope.lookup(name, left)?;
                let r = scope.lookup(name, right)?;
                let id = builder::join(&mut dag, l, r, name, &strs(left_on), &strs(right_on))?;
                scope.bind(name, id)?;
            }
            Step::Concat {
                name,
                inputs,
                columns,
            } => {
                let parents = inputs
                    .iter()
                    .map(|i| scope.lookup(name, i))
                    .collect::<Result<Vec<_>>>()?;
                let names = columns.as_deref().map(strs);
                let id = builder::concat(&mut dag, &parents, name, names.as_deref())?;
                scope.bind(name, id)?;
            }
            Step::Index {
                name,
                input,
                column,
            } => {
                let parent = scope.lookup(name, input)?;
                let col = column.as_deref().unwrap_or(&config.default_index_col);
                let id = builder::index(&mut dag, parent, name, col)?;
                scope.bind(name, id)?;
            }
            Step::Shuffle { name, input } => {
                let parent = scope.lookup(name, input)?;
                let id = builder::shuffle(&mut dag, parent, name)?;
                scope.bind(name, id)?;
            }
            Step::Collect { input, party } => {
                let node = scope.lookup("collect", input)?;
                builder::collect(&mut dag, node, PartyId::new(*party))?;
            }
        }
    }

    if dag.is_empty() {
        return Err(PlanError::Workflow("workflow has no steps".to_string()));
    }
    debug!(nodes = dag.len(), roots = dag.roots().len(), "parsed workflow");

    Ok(ParsedWorkflow {
        dag,
        config,
        nodes: scope.nodes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operands_parse_by_shape() {
        let ops: Vec<OperandDef> = serde_yaml::from_str("[a, 2, 0.5]").unwrap();
        assert_eq!(
            ops,
            vec![
                OperandDef::Column("a".into()),
                OperandDef::Int(2),
                OperandDef::Float(0.5)
            ]
        );
    }

    #[test]
    fn unknown_input_is_reported() {
        let src = r#"
steps:
  - op: project
    name: p
    input: nowhere
    columns: [a]
"#;
        match parse_yaml_workflow(src) {
            Err(PlanError::UnknownInput { step, input }) => {
                assert_eq!(step, "p");
                assert_eq!(input, "nowhere");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }
}
