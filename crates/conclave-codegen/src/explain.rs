//! Plain-text plan listing, one line per operator:
//!
//! ```text
//! job demo
//! in1 = create(a INTEGER, b INTEGER) @ {1}
//! proj1 = project(in1; a) @ {1}
//! joined = join(proj1, proj2; a = a) @ {1, 2} [mpc]
//! ```

use std::fmt::Write as _;

use conclave_core::dag::{OpDag, OpNode};
use conclave_core::op::{Arith, Operator};
use conclave_core::schema::{Column, PartySet};

use crate::error::Result;
use crate::traits::CodeGen;

#[derive(Debug, Clone, Default)]
pub struct Explain {
    /// Append the node id to every line.
    pub show_ids: bool,
}

impl Explain {
    pub fn new() -> Self {
        Self::default()
    }

    fn line(&self, dag: &OpDag, node: &OpNode, detail: &str) -> Result<String> {
        let mut args: Vec<&str> = node
            .inputs()
            .ids()
            .into_iter()
            .chain(node.op().auxiliary_parents())
            .filter_map(|p| dag.get(p))
            .map(|p| p.out_rel().name())
            .collect();
        args.dedup();
        let mut out = String::new();
        write!(out, "{} = {}({}", node.out_rel().name(), node.name(), args.join(", "))?;
        if !detail.is_empty() {
            if !args.is_empty() {
                out.push_str("; ");
            }
            out.push_str(detail);
        }
        write!(out, ") @ {}", parties(node.out_rel().stored_with()))?;
        if node.is_mpc {
            out.push_str(" [mpc]");
        }
        if self.show_ids {
            write!(out, " {}", node.id())?;
        }
        out.push('\n');
        Ok(out)
    }
}

fn parties(set: &PartySet) -> String {
    let ids: Vec<String> = set.iter().map(|p| p.get().to_string()).collect();
    format!("{{{}}}", ids.join(", "))
}

fn names(cols: &[Column]) -> String {
    cols.iter().map(|c| c.name.as_str()).collect::<Vec<_>>().join(", ")
}

fn arith(a: &Arith, sym: &str) -> String {
    let operands: Vec<String> = a.operands.iter().map(ToString::to_string).collect();
    format!("{} = {}", a.target_col.name, operands.join(sym))
}

fn key_pairs(left: &[Column], right: &[Column]) -> String {
    left.iter()
        .zip(right)
        .map(|(l, r)| format!("{} = {}", l.name, r.name))
        .collect::<Vec<_>>()
        .join(", ")
}

impl CodeGen for Explain {
    fn backend(&self) -> &'static str {
        "explain"
    }

    fn generate_job(&mut self, job_name: &str, op_code: &str) -> Result<String> {
        Ok(format!("job {job_name}\n{op_code}"))
    }

    fn generate_create(&mut self, dag: &OpDag, node: &OpNode) -> Result<String> {
        let cols: Vec<String> = node
            .out_rel()
            .columns()
            .iter()
            .map(|c| format!("{} {}", c.name, c.type_tag))
            .collect();
        self.line(dag, node, &cols.join(", "))
    }

    fn generate_store(&mut self, dag: &OpDag, node: &OpNode) -> Result<String> {
        self.line(dag, node, "")
    }

    fn generate_persist(&mut self, dag: &OpDag, node: &OpNode) -> Result<String> {
        self.line(dag, node, "")
    }

    fn generate_open(&mut self, dag: &OpDag, node: &OpNode) -> Result<String> {
        self.line(dag, node, "")
    }

    fn generate_close(&mut self, dag: &OpDag, node: &OpNode) -> Result<String> {
        self.line(dag, node, "")
    }

    fn generate_send(&mut self, dag: &OpDag, node: &OpNode) -> Result<String> {
        self.line(dag, node, "")
    }

    fn generate_aggregate(&mut self, dag: &OpDag, node: &OpNode) -> Result<String> {
        let Operator::Aggregate(agg) = node.op() else {
            return Err(self.unsupported(node));
        };
        let out = node.out_rel().columns().last().map_or("", |c| c.name.as_str());
        let detail = format!(
            "group [{}], {}({}) as {}",
            names(&agg.group_cols),
            agg.aggregator,
            agg.agg_col.name,
            out
        );
        self.line(dag, node, &detail)
    }

    fn generate_index_aggregate(&mut self, dag: &OpDag, node: &OpNode) -> Result<String> {
        let Operator::IndexAggregate(ia) = node.op() else {
            return Err(self.unsupported(node));
        };
        let detail = format!(
            "group [{}], {}({})",
            names(&ia.agg.group_cols),
            ia.agg.aggregator,
            ia.agg.agg_col.name
        );
        self.line(dag, node, &detail)
    }

    fn generate_project(&mut self, dag: &OpDag, node: &OpNode) -> Result<String> {
        let Operator::Project(p) = node.op() else {
            return Err(self.unsupported(node));
        };
        self.line(dag, node, &names(&p.selected_cols))
    }

    fn generate_index(&mut self, dag: &OpDag, node: &OpNode) -> Result<String> {
        let Operator::Index(ix) = node.op() else {
            return Err(self.unsupported(node));
        };
        self.line(dag, node, &ix.idx_col_name)
    }

    fn generate_shuffle(&mut self, dag: &OpDag, node: &OpNode) -> Result<String> {
        self.line(dag, node, "")
    }

    fn generate_multiply(&mut self, dag: &OpDag, node: &OpNode) -> Result<String> {
        let Operator::Multiply(m) = node.op() else {
            return Err(self.unsupported(node));
        };
        self.line(dag, node, &arith(m, " * "))
    }

    fn generate_divide(&mut self, dag: &OpDag, node: &OpNode) -> Result<String> {
        let Operator::Divide(d) = node.op() else {
            return Err(self.unsupported(node));
        };
        self.line(dag, node, &arith(d, " / "))
    }

    fn generate_filter(&mut self, dag: &OpDag, node: &OpNode) -> Result<String> {
        let Operator::Filter(f) = node.op() else {
            return Err(self.unsupported(node));
        };
        let detail = format!("{} {} {}", f.target_col.name, f.operator, f.expr);
        self.line(dag, node, detail.trim_end())
    }

    fn generate_sort_by(&mut self, dag: &OpDag, node: &OpNode) -> Result<String> {
        let Operator::SortBy(s) = node.op() else {
            return Err(self.unsupported(node));
        };
        self.line(dag, node, &s.sort_by_col.name)
    }

    fn generate_comp_neighs(&mut self, dag: &OpDag, node: &OpNode) -> Result<String> {
        let Operator::CompNeighs(c) = node.op() else {
            return Err(self.unsupported(node));
        };
        self.line(dag, node, &c.comp_col.name)
    }

    fn generate_distinct(&mut self, dag: &OpDag, node: &OpNode) -> Result<String> {
        let Operator::Distinct(d) = node.op() else {
            return Err(self.unsupported(node));
        };
        self.line(dag, node, &names(&d.selected_cols))
    }

    fn generate_join(&mut self, dag: &OpDag, node: &OpNode) -> Result<String> {
        let Operator::Join(j) = node.op() else {
            return Err(self.unsupported(node));
        };
        self.line(dag, node, &key_pairs(&j.left_join_cols, &j.right_join_cols))
    }

    fn generate_index_join(&mut self, dag: &OpDag, node: &OpNode) -> Result<String> {
        let Operator::IndexJoin(ij) = node.op() else {
            return Err(self.unsupported(node));
        };
        self.line(dag, node, &key_pairs(&ij.join.left_join_cols, &ij.join.right_join_cols))
    }

    fn generate_reveal_join(&mut self, dag: &OpDag, node: &OpNode) -> Result<String> {
        let Operator::RevealJoin(rj) = node.op() else {
            return Err(self.unsupported(node));
        };
        let detail = format!(
            "{}, reveal {} to {}",
            key_pairs(&rj.join.left_join_cols, &rj.join.right_join_cols),
            rj.revealed_in_rel.name(),
            rj.recipient
        );
        self.line(dag, node, &detail)
    }

    fn generate_hybrid_join(&mut self, dag: &OpDag, node: &OpNode) -> Result<String> {
        let Operator::HybridJoin(hj) = node.op() else {
            return Err(self.unsupported(node));
        };
        let detail = format!(
            "{}, trusted {}",
            key_pairs(&hj.join.left_join_cols, &hj.join.right_join_cols),
            hj.trusted_party
        );
        self.line(dag, node, &detail)
    }

    fn generate_concat(&mut self, dag: &OpDag, node: &OpNode) -> Result<String> {
        self.line(dag, node, "")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generate::generate;
    use conclave_core::schema::{parties, ScalarType};
    use conclave_planner::builder::{self, ColumnDef};

    #[test]
    fn concat_lists_inputs_in_order() {
        let mut dag = OpDag::new();
        let cols = [ColumnDef::new("a", ScalarType::Integer)];
        let y = builder::create(&mut dag, "y", &cols, parties([2])).unwrap();
        let x = builder::create(&mut dag, "x", &cols, parties([1])).unwrap();
        let cat = builder::concat(&mut dag, &[y, x], "cat", None).unwrap();
        builder::index(&mut dag, cat, "numbered", "row").unwrap();

        let job = generate(&mut Explain::new(), &dag, "t", true).unwrap();
        let lines: Vec<&str> = job.code.lines().collect();
        assert_eq!(lines[0], "job t");
        assert!(lines.contains(&"cat = concat(y, x) @ {1, 2}"));
        assert_eq!(lines.last(), Some(&"numbered = index(cat; row) @ {1, 2}"));
    }
}
