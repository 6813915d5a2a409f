//! One constructor per operator.
//!
//! Every builder resolves column names against the current output relation
//! of its parent(s) before touching the graph, so a failed lookup leaves the
//! DAG exactly as it was. Columns an operator touches come out with an empty
//! collusion set.

use std::collections::BTreeSet;

use conclave_core::dag::OpDag;
use conclave_core::error::{Error, Result};
use conclave_core::id::{NodeId, PartyId};
use conclave_core::op::{
    Aggregate, Aggregator, Arith, CompNeighs, Distinct, Filter, FilterOp, Index, Join, Operand,
    Operator, Project, SortBy,
};
use conclave_core::schema::{Column, PartySet, Relation, ScalarType};

use crate::rules;

/// Column declaration for `create`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDef {
    pub name: String,
    pub type_tag: ScalarType,
    pub coll_set: PartySet,
}

impl ColumnDef {
    pub fn new(name: impl Into<String>, type_tag: ScalarType) -> Self {
        Self {
            name: name.into(),
            type_tag,
            coll_set: PartySet::new(),
        }
    }

    pub fn with_coll_set(mut self, coll_set: PartySet) -> Self {
        self.coll_set = coll_set;
        self
    }
}

/// Operand of `multiply`/`divide` before resolution: a column name or a
/// scalar.
#[derive(Debug, Clone, PartialEq)]
pub enum OperandSpec {
    Col(String),
    Int(i64),
    Float(f64),
}

impl From<&str> for OperandSpec {
    fn from(name: &str) -> Self {
        OperandSpec::Col(name.to_string())
    }
}

impl From<String> for OperandSpec {
    fn from(name: String) -> Self {
        OperandSpec::Col(name)
    }
}

impl From<i64> for OperandSpec {
    fn from(v: i64) -> Self {
        OperandSpec::Int(v)
    }
}

impl From<i32> for OperandSpec {
    fn from(v: i32) -> Self {
        OperandSpec::Int(i64::from(v))
    }
}

impl From<f64> for OperandSpec {
    fn from(v: f64) -> Self {
        OperandSpec::Float(v)
    }
}

fn out_rel_of(dag: &OpDag, id: NodeId) -> Result<Relation> {
    Ok(dag.node(id)?.out_rel().clone())
}

fn union_stored_with<'a>(rels: impl IntoIterator<Item = &'a Relation>) -> PartySet {
    rels.into_iter()
        .flat_map(|r| r.stored_with().iter().copied())
        .collect()
}

fn cleared_all(cols: &[Column]) -> Vec<Column> {
    cols.iter().map(Column::cleared).collect()
}

/// Add `op` below `parent` and link it.
fn attach_unary(dag: &mut OpDag, parent: NodeId, op: Operator, out_rel: Relation) -> Result<NodeId> {
    let id = dag.add_node(op, out_rel);
    dag.link(parent, id)?;
    Ok(id)
}

/// Input relation. Registered as a root of `dag`.
pub fn create(
    dag: &mut OpDag,
    rel_name: &str,
    columns: &[ColumnDef],
    stored_with: PartySet,
) -> Result<NodeId> {
    if columns.is_empty() {
        return Err(Error::InvalidArgument(format!(
            "relation '{rel_name}' declares no columns"
        )));
    }
    let mut seen = BTreeSet::new();
    for def in columns {
        if !seen.insert(def.name.as_str()) {
            return Err(Error::Schema(format!(
                "relation '{rel_name}' declares column '{}' twice",
                def.name
            )));
        }
    }
    let cols = columns
        .iter()
        .enumerate()
        .map(|(idx, def)| Column::new(rel_name, &def.name, idx, def.type_tag, def.coll_set.clone()))
        .collect();
    let id = dag.add_node(Operator::Create, Relation::new(rel_name, cols, stored_with));
    dag.add_root(id)?;
    Ok(id)
}

/// Group `input` by `group_col_names` and fold `over_col_name` with
/// `aggregator` into a column named `agg_out_col_name`.
pub fn aggregate(
    dag: &mut OpDag,
    input: NodeId,
    output_name: &str,
    group_col_names: &[&str],
    over_col_name: &str,
    aggregator: Aggregator,
    agg_out_col_name: &str,
) -> Result<NodeId> {
    let in_rel = out_rel_of(dag, input)?;
    let group_cols = in_rel.find_all(group_col_names)?;
    let agg_col = in_rel.find(over_col_name)?.clone();

    let mut out_cols = cleared_all(&group_cols);
    out_cols.push(agg_col.cleared().with_name(agg_out_col_name));
    let out_rel = Relation::new(output_name, out_cols, in_rel.stored_with().clone());

    let op = Operator::Aggregate(Aggregate {
        group_cols,
        agg_col,
        aggregator,
    });
    attach_unary(dag, input, op, out_rel)
}

/// `aggregate` followed by the `IndexAggregate` derivation. `eq_flag_op`
/// and `sorted_keys_op` become extra parents of the result.
#[allow(clippy::too_many_arguments)]
pub fn index_aggregate(
    dag: &mut OpDag,
    input: NodeId,
    output_name: &str,
    group_col_names: &[&str],
    over_col_name: &str,
    aggregator: Aggregator,
    agg_out_col_name: &str,
    eq_flag_op: NodeId,
    sorted_keys_op: NodeId,
) -> Result<NodeId> {
    dag.node(eq_flag_op)?;
    dag.node(sorted_keys_op)?;
    let agg = aggregate(
        dag,
        input,
        output_name,
        group_col_names,
        over_col_name,
        aggregator,
        agg_out_col_name,
    )?;
    rules::index_aggregate_from_aggregate(dag, agg, eq_flag_op, sorted_keys_op)
}

pub fn sort_by(dag: &mut OpDag, input: NodeId, output_name: &str, sort_by_col_name: &str) -> Result<NodeId> {
    let in_rel = out_rel_of(dag, input)?;
    let sort_by_col = in_rel.find(sort_by_col_name)?.clone();
    let out_rel = Relation::new(
        output_name,
        cleared_all(in_rel.columns()),
        in_rel.stored_with().clone(),
    );
    attach_unary(dag, input, Operator::SortBy(SortBy { sort_by_col }), out_rel)
}

pub fn project(
    dag: &mut OpDag,
    input: NodeId,
    output_name: &str,
    selected_col_names: &[&str],
) -> Result<NodeId> {
    let in_rel = out_rel_of(dag, input)?;
    let selected_cols = in_rel.find_all(selected_col_names)?;
    let out_rel = Relation::new(
        output_name,
        cleared_all(&selected_cols),
        in_rel.stored_with().clone(),
    );
    attach_unary(dag, input, Operator::Project(Project { selected_cols }), out_rel)
}

pub fn distinct(
    dag: &mut OpDag,
    input: NodeId,
    output_name: &str,
    selected_col_names: &[&str],
) -> Result<NodeId> {
    let in_rel = out_rel_of(dag, input)?;
    let selected_cols = in_rel.find_all(selected_col_names)?;
    let out_rel = Relation::new(
        output_name,
        cleared_all(&selected_cols),
        in_rel.stored_with().clone(),
    );
    attach_unary(dag, input, Operator::Distinct(Distinct { selected_cols }), out_rel)
}

pub fn multiply(
    dag: &mut OpDag,
    input: NodeId,
    output_name: &str,
    target_col_name: &str,
    operands: &[OperandSpec],
) -> Result<NodeId> {
    let (arith, out_rel) = arith(dag, input, output_name, target_col_name, operands)?;
    attach_unary(dag, input, Operator::Multiply(arith), out_rel)
}

pub fn divide(
    dag: &mut OpDag,
    input: NodeId,
    output_name: &str,
    target_col_name: &str,
    operands: &[OperandSpec],
) -> Result<NodeId> {
    let (arith, out_rel) = arith(dag, input, output_name, target_col_name, operands)?;
    attach_unary(dag, input, Operator::Divide(arith), out_rel)
}

/// Shared schema derivation of `multiply`/`divide`.
///
/// An existing target column is overwritten in place and must also be the
/// first operand; any other target name appends a new column.
fn arith(
    dag: &OpDag,
    input: NodeId,
    output_name: &str,
    target_col_name: &str,
    operands: &[OperandSpec],
) -> Result<(Arith, Relation)> {
    let in_rel = out_rel_of(dag, input)?;
    if operands.is_empty() {
        return Err(Error::InvalidArgument(format!(
            "arithmetic on '{}' needs at least one operand",
            in_rel.name()
        )));
    }
    let operands = operands
        .iter()
        .map(|spec| match spec {
            OperandSpec::Col(name) => in_rel.find(name).cloned().map(Operand::Column),
            OperandSpec::Int(v) => Ok(Operand::Int(*v)),
            OperandSpec::Float(v) => Ok(Operand::Float(*v)),
        })
        .collect::<Result<Vec<_>>>()?;

    let mut out_cols = in_rel.columns().to_vec();
    for col in operands.iter().filter_map(Operand::column) {
        out_cols[col.idx] = col.cleared();
    }

    let target_idx = match in_rel.find(target_col_name) {
        Ok(existing) => {
            let first_is_target = operands
                .first()
                .and_then(Operand::column)
                .is_some_and(|c| c.idx == existing.idx);
            if !first_is_target {
                return Err(Error::InvalidArgument(format!(
                    "existing target column '{target_col_name}' must be the first operand"
                )));
            }
            out_cols[existing.idx] = existing.cleared();
            existing.idx
        }
        Err(_) => {
            let float = operands.iter().any(|op| match op {
                Operand::Float(_) => true,
                Operand::Column(c) => c.type_tag == ScalarType::Float,
                Operand::Int(_) => false,
            });
            let type_tag = if float { ScalarType::Float } else { ScalarType::Integer };
            let idx = out_cols.len();
            out_cols.push(Column::new(output_name, target_col_name, idx, type_tag, PartySet::new()));
            idx
        }
    };

    let out_rel = Relation::new(output_name, out_cols, in_rel.stored_with().clone());
    let target_col = out_rel
        .column(target_idx)
        .cloned()
        .ok_or_else(|| Error::Invariant(format!("target column {target_idx} vanished")))?;
    Ok((
        Arith {
            target_col,
            operands,
        },
        out_rel,
    ))
}

/// Keep rows where `filter_col_name <operator> expr` holds.
pub fn filter(
    dag: &mut OpDag,
    input: NodeId,
    output_name: &str,
    filter_col_name: &str,
    operator: FilterOp,
    expr: &str,
) -> Result<NodeId> {
    let in_rel = out_rel_of(dag, input)?;
    let target_col = in_rel.find(filter_col_name)?.clone();
    let mut out_cols = in_rel.columns().to_vec();
    out_cols[target_col.idx] = target_col.cleared();
    let out_rel = Relation::new(output_name, out_cols, in_rel.stored_with().clone());
    let op = Operator::Filter(Filter {
        target_col,
        operator,
        expr: expr.to_string(),
    });
    attach_unary(dag, input, op, out_rel)
}

/// Resolve join keys and derive the join's output: key columns (named
/// after the left side), then left non-key columns, then right non-key
/// columns, all cleared.
fn join_schema(
    dag: &OpDag,
    left: NodeId,
    right: NodeId,
    output_name: &str,
    left_col_names: &[&str],
    right_col_names: &[&str],
) -> Result<(Join, Relation)> {
    if left_col_names.is_empty() || left_col_names.len() != right_col_names.len() {
        return Err(Error::InvalidArgument(format!(
            "join '{output_name}' needs matching key lists, got {} left and {} right",
            left_col_names.len(),
            right_col_names.len()
        )));
    }
    let left_rel = out_rel_of(dag, left)?;
    let right_rel = out_rel_of(dag, right)?;
    let left_join_cols = left_rel.find_all(left_col_names)?;
    let right_join_cols = right_rel.find_all(right_col_names)?;

    let left_keys: BTreeSet<usize> = left_join_cols.iter().map(|c| c.idx).collect();
    let right_keys: BTreeSet<usize> = right_join_cols.iter().map(|c| c.idx).collect();

    let mut out_cols = cleared_all(&left_join_cols);
    out_cols.extend(
        left_rel
            .columns()
            .iter()
            .filter(|c| !left_keys.contains(&c.idx))
            .map(Column::cleared),
    );
    out_cols.extend(
        right_rel
            .columns()
            .iter()
            .filter(|c| !right_keys.contains(&c.idx))
            .map(Column::cleared),
    );
    let stored_with = union_stored_with([&left_rel, &right_rel]);
    Ok((
        Join {
            left_join_cols,
            right_join_cols,
        },
        Relation::new(output_name, out_cols, stored_with),
    ))
}

pub fn join(
    dag: &mut OpDag,
    left: NodeId,
    right: NodeId,
    output_name: &str,
    left_col_names: &[&str],
    right_col_names: &[&str],
) -> Result<NodeId> {
    let (join, out_rel) = join_schema(dag, left, right, output_name, left_col_names, right_col_names)?;
    let id = dag.add_node(Operator::Join(join), out_rel);
    dag.link(left, id)?;
    dag.link(right, id)?;
    Ok(id)
}

/// `join` followed by the `IndexJoin` derivation; `index_op` becomes the
/// third parent.
pub fn index_join(
    dag: &mut OpDag,
    left: NodeId,
    right: NodeId,
    output_name: &str,
    left_col_names: &[&str],
    right_col_names: &[&str],
    index_op: NodeId,
) -> Result<NodeId> {
    dag.node(index_op)?;
    let id = join(dag, left, right, output_name, left_col_names, right_col_names)?;
    rules::index_join_from_join(dag, id, index_op)
}

/// Stack `inputs` in order. Column names come from the first input unless
/// `column_names` overrides them.
pub fn concat(
    dag: &mut OpDag,
    inputs: &[NodeId],
    output_name: &str,
    column_names: Option<&[&str]>,
) -> Result<NodeId> {
    if inputs.len() < 2 {
        return Err(Error::InvalidArgument(format!(
            "concat '{output_name}' needs at least two inputs, got {}",
            inputs.len()
        )));
    }
    let distinct: BTreeSet<NodeId> = inputs.iter().copied().collect();
    if distinct.len() != inputs.len() {
        return Err(Error::InvalidArgument(format!(
            "concat '{output_name}' lists the same input more than once"
        )));
    }
    let in_rels = inputs
        .iter()
        .map(|id| out_rel_of(dag, *id))
        .collect::<Result<Vec<_>>>()?;
    let width = in_rels[0].columns().len();
    if let Some(bad) = in_rels.iter().find(|r| r.columns().len() != width) {
        return Err(Error::Schema(format!(
            "concat '{output_name}': '{}' has {} columns, expected {width}",
            bad.name(),
            bad.columns().len()
        )));
    }
    let mut out_cols = cleared_all(in_rels[0].columns());
    if let Some(names) = column_names {
        if names.len() != width {
            return Err(Error::Schema(format!(
                "concat '{output_name}': {} column names for {width} columns",
                names.len()
            )));
        }
        out_cols = out_cols
            .iter()
            .zip(names)
            .map(|(c, n)| c.with_name(*n))
            .collect();
    }
    let stored_with = union_stored_with(&in_rels);
    let id = dag.add_node(Operator::Concat, Relation::new(output_name, out_cols, stored_with));
    for input in inputs {
        dag.link(*input, id)?;
    }
    Ok(id)
}

/// Prepend a row-number column named `idx_col_name`.
pub fn index(dag: &mut OpDag, input: NodeId, output_name: &str, idx_col_name: &str) -> Result<NodeId> {
    let in_rel = out_rel_of(dag, input)?;
    if in_rel.find(idx_col_name).is_ok() {
        return Err(Error::Schema(format!(
            "'{}' already has a column named '{idx_col_name}'",
            in_rel.name()
        )));
    }
    let mut out_cols = vec![Column::new(
        output_name,
        idx_col_name,
        0,
        ScalarType::Integer,
        PartySet::new(),
    )];
    out_cols.extend(in_rel.columns().iter().cloned());
    let out_rel = Relation::new(output_name, out_cols, in_rel.stored_with().clone());
    let op = Operator::Index(Index {
        idx_col_name: idx_col_name.to_string(),
    });
    attach_unary(dag, input, op, out_rel)
}

pub fn shuffle(dag: &mut OpDag, input: NodeId, output_name: &str) -> Result<NodeId> {
    let out_rel = out_rel_of(dag, input)?.renamed(output_name);
    attach_unary(dag, input, Operator::Shuffle, out_rel)
}

/// Declare that `node`'s output is delivered to `target_party` only.
pub fn collect(dag: &mut OpDag, node: NodeId, target_party: PartyId) -> Result<()> {
    dag.set_stored_with(node, PartySet::from([target_party]))
}

/// Compare each row's `comp_col_name` with its neighbour's.
pub fn comp_neighs(
    dag: &mut OpDag,
    input: NodeId,
    output_name: &str,
    comp_col_name: &str,
) -> Result<NodeId> {
    let in_rel = out_rel_of(dag, input)?;
    let comp_col = in_rel.find(comp_col_name)?.clone();
    let out_rel = Relation::new(
        output_name,
        vec![comp_col.cleared()],
        in_rel.stored_with().clone(),
    );
    attach_unary(dag, input, Operator::CompNeighs(CompNeighs { comp_col }), out_rel)
}

pub fn persist(dag: &mut OpDag, input: NodeId, output_name: &str) -> Result<NodeId> {
    let out_rel = out_rel_of(dag, input)?.renamed(output_name);
    attach_unary(dag, input, Operator::Persist, out_rel)
}

pub fn store(dag: &mut OpDag, input: NodeId, output_name: &str) -> Result<NodeId> {
    let out_rel = out_rel_of(dag, input)?.renamed(output_name);
    attach_unary(dag, input, Operator::Store, out_rel)
}

/// Secret-share `input` among `target_parties`.
pub fn close(
    dag: &mut OpDag,
    input: NodeId,
    output_name: &str,
    target_parties: PartySet,
) -> Result<NodeId> {
    let out_rel = out_rel_of(dag, input)?
        .renamed(output_name)
        .with_stored_with(target_parties);
    attach_unary(dag, input, Operator::Close, out_rel)
}

/// Reveal `input` to `target_party`.
pub fn open(dag: &mut OpDag, input: NodeId, output_name: &str, target_party: PartyId) -> Result<NodeId> {
    let out_rel = out_rel_of(dag, input)?
        .renamed(output_name)
        .with_stored_with(PartySet::from([target_party]));
    attach_unary(dag, input, Operator::Open, out_rel)
}

pub fn send(dag: &mut OpDag, input: NodeId, output_name: &str, recipients: PartySet) -> Result<NodeId> {
    let out_rel = out_rel_of(dag, input)?
        .renamed(output_name)
        .with_stored_with(recipients);
    attach_unary(dag, input, Operator::Send, out_rel)
}

#[cfg(test)]
mod tests {
    use super::*;
    use conclave_core::schema::parties;

    fn two_col_input(dag: &mut OpDag) -> NodeId {
        let cols = [
            ColumnDef::new("a", ScalarType::Integer).with_coll_set(parties([1])),
            ColumnDef::new("b", ScalarType::Integer).with_coll_set(parties([1])),
        ];
        create(dag, "in", &cols, parties([1])).unwrap()
    }

    #[test]
    fn failed_lookup_adds_nothing() {
        let mut dag = OpDag::new();
        let input = two_col_input(&mut dag);
        let before = dag.len();
        assert!(project(&mut dag, input, "p", &["a", "zzz"]).is_err());
        assert_eq!(dag.len(), before);
        assert!(dag[input].children().is_empty());
    }

    #[test]
    fn multiply_into_existing_column_requires_it_first() {
        let mut dag = OpDag::new();
        let input = two_col_input(&mut dag);
        let err = multiply(&mut dag, input, "m", "a", &["b".into(), "a".into()]);
        assert!(matches!(err, Err(Error::InvalidArgument(_))));

        let ok = multiply(&mut dag, input, "m", "a", &["a".into(), OperandSpec::Int(3)]).unwrap();
        let rel = dag[ok].out_rel();
        assert_eq!(rel.columns().len(), 2);
        assert!(rel.columns()[0].coll_set.is_empty());
        assert_eq!(rel.columns()[1].coll_set, parties([1]));
    }

    #[test]
    fn multiply_into_new_column_appends() {
        let mut dag = OpDag::new();
        let input = two_col_input(&mut dag);
        let m = multiply(&mut dag, input, "m", "c", &["a".into(), "b".into()]).unwrap();
        let rel = dag[m].out_rel();
        assert_eq!(rel.columns().len(), 3);
        assert_eq!(rel.columns()[2].name, "c");
        // input relation keeps its metadata
        assert_eq!(dag[input].out_rel().columns()[0].coll_set, parties([1]));
    }

    #[test]
    fn index_prepends_column() {
        let mut dag = OpDag::new();
        let input = two_col_input(&mut dag);
        let idx = index(&mut dag, input, "ix", "row").unwrap();
        let names: Vec<&str> = dag[idx]
            .out_rel()
            .columns()
            .iter()
            .map(|c| c.name.as_str())
            .collect();
        assert_eq!(names, vec!["row", "a", "b"]);
    }
}
