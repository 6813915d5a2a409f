//! The closed set of relational operators a node can carry.
//!
//! Every consumer (traversal visitors, code generators, rewrite rules)
//! matches on `Operator` exhaustively, so adding a variant fails to build
//! until each match site handles it.
//!
//! Column references held by a payload (`group_cols`, `left_join_cols`, ...)
//! are snapshots of the *input* relation's columns. They are refreshed by
//! position whenever the node is reparented (see `Operator::refresh_cols`).

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::id::{NodeId, PartyId};
use crate::schema::{Column, Relation};

/// Parent arity of an operator, which decides which named parent mirror the
/// node keeps next to its parent set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Arity {
    Unary,
    Binary,
    Nary,
}

/// Fieldless tag of an `Operator`, handy for logging and error reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OpKind {
    Create,
    Store,
    Persist,
    Open,
    Close,
    Send,
    Aggregate,
    IndexAggregate,
    Project,
    Index,
    Shuffle,
    Multiply,
    Divide,
    Filter,
    SortBy,
    CompNeighs,
    Distinct,
    Join,
    IndexJoin,
    RevealJoin,
    HybridJoin,
    Concat,
}

impl OpKind {
    /// Stable operator name used in listings and generated code.
    pub fn name(self) -> &'static str {
        use OpKind::*;
        match self {
            Create => "create",
            Store => "store",
            Persist => "persist",
            Open => "open",
            Close => "close",
            Send => "send",
            Aggregate => "aggregation",
            IndexAggregate => "indexAggregate",
            Project => "project",
            Index => "index",
            Shuffle => "shuffle",
            Multiply => "multiply",
            Divide => "divide",
            Filter => "filter",
            SortBy => "sortBy",
            CompNeighs => "compNeighs",
            Distinct => "distinct",
            Join => "join",
            IndexJoin => "indexJoin",
            RevealJoin => "revealJoin",
            HybridJoin => "hybridJoin",
            Concat => "concat",
        }
    }

    pub fn arity(self) -> Arity {
        use OpKind::*;
        match self {
            Create | Store | Persist | Open | Close | Send | Aggregate | IndexAggregate
            | Project | Index | Shuffle | Multiply | Divide | Filter | SortBy | CompNeighs
            | Distinct => Arity::Unary,
            Join | IndexJoin | RevealJoin | HybridJoin => Arity::Binary,
            Concat => Arity::Nary,
        }
    }
}

impl fmt::Display for OpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Aggregator {
    Sum,
    Count,
    Min,
    Max,
    Mean,
}

impl FromStr for Aggregator {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "+" | "sum" => Ok(Aggregator::Sum),
            "count" => Ok(Aggregator::Count),
            "min" => Ok(Aggregator::Min),
            "max" => Ok(Aggregator::Max),
            "mean" | "avg" => Ok(Aggregator::Mean),
            other => Err(Error::InvalidArgument(format!("unknown aggregator '{other}'"))),
        }
    }
}

impl fmt::Display for Aggregator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Aggregator::Sum => "sum",
            Aggregator::Count => "count",
            Aggregator::Min => "min",
            Aggregator::Max => "max",
            Aggregator::Mean => "mean",
        };
        f.write_str(s)
    }
}

/// Comparison applied by a `Filter`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FilterOp {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
}

impl FromStr for FilterOp {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "=" | "==" => Ok(FilterOp::Eq),
            "!=" | "<>" => Ok(FilterOp::NotEq),
            "<" => Ok(FilterOp::Lt),
            "<=" => Ok(FilterOp::LtEq),
            ">" => Ok(FilterOp::Gt),
            ">=" => Ok(FilterOp::GtEq),
            other => Err(Error::InvalidArgument(format!(
                "unknown filter operator '{other}'"
            ))),
        }
    }
}

impl fmt::Display for FilterOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FilterOp::Eq => "==",
            FilterOp::NotEq => "!=",
            FilterOp::Lt => "<",
            FilterOp::LtEq => "<=",
            FilterOp::Gt => ">",
            FilterOp::GtEq => ">=",
        };
        f.write_str(s)
    }
}

/// Operand of a `Multiply`/`Divide`: an input column or a scalar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Operand {
    Column(Column),
    Int(i64),
    Float(f64),
}

impl Operand {
    pub fn is_zero(&self) -> bool {
        match self {
            Operand::Column(_) => false,
            Operand::Int(v) => *v == 0,
            Operand::Float(v) => *v == 0.0,
        }
    }

    pub fn column(&self) -> Option<&Column> {
        match self {
            Operand::Column(c) => Some(c),
            _ => None,
        }
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Column(c) => write!(f, "{}", c.name),
            Operand::Int(v) => write!(f, "{v}"),
            Operand::Float(v) => write!(f, "{v}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Aggregate {
    pub group_cols: Vec<Column>,
    pub agg_col: Column,
    pub aggregator: Aggregator,
}

/// Aggregation driven by precomputed equality flags and sorted keys; both
/// helper nodes are extra parents of the node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexAggregate {
    pub agg: Aggregate,
    pub eq_flag_op: NodeId,
    pub sorted_keys_op: NodeId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub selected_cols: Vec<Column>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Index {
    pub idx_col_name: String,
}

/// Shared payload of `Multiply` and `Divide`.
///
/// `target_col` is a column of the node's *output* relation: either an input
/// column overwritten in place (then it is also the first operand) or a new
/// column appended at the end.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Arith {
    pub target_col: Column,
    pub operands: Vec<Operand>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    pub target_col: Column,
    pub operator: FilterOp,
    pub expr: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SortBy {
    pub sort_by_col: Column,
}

/// Equality comparison between neighbouring rows, used by hybrid
/// aggregation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompNeighs {
    pub comp_col: Column,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Distinct {
    pub selected_cols: Vec<Column>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Join {
    pub left_join_cols: Vec<Column>,
    pub right_join_cols: Vec<Column>,
}

/// Join aligned through a precomputed index relation (a third parent).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexJoin {
    pub join: Join,
    pub index_op: NodeId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JoinSide {
    Left,
    Right,
}

/// Join where one input is revealed to the party that already holds the
/// other input and the output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RevealJoin {
    pub join: Join,
    pub revealed: JoinSide,
    /// Snapshot of the revealed input relation; refreshed with the join
    /// columns.
    pub revealed_in_rel: Relation,
    pub recipient: PartyId,
}

/// Join whose key matching is done in plaintext by a single trusted party.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HybridJoin {
    pub join: Join,
    pub trusted_party: PartyId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Operator {
    Create,
    Store,
    Persist,
    Open,
    Close,
    Send,
    Aggregate(Aggregate),
    IndexAggregate(IndexAggregate),
    Project(Project),
    Index(Index),
    Shuffle,
    Multiply(Arith),
    Divide(Arith),
    Filter(Filter),
    SortBy(SortBy),
    CompNeighs(CompNeighs),
    Distinct(Distinct),
    Join(Join),
    IndexJoin(IndexJoin),
    RevealJoin(RevealJoin),
    HybridJoin(HybridJoin),
    Concat,
}

/// Current input relations of a node, as seen through its named parent
/// mirrors.
#[derive(Debug, Clone, Copy, Default)]
pub struct InputRels<'a> {
    /// The single parent of a unary node.
    pub primary: Option<&'a Relation>,
    pub left: Option<&'a Relation>,
    pub right: Option<&'a Relation>,
}

impl Operator {
    pub fn kind(&self) -> OpKind {
        match self {
            Operator::Create => OpKind::Create,
            Operator::Store => OpKind::Store,
            Operator::Persist => OpKind::Persist,
            Operator::Open => OpKind::Open,
            Operator::Close => OpKind::Close,
            Operator::Send => OpKind::Send,
            Operator::Aggregate(_) => OpKind::Aggregate,
            Operator::IndexAggregate(_) => OpKind::IndexAggregate,
            Operator::Project(_) => OpKind::Project,
            Operator::Index(_) => OpKind::Index,
            Operator::Shuffle => OpKind::Shuffle,
            Operator::Multiply(_) => OpKind::Multiply,
            Operator::Divide(_) => OpKind::Divide,
            Operator::Filter(_) => OpKind::Filter,
            Operator::SortBy(_) => OpKind::SortBy,
            Operator::CompNeighs(_) => OpKind::CompNeighs,
            Operator::Distinct(_) => OpKind::Distinct,
            Operator::Join(_) => OpKind::Join,
            Operator::IndexJoin(_) => OpKind::IndexJoin,
            Operator::RevealJoin(_) => OpKind::RevealJoin,
            Operator::HybridJoin(_) => OpKind::HybridJoin,
            Operator::Concat => OpKind::Concat,
        }
    }

    pub fn arity(&self) -> Arity {
        self.kind().arity()
    }

    /// The generic join payload shared by every join variant.
    pub fn join(&self) -> Option<&Join> {
        match self {
            Operator::Join(j) => Some(j),
            Operator::IndexJoin(j) => Some(&j.join),
            Operator::RevealJoin(j) => Some(&j.join),
            Operator::HybridJoin(j) => Some(&j.join),
            _ => None,
        }
    }

    fn join_mut(&mut self) -> Option<&mut Join> {
        match self {
            Operator::Join(j) => Some(j),
            Operator::IndexJoin(j) => Some(&mut j.join),
            Operator::RevealJoin(j) => Some(&mut j.join),
            Operator::HybridJoin(j) => Some(&mut j.join),
            _ => None,
        }
    }

    /// Whether the input could be reconstructed from the output plus the
    /// operator's parameters. `in_rel` is the (primary) input relation.
    pub fn is_reversible(&self, in_rel: Option<&Relation>) -> bool {
        match self {
            Operator::Store
            | Operator::Persist
            | Operator::Open
            | Operator::Close
            | Operator::Send
            | Operator::Concat
            | Operator::Index(_)
            | Operator::Shuffle
            | Operator::Divide(_) => true,
            Operator::Project(p) => {
                in_rel.is_some_and(|rel| p.selected_cols.len() == rel.columns().len())
            }
            Operator::Multiply(m) => m.operands.iter().all(|op| !op.is_zero()),
            Operator::Create
            | Operator::Aggregate(_)
            | Operator::IndexAggregate(_)
            | Operator::Filter(_)
            | Operator::SortBy(_)
            | Operator::CompNeighs(_)
            | Operator::Distinct(_)
            | Operator::Join(_)
            | Operator::IndexJoin(_)
            | Operator::RevealJoin(_)
            | Operator::HybridJoin(_) => false,
        }
    }

    /// Re-resolve every input-column reference against the current input
    /// relations. References are matched by position. Inputs that are
    /// currently detached are skipped.
    pub fn refresh_cols(&mut self, inputs: InputRels<'_>) -> Result<()> {
        if let Some(join) = self.join_mut() {
            if let Some(left) = inputs.left {
                join.left_join_cols = resolve_all(left, &join.left_join_cols)?;
            }
            if let Some(right) = inputs.right {
                join.right_join_cols = resolve_all(right, &join.right_join_cols)?;
            }
        }
        if let Operator::RevealJoin(rj) = self {
            let side = match rj.revealed {
                JoinSide::Left => inputs.left,
                JoinSide::Right => inputs.right,
            };
            if let Some(rel) = side {
                rj.revealed_in_rel = rel.clone();
            }
            return Ok(());
        }

        let Some(in_rel) = inputs.primary else {
            return Ok(());
        };
        match self {
            Operator::Aggregate(agg) | Operator::IndexAggregate(IndexAggregate { agg, .. }) => {
                agg.group_cols = resolve_all(in_rel, &agg.group_cols)?;
                agg.agg_col = in_rel.resolve(&agg.agg_col)?;
            }
            Operator::Project(p) => p.selected_cols = resolve_all(in_rel, &p.selected_cols)?,
            Operator::Distinct(d) => d.selected_cols = resolve_all(in_rel, &d.selected_cols)?,
            Operator::Multiply(a) | Operator::Divide(a) => {
                a.operands = a
                    .operands
                    .iter()
                    .map(|op| match op {
                        Operand::Column(c) => in_rel.resolve(c).map(Operand::Column),
                        scalar => Ok(scalar.clone()),
                    })
                    .collect::<Result<_>>()?;
            }
            Operator::Filter(f) => f.target_col = in_rel.resolve(&f.target_col)?,
            Operator::SortBy(s) => s.sort_by_col = in_rel.resolve(&s.sort_by_col)?,
            Operator::CompNeighs(c) => c.comp_col = in_rel.resolve(&c.comp_col)?,
            Operator::Create
            | Operator::Store
            | Operator::Persist
            | Operator::Open
            | Operator::Close
            | Operator::Send
            | Operator::Index(_)
            | Operator::Shuffle
            | Operator::Join(_)
            | Operator::IndexJoin(_)
            | Operator::RevealJoin(_)
            | Operator::HybridJoin(_)
            | Operator::Concat => {}
        }
        Ok(())
    }

    /// Helper nodes an operator references by id, beyond its named parents.
    pub fn auxiliary_parents(&self) -> Vec<NodeId> {
        match self {
            Operator::IndexAggregate(ia) => vec![ia.eq_flag_op, ia.sorted_keys_op],
            Operator::IndexJoin(ij) => vec![ij.index_op],
            _ => Vec::new(),
        }
    }
}

fn resolve_all(rel: &Relation, stale: &[Column]) -> Result<Vec<Column>> {
    stale.iter().map(|c| rel.resolve(c)).collect()
}
