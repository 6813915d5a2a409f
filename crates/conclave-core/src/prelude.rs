//! Convenient re-exports for downstream crates.

pub use crate::config::CompilerConfig;
pub use crate::dag::{Inputs, OpDag, OpNode};
pub use crate::error::{Error, Result};
pub use crate::hash::Hash256;
pub use crate::id::{NodeId, PartyId};
pub use crate::op::{
    Aggregate, Aggregator, Arith, Arity, CompNeighs, Distinct, Filter, FilterOp, HybridJoin, Index,
    IndexAggregate, IndexJoin, Join, JoinSide, OpKind, Operand, Operator, Project, RevealJoin,
    SortBy,
};
pub use crate::schema::{parties, Column, PartySet, Relation, ScalarType};
