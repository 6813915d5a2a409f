#![forbid(unsafe_code)]
//! conclave-planner: building, rewriting and specializing operator graphs.
//!
//! Design:
//! - Graphs live in `conclave-core::dag::OpDag`; this crate never touches
//!   edges directly, only through `OpDag`'s structural API.
//! - `builder`: one function per operator, deriving output schemas and
//!   information-flow metadata and wiring the new node into the graph.
//! - `rewrite`: splice primitives for unary-shaped nodes. Schema refresh of
//!   every reparented node is part of each primitive.
//! - `rules`: specialized join/aggregate derivations, applicability checks,
//!   and a small `optimize` pass.
//! - `dsl`: YAML workflow description → `OpDag`.

pub mod builder;
pub mod dsl;
pub mod error;
pub mod rewrite;
pub mod rules;
pub mod verify;

pub use builder::{ColumnDef, OperandSpec};
pub use dsl::yaml::{parse_yaml_workflow, ParsedWorkflow};
pub use error::{PlanError, Result};
pub use rewrite::{insert_between, insert_between_children, remove_between};
pub use rules::{optimize, OptimizeReport};
