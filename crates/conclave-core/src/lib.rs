#![forbid(unsafe_code)]
//! conclave-core: the intermediate representation shared by every stage of
//! the compiler.
//!
//! - `schema`: passive `Column`/`Relation` values with ownership metadata
//!   (`stored_with`) and advisory collusion sets.
//! - `op`: the closed `Operator` sum type and its per-variant payloads.
//! - `dag`: the arena-backed `OpDag` owning every node, with edge
//!   bookkeeping, traversal, deterministic topological sort and the
//!   per-node privacy predicates.
//!
//! No I/O, no logging, no threads here. The planner crate builds and rewrites
//! graphs through this API; code generators only read it.

pub mod config;
pub mod dag;
pub mod error;
pub mod hash;
pub mod id;
pub mod op;
pub mod prelude;
pub mod schema;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
