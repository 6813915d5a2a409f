#![forbid(unsafe_code)]
//! conclave-codegen: turning a finalized operator DAG into backend code.
//!
//! A backend implements `CodeGen`, one hook per operator variant. `generate`
//! walks the DAG in topological order and dispatches every node with an
//! exhaustive match, so a variant a backend does not handle is a typed
//! `CodegenError::UnsupportedOperator` instead of a silent gap in the
//! output. `Explain` is the reference backend: a readable plan listing.

pub mod error;
pub mod explain;
pub mod generate;
pub mod traits;

pub use error::{CodegenError, Result};
pub use explain::Explain;
pub use generate::{generate, Job};
pub use traits::CodeGen;
