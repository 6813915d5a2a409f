use thiserror::Error;

use crate::id::NodeId;

/// Canonical result for core.
pub type Result<T> = std::result::Result<T, Error>;

/// Contract violations raised by the IR. None of these are transient: each
/// one means the caller built or rewrote a graph incorrectly.
#[derive(Debug, Error)]
pub enum Error {
    #[error("column '{column}' not found in relation '{relation}'")]
    ColumnNotFound { relation: String, column: String },

    #[error("Schema error: {0}")]
    Schema(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Raised by the topological sort; the graph must not be used further.
    #[error("graph is not acyclic: cycle detected at '{0}'")]
    Cycle(String),

    #[error("rewrite precondition violated: {0}")]
    Precondition(String),

    #[error("unknown node {0}")]
    UnknownNode(NodeId),

    #[error("operation not supported: {0}")]
    Unsupported(&'static str),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Hashing error: {0}")]
    Hash(String),

    #[error("Internal invariant failed: {0}")]
    Invariant(String),
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Hash(e.to_string())
    }
}
