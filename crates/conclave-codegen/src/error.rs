use thiserror::Error;

use conclave_core::id::NodeId;
use conclave_core::op::OpKind;

pub type Result<T> = std::result::Result<T, CodegenError>;

#[derive(Debug, Error)]
pub enum CodegenError {
    #[error(transparent)]
    Core(#[from] conclave_core::error::Error),

    #[error("{backend} backend cannot generate '{kind}' ({node})")]
    UnsupportedOperator {
        backend: &'static str,
        kind: OpKind,
        node: NodeId,
    },

    #[error("formatting error: {0}")]
    Fmt(#[from] std::fmt::Error),
}
