//! The backend interface.
//!
//! Every hook receives the whole DAG (for parent lookups) and the node being
//! emitted, and returns that node's code fragment. Hooks default to
//! `UnsupportedOperator`; a backend overrides the ones it can emit.

use conclave_core::dag::{OpDag, OpNode};

use crate::error::{CodegenError, Result};

pub trait CodeGen {
    /// Backend name (stable), used in errors.
    fn backend(&self) -> &'static str;

    /// Error for a node this backend has no hook for.
    fn unsupported(&self, node: &OpNode) -> CodegenError {
        CodegenError::UnsupportedOperator {
            backend: self.backend(),
            kind: node.kind(),
            node: node.id(),
        }
    }

    /// Wrap the concatenated operator fragments into a complete job.
    fn generate_job(&mut self, _job_name: &str, op_code: &str) -> Result<String> {
        Ok(op_code.to_string())
    }

    fn generate_create(&mut self, _dag: &OpDag, node: &OpNode) -> Result<String> {
        Err(self.unsupported(node))
    }
    fn generate_store(&mut self, _dag: &OpDag, node: &OpNode) -> Result<String> {
        Err(self.unsupported(node))
    }
    fn generate_persist(&mut self, _dag: &OpDag, node: &OpNode) -> Result<String> {
        Err(self.unsupported(node))
    }
    fn generate_open(&mut self, _dag: &OpDag, node: &OpNode) -> Result<String> {
        Err(self.unsupported(node))
    }
    fn generate_close(&mut self, _dag: &OpDag, node: &OpNode) -> Result<String> {
        Err(self.unsupported(node))
    }
    fn generate_send(&mut self, _dag: &OpDag, node: &OpNode) -> Result<String> {
        Err(self.unsupported(node))
    }
    fn generate_aggregate(&mut self, _dag: &OpDag, node: &OpNode) -> Result<String> {
        Err(self.unsupported(node))
    }
    fn generate_index_aggregate(&mut self, _dag: &OpDag, node: &OpNode) -> Result<String> {
        Err(self.unsupported(node))
    }
    fn generate_project(&mut self, _dag: &OpDag, node: &OpNode) -> Result<String> {
        Err(self.unsupported(node))
    }
    fn generate_index(&mut self, _dag: &OpDag, node: &OpNode) -> Result<String> {
        Err(self.unsupported(node))
    }
    fn generate_shuffle(&mut self, _dag: &OpDag, node: &OpNode) -> Result<String> {
        Err(self.unsupported(node))
    }
    fn generate_multiply(&mut self, _dag: &OpDag, node: &OpNode) -> Result<String> {
        Err(self.unsupported(node))
    }
    fn generate_divide(&mut self, _dag: &OpDag, node: &OpNode) -> Result<String> {
        Err(self.unsupported(node))
    }
    fn generate_filter(&mut self, _dag: &OpDag, node: &OpNode) -> Result<String> {
        Err(self.unsupported(node))
    }
    fn generate_sort_by(&mut self, _dag: &OpDag, node: &OpNode) -> Result<String> {
        Err(self.unsupported(node))
    }
    fn generate_comp_neighs(&mut self, _dag: &OpDag, node: &OpNode) -> Result<String> {
        Err(self.unsupported(node))
    }
    fn generate_distinct(&mut self, _dag: &OpDag, node: &OpNode) -> Result<String> {
        Err(self.unsupported(node))
    }
    fn generate_join(&mut self, _dag: &OpDag, node: &OpNode) -> Result<String> {
        Err(self.unsupported(node))
    }
    fn generate_index_join(&mut self, _dag: &OpDag, node: &OpNode) -> Result<String> {
        Err(self.unsupported(node))
    }
    fn generate_reveal_join(&mut self, _dag: &OpDag, node: &OpNode) -> Result<String> {
        Err(self.unsupported(node))
    }
    fn generate_hybrid_join(&mut self, _dag: &OpDag, node: &OpNode) -> Result<String> {
        Err(self.unsupported(node))
    }
    fn generate_concat(&mut self, _dag: &OpDag, node: &OpNode) -> Result<String> {
        Err(self.unsupported(node))
    }
}
