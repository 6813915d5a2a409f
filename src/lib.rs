#![forbid(unsafe_code)]
//! conclave: a privacy-annotated relational IR for secure multi-party
//! workflows.
//!
//! - `conclave_core`: relations, operators and the operator DAG.
//! - `conclave_planner`: builders, rewrites, specializations, YAML workflows.
//! - `conclave_codegen`: backend interface and the `Explain` listing.

pub use conclave_codegen as codegen;
pub use conclave_core as ir;
pub use conclave_planner as planner;

pub mod prelude {
    pub use conclave_codegen::{generate, CodeGen, CodegenError, Explain, Job};
    pub use conclave_core::prelude::*;
    pub use conclave_planner::builder::{self, ColumnDef, OperandSpec};
    pub use conclave_planner::rewrite::{insert_between, insert_between_children, remove_between};
    pub use conclave_planner::rules::{self, optimize, OptimizeReport};
    pub use conclave_planner::{parse_yaml_workflow, ParsedWorkflow, PlanError};
}
