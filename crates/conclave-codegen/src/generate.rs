//! Exhaustive dispatch of a sorted DAG onto a `CodeGen` backend.

use serde::Serialize;
use tracing::{debug, trace};

use conclave_core::dag::{OpDag, OpNode};
use conclave_core::hash::{hash_str, Hash256};
use conclave_core::op::Operator;

use crate::error::Result;
use crate::traits::CodeGen;

/// Generated code for one workflow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Job {
    pub name: String,
    pub backend: &'static str,
    pub code: String,
    /// Number of operators emitted.
    pub ops: usize,
    /// Digest of `code`.
    pub code_hash: Hash256,
    /// `OpDag::fingerprint` of the plan the code came from.
    pub plan_fingerprint: Hash256,
}

fn dispatch<G: CodeGen + ?Sized>(gen: &mut G, dag: &OpDag, node: &OpNode) -> Result<String> {
    match node.op() {
        Operator::Create => gen.generate_create(dag, node),
        Operator::Store => gen.generate_store(dag, node),
        Operator::Persist => gen.generate_persist(dag, node),
        Operator::Open => gen.generate_open(dag, node),
        Operator::Close => gen.generate_close(dag, node),
        Operator::Send => gen.generate_send(dag, node),
        Operator::Aggregate(_) => gen.generate_aggregate(dag, node),
        Operator::IndexAggregate(_) => gen.generate_index_aggregate(dag, node),
        Operator::Project(_) => gen.generate_project(dag, node),
        Operator::Index(_) => gen.generate_index(dag, node),
        Operator::Shuffle => gen.generate_shuffle(dag, node),
        Operator::Multiply(_) => gen.generate_multiply(dag, node),
        Operator::Divide(_) => gen.generate_divide(dag, node),
        Operator::Filter(_) => gen.generate_filter(dag, node),
        Operator::SortBy(_) => gen.generate_sort_by(dag, node),
        Operator::CompNeighs(_) => gen.generate_comp_neighs(dag, node),
        Operator::Distinct(_) => gen.generate_distinct(dag, node),
        Operator::Join(_) => gen.generate_join(dag, node),
        Operator::IndexJoin(_) => gen.generate_index_join(dag, node),
        Operator::RevealJoin(_) => gen.generate_reveal_join(dag, node),
        Operator::HybridJoin(_) => gen.generate_hybrid_join(dag, node),
        Operator::Concat => gen.generate_concat(dag, node),
    }
}

/// Emit code for every reachable node of `dag` in topological order and
/// wrap it with the backend's job template.
///
/// The first node the backend cannot handle aborts generation.
pub fn generate<G: CodeGen + ?Sized>(
    gen: &mut G,
    dag: &OpDag,
    job_name: &str,
    deterministic: bool,
) -> Result<Job> {
    let order = dag.top_sort(deterministic)?;
    let mut op_code = String::new();
    for id in &order {
        let node = &dag[*id];
        let fragment = dispatch(gen, dag, node)?;
        trace!(node = %id, kind = %node.kind(), bytes = fragment.len(), "emitted");
        op_code.push_str(&fragment);
    }
    let code = gen.generate_job(job_name, &op_code)?;
    let job = Job {
        name: job_name.to_string(),
        backend: gen.backend(),
        code_hash: hash_str(&code),
        code,
        ops: order.len(),
        plan_fingerprint: dag.fingerprint(deterministic)?,
    };
    debug!(
        job = job_name,
        backend = job.backend,
        ops = job.ops,
        code = %job.code_hash.short(),
        "generated job"
    );
    Ok(job)
}
