//! Debug-time verification helpers for operator graphs.
//!
//! These functions are intended for tests and debug builds to catch
//! violations early (dangling edges, bad orders). They panic on failure.

use std::collections::HashSet;

use conclave_core::dag::OpDag;
use conclave_core::id::NodeId;

/// Verify that `order` lists every parent before each of its children.
pub fn assert_topological(dag: &OpDag, order: &[NodeId]) {
    let mut seen = HashSet::<NodeId>::new();
    for id in order {
        for p in dag[*id].parents() {
            if order.contains(p) {
                assert!(
                    seen.contains(p),
                    "parent {} not placed before {}",
                    dag.describe(*p),
                    dag.describe(*id)
                );
            }
        }
        seen.insert(*id);
    }
}

/// Verify the bidirectional edge invariant and the named parent mirrors.
pub fn assert_consistent(dag: &OpDag) {
    if let Err(e) = dag.validate() {
        panic!("graph invariant violated: {e}");
    }
}

/// Verify that `id` has no edges at all.
pub fn assert_detached(dag: &OpDag, id: NodeId) {
    let node = &dag[id];
    assert!(
        node.parents().is_empty() && node.children().is_empty(),
        "{} still has edges: parents {:?}, children {:?}",
        dag.describe(id),
        node.parents(),
        node.children()
    );
}
