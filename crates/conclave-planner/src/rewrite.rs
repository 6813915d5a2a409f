//! Splice primitives for unary-shaped nodes.
//!
//! An inserted node is fully refreshed (op-specific columns + `stored_with`)
//! against its new parent. A displaced child only has its column references
//! re-resolved; its `stored_with` is left alone so a `collect()` placement
//! survives the splice. The primitives only handle nodes with at most one
//! parent and one child; anything wider is rejected before any edge changes.

use conclave_core::dag::OpDag;
use conclave_core::error::{Error, Result};
use conclave_core::id::NodeId;
use conclave_core::op::Arity;
use tracing::debug;

fn ensure_unary_shaped(dag: &OpDag, id: NodeId) -> Result<()> {
    let node = dag.node(id)?;
    if node.kind().arity() != Arity::Unary || node.parents().len() > 1 || node.children().len() > 1 {
        return Err(Error::Precondition(format!(
            "{} is not unary-shaped ({} parents, {} children)",
            dag.describe(id),
            node.parents().len(),
            node.children().len()
        )));
    }
    Ok(())
}

fn ensure_fresh(dag: &OpDag, id: NodeId) -> Result<()> {
    ensure_unary_shaped(dag, id)?;
    let node = dag.node(id)?;
    if !node.parents().is_empty() || !node.children().is_empty() || dag.roots().contains(&id) {
        return Err(Error::Precondition(format!(
            "{} is already wired into the graph",
            dag.describe(id)
        )));
    }
    Ok(())
}

fn ensure_edge(dag: &OpDag, parent: NodeId, child: NodeId) -> Result<()> {
    if dag.has_edge(parent, child) {
        Ok(())
    } else {
        Err(Error::Precondition(format!(
            "no edge {} -> {}",
            dag.describe(parent),
            dag.describe(child)
        )))
    }
}

/// Detach `node` from between `parent` and `child`, connecting `parent`
/// straight to `child` when there is one. `node` ends up with no edges.
pub fn remove_between(dag: &mut OpDag, parent: NodeId, child: Option<NodeId>, node: NodeId) -> Result<()> {
    ensure_unary_shaped(dag, node)?;
    ensure_edge(dag, parent, node)?;
    match child {
        Some(child) => ensure_edge(dag, node, child)?,
        None if !dag[node].children().is_empty() => {
            return Err(Error::Precondition(format!(
                "{} still has a child; name it to reconnect",
                dag.describe(node)
            )));
        }
        None => {}
    }
    if let Some(child) = child {
        dag.replace_parent(child, node, parent)?;
        dag.update_op_specific_cols(child)?;
    }
    dag.isolate(node)?;
    debug!(
        node = %node,
        parent = %parent,
        child = ?child,
        "removed {}",
        dag[node].out_rel().name()
    );
    Ok(())
}

/// Splice the detached `node` directly below `parent`. If `child` is given,
/// it moves from `parent` to `node`.
pub fn insert_between(dag: &mut OpDag, parent: NodeId, child: Option<NodeId>, node: NodeId) -> Result<()> {
    ensure_fresh(dag, node)?;
    dag.node(parent)?;
    if let Some(child) = child {
        ensure_edge(dag, parent, child)?;
    }
    dag.link(parent, node)?;
    dag.refresh(node)?;
    if let Some(child) = child {
        dag.replace_parent(child, parent, node)?;
        dag.update_op_specific_cols(child)?;
    }
    debug!(
        node = %node,
        parent = %parent,
        child = ?child,
        "inserted {}",
        dag[node].out_rel().name()
    );
    Ok(())
}

/// Splice the detached `node` between `parent` and all of its current
/// children.
pub fn insert_between_children(dag: &mut OpDag, parent: NodeId, node: NodeId) -> Result<()> {
    ensure_fresh(dag, node)?;
    let children: Vec<NodeId> = dag.node(parent)?.children().iter().copied().collect();
    dag.link(parent, node)?;
    dag.refresh(node)?;
    for child in &children {
        dag.replace_parent(*child, parent, node)?;
        dag.update_op_specific_cols(*child)?;
    }
    debug!(
        node = %node,
        parent = %parent,
        moved = children.len(),
        "inserted {} above fan-out",
        dag[node].out_rel().name()
    );
    Ok(())
}
