//! Specialized operators and the pass that introduces them.
//!
//! A derivation never mutates the generic node in place. It adds a new node
//! with the same output relation, moves every parent and child edge onto it
//! and leaves the generic node detached:
//!
//! | derivation                      | parents of the new node              |
//! |---------------------------------|--------------------------------------|
//! | `index_join_from_join`          | left, right, index                   |
//! | `reveal_join_from_join`         | left, right                          |
//! | `hybrid_join_from_join`         | left, right                          |
//! | `index_aggregate_from_aggregate`| input, eq flags, sorted keys         |
//!
//! Children keep their named slot (left/right, concat position).

use conclave_core::config::CompilerConfig;
use conclave_core::dag::OpDag;
use conclave_core::error::{Error, Result};
use conclave_core::id::{NodeId, PartyId};
use conclave_core::op::{
    HybridJoin, IndexAggregate, IndexJoin, Join, JoinSide, OpKind, Operator, RevealJoin,
};
use conclave_core::schema::PartySet;
use tracing::{debug, info, warn};

/// Payload and named parents of a generic `Join`.
fn generic_join(dag: &OpDag, id: NodeId) -> Result<(Join, NodeId, NodeId)> {
    let node = dag.node(id)?;
    let Operator::Join(join) = node.op() else {
        return Err(Error::Precondition(format!(
            "{} is not a generic join",
            dag.describe(id)
        )));
    };
    match (node.left_parent(), node.right_parent()) {
        (Some(left), Some(right)) => Ok((join.clone(), left, right)),
        _ => Err(Error::Precondition(format!(
            "{} is missing a join input",
            dag.describe(id)
        ))),
    }
}

/// Put a node carrying `op` in place of `old`, linked below `parents` in
/// order, and hand it every child of `old`.
fn substitute(dag: &mut OpDag, old: NodeId, op: Operator, parents: &[NodeId]) -> Result<NodeId> {
    let old_node = dag.node(old)?;
    let out_rel = old_node.out_rel().clone();
    let was_mpc = old_node.is_mpc;
    let children: Vec<NodeId> = old_node.children().iter().copied().collect();

    dag.make_orphan(old)?;
    let new = dag.add_node(op, out_rel);
    dag.node_mut(new)?.is_mpc |= was_mpc;
    for p in parents {
        dag.link(*p, new)?;
    }
    for child in &children {
        dag.replace_parent(*child, old, new)?;
        dag.update_op_specific_cols(*child)?;
    }
    // out_rel is carried over as is, including any collect() override, so
    // only the column references are re-resolved.
    dag.update_op_specific_cols(new)?;

    debug!(
        old = %old,
        new = %new,
        kind = %dag[new].kind(),
        children = children.len(),
        "specialized {}",
        dag[new].out_rel().name()
    );
    Ok(new)
}

/// Replace the generic join `join` with an `IndexJoin` aligned through
/// `index_op`, which becomes the third parent.
pub fn index_join_from_join(dag: &mut OpDag, join: NodeId, index_op: NodeId) -> Result<NodeId> {
    let (payload, left, right) = generic_join(dag, join)?;
    dag.node(index_op)?;
    let op = Operator::IndexJoin(IndexJoin {
        join: payload,
        index_op,
    });
    substitute(dag, join, op, &[left, right, index_op])
}

/// Replace the generic join `join` with a `RevealJoin` that opens the
/// `revealed` input to `recipient`.
pub fn reveal_join_from_join(
    dag: &mut OpDag,
    join: NodeId,
    revealed: JoinSide,
    recipient: PartyId,
) -> Result<NodeId> {
    let (payload, left, right) = generic_join(dag, join)?;
    let side = match revealed {
        JoinSide::Left => left,
        JoinSide::Right => right,
    };
    let revealed_in_rel = dag.node(side)?.out_rel().clone();
    let op = Operator::RevealJoin(RevealJoin {
        join: payload,
        revealed,
        revealed_in_rel,
        recipient,
    });
    substitute(dag, join, op, &[left, right])
}

/// Replace the generic join `join` with a `HybridJoin` whose key matching
/// runs in the clear at `trusted_party`. Every child of `join` is moved to
/// the returned node.
pub fn hybrid_join_from_join(dag: &mut OpDag, join: NodeId, trusted_party: PartyId) -> Result<NodeId> {
    let (payload, left, right) = generic_join(dag, join)?;
    let op = Operator::HybridJoin(HybridJoin {
        join: payload,
        trusted_party,
    });
    substitute(dag, join, op, &[left, right])
}

/// Replace the aggregation `agg` with an `IndexAggregate` fed by the
/// equality-flag and sorted-key helper nodes.
pub fn index_aggregate_from_aggregate(
    dag: &mut OpDag,
    agg: NodeId,
    eq_flag_op: NodeId,
    sorted_keys_op: NodeId,
) -> Result<NodeId> {
    let node = dag.node(agg)?;
    let Operator::Aggregate(payload) = node.op() else {
        return Err(Error::Precondition(format!(
            "{} is not an aggregation",
            dag.describe(agg)
        )));
    };
    let payload = payload.clone();
    let input = node.parent().ok_or_else(|| {
        Error::Precondition(format!("{} has no input", dag.describe(agg)))
    })?;
    dag.node(eq_flag_op)?;
    dag.node(sorted_keys_op)?;
    let op = Operator::IndexAggregate(IndexAggregate {
        agg: payload,
        eq_flag_op,
        sorted_keys_op,
    });
    substitute(dag, agg, op, &[input, eq_flag_op, sorted_keys_op])
}

/// Whether `join` may become a `RevealJoin`: its output goes to a single
/// party that already holds one input, so the other input can be revealed
/// to that party. Returns the side to reveal and the recipient.
///
/// Key uniqueness of the revealed join column is not tracked; callers that
/// act on this must know it holds.
pub fn reveal_join_candidate(dag: &OpDag, join: NodeId) -> Option<(JoinSide, PartyId)> {
    let (_, left, right) = generic_join(dag, join).ok()?;
    if !dag.requires_mpc(join) {
        return None;
    }
    let out = dag[join].out_rel().stored_with();
    if out.len() != 1 {
        return None;
    }
    let recipient = *out.iter().next()?;
    if dag[left].out_rel().stored_with() == out {
        Some((JoinSide::Right, recipient))
    } else if dag[right].out_rel().stored_with() == out {
        Some((JoinSide::Left, recipient))
    } else {
        None
    }
}

/// Whether `join` may become a `HybridJoin`: some party is in the collusion
/// set of every key column on both sides. Returns the lowest such party.
pub fn hybrid_join_candidate(dag: &OpDag, join: NodeId) -> Option<PartyId> {
    let (payload, _, _) = generic_join(dag, join).ok()?;
    if !dag.requires_mpc(join) {
        return None;
    }
    let mut keys = payload
        .left_join_cols
        .iter()
        .chain(payload.right_join_cols.iter());
    let first: PartySet = keys.next()?.coll_set.clone();
    let trusted = keys.fold(first, |acc, col| acc.intersection(&col.coll_set).copied().collect());
    trusted.iter().next().copied()
}

/// Flag every reachable node that needs a secure protocol. Existing flags
/// are never cleared. Returns how many nodes changed.
pub fn mark_mpc(dag: &mut OpDag) -> Result<usize> {
    let mut changed = 0;
    for id in dag.top_sort(true)? {
        if !dag[id].is_mpc && dag.requires_mpc(id) {
            dag.node_mut(id)?.is_mpc = true;
            changed += 1;
        }
    }
    debug!(changed, "marked mpc nodes");
    Ok(changed)
}

/// Nodes introduced by `optimize`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OptimizeReport {
    pub hybrid_joins: Vec<NodeId>,
    pub reveal_joins: Vec<NodeId>,
    pub mpc_marked: usize,
}

/// Apply the join specializations `cfg` enables, then `mark_mpc`.
///
/// Hybrid joins are preferred over reveal joins when both apply.
pub fn optimize(dag: &mut OpDag, cfg: &CompilerConfig) -> Result<OptimizeReport> {
    cfg.validate()?;
    let mut report = OptimizeReport::default();

    for id in dag.top_sort(cfg.deterministic)? {
        if dag[id].kind() != OpKind::Join {
            continue;
        }
        if cfg.hybrid_joins {
            if let Some(party) = hybrid_join_candidate(dag, id) {
                report.hybrid_joins.push(hybrid_join_from_join(dag, id, party)?);
                verify(dag, cfg)?;
                continue;
            }
        }
        if cfg.reveal_joins {
            if let Some((side, party)) = reveal_join_candidate(dag, id) {
                report.reveal_joins.push(reveal_join_from_join(dag, id, side, party)?);
                verify(dag, cfg)?;
                continue;
            }
        }
        if dag.requires_mpc(id) {
            warn!(join = %id, "{} stays a full secure join", dag[id].out_rel().name());
        }
    }

    report.mpc_marked = mark_mpc(dag)?;
    info!(
        hybrid = report.hybrid_joins.len(),
        reveal = report.reveal_joins.len(),
        mpc = report.mpc_marked,
        "optimized plan"
    );
    Ok(report)
}

fn verify(dag: &OpDag, cfg: &CompilerConfig) -> Result<()> {
    if cfg.verify_rewrites {
        dag.validate()?;
    }
    Ok(())
}
