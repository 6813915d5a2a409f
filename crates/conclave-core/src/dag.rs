//! Arena-backed operator DAG.
//!
//! `OpDag` owns every `OpNode` in a flat arena indexed by `NodeId`; edges are
//! sets of ids kept on both endpoints. All structural mutation goes through
//! `OpDag` methods so the two sides of an edge, and the named parent mirrors
//! (`Inputs`), never drift apart.
//!
//! Nodes are never freed. A node that is no longer reachable from a declared
//! root simply stops taking part in traversal, sorting and code generation.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::ops;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::hash::{hash_serde, Hash256};
use crate::id::NodeId;
use crate::op::{Arity, InputRels, OpKind, Operator};
use crate::schema::{PartySet, Relation};

/// Named parent mirror kept next to the unordered parent set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Inputs {
    Unary(Option<NodeId>),
    Binary {
        left: Option<NodeId>,
        right: Option<NodeId>,
    },
    /// Parents in output-column order.
    Nary(Vec<NodeId>),
}

impl Inputs {
    fn empty(arity: Arity) -> Self {
        match arity {
            Arity::Unary => Inputs::Unary(None),
            Arity::Binary => Inputs::Binary {
                left: None,
                right: None,
            },
            Arity::Nary => Inputs::Nary(Vec::new()),
        }
    }

    fn attach(&mut self, parent: NodeId) {
        match self {
            Inputs::Unary(slot) => {
                if slot.is_none() {
                    *slot = Some(parent);
                }
            }
            Inputs::Binary { left, right } => {
                if left.is_none() {
                    *left = Some(parent);
                } else if right.is_none() {
                    *right = Some(parent);
                }
            }
            Inputs::Nary(ordered) => ordered.push(parent),
        }
    }

    fn detach(&mut self, parent: NodeId) -> Result<()> {
        match self {
            Inputs::Unary(slot) => {
                if *slot == Some(parent) {
                    *slot = None;
                }
            }
            Inputs::Binary { left, right } => {
                if *left == Some(parent) {
                    *left = None;
                }
                if *right == Some(parent) {
                    *right = None;
                }
            }
            Inputs::Nary(_) => {
                return Err(Error::Unsupported(
                    "removing a single parent from an ordered n-ary node",
                ))
            }
        }
        Ok(())
    }

    fn replace(&mut self, old: NodeId, new: NodeId) {
        let swap = |slot: &mut Option<NodeId>| {
            if *slot == Some(old) {
                *slot = Some(new);
            }
        };
        match self {
            Inputs::Unary(slot) => swap(slot),
            Inputs::Binary { left, right } => {
                swap(left);
                swap(right);
            }
            Inputs::Nary(ordered) => {
                for p in ordered.iter_mut().filter(|p| **p == old) {
                    *p = new;
                }
            }
        }
    }

    /// Named parents in declaration order (left before right, concat order).
    pub fn ids(&self) -> Vec<NodeId> {
        match self {
            Inputs::Unary(slot) => slot.iter().copied().collect(),
            Inputs::Binary { left, right } => left.iter().chain(right.iter()).copied().collect(),
            Inputs::Nary(ordered) => ordered.clone(),
        }
    }
}

/// One relational operator in the graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpNode {
    id: NodeId,
    op: Operator,
    out_rel: Relation,
    /// Each party can compute this operator on its own data.
    pub is_local: bool,
    /// The operator is, or borders, a secure computation.
    pub is_mpc: bool,
    inputs: Inputs,
    parents: BTreeSet<NodeId>,
    children: BTreeSet<NodeId>,
}

impl OpNode {
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Operator name, e.g. `"join"`.
    pub fn name(&self) -> &'static str {
        self.op.kind().name()
    }

    pub fn kind(&self) -> OpKind {
        self.op.kind()
    }

    pub fn op(&self) -> &Operator {
        &self.op
    }

    pub fn out_rel(&self) -> &Relation {
        &self.out_rel
    }

    pub fn inputs(&self) -> &Inputs {
        &self.inputs
    }

    pub fn parents(&self) -> &BTreeSet<NodeId> {
        &self.parents
    }

    pub fn children(&self) -> &BTreeSet<NodeId> {
        &self.children
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    pub fn is_root(&self) -> bool {
        self.parents.is_empty()
    }

    /// Single parent of a unary node.
    pub fn parent(&self) -> Option<NodeId> {
        match self.inputs {
            Inputs::Unary(p) => p,
            _ => None,
        }
    }

    pub fn left_parent(&self) -> Option<NodeId> {
        match self.inputs {
            Inputs::Binary { left, .. } => left,
            _ => None,
        }
    }

    pub fn right_parent(&self) -> Option<NodeId> {
        match self.inputs {
            Inputs::Binary { right, .. } => right,
            _ => None,
        }
    }
}

impl fmt::Display for OpNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{}->{}",
            self.name(),
            if self.is_mpc { "mpc" } else { "" },
            self.out_rel.name()
        )
    }
}

fn default_flags(kind: OpKind) -> (bool, bool) {
    use OpKind::*;
    let is_local = matches!(kind, Create | Project | Multiply | Divide | Filter);
    let is_mpc = matches!(kind, Open | Close | IndexJoin | RevealJoin | HybridJoin);
    (is_local, is_mpc)
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Temporary,
    Permanent,
}

#[derive(Serialize)]
struct FingerprintEntry<'a> {
    kind: OpKind,
    out_rel: &'a Relation,
    is_local: bool,
    is_mpc: bool,
    parents: Vec<&'a str>,
}

/// The operator graph. Owns all nodes and the set of declared roots.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OpDag {
    nodes: Vec<OpNode>,
    roots: BTreeSet<NodeId>,
}

impl ops::Index<NodeId> for OpDag {
    type Output = OpNode;

    /// # Panics
    /// If `id` was not issued by this graph.
    fn index(&self, id: NodeId) -> &OpNode {
        &self.nodes[id.slot()]
    }
}

impl OpDag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of nodes in the arena, including unreachable ones.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn get(&self, id: NodeId) -> Option<&OpNode> {
        self.nodes.get(id.slot())
    }

    pub fn node(&self, id: NodeId) -> Result<&OpNode> {
        self.get(id).ok_or(Error::UnknownNode(id))
    }

    /// Mutable access for the privacy flags; edges stay private.
    pub fn node_mut(&mut self, id: NodeId) -> Result<&mut OpNode> {
        self.nodes.get_mut(id.slot()).ok_or(Error::UnknownNode(id))
    }

    /// All arena nodes, reachable or not.
    pub fn iter(&self) -> impl Iterator<Item = &OpNode> {
        self.nodes.iter()
    }

    pub fn roots(&self) -> &BTreeSet<NodeId> {
        &self.roots
    }

    pub fn add_root(&mut self, id: NodeId) -> Result<()> {
        self.node(id)?;
        self.roots.insert(id);
        Ok(())
    }

    pub fn remove_root(&mut self, id: NodeId) -> bool {
        self.roots.remove(&id)
    }

    /// Add a detached node carrying `op`, with the operator's default
    /// `is_local`/`is_mpc` flags.
    pub fn add_node(&mut self, op: Operator, out_rel: Relation) -> NodeId {
        let id = NodeId::new(self.nodes.len() as u64);
        let (is_local, is_mpc) = default_flags(op.kind());
        let inputs = Inputs::empty(op.arity());
        self.nodes.push(OpNode {
            id,
            op,
            out_rel,
            is_local,
            is_mpc,
            inputs,
            parents: BTreeSet::new(),
            children: BTreeSet::new(),
        });
        id
    }

    fn slot_mut(&mut self, id: NodeId) -> Result<&mut OpNode> {
        self.nodes.get_mut(id.slot()).ok_or(Error::UnknownNode(id))
    }

    pub fn has_edge(&self, parent: NodeId, child: NodeId) -> bool {
        self.get(parent)
            .is_some_and(|p| p.children.contains(&child))
    }

    /// Record the edge `parent -> child` on both endpoints and fill the
    /// child's next free named parent slot (left before right; concat
    /// appends).
    pub fn link(&mut self, parent: NodeId, child: NodeId) -> Result<()> {
        self.node(parent)?;
        self.node(child)?;
        self.slot_mut(parent)?.children.insert(child);
        let c = self.slot_mut(child)?;
        c.parents.insert(parent);
        c.inputs.attach(parent);
        Ok(())
    }

    fn ensure_edge(&self, parent: NodeId, child: NodeId) -> Result<()> {
        self.node(parent)?;
        self.node(child)?;
        if self.has_edge(parent, child) {
            Ok(())
        } else {
            Err(Error::Precondition(format!(
                "no edge {} -> {}",
                self.describe(parent),
                self.describe(child)
            )))
        }
    }

    /// Drop the edge `parent -> child`. Fails for n-ary children, whose
    /// ordered parent list has no well-defined single removal.
    pub fn remove_parent(&mut self, child: NodeId, parent: NodeId) -> Result<()> {
        self.ensure_edge(parent, child)?;
        let c = self.slot_mut(child)?;
        c.inputs.detach(parent)?;
        c.parents.remove(&parent);
        self.slot_mut(parent)?.children.remove(&child);
        Ok(())
    }

    /// Move the edge `old -> child` to `new -> child`, keeping the child's
    /// named slot (and any auxiliary reference in its payload) in place.
    pub fn replace_parent(&mut self, child: NodeId, old: NodeId, new: NodeId) -> Result<()> {
        self.ensure_edge(old, child)?;
        self.node(new)?;
        self.slot_mut(old)?.children.remove(&child);
        self.slot_mut(new)?.children.insert(child);
        let c = self.slot_mut(child)?;
        c.parents.remove(&old);
        c.parents.insert(new);
        c.inputs.replace(old, new);
        match &mut c.op {
            Operator::IndexJoin(ij) if ij.index_op == old => ij.index_op = new,
            Operator::IndexAggregate(ia) => {
                if ia.eq_flag_op == old {
                    ia.eq_flag_op = new;
                }
                if ia.sorted_keys_op == old {
                    ia.sorted_keys_op = new;
                }
            }
            _ => {}
        }
        Ok(())
    }

    /// Move the edge `parent -> old` to `parent -> new`.
    pub fn replace_child(&mut self, parent: NodeId, old: NodeId, new: NodeId) -> Result<()> {
        self.remove_parent(old, parent)?;
        self.link(parent, new)
    }

    /// Remove every parent edge of `id`, clearing its named slots.
    pub fn make_orphan(&mut self, id: NodeId) -> Result<()> {
        let parents = std::mem::take(&mut self.slot_mut(id)?.parents);
        for p in parents {
            self.slot_mut(p)?.children.remove(&id);
        }
        let n = self.slot_mut(id)?;
        n.inputs = Inputs::empty(n.op.arity());
        Ok(())
    }

    /// Remove every edge touching `id`, leaving it fully detached.
    pub fn isolate(&mut self, id: NodeId) -> Result<()> {
        self.make_orphan(id)?;
        let children: Vec<NodeId> = self.node(id)?.children.iter().copied().collect();
        for c in children {
            self.remove_parent(c, id)?;
        }
        Ok(())
    }

    /// Overwrite the parties holding `id`'s output.
    pub fn set_stored_with(&mut self, id: NodeId, stored_with: PartySet) -> Result<()> {
        let n = self.slot_mut(id)?;
        n.out_rel = n.out_rel.with_stored_with(stored_with);
        Ok(())
    }

    /// Primary input relation of a unary node.
    pub fn in_rel(&self, id: NodeId) -> Option<&Relation> {
        let parent = self.get(id)?.parent()?;
        self.get(parent).map(|p| &p.out_rel)
    }

    pub fn left_in_rel(&self, id: NodeId) -> Option<&Relation> {
        let parent = self.get(id)?.left_parent()?;
        self.get(parent).map(|p| &p.out_rel)
    }

    pub fn right_in_rel(&self, id: NodeId) -> Option<&Relation> {
        let parent = self.get(id)?.right_parent()?;
        self.get(parent).map(|p| &p.out_rel)
    }

    /// Input relations in named-parent order.
    pub fn in_rels(&self, id: NodeId) -> Vec<&Relation> {
        self.get(id)
            .map(|n| {
                n.inputs
                    .ids()
                    .into_iter()
                    .filter_map(|p| self.get(p).map(|p| &p.out_rel))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Re-resolve `id`'s input-column references against its current
    /// parents.
    pub fn update_op_specific_cols(&mut self, id: NodeId) -> Result<()> {
        let primary = self.in_rel(id).cloned();
        let left = self.left_in_rel(id).cloned();
        let right = self.right_in_rel(id).cloned();
        let inputs = InputRels {
            primary: primary.as_ref(),
            left: left.as_ref(),
            right: right.as_ref(),
        };
        self.slot_mut(id)?.op.refresh_cols(inputs)
    }

    /// Recompute `stored_with` from the current inputs. Sources and the
    /// operators that explicitly redistribute data (open/close/send) keep
    /// their own value.
    pub fn update_stored_with(&mut self, id: NodeId) -> Result<()> {
        let node = self.node(id)?;
        let derived: Option<PartySet> = match node.kind() {
            OpKind::Create | OpKind::Open | OpKind::Close | OpKind::Send => None,
            _ => match node.op.arity() {
                Arity::Unary => self.in_rel(id).map(|r| r.stored_with().clone()),
                Arity::Binary | Arity::Nary => {
                    let rels = self.in_rels(id);
                    if rels.is_empty() {
                        None
                    } else {
                        Some(
                            rels.iter()
                                .flat_map(|r| r.stored_with().iter().copied())
                                .collect(),
                        )
                    }
                }
            },
        };
        if let Some(stored_with) = derived {
            self.set_stored_with(id, stored_with)?;
        }
        Ok(())
    }

    /// Both refresh steps; run after any reparent of `id`.
    pub fn refresh(&mut self, id: NodeId) -> Result<()> {
        self.update_op_specific_cols(id)?;
        self.update_stored_with(id)
    }

    /// Whether this node needs a secure protocol: its inputs are held by more
    /// than one party and it cannot be computed locally.
    ///
    /// # Panics
    /// If `id` was not issued by this graph.
    pub fn requires_mpc(&self, id: NodeId) -> bool {
        let node = &self[id];
        if node.kind() == OpKind::Create || node.is_local {
            return false;
        }
        match node.op.arity() {
            Arity::Unary => self.in_rel(id).is_some_and(Relation::is_shared),
            Arity::Binary | Arity::Nary => {
                let combined: PartySet = node
                    .parents
                    .iter()
                    .filter_map(|p| self.get(*p))
                    .flat_map(|p| p.out_rel.stored_with().iter().copied())
                    .collect();
                combined.len() > 1
            }
        }
    }

    /// # Panics
    /// If `id` was not issued by this graph.
    pub fn is_reversible(&self, id: NodeId) -> bool {
        self[id].op.is_reversible(self.in_rel(id))
    }

    /// MPC node with no MPC parent other than a `Close`: the start of a
    /// secure sub-job.
    ///
    /// # Panics
    /// If `id` was not issued by this graph.
    pub fn is_upper_boundary(&self, id: NodeId) -> bool {
        let node = &self[id];
        node.is_mpc
            && !node.parents.iter().any(|p| {
                let par = &self[*p];
                par.is_mpc && par.kind() != OpKind::Close
            })
    }

    /// MPC node with no MPC child other than an `Open`: the end of a secure
    /// sub-job.
    ///
    /// # Panics
    /// If `id` was not issued by this graph.
    pub fn is_lower_boundary(&self, id: NodeId) -> bool {
        let node = &self[id];
        node.is_mpc
            && !node.children.iter().any(|c| {
                let child = &self[*c];
                child.is_mpc && child.kind() != OpKind::Open
            })
    }

    /// # Panics
    /// If `id` was not issued by this graph.
    pub fn is_boundary(&self, id: NodeId) -> bool {
        self.is_upper_boundary(id)
    }

    fn sort_by_rel_name(&self, ids: &mut [NodeId]) {
        ids.sort_by(|a, b| {
            self[*a]
                .out_rel
                .name()
                .cmp(self[*b].out_rel.name())
                .then(a.cmp(b))
        });
    }

    /// Children ordered by output relation name.
    pub fn sorted_children(&self, id: NodeId) -> Vec<NodeId> {
        let mut ids: Vec<NodeId> = self[id].children.iter().copied().collect();
        self.sort_by_rel_name(&mut ids);
        ids
    }

    /// Parents ordered by output relation name.
    pub fn sorted_parents(&self, id: NodeId) -> Vec<NodeId> {
        let mut ids: Vec<NodeId> = self[id].parents.iter().copied().collect();
        self.sort_by_rel_name(&mut ids);
        ids
    }

    /// Depth-first walk from every root, calling `visitor` once per
    /// reachable node. Returns the visited set.
    pub fn dfs_visit<F>(&self, mut visitor: F) -> BTreeSet<NodeId>
    where
        F: FnMut(&OpNode),
    {
        let mut visited = BTreeSet::new();
        for root in &self.roots {
            self.dfs_visit_from(*root, &mut visitor, &mut visited);
        }
        visited
    }

    fn dfs_visit_from<F>(&self, id: NodeId, visitor: &mut F, visited: &mut BTreeSet<NodeId>)
    where
        F: FnMut(&OpNode),
    {
        if !visited.insert(id) {
            return;
        }
        let node = &self[id];
        visitor(node);
        for child in &node.children {
            self.dfs_visit_from(*child, visitor, visited);
        }
    }

    /// Every node reachable from the roots.
    pub fn get_all_nodes(&self) -> BTreeSet<NodeId> {
        self.dfs_visit(|_| {})
    }

    /// Topological order of all reachable nodes: every parent precedes each
    /// of its children.
    ///
    /// With `deterministic`, every choice point (the initial worklist and
    /// each node's children) is ordered by output relation name, so two
    /// graphs with the same shape and names sort identically.
    ///
    /// A cycle is reported as `Error::Cycle`; no partial order is returned.
    pub fn top_sort(&self, deterministic: bool) -> Result<Vec<NodeId>> {
        let mut unmarked: Vec<NodeId> = self.get_all_nodes().into_iter().collect();
        if deterministic {
            self.sort_by_rel_name(&mut unmarked);
        }
        let mut marks: HashMap<NodeId, Mark> = HashMap::with_capacity(unmarked.len());
        let mut finished = Vec::with_capacity(unmarked.len());
        while let Some(id) = unmarked.pop() {
            self.top_sort_visit(id, deterministic, &mut marks, &mut finished)?;
        }
        finished.reverse();
        Ok(finished)
    }

    fn top_sort_visit(
        &self,
        id: NodeId,
        deterministic: bool,
        marks: &mut HashMap<NodeId, Mark>,
        finished: &mut Vec<NodeId>,
    ) -> Result<()> {
        match marks.get(&id) {
            Some(Mark::Temporary) => return Err(Error::Cycle(self.describe(id))),
            Some(Mark::Permanent) => return Ok(()),
            None => {}
        }
        marks.insert(id, Mark::Temporary);
        let children = if deterministic {
            self.sorted_children(id)
        } else {
            self[id].children.iter().copied().collect()
        };
        for child in children {
            self.top_sort_visit(child, deterministic, marks, finished)?;
        }
        marks.insert(id, Mark::Permanent);
        finished.push(id);
        Ok(())
    }

    /// Check the bidirectional edge invariant and the named parent mirrors
    /// for every node in the arena.
    pub fn validate(&self) -> Result<()> {
        for node in &self.nodes {
            let id = node.id;
            for p in &node.parents {
                let parent = self.node(*p)?;
                if !parent.children.contains(&id) {
                    return Err(Error::Invariant(format!(
                        "{} lists parent {} which does not list it as a child",
                        self.describe(id),
                        self.describe(*p)
                    )));
                }
            }
            for c in &node.children {
                let child = self.node(*c)?;
                if !child.parents.contains(&id) {
                    return Err(Error::Invariant(format!(
                        "{} lists child {} which does not list it as a parent",
                        self.describe(id),
                        self.describe(*c)
                    )));
                }
            }

            let named = node.inputs.ids();
            // Detached nodes may keep stale auxiliary ids in their payload.
            let aux = if node.parents.is_empty() {
                Vec::new()
            } else {
                node.op.auxiliary_parents()
            };
            if let Some(stray) = named.iter().chain(aux.iter()).find(|p| !node.parents.contains(p)) {
                return Err(Error::Invariant(format!(
                    "{} names {} as an input without an edge",
                    self.describe(id),
                    stray
                )));
            }
            let unnamed = node
                .parents
                .iter()
                .find(|p| !named.contains(p) && !aux.contains(p));
            if let Some(p) = unnamed {
                return Err(Error::Invariant(format!(
                    "{} has parent {} missing from its named inputs",
                    self.describe(id),
                    self.describe(*p)
                )));
            }
            if let Inputs::Nary(ordered) = &node.inputs {
                let distinct: BTreeSet<&NodeId> = ordered.iter().collect();
                if distinct.len() != ordered.len() {
                    return Err(Error::Invariant(format!(
                        "{} has duplicate ordered parents",
                        self.describe(id)
                    )));
                }
            }
        }
        for root in &self.roots {
            if !self.node(*root)?.is_root() {
                return Err(Error::Invariant(format!(
                    "declared root {} has parents",
                    self.describe(*root)
                )));
            }
        }
        Ok(())
    }

    /// Stable digest of the sorted plan, for caching generated code.
    pub fn fingerprint(&self, deterministic: bool) -> Result<Hash256> {
        let order = self.top_sort(deterministic)?;
        let entries: Vec<FingerprintEntry<'_>> = order
            .iter()
            .map(|id| {
                let node = &self[*id];
                FingerprintEntry {
                    kind: node.kind(),
                    out_rel: &node.out_rel,
                    is_local: node.is_local,
                    is_mpc: node.is_mpc,
                    parents: node
                        .inputs
                        .ids()
                        .iter()
                        .chain(node.op.auxiliary_parents().iter())
                        .map(|p| self[*p].out_rel.name())
                        .collect(),
                }
            })
            .collect();
        hash_serde(&entries)
    }

    /// Short `kind->relation (#id)` label for diagnostics.
    pub fn describe(&self, id: NodeId) -> String {
        match self.get(id) {
            Some(n) => format!("{n} ({id})"),
            None => format!("<unknown {id}>"),
        }
    }
}
