//! Arena-backed pushdown graph.
//!
//! Nodes and edges are addressed by dense integer ids; attributes live in
//! parallel tables indexed by those ids. The graph is immutable once
//! [`GraphBuilder::build`] returns, so it can be shared by `&` reference
//! across walk workers without synchronization.

use crate::error::{Result, WalkError};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u32);

impl NodeId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LabelId(pub u32);

impl LabelId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for LabelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "L{}", self.0)
    }
}

// Next id for a table holding `len` entries.
fn dense_id(len: usize, table: &'static str) -> Result<u32> {
    u32::try_from(len).map_err(|_| WalkError::CapacityExceeded(table))
}

/// `LabelId -> display string` table. Interning the same text twice returns
/// the same id.
#[derive(Debug, Clone, Default)]
pub struct LabelTable {
    names: Vec<String>,
    index: HashMap<String, LabelId>,
}

impl LabelTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fails with [`WalkError::CapacityExceeded`] once every 32-bit id is taken.
    pub fn intern(&mut self, name: &str) -> Result<LabelId> {
        if let Some(&id) = self.index.get(name) {
            return Ok(id);
        }
        let id = LabelId(dense_id(self.names.len(), "labels")?);
        self.names.push(name.to_owned());
        self.index.insert(name.to_owned(), id);
        Ok(id)
    }

    pub fn get(&self, id: LabelId) -> Option<&str> {
        self.names.get(id.index()).map(String::as_str)
    }

    pub fn lookup(&self, name: &str) -> Option<LabelId> {
        self.index.get(name).copied()
    }

    pub fn contains(&self, id: LabelId) -> bool {
        id.index() < self.names.len()
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (LabelId, &str)> {
        self.names
            .iter()
            .enumerate()
            .map(|(i, name)| (LabelId(i as u32), name.as_str()))
    }
}

/// Attributes of one edge instance. Parallel edges between the same pair of
/// nodes each get their own `EdgeAttrs`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EdgeAttrs {
    /// Labels emitted when the edge is followed, in order. May be empty.
    pub labels: Vec<LabelId>,
    /// Return site pushed onto the stack when this call edge is taken.
    pub push: Option<NodeId>,
    /// Opaque source location from the extractor.
    pub location: String,
}

impl EdgeAttrs {
    pub fn is_call(&self) -> bool {
        self.push.is_some()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NodeAttrs<'a> {
    /// Set on call sites: the fallthrough node reached when the call is skipped
    /// (and the node pushed when it is entered).
    pub return_node: Option<NodeId>,
    /// Set on function-exit nodes: plausible return sites used when the
    /// stack is empty.
    pub may_return_targets: &'a [NodeId],
}

/// Read-only view over a pushdown graph.
///
/// The transition policy only needs these three queries, so any graph
/// representation that can answer them can be walked.
pub trait CallGraph {
    fn node_count(&self) -> usize;

    /// Distinct successors of `node`, ignoring parallel-edge multiplicity.
    fn neighbors(&self, node: NodeId) -> Result<&[NodeId]>;

    /// All parallel edges `u -> v`. Empty when `v` is not a successor of `u`.
    fn edge_variants(&self, u: NodeId, v: NodeId) -> Result<&[EdgeAttrs]>;

    fn node_attrs(&self, node: NodeId) -> Result<NodeAttrs<'_>>;

    fn out_degree(&self, node: NodeId) -> Result<usize> {
        Ok(self.neighbors(node)?.len())
    }
}

/// A place a walk may start from: the target of an edge tagged with the start
/// label, together with that edge's full label group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Anchor {
    pub node: NodeId,
    pub labels: Vec<LabelId>,
}

#[derive(Debug, Clone)]
pub struct PushdownGraph {
    names: Vec<String>,
    by_name: HashMap<String, NodeId>,
    // `neighbors[u][slot]` and `variants[u][slot]` describe the same successor.
    neighbors: Vec<Vec<NodeId>>,
    variants: Vec<Vec<Vec<EdgeAttrs>>>,
    return_node: Vec<Option<NodeId>>,
    may_return: Vec<Vec<NodeId>>,
    labels: LabelTable,
    // Sorted by label id; `anchors[i]` belongs to `start_labels[i]`.
    start_labels: Vec<LabelId>,
    anchors: Vec<Vec<Anchor>>,
    edge_count: usize,
}

impl PushdownGraph {
    pub fn builder() -> GraphBuilder {
        GraphBuilder::new()
    }

    pub fn edge_count(&self) -> usize {
        self.edge_count
    }

    pub fn labels(&self) -> &LabelTable {
        &self.labels
    }

    pub fn name(&self, node: NodeId) -> Result<&str> {
        self.names
            .get(node.index())
            .map(String::as_str)
            .ok_or(WalkError::UnknownNode(node))
    }

    pub fn node_by_name(&self, name: &str) -> Option<NodeId> {
        self.by_name.get(name).copied()
    }

    pub fn nodes(&self) -> impl Iterator<Item = NodeId> {
        (0..self.names.len()).map(|i| NodeId(i as u32))
    }

    /// Every label that tags at least one edge, ascending by id.
    pub fn start_labels(&self) -> &[LabelId] {
        &self.start_labels
    }

    pub fn anchors(&self, label: LabelId) -> Result<&[Anchor]> {
        self.start_labels
            .binary_search(&label)
            .map(|i| self.anchors[i].as_slice())
            .map_err(|_| WalkError::UnknownLabel(label))
    }

    fn check(&self, node: NodeId) -> Result<()> {
        if node.index() < self.names.len() {
            Ok(())
        } else {
            Err(WalkError::UnknownNode(node))
        }
    }
}

impl CallGraph for PushdownGraph {
    fn node_count(&self) -> usize {
        self.names.len()
    }

    fn neighbors(&self, node: NodeId) -> Result<&[NodeId]> {
        self.neighbors
            .get(node.index())
            .map(Vec::as_slice)
            .ok_or(WalkError::UnknownNode(node))
    }

    fn edge_variants(&self, u: NodeId, v: NodeId) -> Result<&[EdgeAttrs]> {
        let nbrs = self.neighbors(u)?;
        Ok(match nbrs.iter().position(|&x| x == v) {
            Some(slot) => &self.variants[u.index()][slot],
            None => &[],
        })
    }

    fn node_attrs(&self, node: NodeId) -> Result<NodeAttrs<'_>> {
        self.check(node)?;
        Ok(NodeAttrs {
            return_node: self.return_node[node.index()],
            may_return_targets: &self.may_return[node.index()],
        })
    }
}

/// Mutable construction side of [`PushdownGraph`].
///
/// Nodes are interned by name; every id handed out by [`GraphBuilder::node`]
/// is guaranteed to exist in the built graph.
#[derive(Debug, Default)]
pub struct GraphBuilder {
    names: Vec<String>,
    by_name: HashMap<String, NodeId>,
    neighbors: Vec<Vec<NodeId>>,
    variants: Vec<Vec<Vec<EdgeAttrs>>>,
    slots: HashMap<(NodeId, NodeId), usize>,
    return_node: Vec<Option<NodeId>>,
    may_return: Vec<Vec<NodeId>>,
    labels: LabelTable,
    edge_count: usize,
}

impl GraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the id for `name`, creating the node on first use.
    pub fn node(&mut self, name: &str) -> Result<NodeId> {
        if let Some(&id) = self.by_name.get(name) {
            return Ok(id);
        }
        let id = NodeId(dense_id(self.names.len(), "nodes")?);
        self.names.push(name.to_owned());
        self.by_name.insert(name.to_owned(), id);
        self.neighbors.push(Vec::new());
        self.variants.push(Vec::new());
        self.return_node.push(None);
        self.may_return.push(Vec::new());
        Ok(id)
    }

    pub fn labels_mut(&mut self) -> &mut LabelTable {
        &mut self.labels
    }

    pub fn label(&mut self, name: &str) -> Result<LabelId> {
        self.labels.intern(name)
    }

    pub fn add_edge(
        &mut self,
        u: NodeId,
        v: NodeId,
        labels: Vec<LabelId>,
        push: Option<NodeId>,
        location: impl Into<String>,
    ) -> Result<()> {
        self.check(u)?;
        self.check(v)?;
        if let Some(p) = push {
            self.check(p)?;
        }
        if let Some(&bad) = labels.iter().find(|l| !self.labels.contains(**l)) {
            return Err(WalkError::UnknownLabel(bad));
        }

        let attrs = EdgeAttrs {
            labels,
            push,
            location: location.into(),
        };
        let slot = match self.slots.get(&(u, v)) {
            Some(&slot) => slot,
            None => {
                let slot = self.neighbors[u.index()].len();
                self.neighbors[u.index()].push(v);
                self.variants[u.index()].push(Vec::new());
                self.slots.insert((u, v), slot);
                slot
            }
        };
        self.variants[u.index()][slot].push(attrs);
        self.edge_count += 1;
        Ok(())
    }

    /// Marks `u` as a call site whose fallthrough is `v`.
    pub fn set_return_node(&mut self, u: NodeId, v: NodeId) -> Result<()> {
        self.check(u)?;
        self.check(v)?;
        self.return_node[u.index()] = Some(v);
        Ok(())
    }

    pub fn add_may_return_target(&mut self, u: NodeId, target: NodeId) -> Result<()> {
        self.check(u)?;
        self.check(target)?;
        self.may_return[u.index()].push(target);
        Ok(())
    }

    pub fn return_node(&self, u: NodeId) -> Option<NodeId> {
        self.return_node.get(u.index()).copied().flatten()
    }

    pub fn build(self) -> PushdownGraph {
        let mut by_label: BTreeMap<LabelId, Vec<Anchor>> = BTreeMap::new();
        for (u, slots) in self.variants.iter().enumerate() {
            for (slot, edges) in slots.iter().enumerate() {
                let v = self.neighbors[u][slot];
                for edge in edges {
                    for &label in &edge.labels {
                        by_label.entry(label).or_default().push(Anchor {
                            node: v,
                            labels: edge.labels.clone(),
                        });
                    }
                }
            }
        }
        let (start_labels, anchors): (Vec<LabelId>, Vec<Vec<Anchor>>) =
            by_label.into_iter().unzip();

        PushdownGraph {
            names: self.names,
            by_name: self.by_name,
            neighbors: self.neighbors,
            variants: self.variants,
            return_node: self.return_node,
            may_return: self.may_return,
            labels: self.labels,
            start_labels,
            anchors,
            edge_count: self.edge_count,
        }
    }

    fn check(&self, node: NodeId) -> Result<()> {
        if node.index() < self.names.len() {
            Ok(())
        } else {
            Err(WalkError::UnknownNode(node))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parallel_edges_share_one_neighbor_slot() {
        let mut b = GraphBuilder::new();
        let (u, v, w) = (b.node("f.0").unwrap(), b.node("f.1").unwrap(), b.node("f.2").unwrap());
        let x = b.label("x").unwrap();
        let y = b.label("y").unwrap();
        b.add_edge(u, v, vec![x], None, "a.c:1").unwrap();
        b.add_edge(u, v, vec![y], None, "a.c:2").unwrap();
        b.add_edge(u, w, vec![], None, "").unwrap();
        let g = b.build();

        assert_eq!(g.neighbors(u).unwrap(), &[v, w]);
        assert_eq!(g.edge_count(), 3);
        let variants = g.edge_variants(u, v).unwrap();
        assert_eq!(variants.len(), 2);
        assert_eq!(variants[0].labels, vec![x]);
        assert_eq!(variants[1].labels, vec![y]);
        assert!(g.edge_variants(v, u).unwrap().is_empty());
    }

    #[test]
    fn unknown_nodes_are_rejected() {
        let mut b = GraphBuilder::new();
        let u = b.node("f.0").unwrap();
        let ghost = NodeId(7);
        assert!(matches!(
            b.add_edge(u, ghost, vec![], None, ""),
            Err(WalkError::UnknownNode(n)) if n == ghost
        ));
        assert!(b.set_return_node(ghost, u).is_err());

        let g = b.build();
        assert!(matches!(g.neighbors(ghost), Err(WalkError::UnknownNode(_))));
        assert!(g.node_attrs(ghost).is_err());
    }

    #[cfg(target_pointer_width = "64")]
    #[test]
    fn ids_beyond_u32_are_refused() {
        assert_eq!(dense_id(u32::MAX as usize, "nodes").unwrap(), u32::MAX);
        assert!(matches!(
            dense_id(u32::MAX as usize + 1, "labels"),
            Err(WalkError::CapacityExceeded("labels"))
        ));
    }

    #[test]
    fn interning_is_idempotent() {
        let mut table = LabelTable::new();
        let a = table.intern("F2V_INST_load").unwrap();
        assert_eq!(table.intern("F2V_INST_load").unwrap(), a);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn labels_must_exist_in_table() {
        let mut b = GraphBuilder::new();
        let (u, v) = (b.node("f.0").unwrap(), b.node("f.1").unwrap());
        let err = b.add_edge(u, v, vec![LabelId(3)], None, "").unwrap_err();
        assert!(matches!(err, WalkError::UnknownLabel(LabelId(3))));
    }

    #[test]
    fn anchors_point_at_edge_targets_with_whole_label_group() {
        let mut b = GraphBuilder::new();
        let (s, a, c) = (b.node("f.0").unwrap(), b.node("f.1").unwrap(), b.node("g.0").unwrap());
        let open = b.label("open").unwrap();
        let close = b.label("close").unwrap();
        b.add_edge(s, a, vec![open, close], None, "").unwrap();
        b.add_edge(a, c, vec![close], None, "").unwrap();
        let g = b.build();

        assert_eq!(g.start_labels(), &[open, close]);
        assert_eq!(
            g.anchors(open).unwrap(),
            &[Anchor { node: a, labels: vec![open, close] }]
        );
        assert_eq!(g.anchors(close).unwrap().len(), 2);
        assert!(g.anchors(LabelId(9)).is_err());
    }

    #[test]
    fn node_attrs_reflect_call_and_exit_markers() {
        let mut b = GraphBuilder::new();
        let call = b.node("f.0").unwrap();
        let ret = b.node("f.1").unwrap();
        let exit = b.node("g.9").unwrap();
        b.set_return_node(call, ret).unwrap();
        b.add_may_return_target(exit, ret).unwrap();
        let g = b.build();

        assert_eq!(g.node_attrs(call).unwrap().return_node, Some(ret));
        assert_eq!(g.node_attrs(exit).unwrap().may_return_targets, &[ret]);
        assert_eq!(g.node_attrs(ret).unwrap(), NodeAttrs::default());
        assert_eq!(g.node_by_name("g.9"), Some(exit));
        assert_eq!(g.name(exit).unwrap(), "g.9");
    }
}
