// src/dag/graph.rs

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use super::node::{GraphNode, NodeId, NodeKind};

/// Forward edges: node -> its direct dependencies, in declaration order.
pub type Edges = BTreeMap<NodeId, Vec<NodeId>>;

/// Resolved recipe instances plus their dependency edges.
///
/// The inverse edges (dependency -> dependents) are kept in step with the
/// forward ones so watch mode can walk upwards from a changed source.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    nodes: BTreeMap<NodeId, GraphNode>,
    forward: Edges,
    dependents: BTreeMap<NodeId, BTreeSet<NodeId>>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, id: &NodeId) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn node(&self, id: &NodeId) -> Option<&GraphNode> {
        self.nodes.get(id)
    }

    pub fn node_mut(&mut self, id: &NodeId) -> Option<&mut GraphNode> {
        self.nodes.get_mut(id)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &GraphNode> {
        self.nodes.values()
    }

    pub fn ids(&self) -> impl Iterator<Item = &NodeId> {
        self.nodes.keys()
    }

    /// Register a node without edges. An existing node with the same id is
    /// left untouched.
    pub fn insert(&mut self, node: GraphNode) {
        let id = node.id.clone();
        self.forward.entry(id.clone()).or_default();
        self.nodes.entry(id).or_insert(node);
    }

    /// Replace the dependency list of `id`. Duplicates are dropped, first
    /// occurrence wins.
    pub fn set_dependencies(&mut self, id: &NodeId, deps: Vec<NodeId>) {
        if let Some(old) = self.forward.get(id) {
            for dep in old {
                if let Some(set) = self.dependents.get_mut(dep) {
                    set.remove(id);
                }
            }
        }

        let mut seen = BTreeSet::new();
        let deps: Vec<NodeId> = deps.into_iter().filter(|d| seen.insert(d.clone())).collect();
        for dep in &deps {
            self.dependents
                .entry(dep.clone())
                .or_default()
                .insert(id.clone());
        }
        self.forward.insert(id.clone(), deps);
    }

    pub fn dependencies_of(&self, id: &NodeId) -> &[NodeId] {
        self.forward.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn dependents_of(&self, id: &NodeId) -> impl Iterator<Item = &NodeId> {
        self.dependents.get(id).into_iter().flatten()
    }

    pub fn edges(&self) -> &Edges {
        &self.forward
    }

    /// Every node that transitively depends on `id`, excluding `id`.
    pub fn ancestors_of(&self, id: &NodeId) -> BTreeSet<NodeId> {
        let mut out = BTreeSet::new();
        let mut queue: VecDeque<&NodeId> = self.dependents_of(id).collect();
        while let Some(next) = queue.pop_front() {
            if out.insert(next.clone()) {
                queue.extend(self.dependents_of(next));
            }
        }
        out
    }

    /// Nodes built from existing files.
    pub fn sources(&self) -> impl Iterator<Item = &GraphNode> {
        self.nodes
            .values()
            .filter(|n| n.kind == NodeKind::Source)
    }
}
