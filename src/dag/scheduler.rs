// src/dag/scheduler.rs

//! Cycle detection, rank-based staging and diagnostic edge reduction.

use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::fmt::Write as _;

use petgraph::algo::has_path_connecting;
use petgraph::graphmap::DiGraphMap;

use super::graph::{DependencyGraph, Edges};
use super::node::NodeId;
use crate::errors::{EmkError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    InProgress,
    Done,
}

/// Every node mentioned by `edges`, either as a key or as a dependency.
fn all_nodes(edges: &Edges) -> BTreeSet<&NodeId> {
    edges
        .iter()
        .flat_map(|(id, deps)| std::iter::once(id).chain(deps.iter()))
        .collect()
}

fn inverse(edges: &Edges) -> BTreeMap<&NodeId, Vec<&NodeId>> {
    let mut inv: BTreeMap<&NodeId, Vec<&NodeId>> = BTreeMap::new();
    for (id, deps) in edges {
        for dep in deps {
            inv.entry(dep).or_default().push(id);
        }
    }
    inv
}

/// Three-colour depth-first search. The walk starts from nodes nobody
/// depends on, then covers whatever is left (which can only be cycles).
/// The reported node is the in-progress one that was reached again.
pub fn check_acyclic(edges: &Edges) -> Result<()> {
    let nodes = all_nodes(edges);
    let inv = inverse(edges);
    let roots = nodes.iter().copied().filter(|id| !inv.contains_key(id));
    let rest = nodes.iter().copied();

    let mut marks: HashMap<&NodeId, Mark> = HashMap::new();
    for start in roots.chain(rest) {
        if marks.contains_key(start) {
            continue;
        }
        // (node, index of the next dependency to visit)
        let mut stack: Vec<(&NodeId, usize)> = vec![(start, 0)];
        marks.insert(start, Mark::InProgress);

        while let Some((node, next)) = stack.last_mut() {
            let deps = edges.get(*node).map(Vec::as_slice).unwrap_or(&[]);
            match deps.get(*next) {
                Some(dep) => {
                    *next += 1;
                    match marks.get(dep) {
                        Some(Mark::InProgress) => {
                            return Err(EmkError::CycleDetected {
                                node: dep.to_string(),
                            });
                        }
                        Some(Mark::Done) => {}
                        None => {
                            marks.insert(dep, Mark::InProgress);
                            stack.push((dep, 0));
                        }
                    }
                }
                None => {
                    marks.insert(*node, Mark::Done);
                    stack.pop();
                }
            }
        }
    }
    Ok(())
}

/// Group nodes by rank: the longest dependency chain below them.
///
/// Leaves get rank 0 and ranks propagate upwards along the inverse edges,
/// so every dependency lands in an earlier stage than its dependents.
pub fn compute_stages(edges: &Edges) -> Result<Vec<Vec<NodeId>>> {
    check_acyclic(edges)?;

    let nodes = all_nodes(edges);
    let inv = inverse(edges);
    let mut rank: HashMap<&NodeId, usize> = HashMap::new();
    let mut work: VecDeque<&NodeId> = VecDeque::new();

    for &id in &nodes {
        let is_leaf = edges.get(id).is_none_or(Vec::is_empty);
        if is_leaf {
            rank.insert(id, 0);
            work.push_back(id);
        }
    }

    while let Some(node) = work.pop_front() {
        let next = rank.get(node).copied().unwrap_or(0) + 1;
        for &dependent in inv.get(node).into_iter().flatten() {
            let current = rank.get(dependent).copied();
            if current.is_none_or(|r| r < next) {
                rank.insert(dependent, next);
                work.push_back(dependent);
            }
        }
    }

    let depth = rank.values().copied().max().map_or(0, |m| m + 1);
    let mut stages: Vec<BTreeSet<NodeId>> = vec![BTreeSet::new(); depth];
    for (id, r) in rank {
        stages[r].insert(id.clone());
    }
    Ok(stages
        .into_iter()
        .map(|s| s.into_iter().collect())
        .collect())
}

/// Drop direct edges that are implied by a longer path. Only used to make
/// rendered diagrams readable.
pub fn transitive_reduction(edges: &Edges) -> Edges {
    let nodes: Vec<&NodeId> = all_nodes(edges).into_iter().collect();
    let index: HashMap<&NodeId, usize> = nodes.iter().enumerate().map(|(i, id)| (*id, i)).collect();

    let mut g: DiGraphMap<usize, ()> = DiGraphMap::new();
    for i in 0..nodes.len() {
        g.add_node(i);
    }
    for (id, deps) in edges {
        for dep in deps {
            g.add_edge(index[id], index[dep], ());
        }
    }

    edges
        .iter()
        .map(|(id, deps)| {
            let kept = deps
                .iter()
                .filter(|dep| {
                    !deps.iter().any(|other| {
                        other != *dep && has_path_connecting(&g, index[other], index[*dep], None)
                    })
                })
                .cloned()
                .collect();
            (id.clone(), kept)
        })
        .collect()
}

/// Ordered stages for one graph.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Schedule {
    stages: Vec<Vec<NodeId>>,
}

impl Schedule {
    pub fn build(graph: &DependencyGraph) -> Result<Self> {
        Ok(Self {
            stages: compute_stages(graph.edges())?,
        })
    }

    pub fn stages(&self) -> &[Vec<NodeId>] {
        &self.stages
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    pub fn node_count(&self) -> usize {
        self.stages.iter().map(Vec::len).sum()
    }

    /// Same stage order, keeping only `keep`. Empty stages disappear.
    pub fn restricted_to(&self, keep: &BTreeSet<NodeId>) -> Schedule {
        Schedule {
            stages: self
                .stages
                .iter()
                .map(|stage| {
                    stage
                        .iter()
                        .filter(|id| keep.contains(*id))
                        .cloned()
                        .collect::<Vec<_>>()
                })
                .filter(|stage| !stage.is_empty())
                .collect(),
        }
    }

    /// Text diagram of the stages with reduced edges.
    pub fn render(&self, graph: &DependencyGraph) -> String {
        let reduced = transitive_reduction(graph.edges());
        let mut out = String::new();
        for (rank, stage) in self.stages.iter().enumerate() {
            let _ = writeln!(out, "stage {rank}:");
            for id in stage {
                let deps = reduced.get(id).map(Vec::as_slice).unwrap_or(&[]);
                if deps.is_empty() {
                    let _ = writeln!(out, "  {id}");
                } else {
                    let deps: Vec<&str> = deps.iter().map(NodeId::as_str).collect();
                    let _ = writeln!(out, "  {id} <- {}", deps.join(", "));
                }
            }
        }
        out
    }
}
