// src/dag/node.rs

//! Graph nodes and their identity.

use std::fmt;
use std::time::SystemTime;

use crate::tree::{RecipeBody, Run};
use crate::types::Bindings;

/// Deduplication key of a resolved recipe instance.
///
/// Outputs and sources are identified by their path. Tasks carry a `#`
/// prefix so they never collide with files, plus a short digest of the
/// invocation arguments when the task was requested with any.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(String);

impl NodeId {
    pub fn task(path: &str, args: &Bindings) -> Self {
        if args.is_empty() {
            return NodeId(format!("#{path}"));
        }
        let digest = blake3::hash(args.canonical().as_bytes()).to_hex();
        NodeId(format!("#{path}@{}", &digest.as_str()[..12]))
    }

    pub fn output(path: &str) -> Self {
        NodeId(path.to_string())
    }

    pub fn source(path: &str) -> Self {
        NodeId(path.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(s: &str) -> Self {
        NodeId(s.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// Phony action from the task tree.
    Task,
    /// File or directory produced by a recipe from the output tree.
    Output,
    /// Existing file matched by a glob; never built.
    Source,
}

/// Per-invocation state of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeState {
    Pending,
    Running,
    Done,
    Failed,
}

/// What a node looked like on disk the last time it was checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stamp {
    Missing,
    /// Tasks have no artifact and always count as changed.
    Phony,
    /// Directories never make their dependents stale.
    Directory,
    Modified(SystemTime),
}

#[derive(Debug, Clone)]
pub struct GraphNode {
    pub id: NodeId,
    pub kind: NodeKind,
    /// Task path or file path relative to the working directory.
    pub path: String,
    /// Key path of the leaf this node was resolved from.
    pub provenance: String,
    pub bindings: Bindings,
    pub run: Option<Run>,
    pub concurrency: bool,
    pub body: RecipeBody,
    pub state: NodeState,
    pub stamp: Option<Stamp>,
}

impl GraphNode {
    pub fn source(path: &str) -> Self {
        GraphNode {
            id: NodeId::source(path),
            kind: NodeKind::Source,
            path: path.to_string(),
            provenance: path.to_string(),
            bindings: Bindings::new(),
            run: None,
            concurrency: false,
            body: RecipeBody::default(),
            state: NodeState::Pending,
            stamp: None,
        }
    }

    pub fn is_phony(&self) -> bool {
        self.kind == NodeKind::Task
    }
}
