// src/dag/mod.rs

//! Dependency graph construction and scheduling.
//!
//! - [`node`] defines node identity, kinds and on-disk stamps.
//! - [`graph`] holds nodes plus forward and inverse edges.
//! - [`builder`] plots target strings into the graph.
//! - [`scheduler`] checks for cycles and groups nodes into stages.

pub mod builder;
pub mod graph;
pub mod node;
pub mod scheduler;

pub use builder::GraphBuilder;
pub use graph::{DependencyGraph, Edges};
pub use node::{GraphNode, NodeId, NodeKind, NodeState, Stamp};
pub use scheduler::{check_acyclic, compute_stages, transitive_reduction, Schedule};
