// src/engine/mod.rs

//! Orchestration engine for emk.
//!
//! This module ties together:
//! - planning: targets → dependency graph → stages ([`build`])
//! - stage-by-stage execution of a plan ([`build`])
//! - the watch loop that reacts to:
//!   - source file changes and removals
//!   - configuration changes
//!   - update chain completions
//!   - shutdown signals
//!
//! The pure watch state machine lives in [`core`]; the async/IO shell is
//! implemented in [`runtime`].

use std::path::PathBuf;

use crate::dag::{DependencyGraph, NodeId, Schedule};
use crate::errors::Result;
use crate::exec::NodeStatus;

pub mod build;
pub mod core;
pub mod event_handlers;
pub mod queue;
pub mod runtime;

pub use build::Engine;
pub use self::core::WatchCore;
pub use event_handlers::{WatchCommand, WatchStep};
pub use queue::UpdateQueue;
pub use runtime::{WatchExit, WatchRuntime};

/// Options for one top-level invocation.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Rebuild every node regardless of timestamps.
    pub force: bool,
    /// Keep running and rebuild on source changes.
    pub watch: bool,
    /// Plan and print the stages without executing anything.
    pub dry_run: bool,
    /// Directory recipes run in and paths are relative to.
    pub cwd: PathBuf,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            force: false,
            watch: false,
            dry_run: false,
            cwd: PathBuf::from("."),
        }
    }
}

/// What happened to each node of an executed schedule.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    pub executed: Vec<NodeId>,
    pub up_to_date: Vec<NodeId>,
    pub satisfied: Vec<NodeId>,
    pub cached: Vec<NodeId>,
}

impl RunReport {
    pub fn record(&mut self, id: NodeId, status: NodeStatus) {
        match status {
            NodeStatus::Executed => self.executed.push(id),
            NodeStatus::UpToDate => self.up_to_date.push(id),
            NodeStatus::Satisfied => self.satisfied.push(id),
            NodeStatus::Cached => self.cached.push(id),
        }
    }

    /// Number of recipes that actually ran.
    pub fn executed_count(&self) -> usize {
        self.executed.len()
    }

    pub fn was_executed(&self, id: &str) -> bool {
        self.executed.iter().any(|e| e.as_str() == id)
    }
}

/// A planned invocation: the graph, its stages and the requested nodes.
#[derive(Debug, Clone)]
pub struct Plan {
    pub graph: DependencyGraph,
    pub schedule: Schedule,
    /// Ids the requested targets resolved to.
    pub roots: Vec<NodeId>,
}

/// Events flowing into the watch runtime from the watcher, chain tasks
/// and the signal handler.
#[derive(Debug)]
pub enum RuntimeEvent {
    /// A watched source file was written.
    SourceChanged { source: NodeId },
    /// A watched source file disappeared.
    SourceRemoved { source: NodeId },
    /// The configuration file was written.
    ConfigChanged,
    /// An update chain ran to completion or failed.
    ChainFinished {
        source: NodeId,
        result: Result<RunReport>,
    },
    /// Graceful shutdown requested (e.g. Ctrl-C).
    ShutdownRequested,
}
