// src/exec/registry.rs

//! Which nodes are running or finished within one invocation.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use tracing::{debug, info};

use crate::dag::{NodeId, Stamp};
use crate::errors::{EmkError, Result};

/// How a node ended up being satisfied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeStatus {
    /// Its recipe ran.
    Executed,
    /// Its artifact was newer than every dependency.
    UpToDate,
    /// Nothing to do: sources, directories and phony groups without a run.
    Satisfied,
    /// Finished earlier in the same invocation.
    Cached,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeOutcome {
    pub stamp: Stamp,
    pub status: NodeStatus,
}

/// Result of registering a node before running it.
#[derive(Debug)]
pub enum Entry {
    /// Caller should run the node, then call [`ExecutionRegistry::finish`]
    /// or [`ExecutionRegistry::abandon`].
    Run,
    /// Already completed; reuse this.
    Cached(NodeOutcome),
}

#[derive(Debug, Default)]
struct State {
    running: HashMap<NodeId, Vec<String>>,
    completed: HashMap<NodeId, NodeOutcome>,
}

/// Shared between all concurrent branches of one invocation. Registration
/// checks and inserts under one lock so two branches cannot both claim a
/// node.
#[derive(Debug, Default)]
pub struct ExecutionRegistry {
    state: Mutex<State>,
}

impl ExecutionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Claim `id` for the call stack `stack`.
    ///
    /// A node that is already running elsewhere is a conflict unless it
    /// allows concurrent entry, in which case the overlap is only logged.
    pub fn enter(&self, id: &NodeId, stack: &str, concurrency: bool) -> Result<Entry> {
        let mut state = self.lock();

        if let Some(outcome) = state.completed.get(id) {
            debug!(node = %id, stack, "reusing completed result");
            return Ok(Entry::Cached(NodeOutcome {
                stamp: outcome.stamp,
                status: NodeStatus::Cached,
            }));
        }

        let stacks = state.running.entry(id.clone()).or_default();
        if !stacks.is_empty() {
            if !concurrency {
                let mut all = stacks.clone();
                all.push(stack.to_string());
                return Err(EmkError::ConcurrentExecutionConflict {
                    node: id.to_string(),
                    stacks: all,
                });
            }
            info!(
                node = %id,
                stack,
                others = ?stacks,
                "node re-entered concurrently; allowed by its recipe"
            );
        }
        stacks.push(stack.to_string());
        Ok(Entry::Run)
    }

    /// Record a successful run and release the claim.
    pub fn finish(&self, id: &NodeId, stack: &str, outcome: NodeOutcome) {
        let mut state = self.lock();
        release(&mut state, id, stack);
        state.completed.insert(id.clone(), outcome);
    }

    /// Release the claim without recording a result.
    pub fn abandon(&self, id: &NodeId, stack: &str) {
        let mut state = self.lock();
        release(&mut state, id, stack);
    }

    pub fn is_running(&self, id: &NodeId) -> bool {
        self.lock().running.contains_key(id)
    }

    pub fn completed(&self, id: &NodeId) -> Option<NodeOutcome> {
        self.lock().completed.get(id).copied()
    }
}

fn release(state: &mut State, id: &NodeId, stack: &str) {
    if let Some(stacks) = state.running.get_mut(id) {
        if let Some(pos) = stacks.iter().position(|s| s == stack) {
            stacks.remove(pos);
        }
        if stacks.is_empty() {
            state.running.remove(id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome() -> NodeOutcome {
        NodeOutcome {
            stamp: Stamp::Phony,
            status: NodeStatus::Executed,
        }
    }

    #[test]
    fn second_claim_conflicts() {
        let reg = ExecutionRegistry::new();
        let id = NodeId::from("build/x");
        assert!(matches!(reg.enter(&id, "a", false).unwrap(), Entry::Run));
        match reg.enter(&id, "b", false) {
            Err(EmkError::ConcurrentExecutionConflict { stacks, .. }) => {
                assert_eq!(stacks, vec!["a", "b"])
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn concurrency_flag_allows_overlap() {
        let reg = ExecutionRegistry::new();
        let id = NodeId::from("#lint");
        reg.enter(&id, "a", true).unwrap();
        assert!(matches!(reg.enter(&id, "b", true).unwrap(), Entry::Run));
        reg.abandon(&id, "a");
        assert!(reg.is_running(&id));
        reg.abandon(&id, "b");
        assert!(!reg.is_running(&id));
    }

    #[test]
    fn finished_nodes_are_served_from_cache() {
        let reg = ExecutionRegistry::new();
        let id = NodeId::from("#all");
        reg.enter(&id, "a", false).unwrap();
        reg.finish(&id, "a", outcome());
        match reg.enter(&id, "b", false).unwrap() {
            Entry::Cached(o) => assert_eq!(o.status, NodeStatus::Cached),
            Entry::Run => panic!("expected cached result"),
        }
        assert!(!reg.is_running(&id));
    }
}
