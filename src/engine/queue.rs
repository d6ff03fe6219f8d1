// src/engine/queue.rs

//! FIFO of update chains waiting for the running one to finish.

use std::collections::VecDeque;

use tracing::debug;

use crate::dag::NodeId;

/// At most one update chain runs at a time; later requests wait here in
/// arrival order.
#[derive(Debug, Default)]
pub struct UpdateQueue {
    updating: bool,
    pending: VecDeque<NodeId>,
}

impl UpdateQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_updating(&self) -> bool {
        self.updating
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Ask for a chain starting at `source`. Returns the source back when
    /// the chain may start right away; otherwise it is queued.
    ///
    /// A source that is already waiting is not queued twice, since its
    /// chain will pick up every change made before it starts.
    pub fn request(&mut self, source: NodeId) -> Option<NodeId> {
        if !self.updating {
            self.updating = true;
            return Some(source);
        }
        if self.pending.contains(&source) {
            debug!(source = %source, "update already queued");
        } else {
            self.pending.push_back(source);
        }
        None
    }

    /// Mark the running chain as done and hand out the next one, if any.
    pub fn finish(&mut self) -> Option<NodeId> {
        let next = self.pending.pop_front();
        self.updating = next.is_some();
        next
    }

    /// Drop everything; used when the graph is about to be replaced.
    pub fn clear(&mut self) {
        self.pending.clear();
        self.updating = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> NodeId {
        NodeId::source(s)
    }

    #[test]
    fn first_request_starts_immediately() {
        let mut q = UpdateQueue::new();
        assert_eq!(q.request(id("a")), Some(id("a")));
        assert!(q.is_updating());
        assert!(q.is_empty());
    }

    #[test]
    fn requests_during_a_chain_run_in_arrival_order() {
        let mut q = UpdateQueue::new();
        q.request(id("a"));
        assert_eq!(q.request(id("b")), None);
        assert_eq!(q.request(id("c")), None);
        assert_eq!(q.len(), 2);

        assert_eq!(q.finish(), Some(id("b")));
        assert!(q.is_updating());
        assert_eq!(q.finish(), Some(id("c")));
        assert_eq!(q.finish(), None);
        assert!(!q.is_updating());
    }

    #[test]
    fn duplicate_pending_requests_collapse() {
        let mut q = UpdateQueue::new();
        q.request(id("a"));
        q.request(id("b"));
        q.request(id("b"));
        q.request(id("a"));
        assert_eq!(q.len(), 2);
        assert_eq!(q.finish(), Some(id("b")));
        assert_eq!(q.finish(), Some(id("a")));
    }

    #[test]
    fn clear_resets_state() {
        let mut q = UpdateQueue::new();
        q.request(id("a"));
        q.request(id("b"));
        q.clear();
        assert!(!q.is_updating());
        assert!(q.is_empty());
        assert_eq!(q.request(id("c")), Some(id("c")));
    }
}
