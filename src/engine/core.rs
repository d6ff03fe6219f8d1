// src/engine/core.rs

//! Pure watch state machine.
//!
//! [`WatchCore`] consumes [`RuntimeEvent`]s and produces:
//! - an updated queue state
//! - a list of commands describing what the IO shell should do next
//!
//! The async shell (`engine::runtime::WatchRuntime`) reads events from the
//! channel, spawns update chains and handles shutdown. The core has no
//! channels, no Tokio types and performs no IO, so it is unit tested
//! directly.

use crate::engine::event_handlers::{
    handle_chain_finished, handle_config_changed, handle_source_changed,
    handle_source_removed, WatchStep,
};
use crate::engine::queue::UpdateQueue;
use crate::engine::RuntimeEvent;

#[derive(Debug, Default)]
pub struct WatchCore {
    queue: UpdateQueue,
    reload_pending: bool,
}

impl WatchCore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether an update chain is in progress (for tests).
    pub fn is_updating(&self) -> bool {
        self.queue.is_updating()
    }

    /// Number of chains waiting (for tests).
    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    /// Handle a single event, updating state and returning the resulting
    /// commands for the IO shell.
    pub fn step(&mut self, event: RuntimeEvent) -> WatchStep {
        match event {
            RuntimeEvent::SourceChanged { source } => {
                handle_source_changed(&mut self.queue, source)
            }
            RuntimeEvent::SourceRemoved { source } => handle_source_removed(source),
            RuntimeEvent::ConfigChanged => {
                handle_config_changed(&mut self.queue, &mut self.reload_pending)
            }
            RuntimeEvent::ChainFinished { source, result } => handle_chain_finished(
                &mut self.queue,
                &mut self.reload_pending,
                source,
                result,
            ),
            RuntimeEvent::ShutdownRequested => WatchStep {
                commands: Vec::new(),
                keep_running: false,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dag::NodeId;
    use crate::engine::{RunReport, WatchCommand};
    use crate::errors::EmkError;

    fn changed(path: &str) -> RuntimeEvent {
        RuntimeEvent::SourceChanged {
            source: NodeId::source(path),
        }
    }

    fn finished(path: &str) -> RuntimeEvent {
        RuntimeEvent::ChainFinished {
            source: NodeId::source(path),
            result: Ok(RunReport::default()),
        }
    }

    fn started(step: &WatchStep) -> Vec<String> {
        step.commands
            .iter()
            .filter_map(|c| match c {
                WatchCommand::StartChain(id) => Some(id.to_string()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn overlapping_changes_are_serialized() {
        let mut core = WatchCore::new();

        let step = core.step(changed("a.txt"));
        assert_eq!(started(&step), vec!["a.txt"]);

        let step = core.step(changed("b.txt"));
        assert!(step.commands.is_empty());
        assert!(step.keep_running);
        assert_eq!(core.queued(), 1);

        let step = core.step(finished("a.txt"));
        assert_eq!(started(&step), vec!["b.txt"]);

        let step = core.step(finished("b.txt"));
        assert!(step.commands.is_empty());
        assert!(!core.is_updating());
    }

    #[test]
    fn removal_aborts() {
        let mut core = WatchCore::new();
        let step = core.step(RuntimeEvent::SourceRemoved {
            source: NodeId::source("src/x.txt"),
        });
        assert!(!step.keep_running);
        assert!(matches!(
            step.commands.as_slice(),
            [WatchCommand::Abort(EmkError::SourceRemoved { path })] if path == "src/x.txt"
        ));
    }

    #[test]
    fn failed_chain_aborts() {
        let mut core = WatchCore::new();
        core.step(changed("a.txt"));
        core.step(changed("b.txt"));
        let step = core.step(RuntimeEvent::ChainFinished {
            source: NodeId::source("a.txt"),
            result: Err(EmkError::RecipeFailed {
                node: "out".into(),
                exit_code: 2,
            }),
        });
        assert!(!step.keep_running);
        assert!(matches!(
            step.commands.as_slice(),
            [WatchCommand::Abort(EmkError::RecipeFailed { exit_code: 2, .. })]
        ));
    }

    #[test]
    fn config_change_while_idle_reloads_at_once() {
        let mut core = WatchCore::new();
        let step = core.step(RuntimeEvent::ConfigChanged);
        assert!(!step.keep_running);
        assert!(matches!(step.commands.as_slice(), [WatchCommand::Reload]));
    }

    #[test]
    fn config_change_during_a_chain_waits_and_drops_the_queue() {
        let mut core = WatchCore::new();
        core.step(changed("a.txt"));
        core.step(changed("b.txt"));

        let step = core.step(RuntimeEvent::ConfigChanged);
        assert!(step.keep_running);
        assert!(step.commands.is_empty());

        let step = core.step(finished("a.txt"));
        assert!(!step.keep_running);
        assert!(matches!(step.commands.as_slice(), [WatchCommand::Reload]));
        assert_eq!(core.queued(), 0);
    }

    #[test]
    fn shutdown_stops_the_loop() {
        let mut core = WatchCore::new();
        let step = core.step(RuntimeEvent::ShutdownRequested);
        assert!(!step.keep_running);
        assert!(step.commands.is_empty());
    }
}
