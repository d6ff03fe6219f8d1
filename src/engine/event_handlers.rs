// src/engine/event_handlers.rs

//! Event handling logic for the watch core.

use tracing::{info, warn};

use crate::dag::NodeId;
use crate::engine::queue::UpdateQueue;
use crate::engine::RunReport;
use crate::errors::{EmkError, Result};

/// Command produced by the pure core, to be executed by the outer IO shell.
#[derive(Debug)]
pub enum WatchCommand {
    /// Re-execute the ancestors of this source.
    StartChain(NodeId),
    /// Stop watching, reload the configuration and rebuild everything.
    Reload,
    /// Stop watching with this error.
    Abort(EmkError),
}

/// Decision returned by the core after handling a single event.
#[derive(Debug)]
pub struct WatchStep {
    pub commands: Vec<WatchCommand>,
    /// Whether the outer runtime loop should keep running.
    pub keep_running: bool,
}

impl WatchStep {
    fn idle() -> Self {
        Self {
            commands: Vec::new(),
            keep_running: true,
        }
    }

    fn run(command: WatchCommand) -> Self {
        Self {
            commands: vec![command],
            keep_running: true,
        }
    }

    fn stop(command: WatchCommand) -> Self {
        Self {
            commands: vec![command],
            keep_running: false,
        }
    }
}

/// A source changed: start its chain, or queue it behind the running one.
pub fn handle_source_changed(queue: &mut UpdateQueue, source: NodeId) -> WatchStep {
    info!(source = %source, "file was modified");
    if queue.is_updating() {
        warn!(
            source = %source,
            "an update chain is already running; postponing this update until it finishes"
        );
    }
    match queue.request(source) {
        Some(start) => WatchStep::run(WatchCommand::StartChain(start)),
        None => WatchStep::idle(),
    }
}

/// A source disappeared. Its dependents can no longer be built.
pub fn handle_source_removed(source: NodeId) -> WatchStep {
    WatchStep::stop(WatchCommand::Abort(EmkError::SourceRemoved {
        path: source.to_string(),
    }))
}

/// The configuration changed. Reload now when idle, otherwise after the
/// running chain.
pub fn handle_config_changed(queue: &mut UpdateQueue, reload_pending: &mut bool) -> WatchStep {
    if queue.is_updating() {
        info!("configuration changed; reloading after the current update chain");
        *reload_pending = true;
        return WatchStep::idle();
    }
    queue.clear();
    WatchStep::stop(WatchCommand::Reload)
}

/// A chain ended. Failures stop the loop; otherwise a pending reload wins
/// over queued chains, which would run against the old graph.
pub fn handle_chain_finished(
    queue: &mut UpdateQueue,
    reload_pending: &mut bool,
    source: NodeId,
    result: Result<RunReport>,
) -> WatchStep {
    let report = match result {
        Ok(report) => report,
        Err(err) => {
            queue.clear();
            return WatchStep::stop(WatchCommand::Abort(err));
        }
    };
    info!(
        source = %source,
        executed = report.executed.len(),
        up_to_date = report.up_to_date.len(),
        "update chain finished"
    );

    if *reload_pending {
        *reload_pending = false;
        queue.clear();
        return WatchStep::stop(WatchCommand::Reload);
    }

    match queue.finish() {
        Some(next) => WatchStep::run(WatchCommand::StartChain(next)),
        None => WatchStep::idle(),
    }
}
