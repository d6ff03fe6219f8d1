// src/engine/runtime.rs

use std::fmt;
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::dag::NodeId;
use crate::errors::Result;

use super::build::Engine;
use super::core::WatchCore;
use super::{Plan, RuntimeEvent, WatchCommand};

/// Why the watch loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchExit {
    /// Shutdown was requested or every event sender went away.
    Shutdown,
    /// The configuration changed; the caller reloads it and rebuilds.
    Reload,
}

/// Drives [`WatchCore`] from a channel of [`RuntimeEvent`]s and runs
/// update chains on a spawned task.
///
/// The core decides; this shell only moves events in and runs commands.
/// Chains report back with `ChainFinished` on the same channel, so the
/// core sees them in order with everything else.
pub struct WatchRuntime {
    core: WatchCore,
    engine: Engine,
    plan: Arc<Mutex<Plan>>,
    event_tx: mpsc::Sender<RuntimeEvent>,
    event_rx: mpsc::Receiver<RuntimeEvent>,
    chain: Option<JoinHandle<()>>,
}

impl fmt::Debug for WatchRuntime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WatchRuntime")
            .field("core", &self.core)
            .field("chain_running", &self.chain.is_some())
            .finish_non_exhaustive()
    }
}

impl WatchRuntime {
    pub fn new(
        engine: Engine,
        plan: Plan,
        event_tx: mpsc::Sender<RuntimeEvent>,
        event_rx: mpsc::Receiver<RuntimeEvent>,
    ) -> Self {
        Self {
            core: WatchCore::new(),
            engine,
            plan: Arc::new(Mutex::new(plan)),
            event_tx,
            event_rx,
            chain: None,
        }
    }

    /// Main event loop.
    pub async fn run(mut self) -> Result<WatchExit> {
        info!("watching for changes");
        let mut exit = WatchExit::Shutdown;

        loop {
            let event = match self.event_rx.recv().await {
                Some(e) => e,
                None => {
                    info!("runtime event channel closed; exiting");
                    break;
                }
            };

            debug!(?event, "runtime received event");
            let step = self.core.step(event);

            for command in step.commands {
                match command {
                    WatchCommand::StartChain(source) => self.start_chain(source),
                    WatchCommand::Reload => exit = WatchExit::Reload,
                    WatchCommand::Abort(err) => {
                        self.stop_chain();
                        return Err(err);
                    }
                }
            }

            if !step.keep_running {
                info!("core requested exit; stopping watch loop");
                break;
            }
        }

        self.stop_chain();
        Ok(exit)
    }

    fn start_chain(&mut self, source: NodeId) {
        let engine = self.engine.clone();
        let plan = Arc::clone(&self.plan);
        let tx = self.event_tx.clone();

        self.chain = Some(tokio::spawn(async move {
            let result = {
                let mut plan = plan.lock().await;
                engine.update_chain(&mut plan, &source).await
            };
            if tx
                .send(RuntimeEvent::ChainFinished { source, result })
                .await
                .is_err()
            {
                debug!("runtime gone before chain finished");
            }
        }));
    }

    fn stop_chain(&mut self) {
        if let Some(handle) = self.chain.take() {
            if !handle.is_finished() {
                info!("cancelling running update chain");
            }
            handle.abort();
        }
    }
}
