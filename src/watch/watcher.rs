// src/watch/watcher.rs

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::dag::{DependencyGraph, NodeId};
use crate::engine::RuntimeEvent;
use crate::errors::Result;
use crate::fs::FileSystem;

/// What a watched path stands for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Watched {
    Source(NodeId),
    Config,
}

/// Absolute paths of every watched file.
///
/// Files are watched through their parent directory so editors that save
/// by replacing the file keep being noticed.
#[derive(Debug, Clone, Default)]
pub struct WatchSet {
    entries: BTreeMap<PathBuf, Watched>,
}

impl WatchSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every source node of `graph` plus the configuration file.
    pub fn for_graph(
        fs: &dyn FileSystem,
        cwd: &Path,
        graph: &DependencyGraph,
        config: &Path,
    ) -> Result<Self> {
        let mut set = Self::new();
        for node in graph.sources() {
            set.add(fs, &cwd.join(&node.path), Watched::Source(node.id.clone()))?;
        }
        set.add(fs, config, Watched::Config)?;
        Ok(set)
    }

    pub fn add(&mut self, fs: &dyn FileSystem, path: &Path, what: Watched) -> Result<()> {
        let (Some(parent), Some(name)) = (path.parent(), path.file_name()) else {
            debug!(path = ?path, "not watchable");
            return Ok(());
        };
        let parent = if parent.as_os_str().is_empty() {
            Path::new(".")
        } else {
            parent
        };
        let dir = fs.canonicalize(parent)?;
        self.entries.insert(dir.join(name), what);
        Ok(())
    }

    pub fn lookup(&self, path: &Path) -> Option<&Watched> {
        self.entries.get(path)
    }

    pub fn directories(&self) -> BTreeSet<PathBuf> {
        self.entries
            .keys()
            .filter_map(|p| p.parent().map(Path::to_path_buf))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Turn one notify event into runtime events for the watched paths it
/// touches. A path that no longer exists afterwards counts as removed.
pub fn classify(set: &WatchSet, fs: &dyn FileSystem, event: &Event) -> Vec<RuntimeEvent> {
    if !matches!(
        event.kind,
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
    ) {
        return Vec::new();
    }

    event
        .paths
        .iter()
        .filter_map(|path| match set.lookup(path)? {
            Watched::Config => Some(RuntimeEvent::ConfigChanged),
            Watched::Source(id) if fs.exists(path) => Some(RuntimeEvent::SourceChanged {
                source: id.clone(),
            }),
            Watched::Source(id) => Some(RuntimeEvent::SourceRemoved { source: id.clone() }),
        })
        .collect()
}

/// Handle for the filesystem watcher.
///
/// This exists mainly so the underlying `RecommendedWatcher` is kept alive for
/// as long as needed. Dropping this handle will stop file watching.
pub struct WatcherHandle {
    _inner: RecommendedWatcher,
}

impl std::fmt::Debug for WatcherHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatcherHandle").finish()
    }
}

/// Spawn a filesystem watcher for every entry of `set`, forwarding
/// classified events to `runtime_tx`.
pub fn spawn_watcher(
    set: WatchSet,
    fs: Arc<dyn FileSystem>,
    runtime_tx: mpsc::Sender<RuntimeEvent>,
) -> Result<WatcherHandle> {
    // Channel from the blocking notify callback into the async world.
    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<Event>();

    let mut watcher = RecommendedWatcher::new(
        move |res: notify::Result<Event>| match res {
            Ok(event) => {
                if let Err(err) = event_tx.send(event) {
                    eprintln!("emk: failed to forward notify event: {err}");
                }
            }
            Err(err) => {
                eprintln!("emk: file watch error: {err}");
            }
        },
        Config::default(),
    )?;

    for dir in set.directories() {
        watcher.watch(&dir, RecursiveMode::NonRecursive)?;
        debug!(dir = ?dir, "watching directory");
    }
    info!(files = set.len(), "file watcher started");

    tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            debug!(?event, "received notify event");
            for runtime_event in classify(&set, fs.as_ref(), &event) {
                if runtime_tx.send(runtime_event).await.is_err() {
                    debug!("runtime gone; stopping watcher forwarding");
                    return;
                }
            }
        }
        debug!("watcher event loop finished");
    });

    Ok(WatcherHandle { _inner: watcher })
}
