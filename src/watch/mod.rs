// src/watch/mod.rs

//! File watching for `--watch`.
//!
//! Wires a cross-platform watcher (`notify`) to the source nodes of a
//! planned graph and the configuration file, and turns raw notifications
//! into [`crate::engine::RuntimeEvent`]s.
//!
//! It does **not** decide what to rebuild; the engine's update chains do.

pub mod watcher;

pub use watcher::{classify, spawn_watcher, WatchSet, Watched, WatcherHandle};
