#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;

use emk::config::{load_from_str, Emkfile, RawLeaf, RecipeTable};
use emk::engine::Engine;
use emk::exec::ScriptRunner;
use emk::fs::FileSystem;
use emk::report::MemoryReporter;

/// Parse and validate an Emkfile from TOML text.
pub fn emkfile(text: &str) -> Emkfile {
    load_from_str(text).expect("Failed to build valid Emkfile from text")
}

/// Engine over `text` with the given filesystem and runner, reporting into
/// a [`MemoryReporter`].
pub fn engine_with(
    text: &str,
    cwd: impl AsRef<Path>,
    fs: Arc<dyn FileSystem>,
    runner: Arc<dyn ScriptRunner>,
) -> Engine {
    Engine::new(emkfile(text), cwd.as_ref())
        .with_fs(fs)
        .with_runner(runner)
        .with_reporter(Arc::new(MemoryReporter::new()))
}

/// Builder for recipe leaves used with `RawTree`.
#[derive(Debug, Default)]
pub struct RecipeBuilder {
    table: RecipeTable,
}

impl RecipeBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn run(mut self, script: &str) -> Self {
        self.table.run.push(script.to_string());
        self
    }

    pub fn dep(mut self, dep: &str) -> Self {
        self.table.deps.push(dep.to_string());
        self
    }

    pub fn copy(mut self, src: &str) -> Self {
        self.table.copy = Some(src.to_string());
        self
    }

    pub fn concurrency(mut self, allow: bool) -> Self {
        self.table.concurrency = allow;
        self
    }

    pub fn build(self) -> RawLeaf {
        RawLeaf::Recipe(self.table)
    }
}
