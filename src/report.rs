// src/report.rs

//! Leveled reporting sink handed to the resolver, graph builder and engine.
//!
//! Fatal conditions are returned as [`crate::errors::EmkError`] values; the
//! reporter only carries messages that never abort a run.

use std::fmt::Debug;
use std::sync::Mutex;

use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Info,
    Notice,
    Warn,
}

pub trait Reporter: Send + Sync + Debug {
    fn report(&self, level: Level, subject: &str, message: &str);

    fn info(&self, subject: &str, message: &str) {
        self.report(Level::Info, subject, message);
    }

    fn notice(&self, subject: &str, message: &str) {
        self.report(Level::Notice, subject, message);
    }

    fn warn(&self, subject: &str, message: &str) {
        self.report(Level::Warn, subject, message);
    }
}

/// Production reporter: forwards everything to `tracing`.
#[derive(Debug, Clone, Default)]
pub struct TracingReporter;

impl Reporter for TracingReporter {
    fn report(&self, level: Level, subject: &str, message: &str) {
        match level {
            Level::Info => info!(subject, "{message}"),
            Level::Notice => info!(subject, notice = true, "{message}"),
            Level::Warn => warn!(subject, "{message}"),
        }
    }
}

/// Reporter that keeps every message, for assertions in tests.
#[derive(Debug, Default)]
pub struct MemoryReporter {
    entries: Mutex<Vec<(Level, String, String)>>,
}

impl MemoryReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<(Level, String, String)> {
        match self.entries.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn warnings(&self) -> Vec<String> {
        self.entries()
            .into_iter()
            .filter(|(level, _, _)| *level == Level::Warn)
            .map(|(_, subject, message)| format!("{subject}: {message}"))
            .collect()
    }
}

impl Reporter for MemoryReporter {
    fn report(&self, level: Level, subject: &str, message: &str) {
        let entry = (level, subject.to_string(), message.to_string());
        match self.entries.lock() {
            Ok(mut guard) => guard.push(entry),
            Err(poisoned) => poisoned.into_inner().push(entry),
        }
    }
}
