// src/errors.rs

//! Crate-wide error type and result alias.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum EmkError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("failed to compile pattern '{key}': {reason}")]
    PatternCompile { key: String, reason: String },

    #[error("no such definition '{name}'")]
    UndefinedReference { name: String },

    #[error("'{target}' did not match any task patterns nor does such a file dependency exist")]
    NoSuchTarget { target: String },

    #[error(
        "conflicting recipe definitions for '{id}':\n  existing: {existing}\n  incoming: {incoming}"
    )]
    ConflictingRecipeDefinition {
        id: String,
        existing: String,
        incoming: String,
    },

    #[error("cycle detected in dependency graph at '{node}'")]
    CycleDetected { node: String },

    #[error("'{node}' is already running on another call stack ({})", stacks.join(" | "))]
    ConcurrentExecutionConflict { node: String, stacks: Vec<String> },

    #[error("recipe for '{node}' failed with exit code {exit_code}")]
    RecipeFailed { node: String, exit_code: i32 },

    #[error("output '{path}' never got created")]
    OutputNotProduced { path: String },

    #[error("detected callback recursion in {context}")]
    CallbackRecursionNotAllowed { context: String },

    #[error("detected cyclical dependency list in {context}")]
    CyclicDependencyExpression { context: String },

    #[error("expanding '{expr}' took longer than {timeout_ms}ms")]
    EvaluationTimeout { expr: String, timeout_ms: u64 },

    #[error("failed to expand '{expr}': {message}")]
    ExpansionFailed { expr: String, message: String },

    #[error("callback for '{node}' failed: {message}")]
    CallbackFailed { node: String, message: String },

    #[error("dependency file '{path}' was deleted")]
    SourceRemoved { path: String },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("JSON parsing error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("file watch error: {0}")]
    WatchError(#[from] notify::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, EmkError>;
