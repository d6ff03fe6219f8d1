// src/exec/mod.rs

//! Execution layer.
//!
//! - [`expand`] turns dependency strings into target strings, in process
//!   or through the shell.
//! - [`shell`] quotes recipe scripts and runs them with
//!   `tokio::process::Command` behind the [`ScriptRunner`] seam, which tests
//!   replace with a fake.
//! - [`registry`] tracks running and completed nodes of one invocation.
//! - [`node_runner`] executes a single node.

pub mod expand;
pub mod node_runner;
pub mod registry;
pub mod shell;

pub use expand::{ExpandContext, Expander, ShellExpander, TemplateExpander};
pub use node_runner::{execute, is_stale, stamp_of, DepInfo, ExecContext, NodeJob};
pub use registry::{Entry, ExecutionRegistry, NodeOutcome, NodeStatus};
pub use shell::{ScriptInvocation, ScriptRunner, ShellRunner};
