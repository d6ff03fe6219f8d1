// src/exec/expand.rs

//! Expansion of dependency strings before they are resolved as targets.

use std::fmt::Debug;
use std::path::PathBuf;
use std::process::{Output, Stdio};
use std::time::Duration;

use tokio::process::Command;
use tokio::runtime::{Handle, RuntimeFlavor};
use tracing::debug;

use super::shell::{contextify, prologue};
use crate::errors::{EmkError, Result};
use crate::types::Bindings;

/// What `$@`, `$<`, `$*` and `$name` refer to while expanding.
#[derive(Debug, Clone, Copy)]
pub struct ExpandContext<'a> {
    /// Path of the recipe whose dependencies are being expanded.
    pub target: &'a str,
    pub bindings: &'a Bindings,
    /// Dependency strings expanded so far for this recipe.
    pub previous: &'a [String],
}

pub trait Expander: Send + Sync + Debug {
    /// Expand `expr` into zero or more target strings.
    fn expand(&self, expr: &str, ctx: &ExpandContext<'_>) -> Result<Vec<String>>;
}

/// In-process substitution followed by word splitting.
#[derive(Debug, Default, Clone, Copy)]
pub struct TemplateExpander;

impl Expander for TemplateExpander {
    fn expand(&self, expr: &str, ctx: &ExpandContext<'_>) -> Result<Vec<String>> {
        Ok(split_words(&substitute(expr, ctx)))
    }
}

/// Replace `$@`, `$<`, `$*`, `$name` and `${name}`. Unknown names expand to
/// nothing, `$$` is a literal dollar and backslash escapes are preserved.
pub fn substitute(expr: &str, ctx: &ExpandContext<'_>) -> String {
    let mut out = String::with_capacity(expr.len());
    let mut chars = expr.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                out.push('\\');
                if let Some(next) = chars.next() {
                    out.push(next);
                }
            }
            '$' => match chars.peek().copied() {
                Some('@') => {
                    chars.next();
                    out.push_str(ctx.target);
                }
                Some('<') => {
                    chars.next();
                    out.push_str(ctx.previous.first().map(String::as_str).unwrap_or(""));
                }
                Some('*') => {
                    chars.next();
                    out.push_str(&ctx.previous.join(" "));
                }
                Some('$') => {
                    chars.next();
                    out.push('$');
                }
                Some('{') => {
                    chars.next();
                    let mut name = String::new();
                    let mut closed = false;
                    for n in chars.by_ref() {
                        if n == '}' {
                            closed = true;
                            break;
                        }
                        name.push(n);
                    }
                    if closed {
                        push_binding(&mut out, ctx.bindings, &name);
                    } else {
                        out.push_str("${");
                        out.push_str(&name);
                    }
                }
                Some(n) if n == '_' || n.is_ascii_alphabetic() => {
                    let mut name = String::new();
                    while let Some(&n) = chars.peek() {
                        if n == '_' || n.is_ascii_alphanumeric() {
                            name.push(n);
                            chars.next();
                        } else {
                            break;
                        }
                    }
                    push_binding(&mut out, ctx.bindings, &name);
                }
                _ => out.push('$'),
            },
            other => out.push(other),
        }
    }
    out
}

fn push_binding(out: &mut String, bindings: &Bindings, name: &str) {
    if let Some(value) = bindings.get(name) {
        out.push_str(&value.to_string());
    }
}

/// Split on whitespace that is not escaped with a backslash. Escaped
/// whitespace is kept without its backslash; other escapes are untouched.
pub fn split_words(s: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut chars = s.chars();

    while let Some(c) = chars.next() {
        match c {
            '\\' => match chars.next() {
                Some(n) if n.is_whitespace() => current.push(n),
                Some(n) => {
                    current.push('\\');
                    current.push(n);
                }
                None => current.push('\\'),
            },
            c if c.is_whitespace() => {
                if !current.is_empty() {
                    words.push(std::mem::take(&mut current));
                }
            }
            c => current.push(c),
        }
    }
    if !current.is_empty() {
        words.push(current);
    }
    words
}

/// Expansion through the configured shell, so command substitution works.
/// Every evaluation is bounded by `timeout`.
#[derive(Debug, Clone)]
pub struct ShellExpander {
    shell: String,
    cwd: PathBuf,
    timeout: Duration,
}

impl ShellExpander {
    pub fn new(shell: impl Into<String>, cwd: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            shell: shell.into(),
            cwd: cwd.into(),
            timeout,
        }
    }

    fn timeout_error(&self, expr: &str) -> EmkError {
        EmkError::EvaluationTimeout {
            expr: expr.to_string(),
            timeout_ms: u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX),
        }
    }

    /// Run `script`, or `None` if it outlives the timeout. Both pipes are
    /// drained while waiting; the child is killed when the wait is dropped.
    async fn evaluate(&self, script: &str) -> Result<Option<Output>> {
        let child = Command::new(&self.shell)
            .arg("-c")
            .arg(script)
            .current_dir(&self.cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(output) => Ok(Some(output?)),
            Err(_) => Ok(None),
        }
    }

    /// Planning is synchronous. On a multi-thread runtime the worker hands
    /// its queued tasks off while it waits; anywhere else the script runs
    /// on a scoped thread with its own current-thread runtime.
    fn evaluate_blocking(&self, script: &str) -> Result<Option<Output>> {
        if let Ok(handle) = Handle::try_current() {
            if handle.runtime_flavor() == RuntimeFlavor::MultiThread {
                return tokio::task::block_in_place(|| handle.block_on(self.evaluate(script)));
            }
        }

        std::thread::scope(|scope| {
            scope
                .spawn(|| -> Result<Option<Output>> {
                    let runtime = tokio::runtime::Builder::new_current_thread()
                        .enable_all()
                        .build()?;
                    runtime.block_on(self.evaluate(script))
                })
                .join()
                .map_err(|_| EmkError::Other(anyhow::anyhow!("shell expansion thread panicked")))
                .and_then(|result| result)
        })
    }
}

impl Expander for ShellExpander {
    fn expand(&self, expr: &str, ctx: &ExpandContext<'_>) -> Result<Vec<String>> {
        let body = contextify(expr, ctx.target, ctx.previous);
        let script = format!(
            "{}for w in {body}; do printf '%s\\n' \"$w\"; done",
            prologue(ctx.previous, ctx.bindings)
        );
        debug!(expr, script = %script, "shell expansion");

        let Some(output) = self.evaluate_blocking(&script)? else {
            return Err(self.timeout_error(expr));
        };

        if !output.status.success() {
            return Err(EmkError::ExpansionFailed {
                expr: expr.to_string(),
                message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout)
            .lines()
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect())
    }
}
