// src/exec/node_runner.rs

//! Executes one graph node: staleness check, recipe run, re-stat.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info};

use super::registry::{Entry, ExecutionRegistry, NodeOutcome, NodeStatus};
use super::shell::{contextify, variables, ScriptInvocation, ScriptRunner};
use crate::dag::{NodeId, NodeKind, Stamp};
use crate::errors::{EmkError, Result};
use crate::fs::FileSystem;
use crate::report::Reporter;
use crate::tree::{BoxFuture, Run, RunContext};
use crate::types::Bindings;

/// Everything shared by the nodes of one invocation.
#[derive(Debug, Clone)]
pub struct ExecContext {
    pub fs: Arc<dyn FileSystem>,
    pub runner: Arc<dyn ScriptRunner>,
    pub reporter: Arc<dyn Reporter>,
    pub registry: Arc<ExecutionRegistry>,
    pub cwd: PathBuf,
}

/// A dependency as seen by its dependent.
#[derive(Debug, Clone)]
pub struct DepInfo {
    pub path: String,
    pub stamp: Stamp,
}

/// Self-contained description of one node to execute, detached from the
/// graph so it can move into a spawned task.
#[derive(Debug, Clone)]
pub struct NodeJob {
    pub id: NodeId,
    pub kind: NodeKind,
    pub path: String,
    pub bindings: Bindings,
    pub run: Option<Run>,
    pub concurrency: bool,
    pub deps: Vec<DepInfo>,
    pub force: bool,
    /// Describes who asked for this node, for conflict reports.
    pub stack: String,
}

impl NodeJob {
    fn dep_paths(&self) -> Vec<String> {
        self.deps.iter().map(|d| d.path.clone()).collect()
    }
}

/// Stat `path` relative to `cwd`.
pub fn stamp_of(fs: &dyn FileSystem, cwd: &Path, path: &str) -> Stamp {
    match fs.metadata(&cwd.join(path)) {
        None => Stamp::Missing,
        Some(meta) if meta.is_dir => Stamp::Directory,
        Some(meta) => Stamp::Modified(meta.modified),
    }
}

/// A target is stale when any dependency is phony, missing, or at least as
/// new as the target. Directory dependencies only order the build.
pub fn is_stale(target: &Stamp, deps: &[DepInfo]) -> bool {
    let target_time = match target {
        Stamp::Missing | Stamp::Phony => return true,
        Stamp::Directory => return false,
        Stamp::Modified(t) => *t,
    };
    deps.iter().any(|dep| match dep.stamp {
        Stamp::Phony | Stamp::Missing => true,
        Stamp::Directory => false,
        Stamp::Modified(t) => t >= target_time,
    })
}

/// Run `job`, consulting and updating the registry.
pub async fn execute(ctx: Arc<ExecContext>, job: NodeJob) -> Result<NodeOutcome> {
    match ctx.registry.enter(&job.id, &job.stack, job.concurrency)? {
        Entry::Cached(outcome) => return Ok(outcome),
        Entry::Run => {}
    }

    match execute_claimed(&ctx, &job).await {
        Ok(outcome) => {
            ctx.registry.finish(&job.id, &job.stack, outcome);
            Ok(outcome)
        }
        Err(err) => {
            ctx.registry.abandon(&job.id, &job.stack);
            Err(err)
        }
    }
}

async fn execute_claimed(ctx: &ExecContext, job: &NodeJob) -> Result<NodeOutcome> {
    match job.kind {
        NodeKind::Source => {
            let stamp = stamp_of(ctx.fs.as_ref(), &ctx.cwd, &job.path);
            if stamp == Stamp::Missing {
                return Err(EmkError::NoSuchTarget {
                    target: job.path.clone(),
                });
            }
            Ok(NodeOutcome {
                stamp,
                status: NodeStatus::Satisfied,
            })
        }
        NodeKind::Task => match &job.run {
            None => Ok(NodeOutcome {
                stamp: Stamp::Phony,
                status: NodeStatus::Satisfied,
            }),
            Some(run) => {
                run_recipe(ctx, job, run).await?;
                Ok(NodeOutcome {
                    stamp: Stamp::Phony,
                    status: NodeStatus::Executed,
                })
            }
        },
        NodeKind::Output => execute_output(ctx, job).await,
    }
}

async fn execute_output(ctx: &ExecContext, job: &NodeJob) -> Result<NodeOutcome> {
    let full = ctx.cwd.join(&job.path);
    let stamp = stamp_of(ctx.fs.as_ref(), &ctx.cwd, &job.path);

    let Some(run) = &job.run else {
        // directory target
        if stamp == Stamp::Missing {
            ctx.fs.create_dir_all(&full)?;
            debug!(node = %job.id, "created directory");
        }
        return Ok(NodeOutcome {
            stamp: stamp_of(ctx.fs.as_ref(), &ctx.cwd, &job.path),
            status: NodeStatus::Satisfied,
        });
    };

    if stamp == Stamp::Directory {
        return Ok(NodeOutcome {
            stamp,
            status: NodeStatus::UpToDate,
        });
    }

    if !job.force && stamp != Stamp::Missing {
        if !is_stale(&stamp, &job.deps) {
            ctx.reporter.info(&job.path, "up to date");
            return Ok(NodeOutcome {
                stamp,
                status: NodeStatus::UpToDate,
            });
        }
        if ctx.fs.is_symlink(&full) {
            ctx.reporter.info(&job.path, "symlink already in place");
            return Ok(NodeOutcome {
                stamp,
                status: NodeStatus::UpToDate,
            });
        }
    }

    if let Some(parent) = full.parent() {
        if !ctx.fs.is_dir(parent) {
            ctx.fs.create_dir_all(parent)?;
        }
    }

    run_recipe(ctx, job, run).await?;

    match stamp_of(ctx.fs.as_ref(), &ctx.cwd, &job.path) {
        Stamp::Missing => Err(EmkError::OutputNotProduced {
            path: job.path.clone(),
        }),
        stamp => Ok(NodeOutcome {
            stamp,
            status: NodeStatus::Executed,
        }),
    }
}

async fn run_recipe(ctx: &ExecContext, job: &NodeJob, run: &Run) -> Result<()> {
    info!(node = %job.id, "building");
    run_item(ctx, job, run, 0).await
}

/// Run one item. `depth` counts how many callbacks produced it; a callback
/// may chain once.
fn run_item<'a>(
    ctx: &'a ExecContext,
    job: &'a NodeJob,
    run: &'a Run,
    depth: usize,
) -> BoxFuture<'a, Result<()>> {
    Box::pin(async move {
        match run {
            Run::Script(script) => {
                let args = job.dep_paths();
                let invocation = ScriptInvocation {
                    label: job.id.to_string(),
                    script: contextify(script, &job.path, &args),
                    variables: variables(&job.bindings),
                    args,
                    cwd: ctx.cwd.clone(),
                };
                let code = ctx.runner.run(invocation).await?;
                if code != 0 {
                    return Err(EmkError::RecipeFailed {
                        node: job.id.to_string(),
                        exit_code: code,
                    });
                }
                Ok(())
            }
            Run::List(items) => {
                for item in items {
                    run_item(ctx, job, item, depth).await?;
                }
                Ok(())
            }
            Run::Callback(callback) => {
                let run_ctx = RunContext {
                    target: job.path.clone(),
                    deps: job.dep_paths(),
                    bindings: job.bindings.clone(),
                    cwd: ctx.cwd.clone(),
                    fs: Arc::clone(&ctx.fs),
                };
                let next = callback
                    .call(run_ctx)
                    .await
                    .map_err(|err| EmkError::CallbackFailed {
                        node: job.id.to_string(),
                        message: format!("{err:#}"),
                    })?;
                match next {
                    None => Ok(()),
                    Some(_) if depth >= 1 => Err(EmkError::CallbackRecursionNotAllowed {
                        context: format!("{} (callback '{}')", job.id, callback.label()),
                    }),
                    Some(next) => run_item(ctx, job, &next, depth + 1).await,
                }
            }
        }
    })
}
