// src/lib.rs

pub mod cli;
pub mod config;
pub mod dag;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod fragment;
pub mod fs;
pub mod logging;
pub mod report;
pub mod target;
pub mod tree;
pub mod types;
pub mod watch;

use std::path::Path;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::cli::CliArgs;
use crate::config::load_and_validate;
use crate::engine::{Engine, Plan, RunOptions, RunReport, RuntimeEvent, WatchExit, WatchRuntime};
use crate::watch::{spawn_watcher, WatchSet};

/// High-level entry point used by `main.rs`.
pub async fn run(args: CliArgs) -> anyhow::Result<()> {
    let here = std::env::current_dir()?;
    let cwd = match &args.directory {
        Some(dir) => here.join(dir),
        None => here,
    };
    let config_path = cwd.join(&args.file);

    let options = RunOptions {
        force: args.force,
        watch: args.watch,
        dry_run: args.dry_run,
        cwd,
    };
    run_targets(&config_path, &args.targets, &options).await?;
    Ok(())
}

/// Build `targets` (or the default target) from the Emkfile at
/// `config_path`.
///
/// Resolves once every requested target and its dependencies have been
/// executed, or with the first fatal error. In watch mode it only returns
/// on shutdown; a configuration change reloads the file and rebuilds
/// everything with `force`.
pub async fn run_targets(
    config_path: &Path,
    targets: &[String],
    options: &RunOptions,
) -> errors::Result<RunReport> {
    let mut force = options.force;

    loop {
        let emkfile = load_and_validate(config_path)?;
        let engine = Engine::new(emkfile, &options.cwd);
        let mut plan = engine.plan(targets)?;

        if options.dry_run {
            print_dry_run(&plan);
            return Ok(RunReport::default());
        }

        let report = engine.execute(&mut plan, force).await?;
        info!(
            executed = report.executed.len(),
            up_to_date = report.up_to_date.len(),
            "build finished"
        );

        if !options.watch {
            return Ok(report);
        }

        match watch(&engine, plan, config_path).await? {
            WatchExit::Shutdown => return Ok(report),
            WatchExit::Reload => {
                info!(config = ?config_path, "configuration changed; rebuilding");
                force = true;
            }
        }
    }
}

/// Watch the sources of `plan` until shutdown or a configuration change.
async fn watch(engine: &Engine, plan: Plan, config_path: &Path) -> errors::Result<WatchExit> {
    let (rt_tx, rt_rx) = mpsc::channel::<RuntimeEvent>(64);

    let set = WatchSet::for_graph(engine.fs().as_ref(), engine.cwd(), &plan.graph, config_path)?;
    // dropping the handle stops the watcher
    let _watcher = spawn_watcher(set, Arc::clone(engine.fs()), rt_tx.clone())?;

    // Ctrl-C → graceful shutdown.
    let ctrl_c = {
        let tx = rt_tx.clone();
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                eprintln!("failed to listen for Ctrl+C: {e}");
                return;
            }
            let _ = tx.send(RuntimeEvent::ShutdownRequested).await;
        })
    };

    let exit = WatchRuntime::new(engine.clone(), plan, rt_tx, rt_rx).run().await;
    ctrl_c.abort();
    exit
}

/// Print the requested roots and the stage diagram.
fn print_dry_run(plan: &Plan) {
    println!("emk dry-run");
    let roots: Vec<&str> = plan.roots.iter().map(|id| id.as_str()).collect();
    println!("  targets: {}", roots.join(", "));
    println!(
        "  {} nodes in {} stages",
        plan.schedule.node_count(),
        plan.schedule.len()
    );
    println!();
    print!("{}", plan.schedule.render(&plan.graph));

    debug!("dry-run complete (no execution)");
}
