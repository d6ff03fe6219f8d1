// src/engine/build.rs

//! Planning and stage-by-stage execution of targets.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;
use tracing::{debug, info};

use crate::config::{Emkfile, ConfigSection};
use crate::dag::{DependencyGraph, GraphBuilder, GraphNode, NodeId, NodeState, Schedule, Stamp};
use crate::engine::{Plan, RunReport};
use crate::errors::{EmkError, Result};
use crate::exec::{
    execute, stamp_of, DepInfo, ExecContext, ExecutionRegistry, Expander, NodeJob, ScriptRunner,
    ShellExpander, ShellRunner, TemplateExpander,
};
use crate::fs::{FileSystem, RealFileSystem};
use crate::report::{Reporter, TracingReporter};
use crate::types::ExpandMode;

/// Builds targets of one loaded Emkfile.
///
/// The filesystem, script runner and reporter are seams; tests swap in a
/// mock filesystem and a fake runner.
#[derive(Debug, Clone)]
pub struct Engine {
    emkfile: Arc<Emkfile>,
    fs: Arc<dyn FileSystem>,
    runner: Arc<dyn ScriptRunner>,
    reporter: Arc<dyn Reporter>,
    cwd: PathBuf,
}

impl Engine {
    pub fn new(emkfile: Emkfile, cwd: impl Into<PathBuf>) -> Self {
        let runner = ShellRunner::new(emkfile.config.shell.clone());
        Self {
            emkfile: Arc::new(emkfile),
            fs: Arc::new(RealFileSystem),
            runner: Arc::new(runner),
            reporter: Arc::new(TracingReporter),
            cwd: cwd.into(),
        }
    }

    pub fn with_fs(mut self, fs: Arc<dyn FileSystem>) -> Self {
        self.fs = fs;
        self
    }

    pub fn with_runner(mut self, runner: Arc<dyn ScriptRunner>) -> Self {
        self.runner = runner;
        self
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn Reporter>) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn emkfile(&self) -> &Emkfile {
        &self.emkfile
    }

    pub fn fs(&self) -> &Arc<dyn FileSystem> {
        &self.fs
    }

    pub fn cwd(&self) -> &Path {
        &self.cwd
    }

    fn expander(&self) -> Box<dyn Expander> {
        let ConfigSection {
            expand,
            shell,
            eval_timeout_ms,
            ..
        } = &self.emkfile.config;
        match expand {
            ExpandMode::Template => Box::new(TemplateExpander),
            ExpandMode::Shell => Box::new(ShellExpander::new(
                shell.clone(),
                self.cwd.clone(),
                Duration::from_millis(*eval_timeout_ms),
            )),
        }
    }

    /// Resolve `targets` (or the configured default) into a graph and its
    /// stages. Nothing runs.
    pub fn plan(&self, targets: &[String]) -> Result<Plan> {
        let defaults = [self.emkfile.config.default_target.clone()];
        let targets = if targets.is_empty() { &defaults[..] } else { targets };

        let expander = self.expander();
        let mut builder = GraphBuilder::new(
            &self.emkfile.tasks,
            &self.emkfile.outputs,
            self.fs.as_ref(),
            &self.cwd,
            expander.as_ref(),
            self.reporter.as_ref(),
        );

        let mut roots = Vec::new();
        for target in targets {
            for id in builder.plot(target)? {
                if !roots.contains(&id) {
                    roots.push(id);
                }
            }
        }

        let graph = builder.finish();
        let schedule = Schedule::build(&graph)?;
        info!(
            targets = ?targets,
            nodes = graph.len(),
            stages = schedule.len(),
            "planned build"
        );
        Ok(Plan {
            graph,
            schedule,
            roots,
        })
    }

    /// Execute every stage of `plan` with a fresh registry.
    pub async fn execute(&self, plan: &mut Plan, force: bool) -> Result<RunReport> {
        let stack = plan
            .roots
            .iter()
            .map(NodeId::as_str)
            .collect::<Vec<_>>()
            .join(" ");
        self.execute_with(plan, Arc::new(ExecutionRegistry::new()), force, &stack)
            .await
    }

    /// Execute `plan` against a caller-provided registry. Several plans
    /// sharing one registry behave like concurrent branches of one
    /// invocation.
    pub async fn execute_with(
        &self,
        plan: &mut Plan,
        registry: Arc<ExecutionRegistry>,
        force: bool,
        stack: &str,
    ) -> Result<RunReport> {
        let schedule = plan.schedule.clone();
        self.execute_schedule(&mut plan.graph, &schedule, registry, force, stack)
            .await
    }

    /// Re-execute everything that depends on `source`, in stage order, with
    /// the usual staleness checks.
    pub async fn update_chain(&self, plan: &mut Plan, source: &NodeId) -> Result<RunReport> {
        let mut keep: BTreeSet<NodeId> = plan.graph.ancestors_of(source);
        keep.insert(source.clone());
        let schedule = plan.schedule.restricted_to(&keep);
        debug!(
            source = %source,
            nodes = schedule.node_count(),
            "starting update chain"
        );
        self.execute_schedule(
            &mut plan.graph,
            &schedule,
            Arc::new(ExecutionRegistry::new()),
            false,
            &format!("update {source}"),
        )
        .await
    }

    /// Plan and execute in one go.
    pub async fn run(&self, targets: &[String], force: bool) -> Result<RunReport> {
        let mut plan = self.plan(targets)?;
        self.execute(&mut plan, force).await
    }

    async fn execute_schedule(
        &self,
        graph: &mut DependencyGraph,
        schedule: &Schedule,
        registry: Arc<ExecutionRegistry>,
        force: bool,
        stack: &str,
    ) -> Result<RunReport> {
        let ctx = Arc::new(ExecContext {
            fs: Arc::clone(&self.fs),
            runner: Arc::clone(&self.runner),
            reporter: Arc::clone(&self.reporter),
            registry,
            cwd: self.cwd.clone(),
        });

        let mut report = RunReport::default();
        for (rank, stage) in schedule.stages().iter().enumerate() {
            debug!(stage = rank, nodes = stage.len(), "starting stage");

            let mut set = JoinSet::new();
            for id in stage {
                let job = self.job_for(graph, id, force, stack)?;
                if let Some(node) = graph.node_mut(id) {
                    node.state = NodeState::Running;
                }
                let ctx = Arc::clone(&ctx);
                set.spawn(async move {
                    let id = job.id.clone();
                    (id, execute(ctx, job).await)
                });
            }

            // siblings always run to completion; the first error wins
            let mut first_error = None;
            while let Some(joined) = set.join_next().await {
                let (id, result) = match joined {
                    Ok(pair) => pair,
                    Err(err) => {
                        if first_error.is_none() {
                            first_error = Some(EmkError::Other(anyhow::Error::from(err)));
                        }
                        continue;
                    }
                };
                match result {
                    Ok(outcome) => {
                        if let Some(node) = graph.node_mut(&id) {
                            node.state = NodeState::Done;
                            node.stamp = Some(outcome.stamp);
                        }
                        report.record(id, outcome.status);
                    }
                    Err(err) => {
                        if let Some(node) = graph.node_mut(&id) {
                            node.state = NodeState::Failed;
                        }
                        if first_error.is_none() {
                            first_error = Some(err);
                        }
                    }
                }
            }

            if let Some(err) = first_error {
                return Err(err);
            }
        }

        info!(
            executed = report.executed.len(),
            up_to_date = report.up_to_date.len(),
            cached = report.cached.len(),
            "all stages finished"
        );
        Ok(report)
    }

    fn job_for(
        &self,
        graph: &DependencyGraph,
        id: &NodeId,
        force: bool,
        stack: &str,
    ) -> Result<NodeJob> {
        let node = graph.node(id).ok_or_else(|| EmkError::NoSuchTarget {
            target: id.to_string(),
        })?;
        let deps = graph
            .dependencies_of(id)
            .iter()
            .filter_map(|dep| graph.node(dep))
            .map(|dep| DepInfo {
                path: dep.path.clone(),
                stamp: self.recorded_stamp(dep),
            })
            .collect();

        Ok(NodeJob {
            id: id.clone(),
            kind: node.kind,
            path: node.path.clone(),
            bindings: node.bindings.clone(),
            run: node.run.clone(),
            concurrency: node.concurrency,
            deps,
            force,
            stack: stack.to_string(),
        })
    }

    /// Stamp from this session, or from disk for nodes outside the
    /// executed stages.
    fn recorded_stamp(&self, node: &GraphNode) -> Stamp {
        match node.stamp {
            Some(stamp) => stamp,
            None if node.is_phony() => Stamp::Phony,
            None => stamp_of(self.fs.as_ref(), &self.cwd, &node.path),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::config::load_from_str;
    use crate::exec::ScriptInvocation;
    use crate::fs::mock::MockFileSystem;
    use crate::report::MemoryReporter;
    use crate::tree::BoxFuture;

    /// Writes `$@` for every script and records the labels.
    #[derive(Debug)]
    struct Touching {
        fs: Arc<MockFileSystem>,
        ran: Mutex<Vec<String>>,
    }

    impl ScriptRunner for Touching {
        fn run(&self, invocation: ScriptInvocation) -> BoxFuture<'static, anyhow::Result<i32>> {
            self.ran.lock().unwrap().push(invocation.label.clone());
            let target = invocation.cwd.join(invocation.label.trim_start_matches('#'));
            let result = self.fs.write(&target, b"built").map(|_| 0);
            Box::pin(async move { result })
        }
    }

    fn engine(text: &str, fs: Arc<MockFileSystem>) -> (Engine, Arc<Touching>) {
        let runner = Arc::new(Touching {
            fs: Arc::clone(&fs),
            ran: Mutex::new(Vec::new()),
        });
        let engine = Engine::new(load_from_str(text).unwrap(), "/p")
            .with_fs(fs)
            .with_runner(runner.clone())
            .with_reporter(Arc::new(MemoryReporter::new()));
        (engine, runner)
    }

    const TWO_LEVEL: &str = r#"
        [tasks]
        all = "build/x.txt"

        [outputs.build]
        "x.txt" = { deps = "src/x.txt", run = "cp $< $@" }
    "#;

    #[tokio::test]
    async fn second_run_is_a_no_op() {
        let fs = Arc::new(MockFileSystem::new());
        fs.add_file("/p/src/x.txt", "hi");
        let (engine, runner) = engine(TWO_LEVEL, fs.clone());

        let first = engine.run(&[], false).await.unwrap();
        assert!(first.was_executed("build/x.txt"));
        assert_eq!(first.executed_count(), 1);

        let second = engine.run(&[], false).await.unwrap();
        assert_eq!(second.executed_count(), 0);
        assert_eq!(second.up_to_date, vec![NodeId::output("build/x.txt")]);

        fs.touch("/p/src/x.txt");
        let third = engine.run(&["all".to_string()], false).await.unwrap();
        assert_eq!(third.executed_count(), 1);
        assert_eq!(runner.ran.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn directory_dependencies_only_order_the_build() {
        let fs = Arc::new(MockFileSystem::new());
        fs.add_file("/p/src/a.txt", "a");
        fs.add_dir("/p/assets");
        let (engine, _) = engine(
            r#"
            [outputs]
            "bundle.txt" = { deps = ["src/a.txt", "assets"], run = "pack $* > $@" }
            "#,
            fs.clone(),
        );
        let targets = vec!["bundle.txt".to_string()];

        let first = engine.run(&targets, false).await.unwrap();
        assert!(first.was_executed("bundle.txt"));

        fs.add_file("/p/assets/logo.png", "png");
        let second = engine.run(&targets, false).await.unwrap();
        assert_eq!(second.executed_count(), 0);

        fs.touch("/p/src/a.txt");
        let third = engine.run(&targets, false).await.unwrap();
        assert!(third.was_executed("bundle.txt"));
    }

    #[tokio::test]
    async fn force_rebuilds_fresh_outputs() {
        let fs = Arc::new(MockFileSystem::new());
        fs.add_file("/p/src/x.txt", "hi");
        let (engine, _) = engine(TWO_LEVEL, fs);

        engine.run(&[], false).await.unwrap();
        let forced = engine.run(&[], true).await.unwrap();
        assert_eq!(forced.executed_count(), 1);
    }

    #[tokio::test]
    async fn update_chain_only_touches_ancestors() {
        let fs = Arc::new(MockFileSystem::new());
        fs.add_file("/p/src/x.txt", "x");
        fs.add_file("/p/src/y.txt", "y");
        let (engine, _) = engine(
            r#"
            [tasks]
            all = ["build/x.txt", "build/y.txt"]

            [outputs.build]
            ":name(*).txt" = { deps = "src/$name.txt", run = "cp $< $@" }
            "#,
            fs.clone(),
        );

        let mut plan = engine.plan(&[]).unwrap();
        engine.execute(&mut plan, false).await.unwrap();

        fs.touch("/p/src/y.txt");
        let report = engine
            .update_chain(&mut plan, &NodeId::source("src/y.txt"))
            .await
            .unwrap();
        assert_eq!(report.executed, vec![NodeId::output("build/y.txt")]);
        assert!(!report.up_to_date.contains(&NodeId::output("build/x.txt")));
    }

    #[tokio::test]
    async fn missing_output_after_run_fails() {
        #[derive(Debug)]
        struct Noop;
        impl ScriptRunner for Noop {
            fn run(&self, _: ScriptInvocation) -> BoxFuture<'static, anyhow::Result<i32>> {
                Box::pin(async { Ok::<_, anyhow::Error>(0) })
            }
        }

        let fs = Arc::new(MockFileSystem::new());
        fs.add_file("/p/src/x.txt", "hi");
        let engine = Engine::new(load_from_str(TWO_LEVEL).unwrap(), "/p")
            .with_fs(fs)
            .with_runner(Arc::new(Noop))
            .with_reporter(Arc::new(MemoryReporter::new()));

        let mut plan = engine.plan(&[]).unwrap();
        let err = engine.execute(&mut plan, false).await.unwrap_err();
        assert!(matches!(err, EmkError::OutputNotProduced { path } if path == "build/x.txt"));
        let node = plan.graph.node(&NodeId::output("build/x.txt")).unwrap();
        assert_eq!(node.state, NodeState::Failed);
        let task = plan.graph.node(&NodeId::task("all", &Default::default())).unwrap();
        assert_eq!(task.state, NodeState::Pending);
    }
}
