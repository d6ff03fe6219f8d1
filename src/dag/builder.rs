// src/dag/builder.rs

//! Turns target strings into graph nodes, following dependencies.

use std::path::Path;
use std::sync::Arc;

use tracing::debug;

use super::graph::DependencyGraph;
use super::node::{GraphNode, NodeId, NodeKind, NodeState};
use crate::errors::{EmkError, Result};
use crate::exec::expand::{ExpandContext, Expander};
use crate::fs::{glob_files, has_glob_meta, FileSystem};
use crate::report::{MemoryReporter, Reporter};
use crate::target::{resolve, Resolution, TargetSpec};
use crate::tree::{DepExpr, NamespaceTree, RecipeKind};
use crate::types::Bindings;

pub struct GraphBuilder<'a> {
    tasks: &'a NamespaceTree,
    outputs: &'a NamespaceTree,
    fs: &'a dyn FileSystem,
    cwd: &'a Path,
    expander: &'a dyn Expander,
    reporter: &'a dyn Reporter,
    graph: DependencyGraph,
}

impl<'a> GraphBuilder<'a> {
    pub fn new(
        tasks: &'a NamespaceTree,
        outputs: &'a NamespaceTree,
        fs: &'a dyn FileSystem,
        cwd: &'a Path,
        expander: &'a dyn Expander,
        reporter: &'a dyn Reporter,
    ) -> Self {
        Self {
            tasks,
            outputs,
            fs,
            cwd,
            expander,
            reporter,
            graph: DependencyGraph::new(),
        }
    }

    pub fn graph(&self) -> &DependencyGraph {
        &self.graph
    }

    pub fn finish(self) -> DependencyGraph {
        self.graph
    }

    /// Resolve a requested target and everything it depends on. Returns
    /// the ids the target itself resolved to.
    pub fn plot(&mut self, target: &str) -> Result<Vec<NodeId>> {
        self.plot_with(target, &Bindings::new())
    }

    fn plot_with(&mut self, target: &str, inherited: &Bindings) -> Result<Vec<NodeId>> {
        let spec = TargetSpec::parse(target)?;
        let args = inherited.merged(&spec.args);

        let resolutions = self.resolve_trees(&spec.query)?;
        if resolutions.is_empty() {
            let files = glob_files(self.fs, self.cwd, &spec.query)?;
            if files.is_empty() {
                return Err(EmkError::NoSuchTarget {
                    target: target.to_string(),
                });
            }
            return Ok(files.iter().map(|path| self.add_source(path)).collect());
        }

        resolutions
            .iter()
            .map(|resolution| self.add(resolution, &args))
            .collect()
    }

    /// Tasks first, then outputs.
    fn resolve_trees(&self, query: &str) -> Result<Vec<Resolution>> {
        let tasks = resolve(self.tasks, query, &Bindings::new(), self.reporter)?;
        if tasks.is_empty() {
            return resolve(self.outputs, query, &Bindings::new(), self.reporter);
        }

        let quiet = MemoryReporter::new();
        if !resolve(self.outputs, query, &Bindings::new(), &quiet)?.is_empty() {
            self.reporter.warn(
                query,
                "matches both a task and an output; using the task",
            );
        }
        Ok(tasks)
    }

    fn add_source(&mut self, path: &str) -> NodeId {
        let id = NodeId::source(path);
        if !self.graph.contains(&id) {
            debug!(node = %id, "source");
            self.graph.insert(GraphNode::source(path));
        }
        id
    }

    fn add(&mut self, resolution: &Resolution, args: &Bindings) -> Result<NodeId> {
        let path = resolution.path();
        let bindings = args.merged(&resolution.bindings);
        let recipe = resolution.leaf.prepare(&path, &bindings)?;

        let id = match recipe.kind {
            RecipeKind::Task => NodeId::task(&path, args),
            RecipeKind::Output => NodeId::output(&path),
        };
        let body = recipe.body();

        if let Some(existing) = self.graph.node(&id) {
            if existing.body != body {
                return Err(EmkError::ConflictingRecipeDefinition {
                    id: id.to_string(),
                    existing: existing.body.to_string(),
                    incoming: body.to_string(),
                });
            }
            return Ok(id);
        }

        debug!(node = %id, provenance = %recipe.provenance, "adding node");
        self.graph.insert(GraphNode {
            id: id.clone(),
            kind: match recipe.kind {
                RecipeKind::Task => NodeKind::Task,
                RecipeKind::Output => NodeKind::Output,
            },
            path: path.clone(),
            provenance: recipe.provenance.clone(),
            bindings: bindings.clone(),
            run: recipe.run.clone(),
            concurrency: recipe.concurrency,
            body,
            state: NodeState::Pending,
            stamp: None,
        });

        let mut previous: Vec<String> = Vec::new();
        let mut deps: Vec<NodeId> = Vec::new();
        for expr in &recipe.deps {
            let ctx = ExpandContext {
                target: &path,
                bindings: &bindings,
                previous: &previous,
            };
            let strings = self.resolve_dependency_expression(expr, &ctx)?;
            for dep in strings {
                match self.plot_with(&dep, args) {
                    Ok(ids) => deps.extend(ids),
                    Err(EmkError::NoSuchTarget { target }) if target == dep && has_glob_meta(&dep) => {
                        // glob dependencies may legitimately match nothing
                        self.reporter
                            .notice(&path, &format!("nothing matches '{dep}'; skipped"));
                    }
                    Err(err) => {
                        if matches!(err, EmkError::NoSuchTarget { .. }) {
                            self.reporter
                                .warn(&path, &format!("cannot resolve dependency '{dep}'"));
                        }
                        return Err(err);
                    }
                }
                previous.push(dep);
            }
        }

        self.graph.set_dependencies(&id, deps);
        Ok(id)
    }

    /// Flatten one dependency expression into target strings.
    pub fn resolve_dependency_expression(
        &self,
        expr: &DepExpr,
        ctx: &ExpandContext<'_>,
    ) -> Result<Vec<String>> {
        let mut lists = Vec::new();
        self.expand_expr(expr, ctx, &mut lists, false)
    }

    fn expand_expr(
        &self,
        expr: &DepExpr,
        ctx: &ExpandContext<'_>,
        lists: &mut Vec<*const Vec<DepExpr>>,
        from_callback: bool,
    ) -> Result<Vec<String>> {
        match expr {
            DepExpr::Target(text) => self.expander.expand(text, ctx),
            DepExpr::List(items) => {
                let ptr = Arc::as_ptr(items);
                if lists.contains(&ptr) {
                    return Err(EmkError::CyclicDependencyExpression {
                        context: ctx.target.to_string(),
                    });
                }
                lists.push(ptr);
                let mut out = Vec::new();
                for item in items.iter() {
                    out.extend(self.expand_expr(item, ctx, lists, from_callback)?);
                }
                lists.pop();
                Ok(out)
            }
            DepExpr::Callback(callback) => {
                if from_callback {
                    return Err(EmkError::CallbackRecursionNotAllowed {
                        context: format!("{} (callback '{}')", ctx.target, callback.label()),
                    });
                }
                let produced = callback.call(ctx.bindings)?;
                self.expand_expr(&produced, ctx, lists, true)
            }
        }
    }
}
