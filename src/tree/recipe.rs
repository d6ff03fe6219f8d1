// src/tree/recipe.rs

//! Recipe constructors held by tree leaves, and the values they produce.

use std::collections::BTreeSet;
use std::fmt;
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;

use crate::errors::Result;
use crate::fs::FileSystem;
use crate::types::Bindings;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecipeKind {
    /// Phony action addressed by a dotted path.
    Task,
    /// Real file or directory addressed by a slash path.
    Output,
}

impl RecipeKind {
    pub fn split_char(self) -> char {
        match self {
            RecipeKind::Task => '.',
            RecipeKind::Output => '/',
        }
    }
}

/// A dependency as declared by a recipe.
#[derive(Clone)]
pub enum DepExpr {
    /// Target string, expanded then resolved against the trees or the filesystem.
    Target(String),
    List(Arc<Vec<DepExpr>>),
    /// Produces another expression from the recipe's bindings.
    Callback(DepCallback),
}

type DepFn = dyn Fn(&Bindings) -> Result<DepExpr> + Send + Sync;

#[derive(Clone)]
pub struct DepCallback {
    label: String,
    func: Arc<DepFn>,
}

impl DepCallback {
    pub fn call(&self, bindings: &Bindings) -> Result<DepExpr> {
        (self.func)(bindings)
    }

    pub fn label(&self) -> &str {
        &self.label
    }
}

impl DepExpr {
    pub fn target(s: impl Into<String>) -> Self {
        DepExpr::Target(s.into())
    }

    pub fn list(items: Vec<DepExpr>) -> Self {
        DepExpr::List(Arc::new(items))
    }

    pub fn callback<F>(label: impl Into<String>, f: F) -> Self
    where
        F: Fn(&Bindings) -> Result<DepExpr> + Send + Sync + 'static,
    {
        DepExpr::Callback(DepCallback {
            label: label.into(),
            func: Arc::new(f),
        })
    }

    /// Comparable description used for identity checks. Callbacks compare
    /// by label, since constructors build fresh closures on every call.
    pub fn fingerprint(&self) -> String {
        match self {
            DepExpr::Target(s) => s.clone(),
            DepExpr::List(items) => {
                let inner: Vec<String> = items.iter().map(DepExpr::fingerprint).collect();
                format!("[{}]", inner.join(", "))
            }
            DepExpr::Callback(cb) => format!("<fn {}>", cb.label),
        }
    }
}

impl fmt::Debug for DepExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.fingerprint())
    }
}

/// What a run callback sees.
#[derive(Debug, Clone)]
pub struct RunContext {
    /// Target path relative to the working directory (or task path).
    pub target: String,
    /// Resolved dependency paths, in declaration order.
    pub deps: Vec<String>,
    pub bindings: Bindings,
    pub cwd: PathBuf,
    pub fs: Arc<dyn FileSystem>,
}

impl RunContext {
    pub fn target_path(&self) -> PathBuf {
        self.cwd.join(&self.target)
    }

    pub fn dep_path(&self, index: usize) -> Option<PathBuf> {
        self.deps.get(index).map(|d| self.cwd.join(d))
    }
}

type RunFn = dyn Fn(RunContext) -> BoxFuture<'static, anyhow::Result<Option<Run>>> + Send + Sync;

#[derive(Clone)]
pub struct RunCallback {
    label: String,
    func: Arc<RunFn>,
}

impl RunCallback {
    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn call(&self, ctx: RunContext) -> BoxFuture<'static, anyhow::Result<Option<Run>>> {
        (self.func)(ctx)
    }
}

/// How a recipe produces its target.
#[derive(Clone)]
pub enum Run {
    Script(String),
    /// In-process step; may return a follow-up run to chain.
    Callback(RunCallback),
    List(Vec<Run>),
}

impl Run {
    pub fn script(s: impl Into<String>) -> Self {
        Run::Script(s.into())
    }

    pub fn callback<F, Fut>(label: impl Into<String>, f: F) -> Self
    where
        F: Fn(RunContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Option<Run>>> + Send + 'static,
    {
        Run::Callback(RunCallback {
            label: label.into(),
            func: Arc::new(move |ctx| Box::pin(f(ctx))),
        })
    }

    /// Copy the first dependency onto the target.
    pub fn copy_first_dependency() -> Self {
        Run::callback("copy", |ctx: RunContext| async move {
            let from = ctx
                .dep_path(0)
                .ok_or_else(|| anyhow::anyhow!("copy for '{}' has no source", ctx.target))?;
            ctx.fs.copy(&from, &ctx.target_path())?;
            Ok::<_, anyhow::Error>(None)
        })
    }

    /// Append `next` after `self`, flattening lists.
    pub fn then(self, next: Run) -> Run {
        let mut items = match self {
            Run::List(items) => items,
            other => vec![other],
        };
        match next {
            Run::List(more) => items.extend(more),
            other => items.push(other),
        }
        Run::List(items)
    }

    pub fn fingerprint(&self) -> String {
        match self {
            Run::Script(s) => s.clone(),
            Run::Callback(cb) => format!("<fn {}>", cb.label),
            Run::List(items) => items
                .iter()
                .map(Run::fingerprint)
                .collect::<Vec<_>>()
                .join(" && "),
        }
    }
}

impl fmt::Debug for Run {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.fingerprint())
    }
}

/// Descriptor returned by a recipe constructor.
#[derive(Debug, Clone, Default)]
pub struct RecipeSpec {
    pub deps: Vec<DepExpr>,
    pub run: Option<Run>,
    /// Source path to copy onto the target.
    pub copy: Option<String>,
    /// Allow this recipe to be entered from concurrent call stacks.
    pub concurrency: bool,
}

impl RecipeSpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn dep(mut self, dep: impl Into<String>) -> Self {
        self.deps.push(DepExpr::Target(dep.into()));
        self
    }

    pub fn dep_expr(mut self, dep: DepExpr) -> Self {
        self.deps.push(dep);
        self
    }

    pub fn run(mut self, run: Run) -> Self {
        self.run = Some(match self.run.take() {
            Some(existing) => existing.then(run),
            None => run,
        });
        self
    }

    pub fn copy(mut self, src: impl Into<String>) -> Self {
        self.copy = Some(src.into());
        self
    }

    pub fn concurrency(mut self, allow: bool) -> Self {
        self.concurrency = allow;
        self
    }
}

pub type ConstructorFn = Arc<dyn Fn(&Bindings) -> Result<RecipeSpec> + Send + Sync>;

/// Leaf of a namespace tree.
#[derive(Clone)]
pub struct RecipeConstructor {
    kind: RecipeKind,
    provenance: String,
    create: ConstructorFn,
}

impl fmt::Debug for RecipeConstructor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecipeConstructor")
            .field("kind", &self.kind)
            .field("provenance", &self.provenance)
            .finish_non_exhaustive()
    }
}

impl RecipeConstructor {
    pub fn new(kind: RecipeKind, provenance: impl Into<String>, create: ConstructorFn) -> Self {
        Self {
            kind,
            provenance: provenance.into(),
            create,
        }
    }

    /// Constructor returning the same dependency list for any bindings.
    pub fn deps_only(kind: RecipeKind, provenance: impl Into<String>, deps: Vec<String>) -> Self {
        let create: ConstructorFn = Arc::new(move |_| {
            Ok(RecipeSpec {
                deps: deps.iter().cloned().map(DepExpr::Target).collect(),
                ..RecipeSpec::default()
            })
        });
        Self::new(kind, provenance, create)
    }

    pub fn kind(&self) -> RecipeKind {
        self.kind
    }

    /// Key path as written in the configuration.
    pub fn provenance(&self) -> &str {
        &self.provenance
    }

    /// Instantiate for a concrete path. `copy` becomes a dependency on the
    /// source plus a copy step ahead of any declared run.
    pub fn prepare(&self, path: &str, bindings: &Bindings) -> Result<ResolvedRecipe> {
        let spec = (self.create)(bindings)?;

        let (deps, run) = match spec.copy {
            Some(src) => {
                let run = match spec.run {
                    Some(extra) => Run::copy_first_dependency().then(extra),
                    None => Run::copy_first_dependency(),
                };
                (vec![DepExpr::Target(src)], Some(run))
            }
            None => (spec.deps, spec.run),
        };

        Ok(ResolvedRecipe {
            kind: self.kind,
            path: path.to_string(),
            provenance: self.provenance.clone(),
            bindings: bindings.clone(),
            deps,
            run,
            concurrency: spec.concurrency,
        })
    }
}

/// A constructor applied to one concrete path and binding set.
#[derive(Debug, Clone)]
pub struct ResolvedRecipe {
    pub kind: RecipeKind,
    pub path: String,
    pub provenance: String,
    pub bindings: Bindings,
    pub deps: Vec<DepExpr>,
    pub run: Option<Run>,
    pub concurrency: bool,
}

impl ResolvedRecipe {
    pub fn body(&self) -> RecipeBody {
        RecipeBody {
            deps: self.deps.iter().map(DepExpr::fingerprint).collect(),
            run: self.run.as_ref().map(Run::fingerprint),
        }
    }
}

/// Dependency set and run specification, compared when two resolutions
/// land on the same node.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecipeBody {
    pub deps: BTreeSet<String>,
    pub run: Option<String>,
}

impl fmt::Display for RecipeBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let deps: Vec<&str> = self.deps.iter().map(String::as_str).collect();
        write!(
            f,
            "deps: [{}], run: {}",
            deps.join(", "),
            self.run.as_deref().unwrap_or("<none>")
        )
    }
}
