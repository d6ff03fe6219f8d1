// src/config/model.rs

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::Deserialize;

use crate::fragment::{Definitions, DefinitionSource};
use crate::tree::{ConstructorFn, NamespaceTree, RawTree, RecipeSpec};
use crate::types::{Bindings, ExpandMode};

/// `Emkfile.toml` as read from disk.
///
/// ```toml
/// [config]
/// default_target = "all"
///
/// [defs]
/// main = ["index.js", "v2.js"]
/// js = "*.js"
/// ver = { regex = "v[0-9]+" }
///
/// [tasks]
/// all = "build/**"
///
/// [outputs.build]
/// "x.txt" = { deps = "src/x.txt", run = "cp $< $@" }
/// ```
///
/// Tree sections stay as raw TOML tables; whether a table is a recipe or
/// a nested namespace is decided during validation.
#[derive(Debug, Clone, Deserialize)]
pub struct RawEmkfile {
    #[serde(default)]
    pub config: ConfigSection,

    #[serde(default)]
    pub defs: BTreeMap<String, DefValue>,

    #[serde(default)]
    pub tasks: toml::Table,

    #[serde(default)]
    pub outputs: toml::Table,
}

/// `[config]` section.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ConfigSection {
    /// Target built when none is given on the command line.
    #[serde(default = "default_target")]
    pub default_target: String,

    /// How dependency strings are expanded.
    #[serde(default)]
    pub expand: ExpandMode,

    /// Interpreter for recipe scripts and shell expansion.
    #[serde(default = "default_shell")]
    pub shell: String,

    /// Upper bound for one shell expansion, in milliseconds.
    #[serde(default = "default_eval_timeout_ms")]
    pub eval_timeout_ms: u64,
}

fn default_target() -> String {
    "all".to_string()
}

fn default_shell() -> String {
    "sh".to_string()
}

fn default_eval_timeout_ms() -> u64 {
    1000
}

impl Default for ConfigSection {
    fn default() -> Self {
        Self {
            default_target: default_target(),
            expand: ExpandMode::default(),
            shell: default_shell(),
            eval_timeout_ms: default_eval_timeout_ms(),
        }
    }
}

/// One `[defs]` entry.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum DefValue {
    List(Vec<String>),
    Glob(String),
    Regex { regex: String },
}

impl From<&DefValue> for DefinitionSource {
    fn from(value: &DefValue) -> Self {
        match value {
            DefValue::List(items) => DefinitionSource::List(items.clone()),
            DefValue::Glob(glob) => DefinitionSource::Glob(glob.clone()),
            DefValue::Regex { regex } => DefinitionSource::Regex(regex.clone()),
        }
    }
}

/// Recipe written as a TOML table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecipeTable {
    pub deps: Vec<String>,
    /// Scripts run in order.
    pub run: Vec<String>,
    pub copy: Option<String>,
    pub concurrency: bool,
}

impl RecipeTable {
    pub fn to_spec(&self) -> RecipeSpec {
        let mut spec = RecipeSpec::new().concurrency(self.concurrency);
        for dep in &self.deps {
            spec = spec.dep(dep.clone());
        }
        for script in &self.run {
            spec = spec.run(crate::tree::Run::script(script.clone()));
        }
        if let Some(src) = &self.copy {
            spec = spec.copy(src.clone());
        }
        spec
    }
}

/// Leaf of a raw namespace tree, from TOML or from Rust code.
#[derive(Clone)]
pub enum RawLeaf {
    /// Dependency list only (a phony group when used as a task).
    Deps(Vec<String>),
    Recipe(RecipeTable),
    /// Arbitrary Rust constructor, called with the bindings of each match.
    Constructor(ConstructorFn),
}

impl RawLeaf {
    pub fn deps<I, S>(deps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        RawLeaf::Deps(deps.into_iter().map(Into::into).collect())
    }

    pub fn constructor<F>(f: F) -> Self
    where
        F: Fn(&Bindings) -> crate::errors::Result<RecipeSpec> + Send + Sync + 'static,
    {
        RawLeaf::Constructor(Arc::new(f))
    }
}

impl fmt::Debug for RawLeaf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RawLeaf::Deps(deps) => f.debug_tuple("Deps").field(deps).finish(),
            RawLeaf::Recipe(table) => f.debug_tuple("Recipe").field(table).finish(),
            RawLeaf::Constructor(_) => f.write_str("Constructor(..)"),
        }
    }
}

/// Validated configuration: compiled definitions and namespace trees.
#[derive(Debug, Clone)]
pub struct Emkfile {
    pub config: ConfigSection,
    pub defs: Definitions,
    pub tasks: NamespaceTree,
    pub outputs: NamespaceTree,
}

/// Programmatic counterpart of [`RawEmkfile`], accepting Rust closures.
#[derive(Debug, Clone, Default)]
pub struct EmkfileBuilder {
    pub config: ConfigSection,
    pub defs: Vec<(String, DefinitionSource)>,
    pub tasks: RawTree<RawLeaf>,
    pub outputs: RawTree<RawLeaf>,
}

impl EmkfileBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn config(mut self, config: ConfigSection) -> Self {
        self.config = config;
        self
    }

    pub fn define(mut self, name: impl Into<String>, source: DefinitionSource) -> Self {
        self.defs.push((name.into(), source));
        self
    }

    pub fn tasks(mut self, tasks: RawTree<RawLeaf>) -> Self {
        self.tasks = tasks;
        self
    }

    pub fn outputs(mut self, outputs: RawTree<RawLeaf>) -> Self {
        self.outputs = outputs;
        self
    }
}
