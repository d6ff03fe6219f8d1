// src/config/validate.rs

use std::sync::Arc;

use toml::Value;

use crate::config::model::{
    ConfigSection, Emkfile, EmkfileBuilder, RawEmkfile, RawLeaf, RecipeTable,
};
use crate::errors::{EmkError, Result};
use crate::fragment::{DefinitionSource, Definitions};
use crate::report::{Reporter, TracingReporter};
use crate::tree::{self, RawNode, RawTree, RecipeConstructor, RecipeKind};

impl TryFrom<RawEmkfile> for Emkfile {
    type Error = EmkError;

    fn try_from(raw: RawEmkfile) -> std::result::Result<Self, Self::Error> {
        from_raw(raw, &TracingReporter)
    }
}

/// Validate a deserialized file, reporting warnings to `reporter`.
pub fn from_raw(raw: RawEmkfile, reporter: &dyn Reporter) -> Result<Emkfile> {
    let mut path = Vec::new();
    let tasks = table_to_tree(&raw.tasks, &mut path)?;
    let outputs = table_to_tree(&raw.outputs, &mut path)?;

    EmkfileBuilder {
        config: raw.config,
        defs: raw
            .defs
            .iter()
            .map(|(name, value)| (name.clone(), DefinitionSource::from(value)))
            .collect(),
        tasks,
        outputs,
    }
    .build(reporter)
}

impl EmkfileBuilder {
    /// Compile definitions and both namespace trees.
    pub fn build(self, reporter: &dyn Reporter) -> Result<Emkfile> {
        validate_config(&self.config)?;
        ensure_has_targets(&self)?;

        let mut defs = Definitions::new();
        for (name, source) in &self.defs {
            defs.define(name, source)?;
        }

        let tasks = tree::build(&self.tasks, RecipeKind::Task, &defs, reporter, &task_leaf)?;
        let outputs =
            tree::build(&self.outputs, RecipeKind::Output, &defs, reporter, &output_leaf)?;

        Ok(Emkfile {
            config: self.config,
            defs,
            tasks,
            outputs,
        })
    }
}

pub fn validate_config(config: &ConfigSection) -> Result<()> {
    if config.eval_timeout_ms == 0 {
        return Err(EmkError::ConfigError(
            "[config].eval_timeout_ms must be >= 1 (got 0)".to_string(),
        ));
    }
    if config.shell.trim().is_empty() {
        return Err(EmkError::ConfigError(
            "[config].shell must not be empty".to_string(),
        ));
    }
    if config.default_target.trim().is_empty() {
        return Err(EmkError::ConfigError(
            "[config].default_target must not be empty".to_string(),
        ));
    }
    Ok(())
}

fn ensure_has_targets(builder: &EmkfileBuilder) -> Result<()> {
    if builder.tasks.is_empty() && builder.outputs.is_empty() {
        return Err(EmkError::ConfigError(
            "Emkfile must define at least one entry under [tasks] or [outputs]".to_string(),
        ));
    }
    Ok(())
}

fn task_leaf(leaf: &RawLeaf, path: &[String]) -> Result<RecipeConstructor> {
    let provenance = path.join(".");
    Ok(match leaf {
        RawLeaf::Deps(deps) => RecipeConstructor::deps_only(RecipeKind::Task, provenance, deps.clone()),
        RawLeaf::Recipe(table) => table_constructor(RecipeKind::Task, provenance, table),
        RawLeaf::Constructor(create) => {
            RecipeConstructor::new(RecipeKind::Task, provenance, Arc::clone(create))
        }
    })
}

fn output_leaf(leaf: &RawLeaf, path: &[String]) -> Result<RecipeConstructor> {
    let provenance = path.join("/");
    match leaf {
        RawLeaf::Deps(_) => Err(EmkError::ConfigError(format!(
            "output '{provenance}' must be a recipe table (deps/run/copy) or a constructor, \
             not a bare dependency list"
        ))),
        RawLeaf::Recipe(table) => Ok(table_constructor(RecipeKind::Output, provenance, table)),
        RawLeaf::Constructor(create) => Ok(RecipeConstructor::new(
            RecipeKind::Output,
            provenance,
            Arc::clone(create),
        )),
    }
}

fn table_constructor(kind: RecipeKind, provenance: String, table: &RecipeTable) -> RecipeConstructor {
    let table = table.clone();
    RecipeConstructor::new(kind, provenance, Arc::new(move |_| Ok(table.to_spec())))
}

/// Whether a TOML table is a recipe rather than a nested namespace: every
/// key must be a recipe key holding a value of the right shape.
fn is_recipe_table(table: &toml::Table) -> bool {
    !table.is_empty()
        && table.iter().all(|(key, value)| match key.as_str() {
            "deps" | "run" => is_string_list(value),
            "copy" => value.is_str(),
            "concurrency" => value.is_bool(),
            _ => false,
        })
}

fn is_string_list(value: &Value) -> bool {
    match value {
        Value::String(_) => true,
        Value::Array(items) => items.iter().all(Value::is_str),
        _ => false,
    }
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::String(s)) => vec![s.clone()],
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    }
}

fn recipe_table(table: &toml::Table) -> RecipeTable {
    RecipeTable {
        deps: string_list(table.get("deps")),
        run: string_list(table.get("run")),
        copy: table.get("copy").and_then(Value::as_str).map(str::to_string),
        concurrency: table
            .get("concurrency")
            .and_then(Value::as_bool)
            .unwrap_or(false),
    }
}

/// Convert a `[tasks]`/`[outputs]` table into a raw tree, keeping key order.
fn table_to_tree(table: &toml::Table, path: &mut Vec<String>) -> Result<RawTree<RawLeaf>> {
    let mut tree = RawTree::new();
    for (key, value) in table {
        path.push(key.clone());
        let node = match value {
            Value::Table(t) if is_recipe_table(t) => RawNode::Leaf(RawLeaf::Recipe(recipe_table(t))),
            Value::Table(t) => RawNode::Branch(table_to_tree(t, path)?),
            Value::String(s) => RawNode::Leaf(RawLeaf::Deps(vec![s.clone()])),
            Value::Array(items) if items.iter().all(Value::is_str) => {
                RawNode::Leaf(RawLeaf::Deps(string_list(Some(value))))
            }
            other => {
                return Err(EmkError::ConfigError(format!(
                    "unsupported {} value at '{}'",
                    other.type_str(),
                    path.join(".")
                )));
            }
        };
        path.pop();
        tree.insert(key.clone(), node);
    }
    Ok(tree)
}
