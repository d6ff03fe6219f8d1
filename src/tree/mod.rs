// src/tree/mod.rs

//! Namespace trees: ordered mappings from compiled key fragments to
//! subtrees or recipe constructors.
//!
//! Two flavors exist. Task trees are addressed with `.`, output trees with
//! `/`. Every key is compiled exactly once, when the tree is built.

pub mod recipe;

use std::sync::Arc;

use crate::errors::{EmkError, Result};
use crate::fragment::{compile_key, Definitions, Fragment};
use crate::report::Reporter;

pub use recipe::{
    BoxFuture, ConstructorFn, DepCallback, DepExpr, RecipeBody, RecipeConstructor, RecipeKind,
    RecipeSpec, ResolvedRecipe, Run, RunCallback, RunContext,
};

/// Uncompiled tree as read from configuration, generic over the leaf value.
#[derive(Debug, Clone)]
pub struct RawTree<L> {
    entries: Vec<(String, RawNode<L>)>,
}

#[derive(Debug, Clone)]
pub enum RawNode<L> {
    Branch(RawTree<L>),
    Leaf(L),
}

impl<L> Default for RawTree<L> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
        }
    }
}

impl<L> RawTree<L> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Insert or replace `key`, keeping its original position on replace.
    /// Returns the replaced node, if any.
    pub fn insert(&mut self, key: impl Into<String>, node: RawNode<L>) -> Option<RawNode<L>> {
        let key = key.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some((_, slot)) => Some(std::mem::replace(slot, node)),
            None => {
                self.entries.push((key, node));
                None
            }
        }
    }

    pub fn leaf(mut self, key: impl Into<String>, leaf: L) -> Self {
        self.insert(key, RawNode::Leaf(leaf));
        self
    }

    pub fn branch(mut self, key: impl Into<String>, tree: RawTree<L>) -> Self {
        self.insert(key, RawNode::Branch(tree));
        self
    }

    pub fn entries(&self) -> impl Iterator<Item = (&str, &RawNode<L>)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }
}

#[derive(Debug, Clone)]
pub struct NamespaceTree {
    kind: RecipeKind,
    children: Vec<TreeEntry>,
}

#[derive(Debug, Clone)]
pub struct TreeEntry {
    key: String,
    fragment: Fragment,
    node: TreeNode,
}

#[derive(Debug, Clone)]
pub enum TreeNode {
    Branch(NamespaceTree),
    Leaf(Arc<RecipeConstructor>),
}

impl TreeEntry {
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn fragment(&self) -> &Fragment {
        &self.fragment
    }

    pub fn node(&self) -> &TreeNode {
        &self.node
    }
}

impl NamespaceTree {
    pub fn empty(kind: RecipeKind) -> Self {
        Self {
            kind,
            children: Vec::new(),
        }
    }

    pub fn kind(&self) -> RecipeKind {
        self.kind
    }

    pub fn split_char(&self) -> char {
        self.kind.split_char()
    }

    pub fn children(&self) -> &[TreeEntry] {
        &self.children
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    /// Number of leaves in the whole tree.
    pub fn leaf_count(&self) -> usize {
        self.children
            .iter()
            .map(|c| match &c.node {
                TreeNode::Branch(t) => t.leaf_count(),
                TreeNode::Leaf(_) => 1,
            })
            .sum()
    }
}

/// Build a tree from its raw form.
///
/// `leaf` turns each raw leaf into a constructor; it receives the key path
/// leading to the leaf and may reject the value.
pub fn build<L>(
    raw: &RawTree<L>,
    kind: RecipeKind,
    defs: &Definitions,
    reporter: &dyn Reporter,
    leaf: &dyn Fn(&L, &[String]) -> Result<RecipeConstructor>,
) -> Result<NamespaceTree> {
    let mut path = Vec::new();
    build_level(raw, kind, defs, reporter, leaf, &mut path)
}

fn build_level<L>(
    raw: &RawTree<L>,
    kind: RecipeKind,
    defs: &Definitions,
    reporter: &dyn Reporter,
    leaf: &dyn Fn(&L, &[String]) -> Result<RecipeConstructor>,
    path: &mut Vec<String>,
) -> Result<NamespaceTree> {
    let mut nodes = Vec::with_capacity(raw.entries.len());
    for (key, value) in &raw.entries {
        path.push(key.clone());
        let node = match value {
            RawNode::Branch(sub) => {
                TreeNode::Branch(build_level(sub, kind, defs, reporter, leaf, path)?)
            }
            RawNode::Leaf(l) => {
                if kind == RecipeKind::Task && key.contains('/') {
                    reporter.warn(
                        &path.join("."),
                        "task names should not contain '/'; it is reserved for outputs",
                    );
                }
                TreeNode::Leaf(Arc::new(leaf(l, path)?))
            }
        };
        path.pop();
        nodes.push((key, node));
    }

    let sep = kind.split_char().to_string();
    let mut children = Vec::with_capacity(nodes.len());
    for (key, node) in nodes {
        let fragment = compile_key(key, defs).map_err(|err| match err {
            EmkError::PatternCompile { key: k, reason } => EmkError::PatternCompile {
                key: k,
                reason: format!("{reason} (at {})", located(path, key, &sep)),
            },
            other => other,
        })?;
        children.push(TreeEntry {
            key: key.clone(),
            fragment,
            node,
        });
    }

    Ok(NamespaceTree { kind, children })
}

fn located(path: &[String], key: &str, sep: &str) -> String {
    let mut full: Vec<&str> = path.iter().map(String::as_str).collect();
    full.push(key);
    full.join(sep)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fragment::DefinitionSource;
    use crate::report::MemoryReporter;

    type Leaf = Vec<&'static str>;

    fn deps_leaf(deps: &Leaf, path: &[String]) -> Result<RecipeConstructor> {
        Ok(RecipeConstructor::deps_only(
            RecipeKind::Task,
            path.join("."),
            deps.iter().map(|d| d.to_string()).collect(),
        ))
    }

    #[test]
    fn builds_nested_levels_in_declaration_order() {
        let raw: RawTree<Leaf> = RawTree::new()
            .leaf("b", vec!["x"])
            .branch("a", RawTree::new().leaf("c", vec![]).leaf("{d,e}", vec![]))
            .leaf("*.js", vec![]);
        let reporter = MemoryReporter::new();
        let tree = build(&raw, RecipeKind::Task, &Definitions::new(), &reporter, &deps_leaf)
            .unwrap();

        let keys: Vec<&str> = tree.children().iter().map(TreeEntry::key).collect();
        assert_eq!(keys, vec!["b", "a", "*.js"]);
        assert_eq!(tree.leaf_count(), 4);
        assert!(matches!(tree.children()[2].fragment(), Fragment::Regex(_)));
    }

    #[test]
    fn leaf_provenance_is_the_key_path() {
        let raw: RawTree<Leaf> = RawTree::new().branch("a", RawTree::new().leaf("b", vec![]));
        let reporter = MemoryReporter::new();
        let tree = build(&raw, RecipeKind::Task, &Definitions::new(), &reporter, &deps_leaf)
            .unwrap();
        let TreeNode::Branch(a) = tree.children()[0].node() else {
            panic!("expected branch");
        };
        let TreeNode::Leaf(ctor) = a.children()[0].node() else {
            panic!("expected leaf");
        };
        assert_eq!(ctor.provenance(), "a.b");
    }

    #[test]
    fn bad_key_reports_its_location() {
        let raw: RawTree<Leaf> = RawTree::new().branch("a", RawTree::new().leaf("`(`", vec![]));
        let reporter = MemoryReporter::new();
        let err = build(&raw, RecipeKind::Output, &Definitions::new(), &reporter, &deps_leaf)
            .unwrap_err();
        match err {
            EmkError::PatternCompile { reason, .. } => assert!(reason.contains("a/`(`")),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn keys_see_definitions() {
        let mut defs = Definitions::new();
        defs.define("env", &DefinitionSource::List(vec!["dev".into(), "prod".into()]))
            .unwrap();
        let raw: RawTree<Leaf> = RawTree::new().leaf(":env", vec![]);
        let reporter = MemoryReporter::new();
        let tree = build(&raw, RecipeKind::Task, &defs, &reporter, &deps_leaf).unwrap();
        assert!(tree.children()[0].fragment().test_text("prod"));
        assert!(!tree.children()[0].fragment().test_text("qa"));
    }

    #[test]
    fn slash_in_task_name_warns() {
        let raw: RawTree<Leaf> = RawTree::new().leaf("a/b", vec![]);
        let reporter = MemoryReporter::new();
        build(&raw, RecipeKind::Task, &Definitions::new(), &reporter, &deps_leaf).unwrap();
        assert_eq!(reporter.warnings().len(), 1);
    }
}
