// src/target/search.rs

//! Recursive search of a namespace tree for the leaves a query names.

use std::sync::Arc;

use crate::errors::Result;
use crate::fragment::Fragment;
use crate::report::Reporter;
use crate::tree::{NamespaceTree, RecipeConstructor, TreeEntry, TreeNode};
use crate::types::Bindings;

use super::query::{parse_query, QueryToken};

/// One leaf a query resolved to.
#[derive(Debug, Clone)]
pub struct Resolution {
    pub leaf: Arc<RecipeConstructor>,
    pub bindings: Bindings,
    /// Matched text for each level, in order.
    pub segments: Vec<String>,
}

impl Resolution {
    /// Concrete path, joined with the tree's split character.
    pub fn path(&self) -> String {
        self.segments.join(&self.leaf.kind().split_char().to_string())
    }
}

/// Resolve `target` against `tree`. Results follow child declaration order.
pub fn resolve(
    tree: &NamespaceTree,
    target: &str,
    inherited: &Bindings,
    reporter: &dyn Reporter,
) -> Result<Vec<Resolution>> {
    let tokens = parse_query(target, tree.split_char())?;
    let search = Search {
        split: tree.split_char(),
        target,
        reporter,
    };
    let mut out = Vec::new();
    let mut segments = Vec::new();
    search.tree(tree, &tokens, inherited, &mut segments, &mut out);
    Ok(out)
}

struct Search<'a> {
    split: char,
    target: &'a str,
    reporter: &'a dyn Reporter,
}

impl Search<'_> {
    fn node(
        &self,
        node: &TreeNode,
        tokens: &[QueryToken],
        bindings: &Bindings,
        segments: &mut Vec<String>,
        out: &mut Vec<Resolution>,
    ) {
        match node {
            TreeNode::Leaf(leaf) => {
                let done = match tokens {
                    [] | [QueryToken::RecursiveWildcard] => true,
                    _ => false,
                };
                if done {
                    out.push(Resolution {
                        leaf: Arc::clone(leaf),
                        bindings: bindings.clone(),
                        segments: segments.clone(),
                    });
                } else {
                    self.warn(
                        segments,
                        "navigated into a leaf with target remaining",
                    );
                }
            }
            TreeNode::Branch(tree) => {
                if tokens.is_empty() {
                    self.warn(
                        segments,
                        "target terminates at a non-leaf; use a wildcard to select all children",
                    );
                } else {
                    self.tree(tree, tokens, bindings, segments, out);
                }
            }
        }
    }

    fn tree(
        &self,
        tree: &NamespaceTree,
        tokens: &[QueryToken],
        bindings: &Bindings,
        segments: &mut Vec<String>,
        out: &mut Vec<Resolution>,
    ) {
        let Some((head, rest)) = tokens.split_first() else {
            return;
        };

        match head {
            QueryToken::Exact(_) => self.exact(tree, tokens, bindings, segments, out),
            QueryToken::Wildcard => {
                for entry in tree.children() {
                    self.each_item(entry, segments, |item, b, segments| {
                        self.descend(entry, item, rest, &bindings.merged(b), segments, out);
                    });
                }
            }
            QueryToken::RecursiveWildcard => {
                // zero levels
                if !rest.is_empty() {
                    self.tree(tree, rest, bindings, segments, out);
                }
                // one more level, keeping `**` in front
                for entry in tree.children() {
                    let is_leaf = matches!(entry.node(), TreeNode::Leaf(_));
                    if is_leaf && !rest.is_empty() {
                        continue;
                    }
                    let next = if is_leaf { rest } else { tokens };
                    self.each_item(entry, segments, |item, b, segments| {
                        self.descend(entry, item, next, &bindings.merged(b), segments, out);
                    });
                }
            }
            QueryToken::Partial(pattern) => {
                for entry in tree.children() {
                    match entry.fragment().match_pattern(pattern.regex()) {
                        Some((item, b)) => {
                            self.descend(entry, item, rest, &bindings.merged(&b), segments, out)
                        }
                        None if entry.fragment().is_regex() => self.warn_not_enumerable(entry, segments),
                        None => {}
                    }
                }
            }
        }
    }

    /// Leading exact tokens: try the longest squash first, so a literal key
    /// containing the split character beats nested keys. Regex keys only
    /// take part at single-segment granularity.
    fn exact(
        &self,
        tree: &NamespaceTree,
        tokens: &[QueryToken],
        bindings: &Bindings,
        segments: &mut Vec<String>,
        out: &mut Vec<Resolution>,
    ) {
        let leading = tokens.iter().take_while(|t| t.is_exact()).count();
        for squash in (1..=leading).rev() {
            let text = tokens[..squash]
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(&self.split.to_string());

            let literal = tree.children().iter().find(|entry| {
                matches!(entry.fragment(), Fragment::Text(t) if t.literal() == text)
            });

            let hit = match literal {
                Some(entry) => Some((entry, Bindings::new())),
                None => tree.children().iter().find_map(|entry| {
                    let eligible = match entry.fragment() {
                        Fragment::Text(_) => false,
                        Fragment::Enum(_) => true,
                        Fragment::Regex(_) => squash == 1,
                    };
                    if !eligible {
                        return None;
                    }
                    entry.fragment().match_text(&text).map(|b| (entry, b))
                }),
            };

            if let Some((entry, b)) = hit {
                self.descend(entry, text, &tokens[squash..], &bindings.merged(&b), segments, out);
                return;
            }
        }
    }

    fn descend(
        &self,
        entry: &TreeEntry,
        item: String,
        tokens: &[QueryToken],
        bindings: &Bindings,
        segments: &mut Vec<String>,
        out: &mut Vec<Resolution>,
    ) {
        segments.push(item);
        self.node(entry.node(), tokens, bindings, segments, out);
        segments.pop();
    }

    fn each_item<F>(&self, entry: &TreeEntry, segments: &mut Vec<String>, mut f: F)
    where
        F: FnMut(String, &Bindings, &mut Vec<String>),
    {
        match entry.fragment().enumerate() {
            Some(items) => {
                for (item, b) in items {
                    f(item, &b, segments);
                }
            }
            None => self.warn_not_enumerable(entry, segments),
        }
    }

    fn warn_not_enumerable(&self, entry: &TreeEntry, segments: &[String]) {
        self.reporter.warn(
            self.target,
            &format!(
                "cannot enumerate pattern key '{}' at '{}'; it only matches concrete names",
                entry.key(),
                self.joined(segments)
            ),
        );
    }

    fn warn(&self, segments: &[String], message: &str) {
        self.reporter.warn(
            self.target,
            &format!("{message} (at '{}')", self.joined(segments)),
        );
    }

    fn joined(&self, segments: &[String]) -> String {
        segments.join(&self.split.to_string())
    }
}
