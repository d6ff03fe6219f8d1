// src/fragment/mod.rs

//! Pattern fragments: the compiled, matchable form of a namespace key.
//!
//! - [`ast`] / [`parser`] turn key strings into a small AST.
//! - [`glob`] handles brace expansion and glob-to-regex translation.
//! - [`compile`] turns AST nodes into [`Fragment`] values against a table of
//!   named [`Definitions`].
//!
//! Fragments are immutable; rebinding produces a new value so definitions can
//! be shared by many keys.

pub mod ast;
pub mod compile;
pub mod glob;
pub mod parser;

use std::fmt;

use regex::Regex;

use crate::errors::{EmkError, Result};
use crate::types::Bindings;

pub use ast::FragmentAst;
pub use compile::{compile, compile_glob, compile_key, DefinitionSource, Definitions};
pub use glob::Star;
pub use parser::parse_key;

/// Binding label used for captures that were never named.
pub const ANONYMOUS: &str = "_";

#[derive(Debug, Clone)]
pub enum Fragment {
    Text(TextFragment),
    Enum(EnumFragment),
    Regex(RegexFragment),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextFragment {
    literal: String,
}

/// One member of an enumeration. Items produced by a cross-product carry
/// the bindings of the bound enumerations they were built from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumItem {
    pub text: String,
    pub bindings: Bindings,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumFragment {
    items: Vec<EnumItem>,
    binding: Option<String>,
}

#[derive(Debug, Clone)]
pub struct RegexFragment {
    /// Unanchored source, embeddable in larger patterns.
    source: String,
    /// `^(?:source)$`
    regex: Regex,
    /// Binding label for each capturing group, in group order.
    groups: Vec<String>,
    binding: String,
}

impl TextFragment {
    pub fn new(literal: impl Into<String>) -> Self {
        Self {
            literal: literal.into(),
        }
    }

    pub fn literal(&self) -> &str {
        &self.literal
    }
}

impl EnumFragment {
    pub fn new(items: impl IntoIterator<Item = String>) -> Self {
        Self::from_items(
            items
                .into_iter()
                .map(|text| EnumItem {
                    text,
                    bindings: Bindings::new(),
                })
                .collect(),
        )
    }

    pub fn from_items(items: Vec<EnumItem>) -> Self {
        let mut unique: Vec<EnumItem> = Vec::with_capacity(items.len());
        for item in items {
            if !unique.iter().any(|u| u.text == item.text) {
                unique.push(item);
            }
        }
        Self {
            items: unique,
            binding: None,
        }
    }

    pub fn items(&self) -> &[EnumItem] {
        &self.items
    }

    pub fn binding(&self) -> Option<&str> {
        self.binding.as_deref()
    }

    fn bindings_for(&self, item: &EnumItem) -> Bindings {
        let mut out = item.bindings.clone();
        if let Some(name) = &self.binding {
            out.insert_text(name.clone(), item.text.clone());
        }
        out
    }
}

impl RegexFragment {
    /// Build from regex source with one label per capturing group.
    ///
    /// Fails when the compiled pattern's group count disagrees with `groups`.
    pub fn new(source: impl Into<String>, groups: Vec<String>, binding: impl Into<String>) -> Result<Self> {
        let source = source.into();
        let regex = anchored(&source)?;
        let declared = regex.captures_len() - 1;
        if declared != groups.len() {
            return Err(EmkError::PatternCompile {
                key: source,
                reason: format!(
                    "capture count mismatch: pattern has {declared} groups, {} bound",
                    groups.len()
                ),
            });
        }
        Ok(Self {
            source,
            regex,
            groups,
            binding: binding.into(),
        })
    }

    /// Wrap a raw pattern; every group it declares is bound to `binding`.
    pub fn from_source(source: impl Into<String>, binding: impl Into<String>) -> Result<Self> {
        let source = source.into();
        let binding = binding.into();
        let count = anchored(&source)?.captures_len() - 1;
        Self::new(source, vec![binding.clone(); count], binding)
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn binding(&self) -> &str {
        &self.binding
    }

    pub fn groups(&self) -> &[String] {
        &self.groups
    }
}

fn anchored(source: &str) -> Result<Regex> {
    Regex::new(&format!("^(?:{source})$")).map_err(|e| EmkError::PatternCompile {
        key: source.to_string(),
        reason: e.to_string(),
    })
}

impl Fragment {
    pub fn text(literal: impl Into<String>) -> Self {
        Fragment::Text(TextFragment::new(literal))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Fragment::Text(_) => "text",
            Fragment::Enum(_) => "enum",
            Fragment::Regex(_) => "regex",
        }
    }

    pub fn is_regex(&self) -> bool {
        matches!(self, Fragment::Regex(_))
    }

    /// Number of capturing groups this fragment contributes when embedded.
    pub fn capture_count(&self) -> usize {
        match self {
            Fragment::Text(_) => 0,
            Fragment::Enum(e) => usize::from(e.binding.is_some()),
            Fragment::Regex(r) => r.groups.len(),
        }
    }

    /// Regex source for embedding, plus the binding of each group it adds.
    pub fn to_regex_source(&self) -> (String, Vec<String>) {
        match self {
            Fragment::Text(t) => (regex::escape(&t.literal), Vec::new()),
            Fragment::Enum(e) => {
                let alts = if e.items.is_empty() {
                    // matches nothing
                    r"[^\s\S]".to_string()
                } else {
                    e.items
                        .iter()
                        .map(|i| regex::escape(&i.text))
                        .collect::<Vec<_>>()
                        .join("|")
                };
                match &e.binding {
                    Some(name) => (format!("({alts})"), vec![name.clone()]),
                    None => (format!("(?:{alts})"), Vec::new()),
                }
            }
            Fragment::Regex(r) => (format!("(?:{})", r.source), r.groups.clone()),
        }
    }

    /// Same matching semantics, reported under `name`.
    pub fn rebind(&self, name: &str) -> Result<Fragment> {
        Ok(match self {
            Fragment::Text(t) => Fragment::Enum(EnumFragment {
                items: vec![EnumItem {
                    text: t.literal.clone(),
                    bindings: Bindings::new(),
                }],
                binding: Some(name.to_string()),
            }),
            Fragment::Enum(e) => Fragment::Enum(EnumFragment {
                items: e.items.clone(),
                binding: Some(name.to_string()),
            }),
            Fragment::Regex(r) if r.groups.is_empty() => Fragment::Regex(RegexFragment::new(
                format!("({})", r.source),
                vec![name.to_string()],
                name,
            )?),
            Fragment::Regex(r) => Fragment::Regex(RegexFragment {
                source: r.source.clone(),
                regex: r.regex.clone(),
                groups: vec![name.to_string(); r.groups.len()],
                binding: name.to_string(),
            }),
        })
    }

    pub fn test_text(&self, candidate: &str) -> bool {
        match self {
            Fragment::Text(t) => t.literal == candidate,
            Fragment::Enum(e) => e.items.iter().any(|i| i.text == candidate),
            Fragment::Regex(r) => r.regex.is_match(candidate),
        }
    }

    /// Match `candidate` and report the bindings it produces.
    pub fn match_text(&self, candidate: &str) -> Option<Bindings> {
        match self {
            Fragment::Text(t) => (t.literal == candidate).then(Bindings::new),
            Fragment::Enum(e) => e
                .items
                .iter()
                .find(|i| i.text == candidate)
                .map(|item| e.bindings_for(item)),
            Fragment::Regex(r) => {
                let caps = r.regex.captures(candidate)?;
                let mut bindings = Bindings::new();
                for (idx, name) in r.groups.iter().enumerate() {
                    if let Some(m) = caps.get(idx + 1) {
                        bindings.push_capture(name, m.as_str());
                    }
                }
                Some(bindings)
            }
        }
    }

    /// First literal this fragment can produce that satisfies `pattern`.
    ///
    /// Regex fragments cannot answer this and return `None`.
    pub fn match_pattern(&self, pattern: &Regex) -> Option<(String, Bindings)> {
        match self {
            Fragment::Text(t) => pattern
                .is_match(&t.literal)
                .then(|| (t.literal.clone(), Bindings::new())),
            Fragment::Enum(e) => e
                .items
                .iter()
                .find(|i| pattern.is_match(&i.text))
                .map(|item| (item.text.clone(), e.bindings_for(item))),
            Fragment::Regex(_) => None,
        }
    }

    /// Every literal this fragment matches, in declaration order.
    ///
    /// `None` for regex fragments, which are not enumerable.
    pub fn enumerate(&self) -> Option<Box<dyn Iterator<Item = (String, Bindings)> + '_>> {
        match self {
            Fragment::Text(t) => Some(Box::new(std::iter::once((
                t.literal.clone(),
                Bindings::new(),
            )))),
            Fragment::Enum(e) => Some(Box::new(
                e.items
                    .iter()
                    .map(move |item| (item.text.clone(), e.bindings_for(item))),
            )),
            Fragment::Regex(_) => None,
        }
    }
}

impl fmt::Display for Fragment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Fragment::Text(t) => write!(f, "{:?}", t.literal),
            Fragment::Enum(e) => {
                let items: Vec<&str> = e.items.iter().map(|i| i.text.as_str()).collect();
                write!(f, "{{{}}}", items.join(","))
            }
            Fragment::Regex(r) => write!(f, "/{}/", r.source),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::BindingValue;

    #[test]
    fn text_matches_only_exact_literal() {
        let f = Fragment::text("main.js");
        assert!(f.test_text("main.js"));
        assert!(!f.test_text("main.jsx"));
        assert!(!f.test_text("Main.js"));
        assert_eq!(f.capture_count(), 0);
    }

    #[test]
    fn enum_reports_its_binding() {
        let f = Fragment::Enum(EnumFragment::new(["a".to_string(), "b".to_string()]))
            .rebind("which")
            .unwrap();
        let b = f.match_text("b").unwrap();
        assert_eq!(b.get("which"), Some(&BindingValue::Text("b".into())));
        assert!(f.match_text("c").is_none());
        assert_eq!(f.capture_count(), 1);
    }

    #[test]
    fn regex_groups_accumulate_under_binding() {
        let f = Fragment::Regex(RegexFragment::from_source(r"([a-z])-([a-z])", "pair").unwrap());
        let b = f.match_text("x-y").unwrap();
        assert_eq!(
            b.get("pair"),
            Some(&BindingValue::List(vec!["x".into(), "y".into()]))
        );
    }

    #[test]
    fn rebinding_groupless_regex_adds_one_group() {
        let f = Fragment::Regex(RegexFragment::from_source("v[0-9]+", ANONYMOUS).unwrap());
        assert_eq!(f.capture_count(), 0);
        let bound = f.rebind("ver").unwrap();
        assert_eq!(bound.capture_count(), 1);
        let b = bound.match_text("v12").unwrap();
        assert_eq!(b.get("ver"), Some(&BindingValue::Text("v12".into())));
        // original untouched
        assert_eq!(f.capture_count(), 0);
    }

    #[test]
    fn capture_count_mismatch_is_rejected() {
        let err = RegexFragment::new("(a)(b)", vec!["x".into()], "x").unwrap_err();
        assert!(matches!(err, EmkError::PatternCompile { .. }));
    }

    #[test]
    fn match_pattern_picks_first_enum_item() {
        let f = Fragment::Enum(EnumFragment::new([
            "lib.rs".to_string(),
            "main.rs".to_string(),
            "mod.rs".to_string(),
        ]));
        let re = Regex::new("^m.*$").unwrap();
        assert_eq!(f.match_pattern(&re).map(|(s, _)| s), Some("main.rs".into()));
    }

    #[test]
    fn regex_is_not_enumerable() {
        let f = Fragment::Regex(RegexFragment::from_source("a+", ANONYMOUS).unwrap());
        assert!(f.enumerate().is_none());
        let e = Fragment::Enum(EnumFragment::new(["x".to_string(), "y".to_string()]));
        let items: Vec<String> = e.enumerate().unwrap().map(|(s, _)| s).collect();
        assert_eq!(items, vec!["x", "y"]);
    }
}
