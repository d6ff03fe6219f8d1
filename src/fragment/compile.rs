// src/fragment/compile.rs

use std::collections::BTreeMap;

use crate::errors::{EmkError, Result};
use crate::types::Bindings;

use super::ast::FragmentAst;
use super::glob::{expand_braces, glob_to_regex, Star};
use super::parser::parse_key;
use super::{EnumFragment, EnumItem, Fragment, RegexFragment, ANONYMOUS};

/// Raw definition value as declared in `[defs]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DefinitionSource {
    List(Vec<String>),
    Glob(String),
    Regex(String),
}

/// Named fragments visible to key compilation.
#[derive(Debug, Clone, Default)]
pub struct Definitions {
    fragments: BTreeMap<String, Fragment>,
}

impl Definitions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&Fragment> {
        self.fragments.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fragments.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fragments.keys().map(String::as_str)
    }

    /// Compile and register a definition. Lists become enumerations, glob
    /// strings use the zero-or-more star, regexes bind their groups to `name`.
    pub fn define(&mut self, name: &str, source: &DefinitionSource) -> Result<()> {
        let fragment = match source {
            DefinitionSource::List(items) => {
                Fragment::Enum(EnumFragment::new(items.iter().cloned()))
            }
            DefinitionSource::Glob(glob) => compile_glob(glob, Star::ZeroOrMore, name)?,
            DefinitionSource::Regex(source) => {
                Fragment::Regex(RegexFragment::from_source(source.clone(), name)?)
            }
        };
        self.fragments.insert(name.to_string(), fragment);
        Ok(())
    }
}

/// Parse and compile a namespace key.
pub fn compile_key(key: &str, defs: &Definitions) -> Result<Fragment> {
    let ast = parse_key(key)?;
    compile(&ast, defs).map_err(|err| match err {
        EmkError::PatternCompile { reason, .. } => EmkError::PatternCompile {
            key: key.to_string(),
            reason,
        },
        other => other,
    })
}

/// Glob text: braces expand first; remaining stars make a regex, otherwise
/// the expansions form an enumeration.
pub fn compile_glob(glob: &str, star: Star, binding: &str) -> Result<Fragment> {
    let expansions = expand_braces(glob);
    if expansions.iter().any(|e| e.contains('*')) {
        let source = glob_to_regex(glob, star);
        Ok(Fragment::Regex(RegexFragment::from_source(source, binding)?))
    } else {
        Ok(Fragment::Enum(EnumFragment::new(expansions)))
    }
}

pub fn compile(node: &FragmentAst, defs: &Definitions) -> Result<Fragment> {
    match node {
        FragmentAst::Text(value) => Ok(Fragment::text(value.clone())),
        FragmentAst::Glob(value) => compile_glob(value, Star::OneOrMore, ANONYMOUS),
        FragmentAst::Regex(value) => Ok(Fragment::Regex(RegexFragment::from_source(
            value.clone(),
            ANONYMOUS,
        )?)),
        FragmentAst::Reference(name) => {
            defs.get(name)
                .cloned()
                .ok_or_else(|| EmkError::UndefinedReference {
                    name: name.clone(),
                })
        }
        FragmentAst::Label(name) => match defs.get(name) {
            Some(def) => def.rebind(name),
            None => Ok(Fragment::Regex(RegexFragment::new(
                "([^/]*?)",
                vec![name.clone()],
                name.clone(),
            )?)),
        },
        FragmentAst::CaptureGlob { name, inner } | FragmentAst::CaptureRegex { name, inner } => {
            compile(inner, defs)?.rebind(name)
        }
        FragmentAst::Pattern(nodes) => compile_pattern(nodes, defs),
    }
}

fn compile_pattern(nodes: &[FragmentAst], defs: &Definitions) -> Result<Fragment> {
    let mut merged: Vec<FragmentAst> = Vec::with_capacity(nodes.len());
    for node in nodes {
        if let (Some(FragmentAst::Text(prev)), FragmentAst::Text(next)) = (merged.last_mut(), node)
        {
            prev.push_str(next);
            continue;
        }
        merged.push(node.clone());
    }

    let mut fragments = merged
        .iter()
        .map(|n| compile(n, defs))
        .collect::<Result<Vec<_>>>()?;

    if fragments.len() <= 1 {
        return Ok(fragments.pop().unwrap_or_else(|| Fragment::text("")));
    }

    if !fragments.iter().any(Fragment::is_regex) {
        return Ok(Fragment::Enum(cross_product(&fragments)));
    }

    let mut source = String::new();
    let mut groups = Vec::new();
    for fragment in &fragments {
        let (part, part_groups) = fragment.to_regex_source();
        source.push_str(&part);
        groups.extend(part_groups);
    }
    Ok(Fragment::Regex(RegexFragment::new(source, groups, ANONYMOUS)?))
}

/// Every concatenation of text and enum values, in order.
fn cross_product(fragments: &[Fragment]) -> EnumFragment {
    let mut acc = vec![EnumItem {
        text: String::new(),
        bindings: Bindings::new(),
    }];

    for fragment in fragments {
        let choices: Vec<(String, Bindings)> = fragment
            .enumerate()
            .map(|it| it.collect())
            .unwrap_or_default();

        acc = acc
            .iter()
            .flat_map(|prefix| {
                choices.iter().map(move |(text, bindings)| EnumItem {
                    text: format!("{}{}", prefix.text, text),
                    bindings: prefix.bindings.merged(bindings),
                })
            })
            .collect();
    }

    EnumFragment::from_items(acc)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::BindingValue;

    fn defs() -> Definitions {
        let mut d = Definitions::new();
        d.define(
            "main",
            &DefinitionSource::List(vec!["index.js".into(), "v2.js".into()]),
        )
        .unwrap();
        d.define("js", &DefinitionSource::Glob("*.js".into())).unwrap();
        d.define("ver", &DefinitionSource::Regex("v[0-9]+".into()))
            .unwrap();
        d
    }

    #[test]
    fn literal_key_compiles_to_text() {
        let f = compile_key("build", &defs()).unwrap();
        assert!(matches!(f, Fragment::Text(_)));
        assert!(f.test_text("build"));
        assert!(!f.test_text("build2"));
    }

    #[test]
    fn brace_key_is_enum_of_expansions() {
        let f = compile_key("{a,b,c}.js", &defs()).unwrap();
        for ok in ["a.js", "b.js", "c.js"] {
            assert!(f.test_text(ok), "{ok}");
        }
        assert!(!f.test_text("d.js"));
        assert!(!f.test_text("{a,b,c}.js"));
    }

    #[test]
    fn star_key_is_regex_with_one_group() {
        let f = compile_key("*.js", &defs()).unwrap();
        assert_eq!(f.capture_count(), 1);
        assert!(f.test_text("main.js"));
        assert!(!f.test_text(".js"));
    }

    #[test]
    fn label_without_definition_is_word_capture() {
        let f = compile_key(":name", &defs()).unwrap();
        let b = f.match_text("hello").unwrap();
        assert_eq!(b.get("name"), Some(&BindingValue::Text("hello".into())));
        assert!(!f.test_text("a/b"));
    }

    #[test]
    fn label_aliases_definition_with_its_own_binding() {
        let f = compile_key(":main", &defs()).unwrap();
        let b = f.match_text("v2.js").unwrap();
        assert_eq!(b.get("main"), Some(&BindingValue::Text("v2.js".into())));
    }

    #[test]
    fn enum_cross_product_keeps_member_bindings() {
        let f = compile_key(":main.map", &defs()).unwrap();
        assert!(matches!(f, Fragment::Enum(_)));
        let b = f.match_text("index.js.map").unwrap();
        assert_eq!(b.get("main"), Some(&BindingValue::Text("index.js".into())));
    }

    #[test]
    fn mixed_pattern_aligns_groups_with_bindings() {
        let f = compile_key(":dir-:main", &defs()).unwrap();
        assert_eq!(f.capture_count(), 2);
        let b = f.match_text("out-index.js").unwrap();
        assert_eq!(b.get("dir"), Some(&BindingValue::Text("out".into())));
        assert_eq!(b.get("main"), Some(&BindingValue::Text("index.js".into())));
    }

    #[test]
    fn capture_rebinds_inner_glob() {
        let f = compile_key(":stem(*.c)", &defs()).unwrap();
        let b = f.match_text("util.c").unwrap();
        assert_eq!(b.get("stem"), Some(&BindingValue::Text("util".into())));
    }

    #[test]
    fn reference_uses_definition_unchanged() {
        let f = compile_key("&ver", &defs()).unwrap();
        let b = f.match_text("v10").unwrap();
        assert!(b.get("ver").is_none());
        assert!(compile_key("&nope", &defs()).is_err());
    }

    #[test]
    fn unknown_reference_is_reported_by_name() {
        match compile_key("&missing", &defs()) {
            Err(EmkError::UndefinedReference { name }) => assert_eq!(name, "missing"),
            other => panic!("expected UndefinedReference, got {other:?}"),
        }
    }

    #[test]
    fn bad_regex_is_pattern_compile_error() {
        match compile_key("`(unclosed`", &defs()) {
            Err(EmkError::PatternCompile { key, .. }) => assert_eq!(key, "`(unclosed`"),
            other => panic!("expected PatternCompile, got {other:?}"),
        }
    }
}
