// src/target/query.rs

use std::fmt;

use regex::Regex;

use crate::errors::{EmkError, Result};
use crate::fragment::glob::{glob_to_regex, Star};

/// One segment of a target query.
#[derive(Debug, Clone)]
pub enum QueryToken {
    Exact(String),
    /// `*`: every enumerable child.
    Wildcard,
    /// `**`: zero or more levels.
    RecursiveWildcard,
    /// A segment containing `*`, such as `*.js`.
    Partial(PartialPattern),
}

#[derive(Debug, Clone)]
pub struct PartialPattern {
    glob: String,
    regex: Regex,
}

impl PartialPattern {
    pub fn new(glob: &str) -> Result<Self> {
        let source = glob_to_regex(glob, Star::OneOrMore);
        let regex = Regex::new(&format!("^(?:{source})$")).map_err(|e| {
            EmkError::PatternCompile {
                key: glob.to_string(),
                reason: e.to_string(),
            }
        })?;
        Ok(Self {
            glob: glob.to_string(),
            regex,
        })
    }

    pub fn glob(&self) -> &str {
        &self.glob
    }

    pub fn regex(&self) -> &Regex {
        &self.regex
    }
}

impl QueryToken {
    pub fn is_exact(&self) -> bool {
        matches!(self, QueryToken::Exact(_))
    }
}

impl fmt::Display for QueryToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryToken::Exact(s) => f.write_str(s),
            QueryToken::Wildcard => f.write_str("*"),
            QueryToken::RecursiveWildcard => f.write_str("**"),
            QueryToken::Partial(p) => f.write_str(&p.glob),
        }
    }
}

/// Split `target` on `split` into query tokens. Empty segments are dropped,
/// so `build/` and `build` are the same query.
pub fn parse_query(target: &str, split: char) -> Result<Vec<QueryToken>> {
    target
        .split(split)
        .filter(|segment| !segment.is_empty())
        .map(|segment| match segment {
            "*" => Ok(QueryToken::Wildcard),
            "**" => Ok(QueryToken::RecursiveWildcard),
            s if s.contains('*') => PartialPattern::new(s).map(QueryToken::Partial),
            s => Ok(QueryToken::Exact(s.to_string())),
        })
        .collect()
}
