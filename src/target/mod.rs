// src/target/mod.rs

//! Target strings: query parsing and namespace tree search.

pub mod query;
pub mod search;

use crate::errors::Result;
use crate::types::Bindings;

pub use query::{parse_query, PartialPattern, QueryToken};
pub use search::{resolve, Resolution};

/// A target string split into its query and optional `:{json}` arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetSpec {
    pub query: String,
    pub args: Bindings,
}

impl TargetSpec {
    /// Split at the first `:` that starts a JSON object. A `:` followed by
    /// anything else stays part of the query.
    pub fn parse(target: &str) -> Result<TargetSpec> {
        let split = target
            .match_indices(':')
            .map(|(idx, _)| idx)
            .find(|&idx| target[idx + 1..].trim_start().starts_with('{'));

        match split {
            Some(idx) => Ok(TargetSpec {
                query: target[..idx].to_string(),
                args: Bindings::from_json_str(&target[idx + 1..])?,
            }),
            None => Ok(TargetSpec {
                query: target.to_string(),
                args: Bindings::new(),
            }),
        }
    }
}
