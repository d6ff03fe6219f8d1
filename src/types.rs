use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::Deserialize;

use crate::errors::{EmkError, Result};

/// How dependency strings are expanded before resolution.
///
/// - `Template`: in-process substitution of `$@`, `$<`, `$*` and `$name`.
/// - `Shell`: the same substitutions performed by the configured shell, which
///   also allows command substitution such as `$(dirname "$@")`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExpandMode {
    Template,
    Shell,
}

impl Default for ExpandMode {
    fn default() -> Self {
        ExpandMode::Template
    }
}

impl FromStr for ExpandMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "template" => Ok(ExpandMode::Template),
            "shell" => Ok(ExpandMode::Shell),
            other => Err(format!(
                "invalid expand mode: {other} (expected \"template\" or \"shell\")"
            )),
        }
    }
}

/// Value bound to a name while matching a target, or supplied through a
/// `:json` suffix on the target string.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum BindingValue {
    Text(String),
    /// Repeated captures under one name, in match order.
    List(Vec<String>),
    Number(String),
    Bool(bool),
}

impl BindingValue {
    /// First captured value; lists behave like their head in string contexts.
    pub fn first(&self) -> Option<&str> {
        match self {
            BindingValue::Text(s) | BindingValue::Number(s) => Some(s),
            BindingValue::List(items) => items.first().map(String::as_str),
            BindingValue::Bool(true) => Some("true"),
            BindingValue::Bool(false) => Some("false"),
        }
    }

    fn from_json(name: &str, value: serde_json::Value) -> Result<Self> {
        use serde_json::Value;
        match value {
            Value::String(s) => Ok(BindingValue::Text(s)),
            Value::Number(n) => Ok(BindingValue::Number(n.to_string())),
            Value::Bool(b) => Ok(BindingValue::Bool(b)),
            Value::Array(items) => items
                .into_iter()
                .map(|item| match item {
                    Value::String(s) => Ok(s),
                    Value::Number(n) => Ok(n.to_string()),
                    other => Err(EmkError::ConfigError(format!(
                        "cannot bind '{name}': unsupported list item {other}"
                    ))),
                })
                .collect::<Result<Vec<_>>>()
                .map(BindingValue::List),
            other => Err(EmkError::ConfigError(format!(
                "cannot bind '{name}': unsupported value {other}"
            ))),
        }
    }
}

impl fmt::Display for BindingValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BindingValue::Text(s) | BindingValue::Number(s) => f.write_str(s),
            BindingValue::List(items) => f.write_str(&items.join(" ")),
            BindingValue::Bool(b) => write!(f, "{b}"),
        }
    }
}

/// Ordered map of binding name to value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Bindings(BTreeMap<String, BindingValue>);

impl Bindings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn get(&self, name: &str) -> Option<&BindingValue> {
        self.0.get(name)
    }

    pub fn insert(&mut self, name: impl Into<String>, value: BindingValue) {
        self.0.insert(name.into(), value);
    }

    pub fn insert_text(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.insert(name, BindingValue::Text(value.into()));
    }

    /// Record a regex capture. A second capture under the same name turns the
    /// value into a list.
    pub fn push_capture(&mut self, name: &str, value: &str) {
        match self.0.get_mut(name) {
            None => {
                self.0
                    .insert(name.to_string(), BindingValue::Text(value.to_string()));
            }
            Some(BindingValue::List(items)) => items.push(value.to_string()),
            Some(existing) => {
                let head = existing.to_string();
                *existing = BindingValue::List(vec![head, value.to_string()]);
            }
        }
    }

    /// Overlay `other` on top of `self`; entries in `other` win.
    pub fn merge(&mut self, other: &Bindings) {
        for (k, v) in other.iter() {
            self.0.insert(k.to_string(), v.clone());
        }
    }

    pub fn merged(&self, other: &Bindings) -> Bindings {
        let mut out = self.clone();
        out.merge(other);
        out
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &BindingValue)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Parse a JSON object (the `:json` target suffix) into bindings.
    pub fn from_json_str(text: &str) -> Result<Bindings> {
        let value: serde_json::Value = serde_json::from_str(text)?;
        let serde_json::Value::Object(map) = value else {
            return Err(EmkError::ConfigError(format!(
                "target config must be a JSON object, got: {text}"
            )));
        };

        let mut out = Bindings::new();
        for (name, value) in map {
            let bound = BindingValue::from_json(&name, value)?;
            out.insert(name, bound);
        }
        Ok(out)
    }

    /// Stable textual form, used for node identity.
    pub fn canonical(&self) -> String {
        self.0
            .iter()
            .map(|(k, v)| match v {
                BindingValue::List(items) => format!("{k}=[{}]", items.join(",")),
                other => format!("{k}={other}"),
            })
            .collect::<Vec<_>>()
            .join(";")
    }
}

impl FromIterator<(String, BindingValue)> for Bindings {
    fn from_iter<I: IntoIterator<Item = (String, BindingValue)>>(iter: I) -> Self {
        Bindings(iter.into_iter().collect())
    }
}
