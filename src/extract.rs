//! Ordered field-path extraction for loosely-shaped vendor JSON
//!
//! Vendor responses put the same datum under different keys depending on
//! the server instance. Callers hand over a priority list of [`FieldPath`]s;
//! the first path that yields a usable value wins, and exhausting the list
//! is reported as [`NoMatch`] rather than silently defaulting.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use thiserror::Error;

/// Dot-separated path into a JSON document.
///
/// Object keys and array indices share the syntax: `servers.elements.0.host`.
/// The empty path addresses the document itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldPath(String);

impl FieldPath {
    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into())
    }

    pub fn lookup<'a>(&self, value: &'a Value) -> Option<&'a Value> {
        self.0
            .split('.')
            .filter(|segment| !segment.is_empty())
            .try_fold(value, |node, segment| match node {
                Value::Object(map) => map.get(segment),
                Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
                _ => None,
            })
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            write!(f, "<root>")
        } else {
            write!(f, "{}", self.0)
        }
    }
}

impl From<&str> for FieldPath {
    fn from(path: &str) -> Self {
        Self::new(path)
    }
}

/// Build a priority list from string literals
pub fn paths(list: &[&str]) -> Vec<FieldPath> {
    list.iter().copied().map(FieldPath::from).collect()
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("no value found at any of [{}]", .tried.join(", "))]
pub struct NoMatch {
    pub tried: Vec<String>,
}

impl NoMatch {
    fn from_paths(paths: &[FieldPath]) -> Self {
        Self {
            tried: paths.iter().map(ToString::to_string).collect(),
        }
    }
}

fn as_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        _ => None,
    }
}

fn as_port(value: &Value) -> Option<u16> {
    let port: u16 = match value {
        Value::Number(n) => n.as_u64().and_then(|p| u16::try_from(p).ok())?,
        Value::String(s) => s.trim().parse().ok()?,
        _ => return None,
    };
    (port != 0).then_some(port)
}

/// First non-empty string along `paths`
pub fn first_string(value: &Value, paths: &[FieldPath]) -> Option<String> {
    paths.iter().find_map(|p| p.lookup(value).and_then(as_text))
}

/// First non-empty string along `paths`, or the list of paths tried
pub fn require_string(value: &Value, paths: &[FieldPath]) -> Result<String, NoMatch> {
    first_string(value, paths).ok_or_else(|| NoMatch::from_paths(paths))
}

/// First valid TCP port along `paths`; numeric strings are accepted
pub fn first_port(value: &Value, paths: &[FieldPath]) -> Option<u16> {
    paths.iter().find_map(|p| p.lookup(value).and_then(as_port))
}

/// First array along `paths`
pub fn first_array<'a>(value: &'a Value, paths: &[FieldPath]) -> Option<&'a Vec<Value>> {
    paths.iter().find_map(|p| p.lookup(value).and_then(Value::as_array))
}
