//! ---
//! ems_section: "02-device-polling"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Dotted JSON path extraction."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
//! Dotted path lookup over decoded JSON documents.
//!
//! A path such as `evse.0.current` is split on `.` into segments. Each segment
//! indexes an array when the current node is an array and the segment is a
//! non-negative integer literal, or looks up a key when the current node is an
//! object. Any other combination resolves to absent.

use std::fmt;

use serde_json::Value;

/// Pre-split dotted path expression.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct JsonPath {
    raw: String,
    segments: Vec<String>,
}

impl JsonPath {
    pub fn new(raw: impl Into<String>) -> Self {
        let raw = raw.into();
        let segments = raw.split('.').map(str::to_owned).collect();
        Self { raw, segments }
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().map(String::as_str)
    }

    /// Borrow the node at this path, or `None` when any segment fails to resolve.
    pub fn resolve<'a>(&self, document: &'a Value) -> Option<&'a Value> {
        descend(document, &self.segments)
    }
}

impl fmt::Display for JsonPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl From<&str> for JsonPath {
    fn from(raw: &str) -> Self {
        JsonPath::new(raw)
    }
}

/// Look up `path` in `document` without copying it.
pub fn extract<'a>(document: &'a Value, path: &str) -> Option<&'a Value> {
    let segments: Vec<&str> = path.split('.').collect();
    descend(document, &segments)
}

fn descend<'a, S: AsRef<str>>(node: &'a Value, segments: &[S]) -> Option<&'a Value> {
    let Some((head, rest)) = segments.split_first() else {
        // Null leaves count as absent, same as a missing key.
        return (!node.is_null()).then_some(node);
    };
    let child = match node {
        Value::Array(items) => items.get(array_index(head.as_ref())?)?,
        Value::Object(map) => map.get(head.as_ref())?,
        _ => return None,
    };
    descend(child, rest)
}

fn array_index(segment: &str) -> Option<usize> {
    if segment.is_empty() || !segment.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    segment.parse().ok()
}
