//! ---
//! ems_section: "02-device-polling"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Reading values produced by the poller."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};

/// Scalar drawn verbatim from a device document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Bool(bool),
    Number(Number),
    String(String),
}

impl Scalar {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Scalar::Number(n) => n.as_f64(),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Scalar::String(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Bool(b) => write!(f, "{b}"),
            Scalar::Number(n) => write!(f, "{n}"),
            Scalar::String(s) => f.write_str(s),
        }
    }
}

/// Current value of one reading: a scalar taken from the document at exactly the
/// descriptor's path, or unknown. Serialises as the scalar itself or `null`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(from = "Option<Scalar>", into = "Option<Scalar>")]
pub enum ReadingValue {
    Known(Scalar),
    #[default]
    Unknown,
}

impl ReadingValue {
    /// Convert an extractor result. Objects and arrays are not readings.
    pub fn from_extracted(node: Option<&Value>) -> Self {
        match node {
            Some(Value::Bool(b)) => ReadingValue::Known(Scalar::Bool(*b)),
            Some(Value::Number(n)) => ReadingValue::Known(Scalar::Number(n.clone())),
            Some(Value::String(s)) => ReadingValue::Known(Scalar::String(s.clone())),
            _ => ReadingValue::Unknown,
        }
    }

    pub fn is_known(&self) -> bool {
        matches!(self, ReadingValue::Known(_))
    }

    pub fn scalar(&self) -> Option<&Scalar> {
        match self {
            ReadingValue::Known(scalar) => Some(scalar),
            ReadingValue::Unknown => None,
        }
    }
}

impl From<Option<Scalar>> for ReadingValue {
    fn from(value: Option<Scalar>) -> Self {
        value.map_or(ReadingValue::Unknown, ReadingValue::Known)
    }
}

impl From<ReadingValue> for Option<Scalar> {
    fn from(value: ReadingValue) -> Self {
        match value {
            ReadingValue::Known(scalar) => Some(scalar),
            ReadingValue::Unknown => None,
        }
    }
}

impl fmt::Display for ReadingValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReadingValue::Known(scalar) => fmt::Display::fmt(scalar, f),
            ReadingValue::Unknown => f.write_str("unknown"),
        }
    }
}
