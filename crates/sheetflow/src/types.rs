//! Core types shared by discovery, parsing and extraction

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Modification-time threshold; only objects strictly newer are eligible.
pub type Watermark = DateTime<Utc>;

/// Normalized field name → value, in source column order.
pub type ParsedRow = IndexMap<String, FieldValue>;

/// A listed storage entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveredObject {
    /// Key relative to the table location
    pub key: String,
    /// Last modification time reported by the backend
    pub last_modified: DateTime<Utc>,
}

impl DiscoveredObject {
    pub fn new(key: impl Into<String>, last_modified: DateTime<Utc>) -> Self {
        Self {
            key: key.into(),
            last_modified,
        }
    }
}

/// A single cell value produced by a format reader.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Null,
    String(String),
    Integer(i64),
    Number(f64),
    Boolean(bool),
    Timestamp(DateTime<Utc>),
}

impl FieldValue {
    /// Null and the empty string both count as "no value".
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Null => true,
            Self::String(s) => s.is_empty(),
            _ => false,
        }
    }

    /// Convert a JSON value. Nested arrays and objects are kept as JSON text.
    pub fn from_json(value: JsonValue) -> Self {
        match value {
            JsonValue::Null => Self::Null,
            JsonValue::Bool(b) => Self::Boolean(b),
            JsonValue::Number(n) => match n.as_i64() {
                Some(i) => Self::Integer(i),
                None => n.as_f64().map(Self::Number).unwrap_or(Self::Null),
            },
            JsonValue::String(s) => Self::String(s),
            nested @ (JsonValue::Array(_) | JsonValue::Object(_)) => {
                Self::String(nested.to_string())
            }
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

/// True when every value in the row is null or an empty string.
pub fn is_empty_row(row: &ParsedRow) -> bool {
    row.values().all(FieldValue::is_empty)
}
