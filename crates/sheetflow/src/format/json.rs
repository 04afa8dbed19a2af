//! JSON document reader.
//!
//! The document root (or the `json_path` matches) must be an array of
//! objects or a single object. A file holding several concatenated
//! top-level values is read value by value.

use super::fields::{normalize_field_name, KeyCase};
use super::RowIter;
use crate::config::TableSpec;
use crate::error::{Error, Result};
use crate::types::{FieldValue, ParsedRow};
use serde_json::{Deserializer, Value};
use std::io::{BufRead, Read};
use tracing::debug;

pub fn rows<R: BufRead>(spec: &TableSpec, mut reader: R, file: &str) -> Result<RowIter> {
    let mut text = String::new();
    reader.read_to_string(&mut text)?;

    let root = match serde_json::from_str::<Value>(&text) {
        Ok(value) => value,
        Err(e) if e.to_string().starts_with("trailing characters") => {
            debug!(file = %file, "Extra data after first JSON value, reading values in sequence");
            let values = Deserializer::from_str(&text)
                .into_iter::<Value>()
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(|e| Error::invalid_format(file, e))?;
            Value::Array(values)
        }
        Err(e) => return Err(Error::invalid_format(file, e)),
    };

    let root = match spec.json_path.as_deref() {
        Some(path) => {
            let matches = jsonpath_lib::select(&root, path)
                .map_err(|e| Error::invalid_format(file, format!("json_path {}: {:?}", path, e)))?;
            Value::Array(matches.into_iter().cloned().collect())
        }
        None => root,
    };

    let items = match root {
        Value::Array(items) => items,
        object @ Value::Object(_) => vec![object],
        other => {
            return Err(Error::invalid_format(
                file,
                format!("expected an array of objects, found {}", kind_of(&other)),
            ))
        }
    };

    // Nested arrays contribute their elements as rows.
    let objects = items.into_iter().flat_map(|item| match item {
        Value::Array(inner) => inner,
        other => vec![other],
    });

    let file = file.to_string();
    Ok(Box::new(objects.map(move |value| match value {
        Value::Object(map) => Ok(object_to_row(map, KeyCase::Lower)),
        other => Err(Error::invalid_format(
            &file,
            format!("expected an object, found {}", kind_of(&other)),
        )),
    })))
}

/// Normalize keys and convert values of one JSON object.
pub(crate) fn object_to_row(map: serde_json::Map<String, Value>, case: KeyCase) -> ParsedRow {
    map.into_iter()
        .map(|(key, value)| (normalize_field_name(&key, case), FieldValue::from_json(value)))
        .collect()
}

pub(crate) fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
