//! Format resolution: declared format, then file extension, then a short
//! content probe.

use super::text::resolve_encoding;
use super::FormatKind;
use crate::config::TableSpec;
use crate::error::{Error, Result};
use std::io::{Cursor, Read};
use tracing::debug;

/// Bytes read to classify a file with an unrecognized extension.
const PROBE_LEN: usize = 10;

/// Format implied by a key's extension, if any.
pub fn from_extension(key: &str) -> Option<FormatKind> {
    let lowered = key.to_lowercase();
    if lowered.ends_with(".xlsx") || lowered.ends_with(".xls") {
        Some(FormatKind::Excel)
    } else if lowered.ends_with(".json") || lowered.ends_with(".js") {
        Some(FormatKind::Json)
    } else if lowered.ends_with(".jsonl") {
        Some(FormatKind::Jsonl)
    } else if lowered.ends_with(".csv") {
        Some(FormatKind::Csv)
    } else {
        None
    }
}

/// Classify decoded probe text by its first non-whitespace character.
pub fn sniff(probe: &str) -> std::result::Result<FormatKind, String> {
    if probe.is_empty() {
        return Err("unable to read the file for type detection".to_string());
    }
    match probe.chars().find(|c| !c.is_whitespace()) {
        Some('[') => Ok(FormatKind::Json),
        Some(c) if !c.is_control() && c != char::REPLACEMENT_CHARACTER => Ok(FormatKind::Csv),
        Some(c) => Err(format!("first character {:?} is not printable", c)),
        None => Err("probe contained only whitespace".to_string()),
    }
}

/// Resolve the concrete format for `key`, probing `handle` only when the
/// declared format and the extension are both inconclusive. The returned
/// handle starts at the beginning of the content.
pub fn resolve(
    spec: &TableSpec,
    key: &str,
    handle: Box<dyn Read>,
) -> Result<(FormatKind, Box<dyn Read>)> {
    if let Some(kind) = FormatKind::from_setting(spec.format) {
        return Ok((kind, handle));
    }
    if let Some(kind) = from_extension(key) {
        debug!(key = %key, format = kind.as_str(), "Format from extension");
        return Ok((kind, handle));
    }

    let mut handle = handle;
    let mut probe = Vec::with_capacity(PROBE_LEN);
    (&mut handle).take(PROBE_LEN as u64).read_to_end(&mut probe)?;

    let (decoded, _, _) = resolve_encoding(&spec.encoding)?.decode(&probe);
    let kind = sniff(&decoded).map_err(|reason| Error::FormatDetectionFailed {
        key: key.to_string(),
        reason,
    })?;
    debug!(key = %key, format = kind.as_str(), "Format from content probe");

    let rewound: Box<dyn Read> = Box::new(Cursor::new(probe).chain(handle));
    Ok((kind, rewound))
}
