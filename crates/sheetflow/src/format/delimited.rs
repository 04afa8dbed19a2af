//! Delimited text (CSV) reader.
//!
//! The first record is the header unless `field_names` is configured.
//! Records longer than the header put their surplus values under
//! [`EXTRA_FIELD`]; shorter records fill the missing fields with null.

use super::fields::{normalize_field_name, KeyCase, EXTRA_FIELD};
use super::text::NewlinePolicy;
use super::RowIter;
use crate::config::TableSpec;
use crate::error::{Error, Result};
use crate::types::{FieldValue, ParsedRow};
use csv::{ReaderBuilder, StringRecord, Terminator};
use std::io::{BufRead, Cursor, Read};
use tracing::debug;

/// Delimiters considered when sniffing, in order of preference.
const SNIFF_CANDIDATES: [u8; 6] = [b',', b'\t', b';', b' ', b':', b'|'];

/// Build the row iterator over decoded UTF-8 text.
pub fn rows<R>(spec: &TableSpec, mut reader: R, file: &str, policy: NewlinePolicy) -> Result<RowIter>
where
    R: BufRead + 'static,
{
    let quote = spec.quote_char();
    let (delimiter, reader): (u8, Box<dyn Read>) = match spec.explicit_delimiter() {
        Some(delimiter) => (delimiter, Box::new(reader)),
        None => {
            let mut first_line = Vec::new();
            reader.read_until(b'\n', &mut first_line)?;
            let delimiter = sniff_delimiter(&first_line, quote)
                .ok_or_else(|| Error::invalid_format(file, "Unable to sniff a delimiter"))?;
            debug!(file = %file, delimiter = %(delimiter as char), "Sniffed delimiter");
            (delimiter, Box::new(Cursor::new(first_line).chain(reader)))
        }
    };

    let terminator = match policy {
        NewlinePolicy::Universal => Terminator::CRLF,
        NewlinePolicy::LiteralLf => Terminator::Any(b'\n'),
    };
    let mut csv_reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .delimiter(delimiter)
        .quote(quote)
        .double_quote(true)
        .terminator(terminator)
        .from_reader(reader);

    let mut records = std::iter::from_fn(move || {
        let mut record = StringRecord::new();
        match csv_reader.read_record(&mut record) {
            Ok(true) => Some(Ok(record)),
            Ok(false) => None,
            Err(e) => Some(Err(e)),
        }
    });

    let header: Vec<String> = match &spec.field_names {
        Some(names) => names.clone(),
        None => match records.next() {
            None => return Ok(Box::new(std::iter::empty())),
            Some(Err(e)) => return Err(Error::invalid_format(file, e)),
            Some(Ok(record)) => trimmed(&record, policy).iter().map(|s| s.to_string()).collect(),
        },
    };
    let header: Vec<String> = header
        .iter()
        .map(|name| normalize_field_name(name, KeyCase::Lower))
        .collect();

    let file = file.to_string();
    Ok(Box::new(records.map(move |record| {
        let record = record.map_err(|e| Error::invalid_format(&file, e))?;
        Ok(to_row(&header, &trimmed(&record, policy)))
    })))
}

/// Under the literal `\n` policy a CRLF file leaves `\r` on the last field.
fn trimmed(record: &StringRecord, policy: NewlinePolicy) -> StringRecord {
    if policy == NewlinePolicy::Universal {
        return record.clone();
    }
    let last = record.len().saturating_sub(1);
    record
        .iter()
        .enumerate()
        .map(|(i, field)| {
            if i == last {
                field.strip_suffix('\r').unwrap_or(field)
            } else {
                field
            }
        })
        .collect()
}

fn to_row(header: &[String], record: &StringRecord) -> ParsedRow {
    let mut row = ParsedRow::with_capacity(header.len() + 1);
    for (i, name) in header.iter().enumerate() {
        let value = record.get(i).map(FieldValue::from).unwrap_or(FieldValue::Null);
        row.insert(name.clone(), value);
    }
    if record.len() > header.len() {
        let extra: Vec<&str> = record.iter().skip(header.len()).collect();
        row.insert(
            EXTRA_FIELD.to_string(),
            FieldValue::String(serde_json::Value::from(extra).to_string()),
        );
    }
    row
}

/// Pick the first candidate delimiter that occurs outside quotes in the
/// sample line.
pub fn sniff_delimiter(line: &[u8], quote: u8) -> Option<u8> {
    let mut counts = [0usize; SNIFF_CANDIDATES.len()];
    let mut quoted = false;
    for &byte in line {
        if byte == quote {
            quoted = !quoted;
            continue;
        }
        if quoted {
            continue;
        }
        if let Some(i) = SNIFF_CANDIDATES.iter().position(|&c| c == byte) {
            counts[i] += 1;
        }
    }
    SNIFF_CANDIDATES
        .iter()
        .zip(counts)
        .find(|(_, count)| *count > 0)
        .map(|(&c, _)| c)
}
