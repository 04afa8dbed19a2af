//! Excel workbook reader (`.xlsx`, `.xls`, `.xlsb`, `.ods`).
//!
//! `skip_initial` counts sheet rows from row 1 and is applied here, before
//! the header row is taken, so the dispatcher does not skip again.

use super::fields::{normalize_field_name, KeyCase};
use super::RowIter;
use crate::config::TableSpec;
use crate::error::{Error, Result};
use crate::types::{FieldValue, ParsedRow};
use calamine::{open_workbook_auto_from_rs, Data, Range, Reader};
use chrono::NaiveDateTime;
use std::io::{Cursor, Read};
use tracing::debug;

pub fn rows(spec: &TableSpec, mut handle: Box<dyn Read>, file: &str) -> Result<RowIter> {
    let mut bytes = Vec::new();
    handle.read_to_end(&mut bytes)?;

    let mut workbook =
        open_workbook_auto_from_rs(Cursor::new(bytes)).map_err(|e| Error::invalid_format(file, e))?;
    let sheet = match &spec.worksheet_name {
        Some(name) => name.clone(),
        None => workbook
            .sheet_names()
            .first()
            .cloned()
            .ok_or_else(|| Error::invalid_format(file, "workbook has no worksheets"))?,
    };
    debug!(file = %file, sheet = %sheet, "Reading worksheet");
    let range = workbook
        .worksheet_range(&sheet)
        .map_err(|e| Error::invalid_format(file, e))?;

    // The range starts at the first used cell, not at row 1.
    let first_row = range.start().map(|(row, _)| row as usize).unwrap_or(0);
    let header_index = spec.skip_initial.saturating_sub(first_row);
    if header_index >= range.height() {
        return Ok(Box::new(std::iter::empty()));
    }

    let header: Vec<String> = (0..range.width())
        .map(|col| {
            let name = range
                .get((header_index, col))
                .map(header_text)
                .unwrap_or_default();
            normalize_field_name(&name, KeyCase::Lower)
        })
        .collect();

    Ok(Box::new(
        (header_index + 1..range.height()).map(move |row| Ok(sheet_row(&range, row, &header))),
    ))
}

fn sheet_row(range: &Range<Data>, row: usize, header: &[String]) -> ParsedRow {
    header
        .iter()
        .enumerate()
        .map(|(col, name)| {
            let value = range.get((row, col)).map(cell_value).unwrap_or(FieldValue::Null);
            (name.clone(), value)
        })
        .collect()
}

fn header_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::Float(f) if f.fract() == 0.0 && f.abs() < i64::MAX as f64 => (*f as i64).to_string(),
        other => other.to_string(),
    }
}

fn cell_value(cell: &Data) -> FieldValue {
    match cell {
        Data::Empty => FieldValue::Null,
        Data::String(s) => FieldValue::String(s.clone()),
        Data::Int(i) => FieldValue::Integer(*i),
        Data::Float(f) if f.fract() == 0.0 && f.abs() < i64::MAX as f64 => {
            FieldValue::Integer(*f as i64)
        }
        Data::Float(f) => FieldValue::Number(*f),
        Data::Bool(b) => FieldValue::Boolean(*b),
        Data::DateTime(dt) => dt
            .as_datetime()
            .map(|naive| FieldValue::Timestamp(naive.and_utc()))
            .unwrap_or(FieldValue::Number(dt.as_f64())),
        Data::DateTimeIso(raw) => NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
            .map(|naive| FieldValue::Timestamp(naive.and_utc()))
            .unwrap_or_else(|_| FieldValue::String(raw.clone())),
        Data::DurationIso(raw) => FieldValue::String(raw.clone()),
        Data::Error(e) => FieldValue::String(e.to_string()),
    }
}
