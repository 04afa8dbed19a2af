//! Newline-delimited JSON reader. One object per line; blank lines are
//! skipped. Mixed-case keys keep their case.

use super::fields::KeyCase;
use super::json::{kind_of, object_to_row};
use super::text::{Lines, NewlinePolicy};
use super::RowIter;
use crate::error::{Error, Result};
use serde_json::Value;
use std::io::BufRead;

pub fn rows<R>(reader: R, file: &str, policy: NewlinePolicy) -> Result<RowIter>
where
    R: BufRead + 'static,
{
    let file = file.to_string();
    let lines = Lines::new(reader, policy)
        .enumerate()
        .filter(|(_, line)| line.as_ref().map_or(true, |l| !l.trim().is_empty()));

    Ok(Box::new(lines.map(move |(index, line)| {
        let line = line?;
        let lineno = index + 1;
        match serde_json::from_str::<Value>(&line) {
            Ok(Value::Object(map)) => Ok(object_to_row(map, KeyCase::LowerIfAllUpper)),
            Ok(other) => Err(Error::invalid_format(
                &file,
                format!("line {}: expected an object, found {}", lineno, kind_of(&other)),
            )),
            Err(e) => Err(Error::invalid_format(&file, format!("line {}: {}", lineno, e))),
        }
    })))
}
