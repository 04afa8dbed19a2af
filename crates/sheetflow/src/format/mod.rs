//! Format readers. Every reader turns an open byte stream into a lazy
//! sequence of [`ParsedRow`]s and reports structurally invalid input as
//! [`Error::InvalidFormat`](crate::error::Error::InvalidFormat).

pub mod delimited;
pub mod detect;
pub mod excel;
pub mod fields;
pub mod json;
pub mod jsonl;
pub mod text;

use crate::config::{FormatSetting, TableSpec};
use crate::error::Result;
use crate::types::ParsedRow;
use serde::Serialize;
use std::fmt;
use std::io::{BufReader, Read};
use text::{resolve_encoding, DecodingReader, NewlinePolicy};

/// Rows produced by one reader for one file.
pub type RowIter = Box<dyn Iterator<Item = Result<ParsedRow>>>;

/// Concrete file format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FormatKind {
    Csv,
    Excel,
    Json,
    Jsonl,
}

impl FormatKind {
    /// `None` for `detect`.
    pub fn from_setting(setting: FormatSetting) -> Option<Self> {
        match setting {
            FormatSetting::Csv => Some(Self::Csv),
            FormatSetting::Excel => Some(Self::Excel),
            FormatSetting::Json => Some(Self::Json),
            FormatSetting::Jsonl => Some(Self::Jsonl),
            FormatSetting::Detect => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::Excel => "excel",
            Self::Json => "json",
            Self::Jsonl => "jsonl",
        }
    }

    /// Binary formats read raw bytes; text formats read decoded UTF-8.
    pub fn is_binary(&self) -> bool {
        matches!(self, Self::Excel)
    }

    /// Open the reader for this format over `handle`. `file` labels errors.
    pub fn open(self, spec: &TableSpec, handle: Box<dyn Read>, file: &str) -> Result<RowIter> {
        match self {
            Self::Excel => excel::rows(spec, handle, file),
            Self::Csv => {
                let (text, policy) = decoded(spec, handle)?;
                delimited::rows(spec, text, file, policy)
            }
            Self::Json => {
                let (text, _) = decoded(spec, handle)?;
                json::rows(spec, text, file)
            }
            Self::Jsonl => {
                let (text, policy) = decoded(spec, handle)?;
                jsonl::rows(text, file, policy)
            }
        }
    }
}

type TextHandle = BufReader<DecodingReader<Box<dyn Read>>>;

/// Wrap a raw handle in the table's encoding and newline policy.
fn decoded(spec: &TableSpec, handle: Box<dyn Read>) -> Result<(TextHandle, NewlinePolicy)> {
    let encoding = resolve_encoding(&spec.encoding)?;
    Ok((
        BufReader::new(DecodingReader::new(handle, encoding)),
        NewlinePolicy::from_flag(spec.universal_newlines),
    ))
}

impl fmt::Display for FormatKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
