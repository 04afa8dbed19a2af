//! Row stream dispatch: open a discovered key, resolve its format and bound
//! the rows the reader produces.

use crate::config::TableSpec;
use crate::error::Result;
use crate::format::{detect, FormatKind, RowIter};
use crate::source::{Location, ProtocolAdapter};
use crate::types::{is_empty_row, ParsedRow};
use tracing::{debug, warn};

/// Opens row streams for keys under one table location.
pub struct RowStreamDispatcher<'a> {
    adapter: &'a dyn ProtocolAdapter,
    location: &'a Location,
}

impl<'a> RowStreamDispatcher<'a> {
    pub fn new(adapter: &'a dyn ProtocolAdapter, location: &'a Location) -> Self {
        Self { adapter, location }
    }

    /// Credential-scrubbed URI of `key`, used in errors and logs.
    pub fn target_uri(&self, key: &str) -> String {
        crate::source::scrub_credentials(&self.location.target_uri(key))
    }

    /// Resolve the format `key` would be read with.
    pub fn resolve_format(&self, spec: &TableSpec, key: &str) -> Result<FormatKind> {
        let handle = self.adapter.open(key)?;
        detect::resolve(spec, key, handle).map(|(kind, _)| kind)
    }

    /// Open `key` bounded by the table's `max_records_per_run`.
    pub fn open(&self, spec: &TableSpec, key: &str) -> Result<RowStream> {
        self.open_with_limit(spec, key, spec.record_limit())
    }

    /// Open `key` with an explicit row cap (`None` for unbounded).
    ///
    /// With `invalid_format_action = ignore`, a file the reader rejects
    /// yields no further rows instead of an error. Backend failures and
    /// inconclusive format detection always propagate.
    pub fn open_with_limit(
        &self,
        spec: &TableSpec,
        key: &str,
        limit: Option<usize>,
    ) -> Result<RowStream> {
        let file = self.target_uri(key);
        let handle = self.adapter.open(key)?;
        let (kind, handle) = detect::resolve(spec, key, handle)?;
        debug!(file = %file, format = %kind, "Opening row stream");

        let rows = match kind.open(spec, handle, &file) {
            Ok(rows) => rows,
            Err(e) if e.is_invalid_format() && spec.ignores_invalid_files() => {
                warn!(file = %file, error = %e, "Ignoring unparseable file");
                Box::new(std::iter::empty())
            }
            Err(e) => return Err(e),
        };

        Ok(RowStream {
            rows,
            file,
            kind,
            skip_empty: spec.skip_empty_rows,
            // Excel applies skip_initial before reading its header row.
            to_skip: if kind == FormatKind::Excel { 0 } else { spec.skip_initial },
            remaining: limit,
            ignore_invalid: spec.ignores_invalid_files(),
            done: false,
        })
    }
}

/// Lazy, forward-only rows of one file.
pub struct RowStream {
    rows: RowIter,
    file: String,
    kind: FormatKind,
    skip_empty: bool,
    to_skip: usize,
    remaining: Option<usize>,
    ignore_invalid: bool,
    done: bool,
}

impl RowStream {
    pub fn format(&self) -> FormatKind {
        self.kind
    }

    /// Scrubbed URI of the file being read.
    pub fn file(&self) -> &str {
        &self.file
    }
}

impl Iterator for RowStream {
    type Item = Result<ParsedRow>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done || self.remaining == Some(0) {
            return None;
        }
        loop {
            let row = match self.rows.next() {
                None => {
                    self.done = true;
                    return None;
                }
                Some(Ok(row)) => row,
                Some(Err(e)) => {
                    self.done = true;
                    if e.is_invalid_format() && self.ignore_invalid {
                        warn!(file = %self.file, error = %e, "Ignoring rest of unparseable file");
                        return None;
                    }
                    return Some(Err(e));
                }
            };

            if self.skip_empty && is_empty_row(&row) {
                continue;
            }
            if self.to_skip > 0 {
                self.to_skip -= 1;
                continue;
            }
            if let Some(remaining) = self.remaining.as_mut() {
                *remaining -= 1;
            }
            return Some(Ok(row));
        }
    }
}
