//! Record extraction: stream a table's files into a record sink with source
//! metadata attached, and track the modification-time watermark.

use crate::config::TableSpec;
use crate::discovery::FileDiscoveryEngine;
use crate::dispatch::RowStreamDispatcher;
use crate::error::{Error, Result};
use crate::source::scrub_credentials;
use crate::types::{FieldValue, ParsedRow, Watermark};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;
use std::io::{self, Write};
use tracing::{error, info};

pub const SOURCE_BUCKET_FIELD: &str = "_smart_source_bucket";
pub const SOURCE_FILE_FIELD: &str = "_smart_source_file";
pub const SOURCE_LINENO_FIELD: &str = "_smart_source_lineno";

/// Destination for emitted records.
pub trait RecordSink {
    fn write_record(&mut self, stream: &str, record: &ParsedRow) -> io::Result<()>;

    /// Persist progress. Sinks without a state channel ignore it.
    fn write_state(&mut self, _state: &SyncState) -> io::Result<()> {
        Ok(())
    }
}

/// Writes one JSON message per line: `RECORD` for rows, `STATE` for
/// bookmarks.
pub struct JsonLinesSink<W: Write> {
    out: W,
}

impl<W: Write> JsonLinesSink<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn write_message(&mut self, message: &serde_json::Value) -> io::Result<()> {
        serde_json::to_writer(&mut self.out, message)?;
        self.out.write_all(b"\n")?;
        self.out.flush()
    }
}

impl<W: Write> RecordSink for JsonLinesSink<W> {
    fn write_record(&mut self, stream: &str, record: &ParsedRow) -> io::Result<()> {
        self.write_message(&json!({"type": "RECORD", "stream": stream, "record": record}))
    }

    fn write_state(&mut self, state: &SyncState) -> io::Result<()> {
        self.write_message(&json!({"type": "STATE", "value": state}))
    }
}

/// Per-table bookmark.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bookmark {
    pub modified_since: DateTime<Utc>,
}

/// Bookmarks keyed by table name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SyncState {
    pub bookmarks: BTreeMap<String, Bookmark>,
}

impl SyncState {
    pub fn load(path: &std::path::Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content)
            .map_err(|e| Error::Config(format!("Invalid state file {}: {}", path.display(), e)))
    }

    pub fn watermark(&self, table: &str) -> Option<Watermark> {
        self.bookmarks.get(table).map(|b| b.modified_since)
    }

    pub fn advance(&mut self, table: &str, modified_since: Watermark) {
        self.bookmarks
            .insert(table.to_string(), Bookmark { modified_since });
    }
}

/// Watermark to sync `spec` from: the stored bookmark unless the table
/// ignores state or has none, else its `start_date`.
pub fn resolve_watermark(spec: &TableSpec, state: Option<&SyncState>) -> Result<Option<Watermark>> {
    if !spec.ignore_state {
        if let Some(stored) = state.and_then(|s| s.watermark(&spec.name)) {
            return Ok(Some(stored));
        }
    }
    spec.start_watermark()
}

/// Outcome of syncing one table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableSyncSummary {
    pub table: String,
    pub files: usize,
    pub records: usize,
    /// Modification time of the last file processed
    pub watermark: Option<Watermark>,
}

/// Stream one file into `sink`, returning the number of records written.
/// At most `limit` records are written when set.
pub fn sync_file(
    dispatcher: &RowStreamDispatcher<'_>,
    spec: &TableSpec,
    key: &str,
    sink: &mut dyn RecordSink,
    limit: Option<usize>,
) -> Result<usize> {
    info!(table = %spec.name, file = %key, "Syncing file");
    let bucket = scrub_credentials(&spec.path);
    let stream = dispatcher.open_with_limit(spec, key, limit)?;

    let mut records = 0;
    for row in stream {
        let mut record = row?;
        record.insert(SOURCE_BUCKET_FIELD.to_string(), FieldValue::from(bucket.as_str()));
        record.insert(SOURCE_FILE_FIELD.to_string(), FieldValue::from(key));
        // Header is line 1.
        record.insert(
            SOURCE_LINENO_FIELD.to_string(),
            FieldValue::Integer(records as i64 + 2),
        );

        if let Err(e) = sink.write_record(&spec.name, &record) {
            if e.kind() == io::ErrorKind::BrokenPipe {
                error!(
                    file = %key,
                    records,
                    "Pipe to loader broke after {} records were written", records
                );
                return Err(Error::BrokenDownstream {
                    file: key.to_string(),
                    records,
                    message: e.to_string(),
                });
            }
            return Err(e.into());
        }
        records += 1;
    }
    Ok(records)
}

/// Discover and sync every file of `spec` newer than `watermark`, oldest
/// first, stopping once `max_records_per_run` records have been written.
/// The sink receives updated state after each file, including the one that
/// reached the cap, so the next run starts past it.
pub fn sync_table(
    engine: &FileDiscoveryEngine<'_>,
    spec: &TableSpec,
    watermark: Option<Watermark>,
    state: &mut SyncState,
    sink: &mut dyn RecordSink,
) -> Result<TableSyncSummary> {
    let objects = engine.discover(spec, watermark)?;
    let (location, adapter) = engine.adapter_for(spec)?;
    let dispatcher = RowStreamDispatcher::new(adapter.as_ref(), &location);
    let limit = spec.record_limit();

    let mut summary = TableSyncSummary {
        table: spec.name.clone(),
        files: 0,
        records: 0,
        watermark,
    };
    for object in &objects {
        let remaining = limit.map(|l| l.saturating_sub(summary.records));
        summary.records += sync_file(&dispatcher, spec, &object.key, sink, remaining)?;
        summary.files += 1;

        // The file that reaches the cap still moves the bookmark.
        summary.watermark = Some(object.last_modified);
        state.advance(&spec.name, object.last_modified);
        sink.write_state(state).map_err(|e| match e.kind() {
            io::ErrorKind::BrokenPipe => Error::BrokenDownstream {
                file: object.key.clone(),
                records: summary.records,
                message: e.to_string(),
            },
            _ => Error::Io(e),
        })?;

        if limit.is_some_and(|l| summary.records >= l) {
            info!(
                table = %spec.name,
                records = summary.records,
                "Processed the per-run record limit, stopping sync for this table"
            );
            break;
        }
    }

    info!(
        table = %spec.name,
        files = summary.files,
        records = summary.records,
        "Table sync complete"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::local::LocalAdapter;
    use crate::source::Location;
    use std::fs;
    use tempfile::TempDir;

    /// Collects records; fails with a broken pipe after `fail_after` writes.
    #[derive(Default)]
    struct MemorySink {
        records: Vec<(String, ParsedRow)>,
        states: Vec<SyncState>,
        fail_after: Option<usize>,
    }

    impl RecordSink for MemorySink {
        fn write_record(&mut self, stream: &str, record: &ParsedRow) -> io::Result<()> {
            if self.fail_after == Some(self.records.len()) {
                return Err(io::Error::new(io::ErrorKind::BrokenPipe, "reader went away"));
            }
            self.records.push((stream.to_string(), record.clone()));
            Ok(())
        }

        fn write_state(&mut self, state: &SyncState) -> io::Result<()> {
            self.states.push(state.clone());
            Ok(())
        }
    }

    fn spec(path: &str) -> TableSpec {
        TableSpec {
            path: path.to_string(),
            name: "orders".into(),
            pattern: r"\.csv$".into(),
            delimiter: Some(",".into()),
            ..TableSpec::default()
        }
    }

    #[test]
    fn records_carry_source_metadata() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("o.csv"), "id\n1\n2\n").unwrap();
        let path = temp.path().display().to_string();
        let location = Location::parse(&path).unwrap();
        let adapter = LocalAdapter::new(&location);
        let dispatcher = RowStreamDispatcher::new(&adapter, &location);

        let mut sink = MemorySink::default();
        let written = sync_file(&dispatcher, &spec(&path), "o.csv", &mut sink, None).unwrap();
        assert_eq!(written, 2);

        let (stream, first) = &sink.records[0];
        assert_eq!(stream, "orders");
        assert_eq!(first[SOURCE_FILE_FIELD], FieldValue::from("o.csv"));
        assert_eq!(first[SOURCE_LINENO_FIELD], FieldValue::Integer(2));
        assert_eq!(first[SOURCE_BUCKET_FIELD], FieldValue::from(path.as_str()));
        assert_eq!(sink.records[1].1[SOURCE_LINENO_FIELD], FieldValue::Integer(3));
    }

    #[test]
    fn broken_pipe_is_broken_downstream() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("o.csv"), "id\n1\n2\n3\n").unwrap();
        let path = temp.path().display().to_string();
        let location = Location::parse(&path).unwrap();
        let adapter = LocalAdapter::new(&location);
        let dispatcher = RowStreamDispatcher::new(&adapter, &location);

        let mut sink = MemorySink {
            fail_after: Some(1),
            ..MemorySink::default()
        };
        let err = sync_file(&dispatcher, &spec(&path), "o.csv", &mut sink, None).unwrap_err();
        assert!(matches!(err, Error::BrokenDownstream { records: 1, .. }));
    }

    #[test]
    fn watermark_resolution() {
        let mut state = SyncState::default();
        let stored = "2022-06-01T00:00:00Z".parse::<DateTime<Utc>>().unwrap();
        state.advance("orders", stored);

        let table = TableSpec {
            name: "orders".into(),
            start_date: "2020-01-01".into(),
            ..TableSpec::default()
        };
        assert_eq!(resolve_watermark(&table, Some(&state)).unwrap(), Some(stored));

        let start = "2020-01-01T00:00:00Z".parse::<DateTime<Utc>>().unwrap();
        assert_eq!(resolve_watermark(&table, None).unwrap(), Some(start));

        let ignoring = TableSpec {
            ignore_state: true,
            ..table
        };
        assert_eq!(resolve_watermark(&ignoring, Some(&state)).unwrap(), Some(start));
    }

    #[test]
    fn json_lines_sink_shapes_messages() {
        let mut sink = JsonLinesSink::new(Vec::new());
        let mut row = ParsedRow::new();
        row.insert("id".into(), FieldValue::Integer(1));
        sink.write_record("orders", &row).unwrap();
        let mut state = SyncState::default();
        state.advance("orders", "2021-01-01T00:00:00Z".parse().unwrap());
        sink.write_state(&state).unwrap();

        let text = String::from_utf8(sink.into_inner()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], r#"{"type":"RECORD","stream":"orders","record":{"id":1}}"#);
        assert_eq!(
            lines[1],
            r#"{"type":"STATE","value":{"orders":{"modified_since":"2021-01-01T00:00:00Z"}}}"#
        );
    }
}
