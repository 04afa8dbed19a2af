//! End-to-end tests over a local directory source
//!
//! These exercise discovery, dispatch, crawling and sync together the way
//! the CLI drives them.

use chrono::{DateTime, TimeZone, Utc};
use filetime::{set_file_mtime, FileTime};
use sheetflow::extract::{resolve_watermark, sync_table, TableSyncSummary};
use sheetflow::{
    ConnectionRegistry, CrawlConfigBuilder, Credentials, FieldValue, FileDiscoveryEngine,
    FormatSetting, InvalidFormatAction, ParsedRow, RecordSink, RowStreamDispatcher, SyncState,
    TableSpec, TapConfig,
};
use std::fs;
use std::io;
use std::path::PathBuf;
use tempfile::TempDir;

/// Source directory with files at pinned modification times
struct TestEnv {
    _temp: TempDir,
    pub source_dir: PathBuf,
}

impl TestEnv {
    fn new() -> Self {
        let temp = TempDir::new().expect("Failed to create temp dir");
        let source_dir = temp.path().join("source");
        fs::create_dir_all(&source_dir).expect("Failed to create source dir");
        Self {
            _temp: temp,
            source_dir,
        }
    }

    /// Write `name` and pin its mtime to `mtime` seconds after the epoch.
    fn write_file(&self, name: &str, content: &str, mtime: i64) -> PathBuf {
        let path = self.source_dir.join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).ok();
        }
        fs::write(&path, content).expect("Failed to write file");
        set_file_mtime(&path, FileTime::from_unix_time(mtime, 0)).expect("Failed to set mtime");
        path
    }

    fn path(&self) -> String {
        self.source_dir.to_string_lossy().to_string()
    }

    fn table(&self, name: &str, pattern: &str) -> TableSpec {
        TableSpec {
            path: self.path(),
            name: name.to_string(),
            pattern: pattern.to_string(),
            start_date: "1970-01-01T00:00:00Z".to_string(),
            ..TableSpec::default()
        }
    }
}

fn ts(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, 0).unwrap()
}

#[derive(Default)]
struct MemorySink {
    records: Vec<(String, ParsedRow)>,
    states: Vec<SyncState>,
}

impl RecordSink for MemorySink {
    fn write_record(&mut self, stream: &str, record: &ParsedRow) -> io::Result<()> {
        self.records.push((stream.to_string(), record.clone()));
        Ok(())
    }

    fn write_state(&mut self, state: &SyncState) -> io::Result<()> {
        self.states.push(state.clone());
        Ok(())
    }
}

// ============================================================================
// Discovery
// ============================================================================

#[test]
fn test_discovery_orders_by_mtime_and_respects_watermark() {
    let env = TestEnv::new();
    env.write_file("c.csv", "a\n1\n", 3_000);
    env.write_file("a.csv", "a\n1\n", 1_000);
    env.write_file("b.csv", "a\n1\n", 2_000);
    env.write_file("notes.txt", "skip", 1_500);

    let registry = ConnectionRegistry::new();
    let credentials = Credentials::default();
    let engine = FileDiscoveryEngine::new(&registry, &credentials);
    let spec = env.table("t", r"\.csv$");

    let all = engine.discover(&spec, None).unwrap();
    let keys: Vec<&str> = all.iter().map(|o| o.key.as_str()).collect();
    assert_eq!(keys, vec!["a.csv", "b.csv", "c.csv"]);
    assert_eq!(all[0].last_modified, ts(1_000));

    // Strictly newer only: b.csv sits exactly on the watermark.
    let newer = engine.discover(&spec, Some(ts(2_000))).unwrap();
    let keys: Vec<&str> = newer.iter().map(|o| o.key.as_str()).collect();
    assert_eq!(keys, vec!["c.csv"]);
}

#[test]
fn test_discovery_with_search_prefix_keeps_root_relative_keys() {
    let env = TestEnv::new();
    env.write_file("in/a.csv", "a\n1\n", 1_000);
    env.write_file("out/b.csv", "a\n1\n", 1_000);

    let registry = ConnectionRegistry::new();
    let credentials = Credentials::default();
    let engine = FileDiscoveryEngine::new(&registry, &credentials);
    let spec = TableSpec {
        search_prefix: Some("in".into()),
        ..env.table("t", "csv")
    };

    let found = engine.discover(&spec, None).unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].key, "in/a.csv");
}

// ============================================================================
// Dispatch
// ============================================================================

#[test]
fn test_ignore_policy_skips_bad_file_and_continues() {
    let env = TestEnv::new();
    env.write_file("1-good.json", r#"[{"id": 1}]"#, 1_000);
    env.write_file("2-bad.json", "{not json", 2_000);
    env.write_file("3-good.json", r#"[{"id": 3}]"#, 3_000);

    let registry = ConnectionRegistry::new();
    let credentials = Credentials::default();
    let engine = FileDiscoveryEngine::new(&registry, &credentials);
    let spec = TableSpec {
        invalid_format_action: InvalidFormatAction::Ignore,
        ..env.table("events", r"\.json$")
    };

    let mut state = SyncState::default();
    let mut sink = MemorySink::default();
    let summary = sync_table(&engine, &spec, None, &mut state, &mut sink).unwrap();
    assert_eq!(summary.files, 3);
    assert_eq!(summary.records, 2);
    assert_eq!(sink.records[1].1["id"], FieldValue::Integer(3));

    let strict = TableSpec {
        invalid_format_action: InvalidFormatAction::Fail,
        ..spec
    };
    let err = sync_table(&engine, &strict, None, &mut SyncState::default(), &mut MemorySink::default())
        .unwrap_err();
    assert!(err.is_invalid_format());
}

#[test]
fn test_literal_newlines_do_not_split_on_bare_cr() {
    let env = TestEnv::new();
    env.write_file("vendor.csv", "id,note\n1,first\rsecond\n2,third\n", 1_000);

    let registry = ConnectionRegistry::new();
    let credentials = Credentials::default();
    let engine = FileDiscoveryEngine::new(&registry, &credentials);
    let literal = TableSpec {
        format: FormatSetting::Csv,
        delimiter: Some(",".into()),
        universal_newlines: false,
        ..env.table("vendor", "vendor")
    };
    let (location, adapter) = engine.adapter_for(&literal).unwrap();
    let dispatcher = RowStreamDispatcher::new(adapter.as_ref(), &location);

    let rows: Vec<ParsedRow> = dispatcher
        .open(&literal, "vendor.csv")
        .unwrap()
        .map(|r| r.unwrap())
        .collect();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0]["note"], FieldValue::from("first\rsecond"));

    let universal = TableSpec {
        universal_newlines: true,
        ..literal
    };
    let count = dispatcher.open(&universal, "vendor.csv").unwrap().count();
    assert_eq!(count, 3);
}

#[test]
fn test_skip_initial_and_detected_format() {
    let env = TestEnv::new();
    env.write_file("feed", "n\n1\n2\n3\n4\n", 1_000);

    let registry = ConnectionRegistry::new();
    let credentials = Credentials::default();
    let engine = FileDiscoveryEngine::new(&registry, &credentials);
    let spec = TableSpec {
        skip_initial: 3,
        delimiter: Some(",".into()),
        ..env.table("feed", "feed")
    };
    let (location, adapter) = engine.adapter_for(&spec).unwrap();
    let dispatcher = RowStreamDispatcher::new(adapter.as_ref(), &location);

    let stream = dispatcher.open(&spec, "feed").unwrap();
    assert_eq!(stream.format(), sheetflow::FormatKind::Csv);
    let rows: Vec<ParsedRow> = stream.map(|r| r.unwrap()).collect();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["n"], FieldValue::from("4"));
}

// ============================================================================
// Sync
// ============================================================================

#[test]
fn test_record_cap_advances_watermark_past_capped_file() {
    let env = TestEnv::new();
    env.write_file("a.csv", "n\n1\n2\n", 1_000);
    env.write_file("b.csv", "n\n3\n4\n", 2_000);
    env.write_file("c.csv", "n\n5\n6\n", 3_000);

    let registry = ConnectionRegistry::new();
    let credentials = Credentials::default();
    let engine = FileDiscoveryEngine::new(&registry, &credentials);
    let spec = TableSpec {
        max_records_per_run: 3,
        delimiter: Some(",".into()),
        ..env.table("numbers", r"\.csv$")
    };

    let mut state = SyncState::default();
    let mut sink = MemorySink::default();
    let watermark = resolve_watermark(&spec, Some(&state)).unwrap();
    let summary = sync_table(&engine, &spec, watermark, &mut state, &mut sink).unwrap();

    assert_eq!(
        summary,
        TableSyncSummary {
            table: "numbers".into(),
            files: 2,
            records: 3,
            watermark: Some(ts(2_000)),
        }
    );
    assert_eq!(state.watermark("numbers"), Some(ts(2_000)));
    assert_eq!(sink.states.len(), 2);

    let next = resolve_watermark(&spec, Some(&state)).unwrap();
    let mut sink = MemorySink::default();
    let summary = sync_table(&engine, &spec, next, &mut state, &mut sink).unwrap();
    assert_eq!(summary.records, 2);
    assert_eq!(sink.records[0].1["n"], FieldValue::from("5"));
    assert_eq!(state.watermark("numbers"), Some(ts(3_000)));
}

#[test]
fn test_file_larger_than_record_cap_does_not_stall_sync() {
    let env = TestEnv::new();
    env.write_file("big.csv", "n\n1\n2\n3\n4\n5\n", 1_000);
    env.write_file("next.csv", "n\n6\n", 2_000);

    let registry = ConnectionRegistry::new();
    let credentials = Credentials::default();
    let engine = FileDiscoveryEngine::new(&registry, &credentials);
    let spec = TableSpec {
        max_records_per_run: 3,
        delimiter: Some(",".into()),
        ..env.table("numbers", r"\.csv$")
    };

    let mut state = SyncState::default();
    let mut sink = MemorySink::default();
    let watermark = resolve_watermark(&spec, Some(&state)).unwrap();
    let summary = sync_table(&engine, &spec, watermark, &mut state, &mut sink).unwrap();
    assert_eq!(summary.records, 3);
    assert_eq!(state.watermark("numbers"), Some(ts(1_000)));

    let next = resolve_watermark(&spec, Some(&state)).unwrap();
    let mut sink = MemorySink::default();
    let summary = sync_table(&engine, &spec, next, &mut state, &mut sink).unwrap();
    assert_eq!(summary.records, 1);
    assert_eq!(sink.records[0].1["_smart_source_file"], FieldValue::from("next.csv"));
    assert_eq!(state.watermark("numbers"), Some(ts(2_000)));
}

#[test]
fn test_file_of_exactly_cap_rows_advances_watermark() {
    let env = TestEnv::new();
    env.write_file("a.csv", "n\n1\n2\n3\n", 1_000);

    let registry = ConnectionRegistry::new();
    let credentials = Credentials::default();
    let engine = FileDiscoveryEngine::new(&registry, &credentials);
    let spec = TableSpec {
        max_records_per_run: 3,
        delimiter: Some(",".into()),
        ..env.table("numbers", r"\.csv$")
    };

    let mut state = SyncState::default();
    let mut sink = MemorySink::default();
    let summary = sync_table(&engine, &spec, None, &mut state, &mut sink).unwrap();
    assert_eq!(summary.records, 3);
    assert_eq!(state.watermark("numbers"), Some(ts(1_000)));
    assert_eq!(sink.states.last(), Some(&state));
}

#[test]
fn test_state_file_round_trips_through_sync() {
    let env = TestEnv::new();
    env.write_file("a.jsonl", "{\"id\": 1}\n", 1_000);
    env.write_file("b.jsonl", "{\"id\": 2}\n", 2_000);

    let state_path = env.source_dir.join("../state.json");
    fs::write(&state_path, r#"{"events": {"modified_since": "1970-01-01T00:16:40Z"}}"#).unwrap();
    let state = SyncState::load(&state_path).unwrap();
    assert_eq!(state.watermark("events"), Some(ts(1_000)));

    let registry = ConnectionRegistry::new();
    let credentials = Credentials::default();
    let engine = FileDiscoveryEngine::new(&registry, &credentials);
    let spec = env.table("events", "jsonl");

    let watermark = resolve_watermark(&spec, Some(&state)).unwrap();
    let mut state = state;
    let mut sink = MemorySink::default();
    let summary = sync_table(&engine, &spec, watermark, &mut state, &mut sink).unwrap();
    assert_eq!(summary.records, 1);
    assert_eq!(sink.records[0].1["_smart_source_file"], FieldValue::from("b.jsonl"));
    assert_eq!(state.watermark("events"), Some(ts(2_000)));
}

// ============================================================================
// Crawl
// ============================================================================

#[test]
fn test_crawl_generates_one_table_per_directory_and_extension() {
    let env = TestEnv::new();
    env.write_file("a/x.csv", "k\n1\n", 1_000);
    env.write_file("a/y.csv", "k\n2\n", 2_000);
    env.write_file("b/z.json", r#"[{"k": 3}]"#, 3_000);

    let config = TapConfig::from_json_str(&format!(
        r#"{{"tables": [{{"path": {:?}, "crawl_config": true, "max_sampling_read": 10}}]}}"#,
        env.path()
    ))
    .unwrap();

    let registry = ConnectionRegistry::new();
    let credentials = config.credentials.clone();
    let engine = FileDiscoveryEngine::new(&registry, &credentials);
    let tables = CrawlConfigBuilder::new(&engine)
        .build(config.crawl_sources())
        .unwrap();

    let names: Vec<&str> = tables.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(names, vec!["a", "b"]);
    assert_eq!(tables[0].max_sampling_read, Some(10));

    // Generated tables discover exactly their own files.
    let a_files = engine.discover(&tables[0], None).unwrap();
    let keys: Vec<&str> = a_files.iter().map(|o| o.key.as_str()).collect();
    assert_eq!(keys, vec!["a/x.csv", "a/y.csv"]);

    let mut sink = MemorySink::default();
    let summary = sync_table(&engine, &tables[1], None, &mut SyncState::default(), &mut sink).unwrap();
    assert_eq!(summary.records, 1);
    assert_eq!(sink.records[0].0, "b");
}
