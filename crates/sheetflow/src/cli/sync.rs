//! Sync command - stream RECORD messages for each table to stdout

use crate::cli::error::explain;
use crate::cli::Session;
use anyhow::{Context, Result};
use sheetflow::extract::{resolve_watermark, sync_table};
use sheetflow::{JsonLinesSink, RecordSink, SyncState};
use std::io;
use std::path::PathBuf;
use tracing::info;

#[derive(Debug)]
pub struct SyncArgs {
    pub config: PathBuf,
    pub table: Option<String>,
    pub state: Option<PathBuf>,
}

pub fn run(args: SyncArgs) -> Result<()> {
    let session = Session::open(&args.config)?;
    let prior = args
        .state
        .as_deref()
        .map(SyncState::load)
        .transpose()
        .context("Failed to read state file")?;
    let mut state = prior.clone().unwrap_or_default();

    let engine = session.engine();
    let stdout = io::stdout();
    let mut sink = JsonLinesSink::new(stdout.lock());

    let mut total = 0;
    for spec in session.tables(args.table.as_deref())? {
        let watermark = resolve_watermark(&spec, prior.as_ref()).map_err(explain)?;
        let summary = sync_table(&engine, &spec, watermark, &mut state, &mut sink).map_err(explain)?;
        total += summary.records;
    }

    sink.write_state(&state)
        .context("Failed to write final state")?;
    info!(records = total, "Sync complete");
    Ok(())
}
