//! Sample command - show a bounded subset of a table's rows

use crate::cli::error::explain;
use crate::cli::output::{format_value, print_json, print_table};
use crate::cli::Session;
use anyhow::Result;
use sheetflow::{RowStreamDispatcher, Sampler};
use std::path::PathBuf;

#[derive(Debug)]
pub struct SampleArgs {
    pub config: PathBuf,
    pub table: String,
    pub json: bool,
}

pub fn run(args: SampleArgs) -> Result<()> {
    let session = Session::open(&args.config)?;
    let spec = session.table(&args.table)?;

    let engine = session.engine();
    let watermark = spec.start_watermark().map_err(explain)?;
    let candidates = engine.discover(&spec, watermark).map_err(explain)?;
    let (location, adapter) = engine.adapter_for(&spec).map_err(explain)?;
    let dispatcher = RowStreamDispatcher::new(adapter.as_ref(), &location);
    let samples = Sampler::new(&dispatcher)
        .sample(&spec, &candidates)
        .map_err(explain)?;

    if args.json {
        return print_json(&samples);
    }

    println!(
        "{}: {} row{} sampled from {} file{}",
        spec.name,
        samples.len(),
        if samples.len() == 1 { "" } else { "s" },
        samples.files.len(),
        if samples.files.len() == 1 { "" } else { "s" },
    );
    if samples.is_empty() {
        return Ok(());
    }

    let fields = samples.field_names();
    let rows = samples
        .rows
        .iter()
        .map(|row| {
            fields
                .iter()
                .map(|f| row.get(*f).map(format_value).unwrap_or_default())
                .collect()
        })
        .collect();
    print_table(&fields, rows);
    Ok(())
}
