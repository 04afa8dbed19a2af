//! Discover command - list the files each table would read

use crate::cli::error::{explain, HelpfulError};
use crate::cli::output::{format_timestamp, print_json, print_table};
use crate::cli::Session;
use anyhow::Result;
use serde::Serialize;
use sheetflow::config::parse_timestamp;
use sheetflow::{DiscoveredObject, Watermark};
use std::path::PathBuf;

#[derive(Debug)]
pub struct DiscoverArgs {
    pub config: PathBuf,
    pub table: Option<String>,
    pub since: Option<String>,
    pub json: bool,
}

#[derive(Debug, Serialize)]
struct TableListing {
    table: String,
    modified_since: Option<Watermark>,
    files: Vec<DiscoveredObject>,
}

pub fn run(args: DiscoverArgs) -> Result<()> {
    let session = Session::open(&args.config)?;
    let since = args
        .since
        .as_deref()
        .map(|raw| parse_timestamp(raw).map_err(|_| HelpfulError::invalid_timestamp(raw)))
        .transpose()?;

    let engine = session.engine();
    let mut listings = Vec::new();
    for spec in session.tables(args.table.as_deref())? {
        let watermark = match since {
            Some(ts) => Some(ts),
            None => spec.start_watermark().map_err(explain)?,
        };
        let files = engine.discover(&spec, watermark).map_err(explain)?;
        listings.push(TableListing {
            table: spec.name,
            modified_since: watermark,
            files,
        });
    }

    if args.json {
        return print_json(&listings);
    }

    for listing in &listings {
        println!(
            "{} ({} file{})",
            listing.table,
            listing.files.len(),
            if listing.files.len() == 1 { "" } else { "s" }
        );
        if listing.files.is_empty() {
            continue;
        }
        let rows = listing
            .files
            .iter()
            .map(|f| vec![f.key.clone(), format_timestamp(&f.last_modified)])
            .collect();
        print_table(&["KEY", "LAST MODIFIED (UTC)"], rows);
    }
    Ok(())
}
