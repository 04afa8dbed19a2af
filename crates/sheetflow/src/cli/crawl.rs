//! Crawl command - print the table specs generated from crawl sources

use crate::cli::error::{explain, HelpfulError};
use crate::cli::output::print_json;
use crate::cli::Session;
use anyhow::Result;
use serde::Serialize;
use sheetflow::{CrawlConfigBuilder, TableSpec};
use std::path::PathBuf;

#[derive(Debug)]
pub struct CrawlArgs {
    pub config: PathBuf,
}

#[derive(Debug, Serialize)]
struct CrawlOutput {
    tables: Vec<TableSpec>,
}

pub fn run(args: CrawlArgs) -> Result<()> {
    let session = Session::open(&args.config)?;
    if session.config.crawl_sources().next().is_none() {
        return Err(HelpfulError::new("No crawl sources in config")
            .with_context(format!("{} has no table with crawl_config: true", args.config.display()))
            .with_suggestion("TRY: Add {\"path\": \"s3://bucket\", \"crawl_config\": true} to tables")
            .into());
    }

    let engine = session.engine();
    let tables = CrawlConfigBuilder::new(&engine)
        .build(session.config.crawl_sources())
        .map_err(explain)?;
    print_json(&CrawlOutput { tables })
}
