//! Crawl: synthesize table specs from the files under a crawl source,
//! one table per directory and extension.

use crate::config::{FormatSetting, InvalidFormatAction, TableSpec};
use crate::discovery::FileDiscoveryEngine;
use crate::error::Result;
use crate::types::{DiscoveredObject, Watermark};
use chrono::{TimeZone, Utc};
use indexmap::IndexMap;
use regex::Regex;
use std::sync::OnceLock;
use tracing::{debug, info};

/// Table grouping derived from one key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrawlTableEntry {
    pub name: String,
    /// Directory of the grouped files, relative to the source path
    pub search_prefix: String,
    pub pattern: String,
    /// Fragment appended to disambiguate a table name
    rel_pattern: String,
}

impl CrawlTableEntry {
    /// Derive the table entry for `key`; `None` for directory markers.
    pub fn from_key(key: &str) -> Option<Self> {
        if key.ends_with('/') || key.is_empty() {
            return None;
        }
        let (directory, file_name) = match key.rsplit_once('/') {
            Some((dir, file)) => (dir, file),
            None => ("", key),
        };

        let extension = file_name.rsplit_once('.').map(|(_, ext)| ext).filter(|e| !e.is_empty());
        let rel_pattern = match extension {
            Some(ext) => format!(".*{}", regex::escape(ext)),
            None => regex::escape(file_name),
        };

        let (name, pattern) = if directory.is_empty() {
            // Only files at the source root, not in subdirectories.
            let pattern = match extension {
                Some(ext) => format!("^[^/]*{}$", regex::escape(ext)),
                None => format!("^{}$", rel_pattern),
            };
            (strip_non_word(file_name), pattern)
        } else {
            (
                strip_non_word(&directory.replace('/', "_")),
                format!("{}/{}$", regex::escape(directory), rel_pattern),
            )
        };

        Some(Self {
            name,
            search_prefix: directory.to_string(),
            pattern,
            rel_pattern,
        })
    }

    fn disambiguated_name(&self) -> String {
        strip_non_word(&format!("{}_{}", self.name, self.rel_pattern))
    }
}

fn strip_non_word(raw: &str) -> String {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\W+").expect("valid regex"))
        .replace_all(raw, "")
        .into_owned()
}

/// Turns crawl directives into concrete table specs.
pub struct CrawlConfigBuilder<'r> {
    engine: &'r FileDiscoveryEngine<'r>,
}

impl<'r> CrawlConfigBuilder<'r> {
    pub fn new(engine: &'r FileDiscoveryEngine<'r>) -> Self {
        Self { engine }
    }

    /// Build table specs for every crawl source, in order.
    pub fn build<'s, I>(&self, sources: I) -> Result<Vec<TableSpec>>
    where
        I: IntoIterator<Item = &'s TableSpec>,
    {
        let mut tables = Vec::new();
        for source in sources {
            let watermark = source
                .start_watermark()?
                .unwrap_or_else(|| Utc.timestamp_opt(0, 0).single().unwrap_or_default());
            let objects = self.engine.discover(source, Some(watermark))?;
            let generated = group_tables(source, watermark, &objects);
            info!(
                path = %crate::source::scrub_credentials(&source.path),
                files = objects.len(),
                tables = generated.len(),
                "Crawled source"
            );
            tables.extend(generated);
        }
        Ok(tables)
    }
}

/// Group discovered objects into table specs. Keys sharing a directory and
/// extension land in one table; a second pattern for an existing name gets
/// a suffixed name.
pub fn group_tables(
    source: &TableSpec,
    watermark: Watermark,
    objects: &[DiscoveredObject],
) -> Vec<TableSpec> {
    let mut tables: IndexMap<String, TableSpec> = IndexMap::new();

    for object in objects {
        let Some(entry) = CrawlTableEntry::from_key(&object.key) else {
            debug!(key = %object.key, "Skipping directory marker");
            continue;
        };

        let name = match tables.get(&entry.name) {
            None => entry.name.clone(),
            Some(existing) if existing.pattern == entry.pattern => continue,
            Some(_) => {
                let base = entry.disambiguated_name();
                match unique_name(&tables, &base, &entry.pattern) {
                    Some(name) => name,
                    None => continue,
                }
            }
        };
        debug!(key = %object.key, table = %name, pattern = %entry.pattern, "Crawled table");
        tables.insert(name.clone(), crawled_spec(source, watermark, name, &entry));
    }

    tables.into_values().collect()
}

/// First free name starting at `base`; `None` when a table with that name
/// already carries `pattern`.
fn unique_name(tables: &IndexMap<String, TableSpec>, base: &str, pattern: &str) -> Option<String> {
    let mut candidate = base.to_string();
    let mut counter = 2;
    loop {
        match tables.get(&candidate) {
            None => return Some(candidate),
            Some(existing) if existing.pattern == pattern => return None,
            Some(_) => {
                candidate = format!("{}_{}", base, counter);
                counter += 1;
            }
        }
    }
}

fn crawled_spec(
    source: &TableSpec,
    watermark: Watermark,
    name: String,
    entry: &CrawlTableEntry,
) -> TableSpec {
    TableSpec {
        path: source.path.clone(),
        name,
        search_prefix: (!entry.search_prefix.is_empty()).then(|| entry.search_prefix.clone()),
        pattern: entry.pattern.clone(),
        key_properties: Vec::new(),
        format: FormatSetting::Detect,
        encoding: source.encoding.clone(),
        invalid_format_action: InvalidFormatAction::Ignore,
        delimiter: Some("detect".to_string()),
        max_records_per_run: source.max_records_per_run,
        max_sampled_files: Some(source.max_sampled_files()),
        max_sampling_read: Some(source.max_sampling_read()),
        sample_rate: source.sample_rate,
        universal_newlines: source.universal_newlines,
        prefer_number_vs_integer: source.prefer_number_vs_integer,
        prefer_schema_as_string: source.prefer_schema_as_string,
        start_date: watermark.to_rfc3339(),
        ..TableSpec::default()
    }
}
