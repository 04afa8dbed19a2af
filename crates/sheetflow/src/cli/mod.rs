//! Command-line interface for Sheetflow.
//!
//! Every command loads a config file, builds one connection registry for
//! the whole run and works on the tables the config names. Crawl sources
//! are expanded into concrete tables before `discover` and `sync` run.

pub mod crawl;
pub mod discover;
pub mod error;
pub mod output;
pub mod sample;
pub mod sync;

use crate::cli::error::HelpfulError;
use anyhow::Result;
use sheetflow::{
    ConnectionRegistry, CrawlConfigBuilder, Credentials, FileDiscoveryEngine, TableSpec, TapConfig,
};
use std::path::Path;
#[cfg(feature = "imap")]
use {sheetflow::source::ImapConnector, std::sync::Arc};

/// State shared by one CLI invocation.
pub struct Session {
    pub config: TapConfig,
    pub credentials: Credentials,
    pub registry: ConnectionRegistry,
}

#[cfg(feature = "imap")]
fn registry() -> ConnectionRegistry {
    ConnectionRegistry::new().with_mailbox_connector(Arc::new(ImapConnector))
}

#[cfg(not(feature = "imap"))]
fn registry() -> ConnectionRegistry {
    ConnectionRegistry::new()
}

impl Session {
    pub fn open(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(HelpfulError::config_not_found(path).into());
        }
        let config = TapConfig::load(path)
            .map_err(|e| HelpfulError::invalid_config(path, &e.to_string()))?;
        let credentials = config.credentials.clone().with_env_fallbacks();
        Ok(Self {
            config,
            credentials,
            registry: registry(),
        })
    }

    pub fn engine(&self) -> FileDiscoveryEngine<'_> {
        FileDiscoveryEngine::new(&self.registry, &self.credentials)
    }

    /// Selected tables plus the tables generated by crawl sources, narrowed
    /// to `only` when given.
    pub fn tables(&self, only: Option<&str>) -> Result<Vec<TableSpec>> {
        let mut tables: Vec<TableSpec> = self.config.selected_tables().cloned().collect();
        if self.config.crawl_sources().next().is_some() {
            let engine = self.engine();
            let crawled = CrawlConfigBuilder::new(&engine)
                .build(self.config.crawl_sources())
                .map_err(error::explain)?;
            tables.extend(crawled);
        }

        match only {
            None => Ok(tables),
            Some(name) => {
                let known: Vec<String> = tables.iter().map(|t| t.name.clone()).collect();
                tables
                    .into_iter()
                    .find(|t| t.name == name)
                    .map(|t| vec![t])
                    .ok_or_else(|| HelpfulError::table_not_found(name, &known).into())
            }
        }
    }

    /// Exactly one table by name.
    pub fn table(&self, name: &str) -> Result<TableSpec> {
        let mut tables = self.tables(Some(name))?;
        Ok(tables.remove(0))
    }
}
