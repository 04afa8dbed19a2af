//! Sheetflow: discover spreadsheet-like files across storage backends and
//! stream their rows.
//!
//! The pipeline is:
//! - [`discovery`] lists a table's location through a
//!   [`ProtocolAdapter`](source::ProtocolAdapter) and filters the listing by
//!   pattern and watermark
//! - [`dispatch`] opens each key, resolves its format and bounds the rows
//! - [`sampler`] picks a bounded subset of rows for structure inference
//! - [`crawl`] turns a directory tree into table specs
//! - [`extract`] emits rows with source metadata and tracks bookmarks

pub mod config;
pub mod crawl;
pub mod discovery;
pub mod dispatch;
pub mod error;
pub mod extract;
pub mod format;
pub mod sampler;
pub mod source;
pub mod types;

pub use config::{Credentials, FormatSetting, InvalidFormatAction, TableSpec, TapConfig};
pub use crawl::CrawlConfigBuilder;
pub use discovery::FileDiscoveryEngine;
pub use dispatch::{RowStream, RowStreamDispatcher};
pub use error::{Error, Result};
pub use extract::{JsonLinesSink, RecordSink, SyncState};
pub use format::FormatKind;
pub use sampler::{SampleSet, Sampler};
pub use source::{ConnectionRegistry, Location, ProtocolAdapter};
pub use types::{DiscoveredObject, FieldValue, ParsedRow, Watermark};
