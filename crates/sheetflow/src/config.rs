//! Configuration: table definitions and backend credentials
//!
//! The config file is JSON (the connector's native format) or TOML, chosen by
//! extension. Credentials are resolved once here, including environment
//! fallbacks, and then passed explicitly to the protocol adapters.

use crate::error::{Error, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::Path;

pub const DEFAULT_ENCODING: &str = "utf-8";
pub const DEFAULT_SAMPLE_RATE: usize = 5;
pub const DEFAULT_MAX_SAMPLING_READ: usize = 1000;
pub const DEFAULT_MAX_SAMPLED_FILES: usize = 5;

/// Declared file format for a table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FormatSetting {
    Csv,
    Excel,
    Json,
    Jsonl,
    #[default]
    Detect,
}

/// What to do with a file whose content the format reader rejects.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvalidFormatAction {
    Ignore,
    #[default]
    Fail,
}

/// Declarative description of one logical source table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TableSpec {
    /// `scheme://location` of the table's files
    pub path: String,
    pub name: String,
    /// Regular expression searched (not anchored) against each key
    pub pattern: String,
    pub start_date: String,
    pub key_properties: Vec<String>,
    pub format: FormatSetting,
    pub encoding: String,
    pub invalid_format_action: InvalidFormatAction,
    pub universal_newlines: bool,
    pub skip_initial: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selected: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field_names: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search_prefix: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub worksheet_name: Option<String>,
    /// A single ASCII character, or `detect` to sniff from the first line
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delimiter: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quotechar: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub json_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sample_rate: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_sampling_read: Option<usize>,
    /// Zero or negative means unlimited
    pub max_records_per_run: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_sampled_files: Option<usize>,
    pub prefer_number_vs_integer: bool,
    pub prefer_schema_as_string: bool,
    pub ignore_undefined_field_names: bool,
    pub ignore_state: bool,
    pub skip_empty_rows: bool,
    /// Marks a crawl directive rather than a concrete table
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub crawl_config: bool,
}

impl Default for TableSpec {
    fn default() -> Self {
        Self {
            path: String::new(),
            name: String::new(),
            pattern: String::new(),
            start_date: String::new(),
            key_properties: Vec::new(),
            format: FormatSetting::Detect,
            encoding: DEFAULT_ENCODING.to_string(),
            invalid_format_action: InvalidFormatAction::Fail,
            universal_newlines: true,
            skip_initial: 0,
            selected: None,
            field_names: None,
            search_prefix: None,
            worksheet_name: None,
            delimiter: None,
            quotechar: None,
            json_path: None,
            sample_rate: None,
            max_sampling_read: None,
            max_records_per_run: -1,
            max_sampled_files: None,
            prefer_number_vs_integer: false,
            prefer_schema_as_string: false,
            ignore_undefined_field_names: false,
            ignore_state: false,
            skip_empty_rows: false,
            crawl_config: false,
        }
    }
}

impl TableSpec {
    /// Per-run record cap, `None` when unlimited.
    pub fn record_limit(&self) -> Option<usize> {
        (self.max_records_per_run > 0).then_some(self.max_records_per_run as usize)
    }

    pub fn sample_rate(&self) -> usize {
        self.sample_rate.unwrap_or(DEFAULT_SAMPLE_RATE).max(1)
    }

    pub fn max_sampling_read(&self) -> usize {
        self.max_sampling_read.unwrap_or(DEFAULT_MAX_SAMPLING_READ)
    }

    pub fn max_sampled_files(&self) -> usize {
        self.max_sampled_files.unwrap_or(DEFAULT_MAX_SAMPLED_FILES)
    }

    pub fn ignores_invalid_files(&self) -> bool {
        self.invalid_format_action == InvalidFormatAction::Ignore
    }

    /// Compile the inclusion pattern.
    pub fn compiled_pattern(&self) -> Result<Regex> {
        Regex::new(&self.pattern).map_err(|e| Error::Pattern(format!("{}: {}", self.pattern, e)))
    }

    /// Parsed `start_date`, or `None` when unset.
    pub fn start_watermark(&self) -> Result<Option<DateTime<Utc>>> {
        if self.start_date.trim().is_empty() {
            return Ok(None);
        }
        parse_timestamp(&self.start_date).map(Some)
    }

    /// Explicit single-character delimiter, `None` when it should be sniffed.
    pub fn explicit_delimiter(&self) -> Option<u8> {
        match self.delimiter.as_deref() {
            None | Some("detect") => None,
            Some(d) => d.bytes().next(),
        }
    }

    pub fn quote_char(&self) -> u8 {
        self.quotechar
            .as_deref()
            .and_then(|q| q.bytes().next())
            .unwrap_or(b'"')
    }

    fn validate(&self, index: usize) -> Result<()> {
        let label = if self.name.is_empty() {
            format!("tables[{index}]")
        } else {
            format!("table '{}'", self.name)
        };

        if self.path.trim().is_empty() {
            return Err(Error::Config(format!("{label}: 'path' is required")));
        }
        self.compiled_pattern()?;
        crate::format::text::resolve_encoding(&self.encoding)?;

        // Crawl sources match every key unless they narrow it.
        if self.crawl_config {
            self.start_watermark()?;
            return Ok(());
        }
        if self.pattern.is_empty() {
            return Err(Error::Config(format!("{label}: 'pattern' is required")));
        }

        if self.name.trim().is_empty() {
            return Err(Error::Config(format!("{label}: 'name' is required")));
        }
        if self.start_watermark()?.is_none() {
            return Err(Error::Config(format!("{label}: 'start_date' is required")));
        }
        for (field, value) in [("delimiter", &self.delimiter), ("quotechar", &self.quotechar)] {
            if let Some(v) = value {
                // The CSV reader splits on single bytes.
                if v != "detect" && (v.len() != 1 || !v.is_ascii()) {
                    return Err(Error::Config(format!(
                        "{label}: '{field}' must be a single ASCII character, got '{v}'"
                    )));
                }
            }
        }
        Ok(())
    }
}

/// OAuth material for mailbox sources.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct OAuthCredentials {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub refresh_proxy_url: Option<String>,
    pub refresh_proxy_url_auth: Option<String>,
}

/// Transport credentials, resolved once and handed to each adapter.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct Credentials {
    pub aws_access_key_id: Option<String>,
    pub aws_secret_access_key: Option<String>,
    pub azure_storage_connection_string: Option<String>,
    pub google_application_credentials: Option<String>,
    pub ssh_private_key: Option<String>,
    pub ssh_passphrase: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub oauth_credentials: Option<OAuthCredentials>,
}

impl Credentials {
    /// Fill unset fields from the process environment.
    pub fn with_env_fallbacks(mut self) -> Self {
        fn env(name: &str) -> Option<String> {
            std::env::var(name).ok().filter(|v| !v.is_empty())
        }
        self.azure_storage_connection_string = self
            .azure_storage_connection_string
            .or_else(|| env("AZURE_STORAGE_CONNECTION_STRING"));
        self.google_application_credentials = self
            .google_application_credentials
            .or_else(|| env("GOOGLE_APPLICATION_CREDENTIALS"));
        self.aws_access_key_id = self.aws_access_key_id.or_else(|| env("AWS_ACCESS_KEY_ID"));
        self.aws_secret_access_key = self
            .aws_secret_access_key
            .or_else(|| env("AWS_SECRET_ACCESS_KEY"));
        self
    }

    /// Stable identity used to key cached clients without storing secrets.
    pub fn fingerprint(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.hash(&mut hasher);
        hasher.finish()
    }
}

/// Top-level config file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TapConfig {
    pub tables: Vec<TableSpec>,
    #[serde(flatten)]
    pub credentials: Credentials,
}

impl TapConfig {
    /// Load and validate a config file (JSON, or TOML by `.toml` extension).
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let is_toml = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("toml"));
        let config = if is_toml {
            Self::from_toml_str(&content)?
        } else {
            Self::from_json_str(&content)?
        };
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_str(content: &str) -> Result<Self> {
        serde_json::from_str(content).map_err(|e| Error::Config(e.to_string()))
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(e.to_string()))
    }

    pub fn validate(&self) -> Result<()> {
        for (idx, table) in self.tables.iter().enumerate() {
            table.validate(idx)?;
        }
        Ok(())
    }

    /// Crawl directives, in config order.
    pub fn crawl_sources(&self) -> impl Iterator<Item = &TableSpec> {
        self.tables.iter().filter(|t| t.crawl_config)
    }

    /// Concrete tables that are not explicitly deselected.
    pub fn selected_tables(&self) -> impl Iterator<Item = &TableSpec> {
        self.tables
            .iter()
            .filter(|t| !t.crawl_config && t.selected != Some(false))
    }

    pub fn table(&self, name: &str) -> Option<&TableSpec> {
        self.tables.iter().find(|t| !t.crawl_config && t.name == name)
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))
    }
}

/// Parse an RFC 3339 timestamp, a naive `YYYY-MM-DDTHH:MM:SS` (taken as UTC),
/// or a bare date.
pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(ts.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Ok(naive.and_utc());
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        if let Some(naive) = date.and_hms_opt(0, 0, 0) {
            return Ok(naive.and_utc());
        }
    }
    Err(Error::Config(format!("Invalid timestamp '{raw}'")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const SAMPLE_CONFIG: &str = r#"{
        "tables": [
            {
                "path": "file://./artifacts",
                "name": "badnewlines",
                "pattern": ".*\\.csv",
                "start_date": "2017-05-01T00:00:00Z",
                "key_properties": [],
                "format": "csv",
                "universal_newlines": false,
                "sample_rate": 5,
                "max_sampling_read": 2000,
                "max_sampled_files": 3
            },
            {
                "crawl_config": true,
                "path": "file://./fixtures",
                "pattern": ".*\\.xlsx",
                "start_date": "2017-05-01T00:00:00Z"
            }
        ],
        "username": "reader",
        "oauth_credentials": {"access_token": "tok"}
    }"#;

    #[test]
    fn parses_tables_and_credentials() {
        let config = TapConfig::from_json_str(SAMPLE_CONFIG).unwrap();
        config.validate().unwrap();

        assert_eq!(config.tables.len(), 2);
        let table = &config.tables[0];
        assert_eq!(table.format, FormatSetting::Csv);
        assert!(!table.universal_newlines);
        assert_eq!(table.encoding, "utf-8");
        assert_eq!(table.invalid_format_action, InvalidFormatAction::Fail);
        assert_eq!(table.sample_rate(), 5);
        assert_eq!(table.max_sampling_read(), 2000);
        assert_eq!(table.max_sampled_files(), 3);
        assert_eq!(table.record_limit(), None);

        assert_eq!(config.crawl_sources().count(), 1);
        assert_eq!(config.selected_tables().count(), 1);
        assert_eq!(config.credentials.username.as_deref(), Some("reader"));
        assert_eq!(
            config
                .credentials
                .oauth_credentials
                .as_ref()
                .and_then(|o| o.access_token.as_deref()),
            Some("tok")
        );
    }

    #[test]
    fn rejects_unknown_format() {
        let err = TapConfig::from_json_str(
            r#"{"tables": [{"path": "file://x", "name": "t", "pattern": "x", "start_date": "2020-01-01", "format": "xml"}]}"#,
        )
        .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn validate_requires_name_for_concrete_tables() {
        let config = TapConfig {
            tables: vec![TableSpec {
                path: "file://x".into(),
                pattern: ".*".into(),
                start_date: "2020-01-01T00:00:00Z".into(),
                ..TableSpec::default()
            }],
            ..TapConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("'name' is required"));
    }

    #[test]
    fn crawl_sources_need_only_a_path() {
        let config = TapConfig::from_json_str(
            r#"{"tables": [{"path": "s3://bucket", "crawl_config": true}]}"#,
        )
        .unwrap();
        config.validate().unwrap();

        let bad_encoding = TapConfig::from_json_str(
            r#"{"tables": [{"path": "s3://bucket", "crawl_config": true, "encoding": "no-such"}]}"#,
        )
        .unwrap();
        assert!(matches!(bad_encoding.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn validate_rejects_bad_pattern_and_delimiter() {
        let mut table = TableSpec {
            path: "file://x".into(),
            name: "t".into(),
            pattern: "(".into(),
            start_date: "2020-01-01".into(),
            ..TableSpec::default()
        };
        assert!(matches!(table.validate(0), Err(Error::Pattern(_))));

        table.pattern = ".*".into();
        table.delimiter = Some(";;".into());
        assert!(table.validate(0).is_err());

        table.delimiter = Some("detect".into());
        assert!(table.validate(0).is_ok());
    }

    #[test]
    fn validate_rejects_multibyte_delimiter_and_quote() {
        let mut table = TableSpec {
            path: "file://x".into(),
            name: "t".into(),
            pattern: ".*".into(),
            start_date: "2020-01-01".into(),
            delimiter: Some("§".into()),
            ..TableSpec::default()
        };
        let err = table.validate(0).unwrap_err();
        assert!(err.to_string().contains("single ASCII character"));

        table.delimiter = Some("\t".into());
        assert!(table.validate(0).is_ok());
        assert_eq!(table.explicit_delimiter(), Some(b'\t'));

        table.quotechar = Some("«".into());
        assert!(table.validate(0).is_err());
    }

    #[test]
    fn toml_config_is_supported() {
        let config = TapConfig::from_toml_str(
            r#"
            [[tables]]
            path = "s3://bucket"
            name = "orders"
            pattern = "orders/.*\\.csv$"
            start_date = "2021-01-01T00:00:00Z"
            max_records_per_run = 100
            invalid_format_action = "ignore"
            "#,
        )
        .unwrap();
        let table = &config.tables[0];
        assert_eq!(table.record_limit(), Some(100));
        assert!(table.ignores_invalid_files());
    }

    #[test]
    fn timestamps_parse_in_several_shapes() {
        let expected = Utc.with_ymd_and_hms(2017, 5, 1, 0, 0, 0).unwrap();
        assert_eq!(parse_timestamp("2017-05-01T00:00:00Z").unwrap(), expected);
        assert_eq!(parse_timestamp("2017-05-01T02:00:00+02:00").unwrap(), expected);
        assert_eq!(parse_timestamp("2017-05-01T00:00:00").unwrap(), expected);
        assert_eq!(parse_timestamp("2017-05-01").unwrap(), expected);
        assert!(parse_timestamp("yesterday").is_err());
    }

    #[test]
    fn credential_fingerprint_tracks_content() {
        let a = Credentials::default();
        let b = Credentials {
            aws_access_key_id: Some("key".into()),
            ..Credentials::default()
        };
        assert_eq!(a.fingerprint(), Credentials::default().fingerprint());
        assert_ne!(a.fingerprint(), b.fingerprint());
    }
}
