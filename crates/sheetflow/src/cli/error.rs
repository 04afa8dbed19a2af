//! Helpful error types for CLI commands
//!
//! Every error includes:
//! - What went wrong
//! - Context about the situation
//! - Suggestions for how to fix it

use sheetflow::Error;
use std::fmt;
use std::path::Path;

/// An error with helpful context and suggestions
#[derive(Debug)]
pub struct HelpfulError {
    /// The main error message
    pub message: String,
    /// Additional context about what was happening
    pub context: Option<String>,
    /// Suggestions for how to fix the error
    pub suggestions: Vec<String>,
}

impl HelpfulError {
    /// Create a new helpful error
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            context: None,
            suggestions: Vec::new(),
        }
    }

    /// Add context to the error
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    /// Add a suggestion for fixing the error
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestions.push(suggestion.into());
        self
    }

    /// Add multiple suggestions
    pub fn with_suggestions(mut self, suggestions: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.suggestions.extend(suggestions.into_iter().map(|s| s.into()));
        self
    }

    // === Common error constructors ===

    /// Config file does not exist
    pub fn config_not_found(path: &Path) -> Self {
        Self::new(format!("Config file not found: {}", path.display()))
            .with_context("Every command reads its tables from a config file")
            .with_suggestions([
                format!("TRY: Check the path exists: ls -la {}", path.display()),
                "TRY: Config files are JSON, or TOML when the name ends in .toml".to_string(),
            ])
    }

    /// Config file failed to parse or validate
    pub fn invalid_config(path: &Path, reason: &str) -> Self {
        Self::new(format!("Invalid config: {}", path.display()))
            .with_context(reason.to_string())
            .with_suggestions([
                "TRY: Every table needs name, path, pattern and start_date".to_string(),
                "TRY: delimiter and quotechar must be single ASCII characters (or delimiter 'detect')"
                    .to_string(),
            ])
    }

    /// No table with the requested name
    pub fn table_not_found(name: &str, known: &[String]) -> Self {
        let available = if known.is_empty() {
            "(none)".to_string()
        } else {
            known.join(", ")
        };
        Self::new(format!("Table not found: {}", name))
            .with_context(format!("Available tables: {}", available))
            .with_suggestion("TRY: Deselected tables (selected: false) are skipped")
    }

    /// --since could not be parsed
    pub fn invalid_timestamp(raw: &str) -> Self {
        Self::new(format!("Invalid timestamp: '{}'", raw))
            .with_suggestions([
                "TRY: Use RFC 3339: 2024-01-31T00:00:00Z".to_string(),
                "TRY: A bare date also works: 2024-01-31".to_string(),
            ])
    }

    /// Listing hit the result ceiling
    pub fn too_many_results(location: &str, limit: usize) -> Self {
        Self::new(format!("More than {} files under {}", limit, location))
            .with_context("Listings are capped to keep discovery bounded")
            .with_suggestions([
                "TRY: Set search_prefix to a narrower directory or key prefix".to_string(),
                "TRY: For sftp and ftp, search_prefix is a glob on the file name".to_string(),
            ])
    }

    /// Neither extension nor content settled the format
    pub fn format_detection_failed(key: &str, reason: &str) -> Self {
        Self::new(format!("Cannot tell the format of {}", key))
            .with_context(reason.to_string())
            .with_suggestion("TRY: Set format to csv, excel, json or jsonl on the table")
    }

    /// Storage backend could not be reached or authenticated
    pub fn backend_unavailable(backend: &str, message: &str) -> Self {
        Self::new(format!("Cannot reach {} backend", backend))
            .with_context(message.to_string())
            .with_suggestions([
                "TRY: Check the credentials in the config or environment".to_string(),
                "TRY: Run with -v for connection details".to_string(),
            ])
    }
}

/// Attach operator guidance to library errors that have it.
pub fn explain(err: Error) -> anyhow::Error {
    match &err {
        Error::TooManyResults { location, limit } => {
            HelpfulError::too_many_results(location, *limit).into()
        }
        Error::FormatDetectionFailed { key, reason } => {
            HelpfulError::format_detection_failed(key, reason).into()
        }
        Error::BackendUnavailable { backend, message } => {
            HelpfulError::backend_unavailable(backend, message).into()
        }
        _ => err.into(),
    }
}

impl fmt::Display for HelpfulError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "ERROR: {}", self.message)?;

        if let Some(ctx) = &self.context {
            writeln!(f, "CONTEXT: {}", ctx)?;
        }

        if !self.suggestions.is_empty() {
            writeln!(f)?;
            for suggestion in &self.suggestions {
                writeln!(f, "  {}", suggestion)?;
            }
        }

        Ok(())
    }
}

impl std::error::Error for HelpfulError {}
