//! Error types for discovery and extraction

use std::io;
use thiserror::Error;

/// Sheetflow error type
#[derive(Error, Debug)]
pub enum Error {
    #[error("Protocol '{0}' is not supported")]
    UnsupportedProtocol(String),

    #[error("Backend '{backend}' unavailable: {message}")]
    BackendUnavailable { backend: String, message: String },

    #[error("Read more than {limit} records from the path {location}. Use a more specific search_prefix")]
    TooManyResults { location: String, limit: usize },

    #[error("Unable to detect the format for {key}: {reason}")]
    FormatDetectionFailed { key: String, reason: String },

    #[error("{file} could not be parsed: {message}")]
    InvalidFormat { file: String, message: String },

    #[error("Pipe to loader broke after {records} records were written from {file}: {message}")]
    BrokenDownstream {
        file: String,
        records: usize,
        message: String,
    },

    #[error("Config error: {0}")]
    Config(String),

    #[error("Pattern error: {0}")]
    Pattern(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl Error {
    pub fn backend(backend: impl Into<String>, message: impl ToString) -> Self {
        Self::BackendUnavailable {
            backend: backend.into(),
            message: message.to_string(),
        }
    }

    pub fn invalid_format(file: impl Into<String>, message: impl ToString) -> Self {
        Self::InvalidFormat {
            file: file.into(),
            message: message.to_string(),
        }
    }

    /// Whether the `invalid_format_action` policy applies to this error.
    pub fn is_invalid_format(&self) -> bool {
        matches!(self, Self::InvalidFormat { .. })
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
