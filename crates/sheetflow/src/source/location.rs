//! Table location parsing and credential scrubbing.

use crate::error::{Error, Result};
use regex::Regex;
use std::fmt;
use std::sync::OnceLock;
use url::Url;

/// Token that replaces `scheme://user:pass@` in surfaced locations.
pub const CREDENTIAL_MASK: &str = "********";

/// Storage protocol of a table location.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scheme {
    File,
    S3,
    Gcs,
    Azure,
    Sftp,
    Ftp,
    Http,
    Https,
    Imap,
}

impl Scheme {
    pub fn parse(raw: &str) -> Result<Self> {
        match raw.to_ascii_lowercase().as_str() {
            "file" | "local" => Ok(Self::File),
            "s3" => Ok(Self::S3),
            "gs" => Ok(Self::Gcs),
            "azure" => Ok(Self::Azure),
            "sftp" => Ok(Self::Sftp),
            "ftp" => Ok(Self::Ftp),
            "http" => Ok(Self::Http),
            "https" => Ok(Self::Https),
            "imap" => Ok(Self::Imap),
            _ => Err(Error::UnsupportedProtocol(raw.to_string())),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::File => "file",
            Self::S3 => "s3",
            Self::Gcs => "gs",
            Self::Azure => "azure",
            Self::Sftp => "sftp",
            Self::Ftp => "ftp",
            Self::Http => "http",
            Self::Https => "https",
            Self::Imap => "imap",
        }
    }

    pub fn is_object_store(&self) -> bool {
        matches!(self, Self::S3 | Self::Gcs | Self::Azure)
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A parsed `scheme://location` table path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    pub scheme: Scheme,
    /// The path exactly as configured
    pub raw: String,
    /// Everything after `scheme://` (the whole path for scheme-less paths)
    pub rest: String,
}

impl Location {
    /// Split on the first `://`; a path without one is a local path.
    pub fn parse(path: &str) -> Result<Self> {
        let (scheme, rest) = match path.split_once("://") {
            Some((scheme, rest)) => (Scheme::parse(scheme)?, rest),
            None => (Scheme::File, path),
        };
        Ok(Self {
            scheme,
            raw: path.to_string(),
            rest: rest.to_string(),
        })
    }

    /// Bucket or container name for object-store locations.
    pub fn bucket(&self) -> &str {
        self.rest.split('/').next().unwrap_or_default()
    }

    /// Key prefix below the bucket, without surrounding slashes.
    pub fn base_prefix(&self) -> &str {
        self.rest
            .split_once('/')
            .map(|(_, prefix)| prefix.trim_matches('/'))
            .unwrap_or_default()
    }

    /// Parse as a URL (remote schemes carrying host and credentials).
    pub fn url(&self) -> Result<Url> {
        Url::parse(&self.raw).map_err(|e| {
            Error::Config(format!("Invalid {} location '{}': {}", self.scheme, self.redacted(), e))
        })
    }

    /// URI of one discovered key under this location.
    pub fn target_uri(&self, key: &str) -> String {
        if self.scheme == Scheme::Imap {
            let host = self.rest.split('/').next().unwrap_or_default();
            return format!("imap://{}/{}", host, key);
        }
        format!("{}/{}", self.raw.trim_end_matches('/'), key)
    }

    /// The configured path with embedded credentials masked.
    pub fn redacted(&self) -> String {
        scrub_credentials(&self.raw)
    }
}

/// Mask the `scheme://user:pass@` segment of `sftp://` and `ftp://` URIs.
pub fn scrub_credentials(path: &str) -> String {
    static SFTP: OnceLock<Regex> = OnceLock::new();
    static FTP: OnceLock<Regex> = OnceLock::new();

    let matcher = if path.starts_with("sftp") {
        SFTP.get_or_init(|| Regex::new(r"(?s)sftp://.*?@").expect("valid regex"))
    } else if path.starts_with("ftp") {
        FTP.get_or_init(|| Regex::new(r"(?s)ftp://.*?@").expect("valid regex"))
    } else {
        return path.to_string();
    };
    matcher.replace(path, CREDENTIAL_MASK).into_owned()
}
