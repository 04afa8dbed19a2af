//! Protocol adapters: list `(key, modified time)` entries under a location
//! and open a byte stream for one key.
//!
//! Adapters carry no business logic. Pattern matching, watermark filtering
//! and ordering live in [`crate::discovery`].

pub mod cloud;
pub mod ftp;
pub mod http;
#[cfg(feature = "imap")]
pub mod imap_client;
pub mod local;
pub mod location;
pub mod mailbox;
pub mod registry;

#[cfg(feature = "sftp")]
pub mod sftp;
#[cfg(not(feature = "sftp"))]
pub mod sftp {
    use super::{ListRequest, Location, ProtocolAdapter};
    use crate::config::Credentials;
    use crate::error::{Error, Result};
    use crate::types::DiscoveredObject;
    use std::io::Read;

    /// Placeholder used when the crate is built without the `sftp` feature.
    pub struct SftpAdapter;

    impl SftpAdapter {
        pub fn new(_location: &Location, _credentials: &Credentials) -> Result<Self> {
            Ok(Self)
        }
    }

    impl ProtocolAdapter for SftpAdapter {
        fn backend(&self) -> &'static str {
            "sftp"
        }

        fn list(&self, _request: &ListRequest<'_>) -> Result<Vec<DiscoveredObject>> {
            Err(Error::backend("sftp", "built without the `sftp` feature"))
        }

        fn open(&self, _key: &str) -> Result<Box<dyn Read>> {
            Err(Error::backend("sftp", "built without the `sftp` feature"))
        }
    }
}

pub use location::{scrub_credentials, Location, Scheme, CREDENTIAL_MASK};
#[cfg(feature = "imap")]
pub use imap_client::ImapConnector;
pub use mailbox::{MailboxConnector, MailboxEntry, MailboxFileSystem};
pub use registry::ConnectionRegistry;

use crate::config::Credentials;
use crate::error::Result;
use crate::types::{DiscoveredObject, Watermark};
use std::io::Read;

/// Listing ceiling for filesystem, SSH and FTP backends.
pub const MAX_LISTING_RESULTS: usize = 10_000;

/// Parameters for one listing call.
#[derive(Debug, Clone, Copy, Default)]
pub struct ListRequest<'a> {
    /// Narrowing prefix. Directory/key prefix for filesystem and object
    /// stores; a shell glob on the file name for SSH, FTP and mailboxes.
    pub search_prefix: Option<&'a str>,
    /// Pushdown hint only; callers still filter on modification time.
    pub modified_since: Option<Watermark>,
}

/// Uniform listing and reading capability over one storage protocol.
pub trait ProtocolAdapter {
    /// Short backend name for logs and errors.
    fn backend(&self) -> &'static str;

    /// List every entry under the location.
    fn list(&self, request: &ListRequest<'_>) -> Result<Vec<DiscoveredObject>>;

    /// Open a fresh byte stream for a listed key.
    fn open(&self, key: &str) -> Result<Box<dyn Read>>;
}

/// Build the adapter for a location's scheme.
pub fn adapter_for<'r>(
    location: &Location,
    credentials: &Credentials,
    registry: &'r ConnectionRegistry,
) -> Result<Box<dyn ProtocolAdapter + 'r>> {
    let adapter: Box<dyn ProtocolAdapter + 'r> = match location.scheme {
        Scheme::File => Box::new(local::LocalAdapter::new(location)),
        Scheme::S3 | Scheme::Gcs | Scheme::Azure => {
            Box::new(cloud::ObjectStoreAdapter::new(location, credentials, registry)?)
        }
        Scheme::Sftp => Box::new(sftp::SftpAdapter::new(location, credentials)?),
        Scheme::Ftp => Box::new(ftp::FtpAdapter::new(location, credentials)?),
        Scheme::Http | Scheme::Https => Box::new(http::HttpAdapter::new(location)?),
        Scheme::Imap => Box::new(mailbox::MailboxAdapter::new(location, credentials, registry)?),
    };
    Ok(adapter)
}

/// Glob match used by single-directory backends for `search_prefix`.
pub(crate) fn matches_glob(search_prefix: Option<&str>, name: &str) -> Result<bool> {
    match search_prefix {
        None => Ok(true),
        Some(raw) => glob::Pattern::new(raw)
            .map(|p| p.matches(name))
            .map_err(|e| crate::error::Error::Pattern(format!("{}: {}", raw, e))),
    }
}

/// Fail with `TooManyResults` once a listing passes the ceiling.
pub(crate) fn check_ceiling(count: usize, location: &str) -> Result<()> {
    if count > MAX_LISTING_RESULTS {
        return Err(crate::error::Error::TooManyResults {
            location: location.to_string(),
            limit: MAX_LISTING_RESULTS,
        });
    }
    Ok(())
}
