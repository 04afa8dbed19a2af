//! Mailbox (IMAP) adapter.
//!
//! Attachments are exposed as a file system by a [`MailboxConnector`]
//! registered on the [`ConnectionRegistry`]. The adapter owns credential
//! resolution, including the OAuth refresh round-trip through a token proxy.

use super::{matches_glob, ListRequest, Location, ProtocolAdapter};
use crate::config::{Credentials, OAuthCredentials};
use crate::error::{Error, Result};
use crate::source::registry::ConnectionRegistry;
use crate::types::DiscoveredObject;
use chrono::{DateTime, NaiveDate, Utc};
use reqwest::header::AUTHORIZATION;
use serde::Deserialize;
use std::io::{Cursor, Read};
use std::sync::Arc;
use tracing::{debug, info};

/// One attachment visible in a mailbox folder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailboxEntry {
    /// Fully resolved path, e.g. `INBOX/1234/report.csv`
    pub name: String,
    pub last_modified: Option<DateTime<Utc>>,
}

/// File-system view over a connected mailbox.
pub trait MailboxFileSystem: Send + Sync {
    /// List attachments in `folder`, optionally only messages since `since`.
    fn ls(&self, folder: &str, since: Option<NaiveDate>) -> Result<Vec<MailboxEntry>>;

    /// Fetch one attachment by its resolved path.
    fn open(&self, path: &str) -> Result<Vec<u8>>;
}

/// Opens a mailbox file system with XOAUTH2 credentials.
pub trait MailboxConnector: Send + Sync {
    fn connect(
        &self,
        host: &str,
        username: &str,
        access_token: &str,
    ) -> Result<Arc<dyn MailboxFileSystem>>;
}

pub struct MailboxAdapter {
    fs: Arc<dyn MailboxFileSystem>,
    folder: String,
}

impl MailboxAdapter {
    pub fn new(
        location: &Location,
        credentials: &Credentials,
        registry: &ConnectionRegistry,
    ) -> Result<Self> {
        let url = location.url()?;
        let host = url
            .host_str()
            .ok_or_else(|| Error::Config(format!("Missing host in {}", location.redacted())))?
            .to_string();
        let connector = registry.mailbox_connector().cloned().ok_or_else(|| {
            Error::backend(
                "imap",
                "no mailbox connector is registered (build with the `imap` feature)",
            )
        })?;

        let key = ConnectionRegistry::mailbox_key(&host, credentials);
        let fs = registry.mailbox(&key, || connect(connector.as_ref(), &host, credentials))?;
        Ok(Self {
            fs,
            folder: url.path().to_string(),
        })
    }
}

impl ProtocolAdapter for MailboxAdapter {
    fn backend(&self) -> &'static str {
        "imap"
    }

    fn list(&self, request: &ListRequest<'_>) -> Result<Vec<DiscoveredObject>> {
        let since = request.modified_since.map(|w| w.date_naive());
        info!(folder = %self.folder, since = ?since, "Listing mailbox attachments");

        let mut objects = Vec::new();
        for entry in self.fs.ls(&self.folder, since)? {
            if !matches_glob(request.search_prefix, &entry.name)? {
                continue;
            }
            let modified = entry.last_modified.unwrap_or_else(Utc::now);
            objects.push(DiscoveredObject::new(entry.name, modified));
        }
        info!(count = objects.len(), "Found mailbox attachments");
        Ok(objects)
    }

    fn open(&self, key: &str) -> Result<Box<dyn Read>> {
        Ok(Box::new(Cursor::new(self.fs.open(key)?)))
    }
}

/// Connect with the configured access token, or a freshly refreshed one
/// when none is configured. Login failures are not retried.
fn connect(
    connector: &dyn MailboxConnector,
    host: &str,
    credentials: &Credentials,
) -> Result<Arc<dyn MailboxFileSystem>> {
    let username = credentials
        .username
        .as_deref()
        .ok_or_else(|| Error::Config("imap sources require `username`".into()))?;
    let oauth = credentials.oauth_credentials.clone().unwrap_or_default();

    let token = match oauth.access_token.clone() {
        Some(token) => token,
        None => refresh_access_token(&oauth)?,
    };
    connector.connect(host, username, &token)
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

/// Exchange the refresh token for a fresh access token via the proxy.
fn refresh_access_token(oauth: &OAuthCredentials) -> Result<String> {
    let (Some(url), Some(refresh_token)) = (&oauth.refresh_proxy_url, &oauth.refresh_token) else {
        return Err(Error::Config(
            "imap sources need `access_token` or `refresh_token` and `refresh_proxy_url`".into(),
        ));
    };
    debug!(url = %url, "Refreshing mailbox access token");

    let mut request = reqwest::blocking::Client::new().post(url).json(&serde_json::json!({
        "grant_type": "refresh_token",
        "refresh_token": refresh_token,
    }));
    if let Some(auth) = &oauth.refresh_proxy_url_auth {
        request = request.header(AUTHORIZATION, auth);
    }

    let response = request
        .send()
        .and_then(|r| r.error_for_status())
        .map_err(|e| Error::backend("imap", e))?;
    let body: TokenResponse = response.json().map_err(|e| Error::backend("imap", e))?;
    Ok(body.access_token)
}
