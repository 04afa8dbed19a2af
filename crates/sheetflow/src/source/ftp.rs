//! FTP adapter. Lists a single directory with `MLSD`.

use super::{check_ceiling, matches_glob, ListRequest, Location, ProtocolAdapter};
use crate::config::Credentials;
use crate::error::{Error, Result};
use crate::types::DiscoveredObject;
use chrono::{DateTime, NaiveDateTime, Utc};
use std::io::Read;
use suppaftp::FtpStream;
use tracing::{debug, info, warn};

const DEFAULT_PORT: u16 = 21;

pub struct FtpAdapter {
    host: String,
    port: u16,
    username: String,
    password: String,
    directory: String,
    redacted: String,
}

impl FtpAdapter {
    pub fn new(location: &Location, credentials: &Credentials) -> Result<Self> {
        let url = location.url()?;
        let host = url
            .host_str()
            .ok_or_else(|| Error::Config(format!("Missing host in {}", location.redacted())))?
            .to_string();

        let username = match url.username() {
            "" => credentials.username.clone().unwrap_or_else(|| "anonymous".into()),
            user => user.to_string(),
        };
        let password = url
            .password()
            .map(str::to_string)
            .or_else(|| credentials.password.clone())
            .unwrap_or_else(|| "anonymous@".into());

        let directory = match url.path().trim_end_matches('/') {
            "" => "/".to_string(),
            path => path.to_string(),
        };

        Ok(Self {
            host,
            port: url.port().unwrap_or(DEFAULT_PORT),
            username,
            password,
            directory,
            redacted: location.redacted(),
        })
    }

    fn connect(&self) -> Result<FtpStream> {
        let mut stream = FtpStream::connect((self.host.as_str(), self.port))
            .map_err(|e| Error::backend("ftp", e))?;
        stream
            .login(&self.username, &self.password)
            .map_err(|e| Error::backend("ftp", e))?;
        Ok(stream)
    }

    fn remote_path(&self, key: &str) -> String {
        format!("{}/{}", self.directory.trim_end_matches('/'), key)
    }
}

impl ProtocolAdapter for FtpAdapter {
    fn backend(&self) -> &'static str {
        "ftp"
    }

    fn list(&self, request: &ListRequest<'_>) -> Result<Vec<DiscoveredObject>> {
        info!(location = %self.redacted, "Listing FTP directory");
        let mut stream = self.connect()?;
        let lines = stream
            .mlsd(Some(&self.directory))
            .map_err(|e| Error::backend("ftp", e))?;
        if let Err(e) = stream.quit() {
            debug!(error = %e, "FTP quit failed");
        }

        let mut objects = Vec::new();
        for line in &lines {
            let Some((name, modified)) = parse_mlsd_line(line) else {
                continue;
            };
            if !matches_glob(request.search_prefix, &name)? {
                continue;
            }
            objects.push(DiscoveredObject::new(name, modified));
            check_ceiling(objects.len(), &self.redacted)?;
        }
        debug!(count = objects.len(), "FTP listing complete");
        Ok(objects)
    }

    fn open(&self, key: &str) -> Result<Box<dyn Read>> {
        let mut stream = self.connect()?;
        let buffer = stream
            .retr_as_buffer(&self.remote_path(key))
            .map_err(|e| Error::backend("ftp", e))?;
        if let Err(e) = stream.quit() {
            debug!(error = %e, "FTP quit failed");
        }
        Ok(Box::new(buffer))
    }
}

/// Parse one `MLSD` fact line into `(name, modified)`. Non-file entries
/// yield `None`.
pub(crate) fn parse_mlsd_line(line: &str) -> Option<(String, DateTime<Utc>)> {
    let (facts, name) = line.split_once(' ')?;
    let name = name.trim_end_matches(['\r', '\n']);

    let mut is_file = false;
    let mut modified = None;
    for fact in facts.split(';').filter(|f| !f.is_empty()) {
        let Some((key, value)) = fact.split_once('=') else {
            continue;
        };
        match key.to_ascii_lowercase().as_str() {
            "type" => is_file = value.eq_ignore_ascii_case("file"),
            "modify" => {
                // Fractional seconds are optional.
                let whole = value.split('.').next().unwrap_or(value);
                modified = NaiveDateTime::parse_from_str(whole, "%Y%m%d%H%M%S")
                    .ok()
                    .map(|dt| dt.and_utc());
            }
            _ => {}
        }
    }

    if !is_file {
        return None;
    }
    let modified = modified.unwrap_or_else(|| {
        warn!(name = %name, "MLSD entry has no modify fact, using current time");
        Utc::now()
    });
    Some((name.to_string(), modified))
}
