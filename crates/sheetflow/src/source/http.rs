//! HTTP(S) adapter. The location is a base URL and the table pattern is the
//! resource name; listing issues a single GET and yields at most one entry.

use super::{ListRequest, Location, ProtocolAdapter};
use crate::error::{Error, Result};
use crate::types::DiscoveredObject;
use chrono::{DateTime, Utc};
use reqwest::blocking::{Client, Response};
use reqwest::header::LAST_MODIFIED;
use std::io::Read;
use std::time::Duration;
use tracing::{info, warn};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

pub struct HttpAdapter {
    client: Client,
    base: String,
}

impl HttpAdapter {
    pub fn new(location: &Location) -> Result<Self> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| Error::backend("http", e))?;
        Ok(Self {
            client,
            base: location.raw.trim_end_matches('/').to_string(),
        })
    }

    fn url_for(&self, resource: &str) -> String {
        format!("{}/{}", self.base, resource.trim_start_matches('/'))
    }

    fn get(&self, resource: &str) -> Result<Response> {
        let url = self.url_for(resource);
        let response = self
            .client
            .get(&url)
            .send()
            .map_err(|e| Error::backend("http", e))?;
        if !response.status().is_success() {
            return Err(Error::backend(
                "http",
                format!("GET {} returned {}", url, response.status()),
            ));
        }
        Ok(response)
    }
}

impl ProtocolAdapter for HttpAdapter {
    fn backend(&self) -> &'static str {
        "http"
    }

    /// `search_prefix` carries the resource name (the table pattern).
    fn list(&self, request: &ListRequest<'_>) -> Result<Vec<DiscoveredObject>> {
        let Some(resource) = request.search_prefix.filter(|r| !r.is_empty()) else {
            return Ok(Vec::new());
        };
        info!(url = %self.url_for(resource), "Fetching HTTP resource");
        let response = self.get(resource)?;
        let modified = last_modified(&response).unwrap_or_else(|| {
            warn!(resource = %resource, "No usable Last-Modified header, using current time");
            Utc::now()
        });
        Ok(vec![DiscoveredObject::new(resource, modified)])
    }

    fn open(&self, key: &str) -> Result<Box<dyn Read>> {
        Ok(Box::new(self.get(key)?))
    }
}

fn last_modified(response: &Response) -> Option<DateTime<Utc>> {
    let raw = response.headers().get(LAST_MODIFIED)?.to_str().ok()?;
    parse_http_date(raw)
}

/// Parse an RFC 7231 HTTP date (`Tue, 15 Nov 1994 08:12:31 GMT`).
pub(crate) fn parse_http_date(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc2822(raw.trim())
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn parses_http_dates() {
        assert_eq!(
            parse_http_date("Tue, 15 Nov 1994 08:12:31 GMT"),
            Some(Utc.with_ymd_and_hms(1994, 11, 15, 8, 12, 31).unwrap())
        );
        assert_eq!(parse_http_date("yesterday"), None);
    }

    #[test]
    fn joins_resource_onto_base() {
        let location = Location::parse("https://data.example.com/exports/").unwrap();
        let adapter = HttpAdapter::new(&location).unwrap();
        assert_eq!(adapter.url_for("sales.csv"), "https://data.example.com/exports/sales.csv");
        assert_eq!(adapter.url_for("/sales.csv"), "https://data.example.com/exports/sales.csv");
    }

    #[test]
    fn listing_without_resource_is_empty() {
        let location = Location::parse("https://data.example.com").unwrap();
        let adapter = HttpAdapter::new(&location).unwrap();
        assert!(adapter.list(&ListRequest::default()).unwrap().is_empty());
    }
}
