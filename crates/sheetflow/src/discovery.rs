//! File discovery: list a table's location, keep keys matching its pattern
//! and modified after the watermark, oldest first.

use crate::config::{Credentials, TableSpec};
use crate::error::Result;
use crate::source::{self, ConnectionRegistry, ListRequest, Location, ProtocolAdapter, Scheme};
use crate::types::{DiscoveredObject, Watermark};
use regex::Regex;
use tracing::{debug, info};

/// Resolves adapters for table specs and filters their listings.
pub struct FileDiscoveryEngine<'r> {
    registry: &'r ConnectionRegistry,
    credentials: &'r Credentials,
}

impl<'r> FileDiscoveryEngine<'r> {
    pub fn new(registry: &'r ConnectionRegistry, credentials: &'r Credentials) -> Self {
        Self {
            registry,
            credentials,
        }
    }

    pub fn registry(&self) -> &'r ConnectionRegistry {
        self.registry
    }

    pub fn credentials(&self) -> &'r Credentials {
        self.credentials
    }

    /// Parse the table location and build its protocol adapter.
    pub fn adapter_for(&self, spec: &TableSpec) -> Result<(Location, Box<dyn ProtocolAdapter + 'r>)> {
        let location = Location::parse(&spec.path)?;
        let adapter = source::adapter_for(&location, self.credentials, self.registry)?;
        Ok((location, adapter))
    }

    /// List candidates for `spec`: keys where the pattern matches anywhere,
    /// strictly newer than `watermark`, sorted by modification time.
    pub fn discover(
        &self,
        spec: &TableSpec,
        watermark: Option<Watermark>,
    ) -> Result<Vec<DiscoveredObject>> {
        let pattern = spec.compiled_pattern()?;
        let (location, adapter) = self.adapter_for(spec)?;

        // HTTP sources fetch exactly `path/pattern`.
        let search_prefix = match location.scheme {
            Scheme::Http | Scheme::Https => Some(spec.pattern.as_str()),
            _ => spec.search_prefix.as_deref(),
        };
        let listed = adapter.list(&ListRequest {
            search_prefix,
            modified_since: watermark,
        })?;

        match watermark {
            Some(since) => info!(
                location = %location.redacted(),
                count = listed.len(),
                pattern = %spec.pattern,
                since = %since,
                "Checking resolved objects against pattern and watermark"
            ),
            None => info!(
                location = %location.redacted(),
                count = listed.len(),
                pattern = %spec.pattern,
                "Checking resolved objects against pattern"
            ),
        }

        let matched = filter_objects(listed, &pattern, watermark);
        info!(table = %spec.name, count = matched.len(), "Resolved objects that met criteria");
        Ok(matched)
    }
}

/// Keep objects whose key contains a pattern match and whose modification
/// time is strictly after `watermark`; order by time, then key.
pub fn filter_objects(
    objects: Vec<DiscoveredObject>,
    pattern: &Regex,
    watermark: Option<Watermark>,
) -> Vec<DiscoveredObject> {
    let mut kept: Vec<DiscoveredObject> = objects
        .into_iter()
        .filter(|obj| {
            let include = pattern.is_match(&obj.key)
                && watermark.map_or(true, |since| since < obj.last_modified);
            if include {
                debug!(key = %obj.key, last_modified = %obj.last_modified, "Including key");
            } else {
                debug!(key = %obj.key, "Not including key");
            }
            include
        })
        .collect();
    kept.sort_by(|a, b| {
        a.last_modified
            .cmp(&b.last_modified)
            .then_with(|| a.key.cmp(&b.key))
    });
    kept
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn obj(key: &str, day: u32) -> DiscoveredObject {
        DiscoveredObject::new(key, Utc.with_ymd_and_hms(2021, 1, day, 0, 0, 0).unwrap())
    }

    #[test]
    fn pattern_is_searched_not_anchored() {
        let objects = vec![obj("a/b/file.csv", 1), obj("a/file.csv.bak", 2), obj("other.txt", 3)];

        let csv_only = filter_objects(objects.clone(), &Regex::new(r"\.csv$").unwrap(), None);
        assert_eq!(csv_only.len(), 1);
        assert_eq!(csv_only[0].key, "a/b/file.csv");

        let loose = filter_objects(objects, &Regex::new("file").unwrap(), None);
        assert_eq!(loose.len(), 2);
    }

    #[test]
    fn watermark_is_strict() {
        let objects = vec![obj("x.csv", 1), obj("y.csv", 2), obj("z.csv", 3)];
        let since = Utc.with_ymd_and_hms(2021, 1, 2, 0, 0, 0).unwrap();
        let kept = filter_objects(objects, &Regex::new("csv").unwrap(), Some(since));
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].key, "z.csv");
    }

    #[test]
    fn output_is_time_ordered() {
        let objects = vec![obj("c.csv", 3), obj("a.csv", 1), obj("b2.csv", 2), obj("b1.csv", 2)];
        let keys: Vec<String> = filter_objects(objects, &Regex::new(".").unwrap(), None)
            .into_iter()
            .map(|o| o.key)
            .collect();
        assert_eq!(keys, vec!["a.csv", "b1.csv", "b2.csv", "c.csv"]);
    }

    #[test]
    fn empty_result_is_not_an_error() {
        let kept = filter_objects(vec![obj("a.json", 1)], &Regex::new("csv").unwrap(), None);
        assert!(kept.is_empty());
    }

    #[test]
    fn unknown_scheme_is_unsupported() {
        let registry = ConnectionRegistry::new();
        let credentials = Credentials::default();
        let engine = FileDiscoveryEngine::new(&registry, &credentials);
        let spec = TableSpec {
            path: "gopher://host/data".into(),
            pattern: ".*".into(),
            ..TableSpec::default()
        };
        let err = engine.discover(&spec, None).unwrap_err();
        assert!(matches!(err, crate::error::Error::UnsupportedProtocol(_)));
    }
}
