//! Bounded sampling of candidate files for structure inference.

use crate::config::TableSpec;
use crate::dispatch::RowStreamDispatcher;
use crate::error::Result;
use crate::format::fields::UNDEFINED_FIELD;
use crate::types::{DiscoveredObject, ParsedRow};
use serde::Serialize;
use tracing::info;

/// Rows sampled across a table's files.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SampleSet {
    pub rows: Vec<ParsedRow>,
    /// Keys of the files that were opened, in order
    pub files: Vec<String>,
}

impl SampleSet {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Field names in first-seen order across all sampled rows.
    pub fn field_names(&self) -> Vec<&str> {
        let mut names: indexmap::IndexSet<&str> = indexmap::IndexSet::new();
        for row in &self.rows {
            names.extend(row.keys().map(String::as_str));
        }
        names.into_iter().collect()
    }
}

pub struct Sampler<'a> {
    dispatcher: &'a RowStreamDispatcher<'a>,
}

impl<'a> Sampler<'a> {
    pub fn new(dispatcher: &'a RowStreamDispatcher<'a>) -> Self {
        Self { dispatcher }
    }

    /// Sample up to `max_sampled_files` candidates in order, keeping every
    /// `sample_rate`-th row and at most `max_sampling_read` rows per file.
    pub fn sample(&self, spec: &TableSpec, candidates: &[DiscoveredObject]) -> Result<SampleSet> {
        let mut set = SampleSet::default();
        for candidate in candidates.iter().take(spec.max_sampled_files()) {
            let rows = self.sample_file(spec, &candidate.key)?;
            set.rows.extend(rows);
            set.files.push(candidate.key.clone());
        }

        if spec.ignore_undefined_field_names {
            for row in &mut set.rows {
                row.shift_remove(UNDEFINED_FIELD);
            }
        }
        Ok(set)
    }

    fn sample_file(&self, spec: &TableSpec, key: &str) -> Result<Vec<ParsedRow>> {
        let rate = spec.sample_rate();
        let max = spec.max_sampling_read();
        info!(file = %key, max_records = max, sample_rate = rate, "Sampling file");

        let mut samples = Vec::new();
        if max == 0 {
            return Ok(samples);
        }
        // Empty rows are already dropped by the stream when skip_empty_rows is set.
        let stream = self.dispatcher.open_with_limit(spec, key, None)?;
        for (index, row) in stream.enumerate() {
            let row = row?;
            if index % rate == 0 {
                samples.push(row);
                if samples.len() >= max {
                    break;
                }
            }
        }
        info!(file = %key, count = samples.len(), "Sampled records");
        Ok(samples)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::InvalidFormatAction;
    use crate::source::local::LocalAdapter;
    use crate::source::Location;
    use crate::types::FieldValue;
    use chrono::Utc;
    use std::fs;
    use tempfile::TempDir;

    fn numbers(n: usize) -> String {
        let mut body = String::from("n,\n");
        for i in 0..n {
            body.push_str(&format!("{},x\n", i));
        }
        body
    }

    fn candidates(keys: &[&str]) -> Vec<DiscoveredObject> {
        keys.iter().map(|k| DiscoveredObject::new(*k, Utc::now())).collect()
    }

    fn spec() -> TableSpec {
        TableSpec {
            delimiter: Some(",".into()),
            ..TableSpec::default()
        }
    }

    #[test]
    fn stride_and_per_file_cap() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("a.csv"), numbers(20)).unwrap();
        let location = Location::parse(&temp.path().display().to_string()).unwrap();
        let adapter = LocalAdapter::new(&location);
        let dispatcher = RowStreamDispatcher::new(&adapter, &location);
        let sampler = Sampler::new(&dispatcher);

        let strided = TableSpec {
            sample_rate: Some(5),
            ..spec()
        };
        let set = sampler.sample(&strided, &candidates(&["a.csv"])).unwrap();
        let picked: Vec<&FieldValue> = set.rows.iter().map(|r| &r["n"]).collect();
        assert_eq!(
            picked,
            vec![
                &FieldValue::from("0"),
                &FieldValue::from("5"),
                &FieldValue::from("10"),
                &FieldValue::from("15")
            ]
        );

        let capped = TableSpec {
            sample_rate: Some(1),
            max_sampling_read: Some(3),
            ..spec()
        };
        assert_eq!(sampler.sample(&capped, &candidates(&["a.csv"])).unwrap().len(), 3);
    }

    #[test]
    fn file_cap_and_undefined_field_stripping() {
        let temp = TempDir::new().unwrap();
        for name in ["a.csv", "b.csv", "c.csv"] {
            fs::write(temp.path().join(name), numbers(2)).unwrap();
        }
        let location = Location::parse(&temp.path().display().to_string()).unwrap();
        let adapter = LocalAdapter::new(&location);
        let dispatcher = RowStreamDispatcher::new(&adapter, &location);
        let sampler = Sampler::new(&dispatcher);

        let spec = TableSpec {
            sample_rate: Some(1),
            max_sampled_files: Some(2),
            ..spec()
        };
        let set = sampler
            .sample(&spec, &candidates(&["a.csv", "b.csv", "c.csv"]))
            .unwrap();
        assert_eq!(set.files, vec!["a.csv", "b.csv"]);
        assert_eq!(set.len(), 4);
        assert!(set.rows[0].contains_key(UNDEFINED_FIELD));
        assert_eq!(set.field_names(), vec!["n", ""]);

        let stripped = TableSpec {
            ignore_undefined_field_names: true,
            ..spec
        };
        let set = sampler.sample(&stripped, &candidates(&["a.csv"])).unwrap();
        assert!(set.rows.iter().all(|r| !r.contains_key(UNDEFINED_FIELD)));
    }

    #[test]
    fn ignored_invalid_file_does_not_abort_siblings() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("bad.json"), "{oops").unwrap();
        fs::write(temp.path().join("good.json"), r#"[{"a": 1}]"#).unwrap();
        let location = Location::parse(&temp.path().display().to_string()).unwrap();
        let adapter = LocalAdapter::new(&location);
        let dispatcher = RowStreamDispatcher::new(&adapter, &location);
        let sampler = Sampler::new(&dispatcher);

        let spec = TableSpec {
            sample_rate: Some(1),
            invalid_format_action: InvalidFormatAction::Ignore,
            ..TableSpec::default()
        };
        let set = sampler
            .sample(&spec, &candidates(&["bad.json", "good.json"]))
            .unwrap();
        assert_eq!(set.len(), 1);

        let strict = TableSpec {
            sample_rate: Some(1),
            ..TableSpec::default()
        };
        assert!(sampler
            .sample(&strict, &candidates(&["bad.json", "good.json"]))
            .unwrap_err()
            .is_invalid_format());
    }
}
