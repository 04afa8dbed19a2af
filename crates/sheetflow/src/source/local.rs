//! Local filesystem adapter.

use super::{check_ceiling, ListRequest, Location, ProtocolAdapter};
use crate::error::{Error, Result};
use crate::types::DiscoveredObject;
use chrono::{DateTime, Utc};
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use walkdir::WalkDir;

/// Join path components with forward slashes so keys look the same on every
/// platform.
fn normalize_path_to_forward_slashes(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// Walks a directory tree. Keys are relative to the location root, even when
/// a `search_prefix` narrows the walk to a subdirectory.
pub struct LocalAdapter {
    root: PathBuf,
}

impl LocalAdapter {
    pub fn new(location: &Location) -> Self {
        Self {
            root: PathBuf::from(&location.rest),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl ProtocolAdapter for LocalAdapter {
    fn backend(&self) -> &'static str {
        "file"
    }

    fn list(&self, request: &ListRequest<'_>) -> Result<Vec<DiscoveredObject>> {
        let walk_root = match request.search_prefix {
            Some(prefix) if !prefix.is_empty() => self.root.join(prefix),
            _ => self.root.clone(),
        };
        info!(path = %walk_root.display(), "Walking local directory");

        if !walk_root.exists() {
            return Err(Error::backend(
                "file",
                format!("Path not found: {}", walk_root.display()),
            ));
        }

        let mut objects = Vec::new();
        for entry in WalkDir::new(&walk_root).follow_links(false).sort_by_file_name() {
            let entry = entry.map_err(|e| Error::backend("file", e))?;
            if !entry.file_type().is_file() {
                continue;
            }

            let metadata = entry.metadata().map_err(|e| Error::backend("file", e))?;
            let modified = metadata.modified()?;
            let rel = entry.path().strip_prefix(&self.root).unwrap_or(entry.path());

            objects.push(DiscoveredObject::new(
                normalize_path_to_forward_slashes(rel),
                DateTime::<Utc>::from(modified),
            ));
            check_ceiling(objects.len(), &walk_root.display().to_string())?;
        }

        debug!(count = objects.len(), "Local listing complete");
        Ok(objects)
    }

    fn open(&self, key: &str) -> Result<Box<dyn Read>> {
        let path = self.root.join(key);
        let file = File::open(&path)
            .map_err(|e| Error::backend("file", format!("{}: {}", path.display(), e)))?;
        Ok(Box::new(file))
    }
}
