//! Object-store adapter for S3, GCS and Azure Blob Storage.
//!
//! Listing is paginated by the client library and has no result ceiling.
//! `search_prefix` uses plain string-prefix semantics, like the stores' own
//! list APIs, rather than the path-segment semantics of `object_store`.

use super::location::{Location, Scheme};
use super::registry::ConnectionRegistry;
use super::{ListRequest, ProtocolAdapter};
use crate::config::Credentials;
use crate::error::{Error, Result};
use crate::types::DiscoveredObject;
use futures::TryStreamExt;
use object_store::aws::AmazonS3Builder;
use object_store::azure::MicrosoftAzureBuilder;
use object_store::gcp::GoogleCloudStorageBuilder;
use object_store::path::Path as ObjectPath;
use object_store::{ObjectMeta, ObjectStore};
use std::io::{Cursor, Read};
use std::sync::Arc;
use tracing::{debug, info};

pub struct ObjectStoreAdapter<'r> {
    registry: &'r ConnectionRegistry,
    store: Arc<dyn ObjectStore>,
    scheme: Scheme,
    bucket: String,
    base_prefix: String,
}

impl<'r> ObjectStoreAdapter<'r> {
    pub fn new(
        location: &Location,
        credentials: &Credentials,
        registry: &'r ConnectionRegistry,
    ) -> Result<Self> {
        let key = ConnectionRegistry::store_key(location, credentials);
        let store = registry.object_store(&key, || build_store(location, credentials))?;
        Ok(Self {
            registry,
            store,
            scheme: location.scheme,
            bucket: location.bucket().to_string(),
            base_prefix: location.base_prefix().to_string(),
        })
    }

    /// Full key prefix (location prefix + search prefix) as a plain string.
    fn full_prefix(&self, search_prefix: Option<&str>) -> String {
        let search = search_prefix.unwrap_or_default();
        match (self.base_prefix.is_empty(), search.is_empty()) {
            (true, _) => search.to_string(),
            (false, true) => format!("{}/", self.base_prefix),
            (false, false) => format!("{}/{}", self.base_prefix, search.trim_start_matches('/')),
        }
    }

    /// Strip the location prefix so keys are relative to the table path.
    fn relative_key<'k>(&self, key: &'k str) -> &'k str {
        if self.base_prefix.is_empty() {
            return key;
        }
        key.strip_prefix(self.base_prefix.as_str())
            .map(|rest| rest.trim_start_matches('/'))
            .unwrap_or(key)
    }

    fn keep(&self, meta: &ObjectMeta, key: &str) -> bool {
        if key.is_empty() || key.ends_with('/') {
            return false;
        }
        // Azure lists zero-size blobs for virtual directories.
        !(self.scheme == Scheme::Azure && meta.size == 0)
    }
}

impl ProtocolAdapter for ObjectStoreAdapter<'_> {
    fn backend(&self) -> &'static str {
        self.scheme.as_str()
    }

    fn list(&self, request: &ListRequest<'_>) -> Result<Vec<DiscoveredObject>> {
        let prefix = self.full_prefix(request.search_prefix);
        // List the enclosing "directory", then apply the string prefix.
        let list_root = prefix
            .rsplit_once('/')
            .map(|(dir, _)| dir)
            .filter(|dir| !dir.is_empty())
            .map(ObjectPath::from);
        info!(
            backend = self.scheme.as_str(),
            bucket = %self.bucket,
            prefix = %prefix,
            "Listing object store"
        );

        let store = Arc::clone(&self.store);
        let metas: Vec<ObjectMeta> = self
            .registry
            .block_on(async move { store.list(list_root.as_ref()).try_collect().await })?
            .map_err(|e| Error::backend(self.scheme.as_str(), e))?;

        let objects: Vec<DiscoveredObject> = metas
            .iter()
            .filter(|meta| meta.location.as_ref().starts_with(prefix.as_str()))
            .filter_map(|meta| {
                let key = self.relative_key(meta.location.as_ref());
                self.keep(meta, key)
                    .then(|| DiscoveredObject::new(key, meta.last_modified))
            })
            .collect();

        debug!(listed = metas.len(), kept = objects.len(), "Object store listing complete");
        Ok(objects)
    }

    fn open(&self, key: &str) -> Result<Box<dyn Read>> {
        let path = if self.base_prefix.is_empty() {
            ObjectPath::from(key)
        } else {
            ObjectPath::from(format!("{}/{}", self.base_prefix, key))
        };
        let store = Arc::clone(&self.store);
        let bytes = self
            .registry
            .block_on(async move {
                match store.get(&path).await {
                    Ok(result) => result.bytes().await,
                    Err(e) => Err(e),
                }
            })?
            .map_err(|e| Error::backend(self.scheme.as_str(), e))?;
        Ok(Box::new(Cursor::new(bytes)))
    }
}

/// Construct a client for the location's backend from explicit credentials.
fn build_store(location: &Location, credentials: &Credentials) -> Result<Arc<dyn ObjectStore>> {
    let bucket = location.bucket();
    let backend = location.scheme.as_str();
    let store: Arc<dyn ObjectStore> = match location.scheme {
        Scheme::S3 => {
            let mut builder = AmazonS3Builder::from_env().with_bucket_name(bucket);
            if let Some(key_id) = &credentials.aws_access_key_id {
                builder = builder.with_access_key_id(key_id);
            }
            if let Some(secret) = &credentials.aws_secret_access_key {
                builder = builder.with_secret_access_key(secret);
            }
            Arc::new(builder.build().map_err(|e| Error::backend(backend, e))?)
        }
        Scheme::Gcs => {
            let mut builder = GoogleCloudStorageBuilder::from_env().with_bucket_name(bucket);
            if let Some(raw) = &credentials.google_application_credentials {
                // Either inline service-account JSON or a path to it.
                builder = if raw.trim_start().starts_with('{') {
                    builder.with_service_account_key(raw)
                } else {
                    builder.with_service_account_path(raw)
                };
            }
            Arc::new(builder.build().map_err(|e| Error::backend(backend, e))?)
        }
        Scheme::Azure => {
            let mut builder = MicrosoftAzureBuilder::from_env().with_container_name(bucket);
            if let Some(conn) = &credentials.azure_storage_connection_string {
                let parts = parse_connection_string(conn);
                if parts
                    .iter()
                    .any(|(k, v)| k.eq_ignore_ascii_case("UseDevelopmentStorage") && v == "true")
                {
                    builder = builder.with_use_emulator(true);
                }
                for (name, value) in parts {
                    builder = match name.as_str() {
                        "AccountName" => builder.with_account(value),
                        "AccountKey" => builder.with_access_key(value),
                        _ => builder,
                    };
                }
            }
            Arc::new(builder.build().map_err(|e| Error::backend(backend, e))?)
        }
        other => {
            return Err(Error::Config(format!("{} is not an object store", other)));
        }
    };
    Ok(store)
}

/// Split an Azure `Key=Value;Key=Value` connection string.
fn parse_connection_string(raw: &str) -> Vec<(String, String)> {
    raw.split(';')
        .filter_map(|part| part.split_once('='))
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        .collect()
}
