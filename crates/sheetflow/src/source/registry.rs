//! Connection registry for external service clients.
//!
//! Object-store clients and mailbox handles are created lazily, once per
//! backend + credential identity, and reused across sequential calls. The
//! registry also owns the single-threaded runtime that drives async client
//! libraries from the blocking pipeline.

use super::location::Location;
use super::mailbox::{MailboxConnector, MailboxFileSystem};
use crate::config::Credentials;
use crate::error::{Error, Result};
use object_store::ObjectStore;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::runtime::Runtime;

/// Lazily-populated cache of service clients.
#[derive(Default)]
pub struct ConnectionRegistry {
    stores: Mutex<HashMap<String, Arc<dyn ObjectStore>>>,
    mailboxes: Mutex<HashMap<String, Arc<dyn MailboxFileSystem>>>,
    mailbox_connector: Option<Arc<dyn MailboxConnector>>,
    runtime: Mutex<Option<Arc<Runtime>>>,
}

impl std::fmt::Debug for ConnectionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionRegistry").finish_non_exhaustive()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach the connector used to open mailbox file systems.
    pub fn with_mailbox_connector(mut self, connector: Arc<dyn MailboxConnector>) -> Self {
        self.mailbox_connector = Some(connector);
        self
    }

    pub fn mailbox_connector(&self) -> Option<&Arc<dyn MailboxConnector>> {
        self.mailbox_connector.as_ref()
    }

    /// Cache key for an object-store client.
    pub fn store_key(location: &Location, credentials: &Credentials) -> String {
        format!(
            "{}://{}#{:x}",
            location.scheme,
            location.bucket(),
            credentials.fingerprint()
        )
    }

    /// Return the cached client for `key`, creating it with `init` on first use.
    pub fn object_store<F>(&self, key: &str, init: F) -> Result<Arc<dyn ObjectStore>>
    where
        F: FnOnce() -> Result<Arc<dyn ObjectStore>>,
    {
        let mut stores = lock(&self.stores);
        if let Some(store) = stores.get(key) {
            return Ok(Arc::clone(store));
        }
        let store = init()?;
        tracing::debug!(key = %key, "Created object store client");
        stores.insert(key.to_string(), Arc::clone(&store));
        Ok(store)
    }

    /// Pre-populate a client, e.g. an in-memory store in tests.
    pub fn register_object_store(
        &self,
        location: &Location,
        credentials: &Credentials,
        store: Arc<dyn ObjectStore>,
    ) {
        lock(&self.stores).insert(Self::store_key(location, credentials), store);
    }

    /// Cache key for a mailbox handle.
    pub fn mailbox_key(host: &str, credentials: &Credentials) -> String {
        format!("imap://{}#{:x}", host, credentials.fingerprint())
    }

    /// Return the cached mailbox handle for `key`, creating it on first use.
    pub fn mailbox<F>(&self, key: &str, init: F) -> Result<Arc<dyn MailboxFileSystem>>
    where
        F: FnOnce() -> Result<Arc<dyn MailboxFileSystem>>,
    {
        let mut mailboxes = lock(&self.mailboxes);
        if let Some(fs) = mailboxes.get(key) {
            return Ok(Arc::clone(fs));
        }
        let fs = init()?;
        tracing::debug!(key = %key, "Connected mailbox");
        mailboxes.insert(key.to_string(), Arc::clone(&fs));
        Ok(fs)
    }

    /// Run a future to completion on the registry's runtime.
    pub fn block_on<F: Future>(&self, future: F) -> Result<F::Output> {
        let runtime = {
            let mut slot = lock(&self.runtime);
            match slot.as_ref() {
                Some(runtime) => Arc::clone(runtime),
                None => {
                    let runtime = Arc::new(
                        tokio::runtime::Builder::new_current_thread()
                            .enable_all()
                            .build()
                            .map_err(|e| Error::backend("runtime", e))?,
                    );
                    *slot = Some(Arc::clone(&runtime));
                    runtime
                }
            }
        };
        Ok(runtime.block_on(future))
    }

    /// Number of cached clients across all backends.
    pub fn cached_clients(&self) -> usize {
        lock(&self.stores).len() + lock(&self.mailboxes).len()
    }

    /// Drop every cached client; the next use re-initializes.
    pub fn reset(&self) {
        lock(&self.stores).clear();
        lock(&self.mailboxes).clear();
    }
}
