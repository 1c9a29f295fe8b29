//! Service factory: resolves and holds the active backend
//!
//! Resolution is lazy and memoized: the first successful [`backend`]
//! call builds the backend selected by [`Config::save_to`] and every later
//! call returns the same instance. [`set_backend`] replaces it (after a
//! contract probe) and [`reset`] forgets it, which is what tests use for
//! isolation.
//!
//! [`backend`]: ServiceFactory::backend
//! [`set_backend`]: ServiceFactory::set_backend
//! [`reset`]: ServiceFactory::reset

use crate::backend::{Backend, LocalBackend, ObjectClient, ObjectStoreBackend};
use crate::config::{Config, Services};
use crate::{Error, Result};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info};

/// Resolves the [`Backend`] a configuration selects.
pub struct ServiceFactory {
    config: Config,
    object_client: Option<Arc<dyn ObjectClient>>,
    backend: Mutex<Option<Arc<dyn Backend>>>,
}

impl std::fmt::Debug for ServiceFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceFactory")
            .field("save_to", &self.config.save_to)
            .field("object_client", &self.object_client.is_some())
            .field("resolved", &self.is_resolved())
            .finish()
    }
}

impl ServiceFactory {
    /// Factory for `config`; nothing is built until [`backend`](Self::backend)
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self {
            config,
            object_client: None,
            backend: Mutex::new(None),
        }
    }

    /// Client used when `save_to = "remote"`
    #[must_use]
    pub fn with_object_client(mut self, client: impl ObjectClient + 'static) -> Self {
        self.object_client = Some(Arc::new(client));
        self
    }

    /// Configuration the factory resolves from
    #[must_use]
    pub const fn config(&self) -> &Config {
        &self.config
    }

    fn slot(&self) -> MutexGuard<'_, Option<Arc<dyn Backend>>> {
        // The slot holds a plain Option, a panic elsewhere cannot corrupt it
        self.backend.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Whether a backend is memoized
    #[must_use]
    pub fn is_resolved(&self) -> bool {
        self.slot().is_some()
    }

    /// Active backend, built on first use.
    ///
    /// # Errors
    /// Returns `UnsupportedBackend` if `remote` is selected without a
    /// `[remote]` section or without an installed object client
    pub fn backend(&self) -> Result<Arc<dyn Backend>> {
        let mut slot = self.slot();
        if let Some(backend) = slot.as_ref() {
            return Ok(Arc::clone(backend));
        }
        let backend = self.build()?;
        *slot = Some(Arc::clone(&backend));
        Ok(backend)
    }

    fn build(&self) -> Result<Arc<dyn Backend>> {
        match self.config.save_to {
            Services::Local => {
                debug!(base = %self.config.output_base_path, "Using local checkpoint storage");
                Ok(Arc::new(LocalBackend::new()))
            }
            Services::Remote => {
                let remote = self.config.remote.as_ref().ok_or_else(|| {
                    Error::UnsupportedBackend(
                        "remote storage selected without a [remote] section".to_string(),
                    )
                })?;
                let client = self.object_client.as_ref().ok_or_else(|| {
                    Error::UnsupportedBackend(
                        "remote storage selected but no object client is installed".to_string(),
                    )
                })?;
                info!(
                    bucket = %remote.bucket_name,
                    endpoint = remote.endpoint_url.as_deref().unwrap_or("default"),
                    "Using remote checkpoint storage"
                );
                Ok(Arc::new(ObjectStoreBackend::new(Arc::clone(client))))
            }
        }
    }

    /// Replace the memoized backend.
    ///
    /// The override is probed first: it must answer `exists` on the output
    /// base path, and `list` when that path exists.
    ///
    /// # Errors
    /// Returns `ConfigurationType` if the probe fails
    pub fn set_backend(&self, backend: Arc<dyn Backend>) -> Result<()> {
        let base = self.config.output_base_path.as_str();
        let reject = |op: &str, e: &Error| {
            Error::ConfigurationType(format!("{} failed {op} on {base}: {e}", backend.name()))
        };
        if backend.exists(base).map_err(|e| reject("exists", &e))? {
            backend.list(base, false).map_err(|e| reject("list", &e))?;
        }
        debug!(backend = backend.name(), "Checkpoint backend overridden");
        *self.slot() = Some(backend);
        Ok(())
    }

    /// Forget the memoized backend; the next [`backend`](Self::backend)
    /// call resolves again.
    pub fn reset(&self) {
        *self.slot() = None;
    }
}
