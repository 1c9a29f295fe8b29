//! In-process object store using `DashMap`.
//!
//! Data is lost when the last clone is dropped. Clones share one namespace,
//! so a test can keep a handle while the engine owns another.

use super::object_store::{ObjectClient, ObjectSession};
use crate::{Error, Result};
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

#[derive(Debug, Default)]
struct Shared {
    objects: DashMap<String, Vec<u8>>,
    open: AtomicUsize,
    opened: AtomicUsize,
    read_only: AtomicBool,
}

/// Lock-free in-memory [`ObjectClient`].
///
/// Tracks session counts so tests can assert that no connection outlives
/// the operation that opened it.
///
/// # Example
///
/// ```rust
/// use resnap::backend::{Backend, MemoryObjectClient, ObjectStoreBackend};
///
/// # fn example() -> resnap::Result<()> {
/// let client = MemoryObjectClient::new();
/// let backend = ObjectStoreBackend::new(client.clone());
/// backend.write("out/hello.txt", b"world")?;
/// assert_eq!(client.object_count(), 1);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemoryObjectClient {
    shared: Arc<Shared>,
}

impl MemoryObjectClient {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored objects, directory markers included.
    #[must_use]
    pub fn object_count(&self) -> usize {
        self.shared.objects.len()
    }

    /// Whether an object with this exact key exists.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.shared.objects.contains_key(key)
    }

    /// All keys, sorted.
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.shared.objects.iter().map(|e| e.key().clone()).collect();
        keys.sort();
        keys
    }

    /// Sessions currently open.
    #[must_use]
    pub fn open_sessions(&self) -> usize {
        self.shared.open.load(Ordering::SeqCst)
    }

    /// Sessions opened since creation.
    #[must_use]
    pub fn sessions_opened(&self) -> usize {
        self.shared.opened.load(Ordering::SeqCst)
    }

    /// Reject every `put` and `delete` while set.
    pub fn set_read_only(&self, read_only: bool) {
        self.shared.read_only.store(read_only, Ordering::SeqCst);
    }

    /// Remove every object.
    pub fn clear(&self) {
        self.shared.objects.clear();
    }
}

struct MemorySession<'a> {
    shared: &'a Shared,
}

impl MemorySession<'_> {
    fn check_writable(&self, key: &str) -> Result<()> {
        if self.shared.read_only.load(Ordering::SeqCst) {
            return Err(Error::Backend(format!("{key}: store is read-only")));
        }
        Ok(())
    }
}

impl Drop for MemorySession<'_> {
    fn drop(&mut self) {
        self.shared.open.fetch_sub(1, Ordering::SeqCst);
    }
}

impl ObjectSession for MemorySession<'_> {
    fn head(&self, key: &str) -> Result<u64> {
        self.shared
            .objects
            .get(key)
            .map(|v| v.value().len() as u64)
            .ok_or_else(|| Error::NotFound(key.to_string()))
    }

    fn get(&self, key: &str) -> Result<Vec<u8>> {
        self.shared
            .objects
            .get(key)
            .map(|v| v.value().clone())
            .ok_or_else(|| Error::NotFound(key.to_string()))
    }

    fn put(&self, key: &str, bytes: &[u8]) -> Result<()> {
        self.check_writable(key)?;
        self.shared.objects.insert(key.to_string(), bytes.to_vec());
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<()> {
        self.check_writable(key)?;
        self.shared
            .objects
            .remove(key)
            .map(|_| ())
            .ok_or_else(|| Error::NotFound(key.to_string()))
    }

    fn list_prefix(&self, prefix: &str) -> Result<Vec<String>> {
        let mut keys: Vec<String> = self
            .shared
            .objects
            .iter()
            .filter(|e| e.key().starts_with(prefix))
            .map(|e| e.key().clone())
            .collect();
        keys.sort();
        Ok(keys)
    }
}

impl ObjectClient for MemoryObjectClient {
    fn connect(&self) -> Result<Box<dyn ObjectSession + '_>> {
        self.shared.open.fetch_add(1, Ordering::SeqCst);
        self.shared.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MemorySession {
            shared: &self.shared,
        }))
    }
}
