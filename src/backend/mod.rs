//! Storage backends
//!
//! The checkpoint engine only needs a handful of blocking operations over
//! `/`-separated paths. Implementations:
//!
//! - [`LocalBackend`]: local filesystem
//! - [`ObjectStoreBackend`]: any S3-like [`ObjectClient`]
//! - [`MemoryObjectClient`]: in-process object store for tests and demos
//!
//! Implementations acquire whatever connection they need inside each call
//! and release it before returning; the engine never holds a handle across
//! operations.
//!
//! Absence is reported as [`Error::NotFound`](crate::Error::NotFound) so
//! callers branch on the variant instead of inspecting messages. `exists`
//! and `is_directory` never report absence as an error.

mod local;
mod memory;
mod object_store;

pub use local::LocalBackend;
pub use memory::MemoryObjectClient;
pub use object_store::{ObjectClient, ObjectSession, ObjectStoreBackend};

use crate::Result;

/// Separator of backend paths
pub const SEPARATOR: char = '/';

/// Uniform operations over a storage location.
///
/// Every method is blocking. A `write` must be visible to a subsequent
/// `exists`/`list` from any caller once it returns.
pub trait Backend: Send + Sync {
    /// Short backend name for logs
    fn name(&self) -> &'static str;

    /// Whether a file or directory exists at `path`.
    ///
    /// # Errors
    /// Returns error only for failures other than absence
    fn exists(&self, path: &str) -> Result<bool>;

    /// Entries under `path`, all descendants when `recursive`.
    ///
    /// Returned paths are usable as-is in further calls.
    ///
    /// # Errors
    /// Returns `NotFound` if `path` does not exist
    fn list(&self, path: &str, recursive: bool) -> Result<Vec<String>>;

    /// Create a directory (and missing parents).
    ///
    /// # Errors
    /// Returns error if the directory cannot be created
    fn mkdir(&self, path: &str) -> Result<()>;

    /// Delete a file or an empty directory.
    ///
    /// # Errors
    /// Returns `NotFound` if nothing exists at `path`
    fn delete(&self, path: &str) -> Result<()>;

    /// Read a whole file.
    ///
    /// # Errors
    /// Returns `NotFound` if the file does not exist
    fn read(&self, path: &str) -> Result<Vec<u8>>;

    /// Write a whole file. Readers observe either nothing or the full
    /// content.
    ///
    /// # Errors
    /// Returns error if the write fails
    fn write(&self, path: &str, bytes: &[u8]) -> Result<()>;

    /// Whether `path` is a directory; false when absent.
    ///
    /// # Errors
    /// Returns error only for failures other than absence
    fn is_directory(&self, path: &str) -> Result<bool>;
}

/// Join path segments with [`SEPARATOR`], skipping empty ones.
#[must_use]
pub fn join(base: &str, name: &str) -> String {
    let base = base.trim_end_matches(SEPARATOR);
    let name = name.trim_start_matches(SEPARATOR);
    match (base.is_empty(), name.is_empty()) {
        (true, _) => name.to_string(),
        (_, true) => base.to_string(),
        _ => format!("{base}{SEPARATOR}{name}"),
    }
}

/// Create `path` unless it already exists.
///
/// # Errors
/// Propagates backend failures
pub fn ensure_dir(backend: &dyn Backend, path: &str) -> Result<()> {
    if path.is_empty() || backend.exists(path)? {
        return Ok(());
    }
    backend.mkdir(path)
}
