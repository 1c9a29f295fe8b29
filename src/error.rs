//! Error types for resnap
//!
//! Toyota Way: Clear error messages with actionable guidance (Respect for People)
//!
//! Two families never mix: [`Error`] covers the checkpoint engine itself
//! (configuration, formats, storage), while [`CallError`] wraps a
//! checkpointed call so the caller can tell "my computation failed" from
//! "the engine could not read or write its store".

use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Resnap error types
#[derive(Error, Debug)]
pub enum Error {
    /// Bad or missing backend selection, malformed configuration section
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A backend override failed the storage contract probe
    #[error("Backend override rejected: {0}\nThe override must answer exists/list on the output base path")]
    ConfigurationType(String),

    /// Configured storage target cannot be built
    #[error("Unsupported backend: {0}")]
    UnsupportedBackend(String),

    /// Unregistered result format or incompatible compression/extension pair
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// Backend reports the object absent
    #[error("Not found: {0}")]
    NotFound(String),

    /// Any other backend-reported failure (propagated, never retried here)
    #[error("Backend error: {0}")]
    Backend(String),

    /// Value cannot be represented by the fingerprint serialization
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Call arguments do not match the declared signature
    #[error("Argument binding failed: {0}")]
    Binding(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Arrow error
    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    /// Parquet error
    #[error("Parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// True when the backend reported the object absent.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

/// Outcome of a failed checkpointed call.
#[derive(Error, Debug)]
pub enum CallError<E> {
    /// The wrapped computation itself failed; the error is returned unchanged.
    #[error("computation failed: {0}")]
    Computation(E),

    /// The checkpoint engine failed.
    #[error(transparent)]
    Checkpoint(#[from] Error),
}

impl<E> CallError<E> {
    /// The computation's own error, if that is what failed.
    pub fn into_computation(self) -> Option<E> {
        match self {
            Self::Computation(e) => Some(e),
            Self::Checkpoint(_) => None,
        }
    }

    /// True when the engine, not the computation, failed.
    #[must_use]
    pub const fn is_checkpoint(&self) -> bool {
        matches!(self, Self::Checkpoint(_))
    }
}
