//! Artifact compression
//!
//! Blob formats compress the encoded bytes themselves; parquet applies
//! the same choice inside its column chunks.

use crate::{Error, Result};
use std::io::{Read, Write};
use std::path::Path;

/// Compression algorithm for stored artifacts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Compression {
    /// Gzip (DEFLATE) - artifact name must end in `.gz`
    Gzip,
    /// Snappy - any extension, parquet only
    Snappy,
    /// LZ4 - fast, artifact name must end in `.lz4`
    Lz4,
    /// ZSTD - better ratio, artifact name must end in `.zst`
    Zstd,
}

impl Compression {
    /// Every supported algorithm
    pub const ALL: [Self; 4] = [Self::Gzip, Self::Snappy, Self::Lz4, Self::Zstd];

    /// Get algorithm name as string
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Gzip => "gzip",
            Self::Snappy => "snappy",
            Self::Lz4 => "lz4",
            Self::Zstd => "zstd",
        }
    }

    /// Extensions a compressed artifact may carry; `None` means any.
    #[must_use]
    pub const fn allowed_extensions(&self) -> Option<&'static [&'static str]> {
        match self {
            Self::Gzip => Some(&[".gz"]),
            Self::Snappy => None,
            Self::Lz4 => Some(&[".lz4"]),
            Self::Zstd => Some(&[".zst"]),
        }
    }

    /// Suffix appended to artifact names, empty when any extension is allowed.
    #[must_use]
    pub fn suffix(&self) -> &'static str {
        self.allowed_extensions()
            .and_then(|exts| exts.first().copied())
            .unwrap_or("")
    }

    /// Compress data using this algorithm
    ///
    /// # Errors
    /// Returns error if compression fails or the algorithm is parquet-only
    pub fn compress(&self, data: &[u8]) -> Result<Vec<u8>> {
        match self {
            Self::Gzip => {
                let mut encoder =
                    flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
                encoder.write_all(data)?;
                Ok(encoder.finish()?)
            }
            Self::Lz4 => Ok(lz4_flex::compress_prepend_size(data)),
            Self::Zstd => zstd::encode_all(data, 3)
                .map_err(|e| Error::Other(format!("ZSTD compression failed: {e}"))),
            Self::Snappy => Err(Self::parquet_only()),
        }
    }

    /// Decompress data using this algorithm
    ///
    /// # Errors
    /// Returns error if decompression fails (e.g., corrupted data)
    pub fn decompress(&self, data: &[u8]) -> Result<Vec<u8>> {
        match self {
            Self::Gzip => {
                let mut out = Vec::new();
                flate2::read::GzDecoder::new(data)
                    .read_to_end(&mut out)
                    .map_err(|e| Error::Other(format!("GZIP decompression failed: {e}")))?;
                Ok(out)
            }
            Self::Lz4 => lz4_flex::decompress_size_prepended(data)
                .map_err(|e| Error::Other(format!("LZ4 decompression failed: {e}"))),
            Self::Zstd => zstd::decode_all(data)
                .map_err(|e| Error::Other(format!("ZSTD decompression failed: {e}"))),
            Self::Snappy => Err(Self::parquet_only()),
        }
    }

    fn parquet_only() -> Error {
        Error::UnsupportedFormat("snappy compression is only available for parquet".to_string())
    }
}

impl std::fmt::Display for Compression {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Compression {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| {
                Error::UnsupportedFormat(format!(
                    "{s} not supported. It must be in this list: {}",
                    Self::ALL.map(|c| c.as_str()).join(", ")
                ))
            })
    }
}

/// Check that an artifact path carries an extension its compression allows.
///
/// # Errors
/// Returns `UnsupportedFormat` when the extension does not match
pub fn verify_compression_and_extension(
    compression: Option<Compression>,
    path: &str,
) -> Result<()> {
    let Some(compression) = compression else {
        return Ok(());
    };
    let Some(allowed) = compression.allowed_extensions() else {
        return Ok(());
    };

    let extension = Path::new(path)
        .extension()
        .map(|ext| format!(".{}", ext.to_string_lossy()))
        .unwrap_or_default();
    if allowed.contains(&extension.as_str()) {
        Ok(())
    } else {
        Err(Error::UnsupportedFormat(format!(
            "A {compression}-compressed file must have an extension in this list: {}",
            allowed.join(", ")
        )))
    }
}
