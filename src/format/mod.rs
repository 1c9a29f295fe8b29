//! Result format registry
//!
//! A format is a named `(encode, decode)` pair plus the compression it
//! applies. Adding a format means registering a [`FormatCodec`], not
//! implementing a trait:
//!
//! ```rust
//! use resnap::format::{Compression, FormatCodec, FormatRegistry};
//!
//! let mut registry = FormatRegistry::new();
//! registry.register(FormatCodec::csv().named("csv.gz").with_compression(Compression::Gzip))?;
//! assert_eq!(registry.get("csv.gz")?.artifact_extension(), ".csv.gz");
//! # Ok::<(), resnap::Error>(())
//! ```

mod blob;
mod compression;
mod table;

pub use compression::{verify_compression_and_extension, Compression};

use crate::payload::{Payload, PayloadKind};
use crate::{Error, Result};
use std::collections::HashMap;

/// Encoder: payload to stored bytes, applying the codec's compression
pub type EncodeFn = fn(&Payload, Option<Compression>) -> Result<Vec<u8>>;

/// Decoder: stored bytes back to a payload
pub type DecodeFn = fn(&[u8], Option<Compression>) -> Result<Payload>;

/// One registered result format.
#[derive(Debug, Clone)]
pub struct FormatCodec {
    name: String,
    extension: String,
    compression: Option<Compression>,
    accepts: Vec<PayloadKind>,
    encode: EncodeFn,
    decode: DecodeFn,
}

impl FormatCodec {
    /// Create a codec from its parts.
    ///
    /// # Arguments
    ///
    /// * `name` - Registry key and the `result_format` written to metadata
    /// * `extension` - File extension without the leading dot
    /// * `accepts` - Payload kinds `encode` can store; `decode` must give
    ///   back a payload every result type of those kinds can be read from
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        extension: impl Into<String>,
        accepts: &[PayloadKind],
        encode: EncodeFn,
        decode: DecodeFn,
    ) -> Self {
        Self {
            name: name.into(),
            extension: extension.into(),
            compression: None,
            accepts: accepts.to_vec(),
            encode,
            decode,
        }
    }

    /// JSON documents (pretty printed)
    #[must_use]
    pub fn json() -> Self {
        Self::new(
            "json",
            "json",
            &[PayloadKind::Json, PayloadKind::Text],
            blob::encode_json,
            blob::decode_json,
        )
    }

    /// UTF-8 text
    #[must_use]
    pub fn text() -> Self {
        Self::new(
            "txt",
            "txt",
            &[PayloadKind::Text],
            blob::encode_text,
            blob::decode_text,
        )
    }

    /// Raw bytes
    #[must_use]
    pub fn binary() -> Self {
        Self::new(
            "bin",
            "bin",
            &[PayloadKind::Bytes],
            blob::encode_bytes,
            blob::decode_bytes,
        )
    }

    /// CSV with a header row
    #[must_use]
    pub fn csv() -> Self {
        Self::new(
            "csv",
            "csv",
            &[PayloadKind::Table],
            table::encode_csv,
            table::decode_csv,
        )
    }

    /// Parquet with snappy column compression
    #[must_use]
    pub fn parquet() -> Self {
        Self::new(
            "parquet",
            "parquet",
            &[PayloadKind::Table],
            table::encode_parquet,
            table::decode_parquet,
        )
        .with_compression(Compression::Snappy)
    }

    /// Rename the codec (registry key and recorded `result_format`)
    #[must_use]
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set the compression applied by this codec
    #[must_use]
    pub fn with_compression(mut self, compression: Compression) -> Self {
        self.compression = Some(compression);
        self
    }

    /// Registry key
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Compression applied by this codec
    #[must_use]
    pub const fn compression(&self) -> Option<Compression> {
        self.compression
    }

    /// Whether `encode` can store this payload kind
    #[must_use]
    pub fn accepts(&self, kind: PayloadKind) -> bool {
        self.accepts.contains(&kind)
    }

    /// Suffix of artifact files, e.g. `.csv.gz`
    #[must_use]
    pub fn artifact_extension(&self) -> String {
        let suffix = self.compression.map_or("", |c| c.suffix());
        format!(".{}{suffix}", self.extension)
    }

    /// Check the compression/extension pairing for an artifact path.
    ///
    /// # Errors
    /// Returns `UnsupportedFormat` on a mismatch
    pub fn validate(&self, artifact_path: &str) -> Result<()> {
        verify_compression_and_extension(self.compression, artifact_path)
    }

    /// Encode a payload
    ///
    /// # Errors
    /// Returns `UnsupportedFormat` if the payload kind is not accepted,
    /// or the codec's own error if encoding fails
    pub fn encode(&self, payload: &Payload) -> Result<Vec<u8>> {
        if !self.accepts(payload.kind()) {
            return Err(Error::UnsupportedFormat(format!(
                "format {} cannot store a {} result",
                self.name,
                payload.kind()
            )));
        }
        (self.encode)(payload, self.compression)
    }

    /// Decode stored bytes
    ///
    /// # Errors
    /// Returns error if the bytes are not valid for this format
    pub fn decode(&self, bytes: &[u8]) -> Result<Payload> {
        (self.decode)(bytes, self.compression)
    }
}

/// Format name to codec mapping.
#[derive(Debug, Clone)]
pub struct FormatRegistry {
    codecs: HashMap<String, FormatCodec>,
}

impl FormatRegistry {
    /// Registry with the built-in formats: json, txt, bin, csv, parquet
    #[must_use]
    pub fn new() -> Self {
        let mut codecs = HashMap::new();
        for codec in [
            FormatCodec::json(),
            FormatCodec::text(),
            FormatCodec::binary(),
            FormatCodec::csv(),
            FormatCodec::parquet(),
        ] {
            codecs.insert(codec.name.clone(), codec);
        }
        Self { codecs }
    }

    /// Registry without any format
    #[must_use]
    pub fn empty() -> Self {
        Self {
            codecs: HashMap::new(),
        }
    }

    /// Register (or replace) a codec.
    ///
    /// # Errors
    /// Returns `UnsupportedFormat` if the codec's compression does not
    /// allow its own artifact extension
    pub fn register(&mut self, codec: FormatCodec) -> Result<()> {
        codec.validate(&format!("artifact{}", codec.artifact_extension()))?;
        self.codecs.insert(codec.name.clone(), codec);
        Ok(())
    }

    /// Look up a codec by name.
    ///
    /// # Errors
    /// Returns `UnsupportedFormat` naming the valid formats
    pub fn get(&self, name: &str) -> Result<&FormatCodec> {
        self.codecs.get(name).ok_or_else(|| {
            Error::UnsupportedFormat(format!(
                "{name} is not supported. Valid ones are {}.",
                self.names().join(", ")
            ))
        })
    }

    /// Whether a format is registered
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.codecs.contains_key(name)
    }

    /// Registered names, sorted
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.codecs.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl Default for FormatRegistry {
    fn default() -> Self {
        Self::new()
    }
}
