//! Result payloads
//!
//! A checkpointed computation returns a typed value; storage only knows
//! four shapes of data. [`Payload`] is that tagged union, and the
//! [`IntoPayload`]/[`FromPayload`] pair converts between the two at the
//! call boundary.

use crate::{Error, Result};
use arrow::record_batch::RecordBatch;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Stored shape of a computation result.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// Structured record (numbers, strings, arrays, objects)
    Json(serde_json::Value),
    /// Plain text
    Text(String),
    /// Opaque binary blob
    Bytes(Vec<u8>),
    /// Tabular dataset
    Table(RecordBatch),
}

/// Discriminant of [`Payload`], used by codecs to declare what they accept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PayloadKind {
    /// [`Payload::Json`]
    Json,
    /// [`Payload::Text`]
    Text,
    /// [`Payload::Bytes`]
    Bytes,
    /// [`Payload::Table`]
    Table,
}

impl PayloadKind {
    /// Get kind name as string
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Text => "text",
            Self::Bytes => "bytes",
            Self::Table => "table",
        }
    }
}

impl std::fmt::Display for PayloadKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Payload {
    /// Kind of this payload
    #[must_use]
    pub const fn kind(&self) -> PayloadKind {
        match self {
            Self::Json(_) => PayloadKind::Json,
            Self::Text(_) => PayloadKind::Text,
            Self::Bytes(_) => PayloadKind::Bytes,
            Self::Table(_) => PayloadKind::Table,
        }
    }

    /// Format used when a checkpoint does not name one.
    ///
    /// Tables go to parquet, everything else to the format that stores it
    /// losslessly.
    #[must_use]
    pub const fn default_format(&self) -> &'static str {
        match self {
            Self::Json(_) => "json",
            Self::Text(_) => "txt",
            Self::Bytes(_) => "bin",
            Self::Table(_) => "parquet",
        }
    }

    fn mismatch(&self, expected: PayloadKind) -> Error {
        Error::UnsupportedFormat(format!(
            "stored payload is {}, expected {expected}",
            self.kind()
        ))
    }
}

/// Conversion of a computation result into a storable payload.
pub trait IntoPayload {
    /// Build the payload. Takes `&self` because the caller still returns
    /// the original value after persisting it.
    ///
    /// # Errors
    /// Returns error if the value cannot be represented
    fn to_payload(&self) -> Result<Payload>;
}

/// Reconstruction of a computation result from a replayed payload.
pub trait FromPayload: Sized {
    /// Rebuild the value.
    ///
    /// # Errors
    /// Returns error if the payload has the wrong shape
    fn from_payload(payload: Payload) -> Result<Self>;
}

impl IntoPayload for RecordBatch {
    fn to_payload(&self) -> Result<Payload> {
        Ok(Payload::Table(self.clone()))
    }
}

impl FromPayload for RecordBatch {
    fn from_payload(payload: Payload) -> Result<Self> {
        match payload {
            Payload::Table(batch) => Ok(batch),
            other => Err(other.mismatch(PayloadKind::Table)),
        }
    }
}

impl IntoPayload for String {
    fn to_payload(&self) -> Result<Payload> {
        Ok(Payload::Text(self.clone()))
    }
}

impl FromPayload for String {
    fn from_payload(payload: Payload) -> Result<Self> {
        match payload {
            Payload::Text(text) => Ok(text),
            Payload::Json(serde_json::Value::String(text)) => Ok(text),
            other => Err(other.mismatch(PayloadKind::Text)),
        }
    }
}

impl IntoPayload for Vec<u8> {
    fn to_payload(&self) -> Result<Payload> {
        Ok(Payload::Bytes(self.clone()))
    }
}

impl FromPayload for Vec<u8> {
    fn from_payload(payload: Payload) -> Result<Self> {
        match payload {
            Payload::Bytes(bytes) => Ok(bytes),
            Payload::Text(text) => Ok(text.into_bytes()),
            other => Err(other.mismatch(PayloadKind::Bytes)),
        }
    }
}

impl IntoPayload for serde_json::Value {
    fn to_payload(&self) -> Result<Payload> {
        Ok(Payload::Json(self.clone()))
    }
}

impl FromPayload for serde_json::Value {
    fn from_payload(payload: Payload) -> Result<Self> {
        match payload {
            Payload::Json(value) => Ok(value),
            Payload::Text(text) => Ok(Self::String(text)),
            other => Err(other.mismatch(PayloadKind::Json)),
        }
    }
}

/// Wrapper storing any serde type as a JSON payload.
///
/// ```rust
/// use resnap::payload::{FromPayload, IntoPayload, Json};
///
/// let point = Json((3_i32, "north".to_string()));
/// let payload = point.to_payload()?;
/// let back: Json<(i32, String)> = Json::from_payload(payload)?;
/// assert_eq!(back.0, (3, "north".to_string()));
/// # Ok::<(), resnap::Error>(())
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Json<T>(pub T);

impl<T: Serialize> IntoPayload for Json<T> {
    fn to_payload(&self) -> Result<Payload> {
        Ok(Payload::Json(serde_json::to_value(&self.0)?))
    }
}

impl<T: DeserializeOwned> FromPayload for Json<T> {
    fn from_payload(payload: Payload) -> Result<Self> {
        match payload {
            Payload::Json(value) => Ok(Self(serde_json::from_value(value)?)),
            other => Err(other.mismatch(PayloadKind::Json)),
        }
    }
}

macro_rules! json_scalar_payload {
    ($($ty:ty),* $(,)?) => {
        $(
            impl IntoPayload for $ty {
                fn to_payload(&self) -> Result<Payload> {
                    Json(self).to_payload()
                }
            }

            impl FromPayload for $ty {
                fn from_payload(payload: Payload) -> Result<Self> {
                    Json::<$ty>::from_payload(payload).map(|json| json.0)
                }
            }
        )*
    };
}

json_scalar_payload!(i8, i16, i32, i64, u8, u16, u32, u64, usize, f32, f64, bool, ());
