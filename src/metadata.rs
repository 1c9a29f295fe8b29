//! Metadata records - one per recorded invocation attempt
//!
//! ## Persisted layout
//!
//! ```text
//! {output_base_path}/{folder}/{function}_{timestamp}.resnap            <- metadata (JSON)
//! {output_base_path}/{folder}/{function}_{timestamp}.resnap.{format}   <- artifact (SUCCESS only)
//! ```
//!
//! The timestamp is ISO-8601 with microsecond precision and no offset
//! (always UTC). Recovering it from a name splits on [`EXT`] first, then
//! takes the trailing `_`-delimited token, so function names may contain
//! underscores.

use crate::fingerprint::Fingerprint;
use crate::{Error, Result};
use chrono::{DateTime, NaiveDateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};

/// Reserved suffix marking checkpoint files
pub const EXT: &str = ".resnap";

/// Timestamp layout used in file names
const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6f";

/// Outcome of an invocation attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    /// Computation returned a value; an artifact exists
    Success,
    /// Computation failed; audit only, never replayed
    Failure,
}

/// Metadata of one recorded attempt.
///
/// Immutable once written. Only [`Status::Success`] records carry a
/// `result_path`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Metadata {
    function_name: String,
    argument_fingerprint: Fingerprint,
    timestamp: DateTime<Utc>,
    status: Status,
    result_format: String,
    result_path: Option<String>,
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    extra_metadata: serde_json::Map<String, serde_json::Value>,
}

impl Metadata {
    /// Record of a successful attempt whose artifact lives at `result_path`.
    #[must_use]
    pub fn success(
        function_name: impl Into<String>,
        argument_fingerprint: Fingerprint,
        timestamp: DateTime<Utc>,
        result_format: impl Into<String>,
        result_path: impl Into<String>,
    ) -> Self {
        Self {
            function_name: function_name.into(),
            argument_fingerprint,
            timestamp: timestamp.trunc_subsecs(6),
            status: Status::Success,
            result_format: result_format.into(),
            result_path: Some(result_path.into()),
            extra_metadata: serde_json::Map::new(),
        }
    }

    /// Record of a failed attempt.
    #[must_use]
    pub fn failure(
        function_name: impl Into<String>,
        argument_fingerprint: Fingerprint,
        timestamp: DateTime<Utc>,
        result_format: impl Into<String>,
    ) -> Self {
        Self {
            function_name: function_name.into(),
            argument_fingerprint,
            timestamp: timestamp.trunc_subsecs(6),
            status: Status::Failure,
            result_format: result_format.into(),
            result_path: None,
            extra_metadata: serde_json::Map::new(),
        }
    }

    /// Attach caller-supplied metadata
    #[must_use]
    pub fn with_extra(mut self, extra: serde_json::Map<String, serde_json::Value>) -> Self {
        self.extra_metadata = extra;
        self
    }

    /// Name of the checkpointed function
    #[must_use]
    pub fn function_name(&self) -> &str {
        &self.function_name
    }

    /// Fingerprint of the bound arguments
    #[must_use]
    pub const fn argument_fingerprint(&self) -> &Fingerprint {
        &self.argument_fingerprint
    }

    /// Instant the attempt was recorded
    #[must_use]
    pub const fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Outcome of the attempt
    #[must_use]
    pub const fn status(&self) -> Status {
        self.status
    }

    /// Registered format of the artifact
    #[must_use]
    pub fn result_format(&self) -> &str {
        &self.result_format
    }

    /// Location of the artifact (success only)
    #[must_use]
    pub fn result_path(&self) -> Option<&str> {
        self.result_path.as_deref()
    }

    /// Caller-supplied metadata
    #[must_use]
    pub const fn extra_metadata(&self) -> &serde_json::Map<String, serde_json::Value> {
        &self.extra_metadata
    }

    /// Serialize for storage (pretty JSON)
    ///
    /// # Errors
    /// Returns error if serialization fails
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec_pretty(self)?)
    }

    /// Parse a stored record
    ///
    /// # Errors
    /// Returns error if the bytes are not a valid record
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// Timestamp as written into file names.
#[must_use]
pub fn format_timestamp(timestamp: DateTime<Utc>) -> String {
    timestamp.format(TIMESTAMP_FORMAT).to_string()
}

/// Base name shared by a record and its artifact: `{function}_{timestamp}.resnap`
#[must_use]
pub fn metadata_file_name(function_name: &str, timestamp: DateTime<Utc>) -> String {
    format!("{function_name}_{}{EXT}", format_timestamp(timestamp))
}

/// Artifact name: the metadata name plus the format's extension
#[must_use]
pub fn artifact_file_name(
    function_name: &str,
    timestamp: DateTime<Utc>,
    artifact_extension: &str,
) -> String {
    format!(
        "{}{artifact_extension}",
        metadata_file_name(function_name, timestamp)
    )
}

/// Recover the timestamp embedded in a checkpoint file name or path.
///
/// Inverse of [`metadata_file_name`] and [`artifact_file_name`].
///
/// # Errors
/// Returns `Other` if the name carries no parseable timestamp
pub fn timestamp_from_file_name(path: &str) -> Result<DateTime<Utc>> {
    let file_name = path.rsplit(['/', '\\']).next().unwrap_or_default();
    let without_ext = file_name.split(EXT).next().unwrap_or_default();
    let token = without_ext.rsplit('_').next().unwrap_or_default();
    NaiveDateTime::parse_from_str(token, TIMESTAMP_FORMAT)
        .or_else(|_| NaiveDateTime::parse_from_str(token, "%Y-%m-%dT%H:%M:%S"))
        .map(|naive| naive.and_utc())
        .map_err(|e| Error::Other(format!("no timestamp in checkpoint name {path}: {e}")))
}

/// Whether a path names a metadata record (not an artifact).
#[must_use]
pub fn is_metadata_file(path: &str) -> bool {
    path.ends_with(EXT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn fp() -> Fingerprint {
        Fingerprint::from("ab".repeat(32).as_str())
    }

    #[test]
    fn test_file_name_layout() {
        let ts = Utc.with_ymd_and_hms(2021, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(
            metadata_file_name("toto", ts),
            "toto_2021-01-01T00:00:00.000000.resnap"
        );
        assert_eq!(
            artifact_file_name("toto", ts, ".json"),
            "toto_2021-01-01T00:00:00.000000.resnap.json"
        );
    }

    #[test]
    fn test_timestamp_from_file_name() {
        let expected = Utc.with_ymd_and_hms(2021, 1, 1, 0, 0, 0).unwrap();
        for name in [
            "toto_2021-01-01T00:00:00.resnap",
            "toto/toto_2021-01-01T00:00:00.resnap",
            "out_dir/my_func/my_func_2021-01-01T00:00:00.000000.resnap.parquet",
        ] {
            assert_eq!(timestamp_from_file_name(name).unwrap(), expected, "{name}");
        }
    }

    #[test]
    fn test_timestamp_round_trip_keeps_microseconds() {
        let ts = Utc::now().trunc_subsecs(6);
        let name = metadata_file_name("f", ts);
        assert_eq!(timestamp_from_file_name(&name).unwrap(), ts);
    }

    #[test]
    fn test_unparseable_name() {
        assert!(timestamp_from_file_name("notes.txt").is_err());
    }

    #[test]
    fn test_metadata_codec() {
        let ts = Utc::now();
        let record = Metadata::success("f", fp(), ts, "json", "out/f/f_x.resnap.json");
        let decoded = Metadata::from_bytes(&record.to_bytes().unwrap()).unwrap();
        assert_eq!(decoded, record);
        assert_eq!(decoded.timestamp(), ts.trunc_subsecs(6));
    }

    #[test]
    fn test_status_serialized_lowercase() {
        let record = Metadata::failure("f", fp(), Utc::now(), "json");
        let json: serde_json::Value = serde_json::from_slice(&record.to_bytes().unwrap()).unwrap();
        assert_eq!(json["status"], "failure");
        assert!(json["result_path"].is_null());
        assert!(json.get("extra_metadata").is_none());
    }

    #[test]
    fn test_extra_metadata_persisted() {
        let mut extra = serde_json::Map::new();
        extra.insert("rows".to_string(), serde_json::json!(12));
        let record = Metadata::success("f", fp(), Utc::now(), "csv", "p").with_extra(extra);
        let decoded = Metadata::from_bytes(&record.to_bytes().unwrap()).unwrap();
        assert_eq!(decoded.extra_metadata()["rows"], 12);
    }

    #[test]
    fn test_is_metadata_file() {
        assert!(is_metadata_file("a/f_2021-01-01T00:00:00.resnap"));
        assert!(!is_metadata_file("a/f_2021-01-01T00:00:00.resnap.json"));
    }
}
