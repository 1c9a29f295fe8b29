//! Metadata store: enumerate, rank and write checkpoint records
//!
//! Records of one function live in `{base}/{folder}` where `folder`
//! defaults to the function name. A successful attempt writes its artifact
//! first and its metadata second, so any metadata a reader can see points
//! at a complete artifact.

use crate::backend::{ensure_dir, join, Backend};
use crate::fingerprint::Fingerprint;
use crate::format::FormatCodec;
use crate::metadata::{artifact_file_name, is_metadata_file, metadata_file_name, Metadata, Status};
use crate::payload::Payload;
use crate::{Error, Result};
use chrono::{SubsecRound, Utc};
use std::sync::Arc;
use tracing::{debug, warn};

/// Outcome handed to [`MetadataStore::record`].
#[derive(Debug, Clone, Copy)]
pub enum Attempt<'a> {
    /// Computation succeeded; `encoded` is the artifact content
    Success {
        /// Codec that produced `encoded`
        codec: &'a FormatCodec,
        /// Encoded result
        encoded: &'a [u8],
    },
    /// Computation failed; only metadata is written
    Failure {
        /// Format the result would have been stored in
        format: &'a str,
    },
}

/// Reads and writes metadata records through a [`Backend`].
#[derive(Clone)]
pub struct MetadataStore {
    backend: Arc<dyn Backend>,
    base_path: String,
}

impl std::fmt::Debug for MetadataStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetadataStore")
            .field("backend", &self.backend.name())
            .field("base_path", &self.base_path)
            .finish()
    }
}

impl MetadataStore {
    /// Create a store rooted at `base_path`
    #[must_use]
    pub fn new(backend: Arc<dyn Backend>, base_path: impl Into<String>) -> Self {
        Self {
            backend,
            base_path: base_path.into(),
        }
    }

    /// Root of every checkpoint folder
    #[must_use]
    pub fn base_path(&self) -> &str {
        &self.base_path
    }

    /// Backend the store writes through
    #[must_use]
    pub fn backend(&self) -> &Arc<dyn Backend> {
        &self.backend
    }

    /// Location of a checkpoint folder
    #[must_use]
    pub fn folder_path(&self, folder: &str) -> String {
        join(&self.base_path, folder)
    }

    /// Every readable record of `function_name` in `folder`, success and
    /// failure, most recent first.
    ///
    /// Unreadable or malformed records are skipped with a warning.
    ///
    /// # Errors
    /// Returns error if the folder cannot be listed
    pub fn list_records_in(&self, function_name: &str, folder: &str) -> Result<Vec<Metadata>> {
        let path = self.folder_path(folder);
        if !self.backend.exists(&path)? {
            return Ok(Vec::new());
        }

        let mut records = Vec::new();
        for entry in self.backend.list(&path, true)? {
            let file_name = entry.rsplit(['/', '\\']).next().unwrap_or_default();
            if !file_name.contains(function_name) || !is_metadata_file(file_name) {
                continue;
            }
            let record = match self
                .backend
                .read(&entry)
                .and_then(|bytes| Metadata::from_bytes(&bytes))
            {
                Ok(record) => record,
                Err(e) => {
                    warn!(path = %entry, error = %e, "Skipping unreadable checkpoint metadata");
                    continue;
                }
            };
            // Folders may be shared; a name like `ff_*` also contains `f`
            if record.function_name() == function_name {
                records.push(record);
            }
        }
        records.sort_by(|a, b| b.timestamp().cmp(&a.timestamp()));
        Ok(records)
    }

    /// Successful records of `function_name` in `folder`, most recent first.
    ///
    /// # Errors
    /// Returns error if the folder cannot be listed
    pub fn list_successes_in(&self, function_name: &str, folder: &str) -> Result<Vec<Metadata>> {
        let mut records = self.list_records_in(function_name, folder)?;
        records.retain(|r| r.status() == Status::Success);
        Ok(records)
    }

    /// Successful records of `function_name` in its own folder.
    ///
    /// # Errors
    /// Returns error if the folder cannot be listed
    pub fn list_successes(&self, function_name: &str) -> Result<Vec<Metadata>> {
        self.list_successes_in(function_name, function_name)
    }

    /// Most recent success of `function_name` with this fingerprint.
    ///
    /// `None` is a cache miss.
    ///
    /// # Errors
    /// Returns error if the folder cannot be listed
    pub fn lookup_in(
        &self,
        function_name: &str,
        folder: &str,
        fingerprint: &Fingerprint,
    ) -> Result<Option<Metadata>> {
        Ok(self
            .list_successes_in(function_name, folder)?
            .into_iter()
            .find(|r| r.argument_fingerprint() == fingerprint))
    }

    /// [`lookup_in`](Self::lookup_in) on the function's own folder.
    ///
    /// # Errors
    /// Returns error if the folder cannot be listed
    pub fn lookup(&self, function_name: &str, fingerprint: &Fingerprint) -> Result<Option<Metadata>> {
        self.lookup_in(function_name, function_name, fingerprint)
    }

    /// Persist one attempt and return its record.
    ///
    /// On success the artifact is fully written before the metadata that
    /// references it.
    ///
    /// # Errors
    /// Returns `UnsupportedFormat` if the artifact name does not fit the
    /// codec's compression, or the backend error of a failed write
    pub fn record(
        &self,
        function_name: &str,
        folder: &str,
        fingerprint: &Fingerprint,
        attempt: Attempt<'_>,
        extra: serde_json::Map<String, serde_json::Value>,
    ) -> Result<Metadata> {
        let folder_path = self.folder_path(folder);
        let mut timestamp = Utc::now().trunc_subsecs(6);
        let mut metadata_path = join(&folder_path, &metadata_file_name(function_name, timestamp));
        // Two attempts within one microsecond must not share a name
        while self.backend.exists(&metadata_path)? {
            timestamp += chrono::Duration::microseconds(1);
            metadata_path = join(&folder_path, &metadata_file_name(function_name, timestamp));
        }

        let record = match attempt {
            Attempt::Success { codec, encoded } => {
                let artifact_path = join(
                    &folder_path,
                    &artifact_file_name(function_name, timestamp, &codec.artifact_extension()),
                );
                codec.validate(&artifact_path)?;
                ensure_dir(self.backend.as_ref(), &folder_path)?;
                self.backend.write(&artifact_path, encoded)?;
                Metadata::success(
                    function_name,
                    fingerprint.clone(),
                    timestamp,
                    codec.name(),
                    artifact_path,
                )
            }
            Attempt::Failure { format } => {
                ensure_dir(self.backend.as_ref(), &folder_path)?;
                Metadata::failure(function_name, fingerprint.clone(), timestamp, format)
            }
        }
        .with_extra(extra);

        self.backend.write(&metadata_path, &record.to_bytes()?)?;
        debug!(
            function = %function_name,
            fingerprint = %fingerprint,
            status = ?record.status(),
            path = %metadata_path,
            "Checkpoint recorded"
        );
        Ok(record)
    }

    /// Decode the artifact of a successful record.
    ///
    /// # Errors
    /// Returns `NotFound` if the artifact is gone, `Other` for a record
    /// without artifact, or the codec error
    pub fn read_result(&self, record: &Metadata, codec: &FormatCodec) -> Result<Payload> {
        let path = record.result_path().ok_or_else(|| {
            Error::Other(format!(
                "checkpoint of {} has no result artifact",
                record.function_name()
            ))
        })?;
        codec.decode(&self.backend.read(path)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{MemoryObjectClient, ObjectStoreBackend};

    fn store() -> (MemoryObjectClient, MetadataStore) {
        let client = MemoryObjectClient::new();
        let backend = Arc::new(ObjectStoreBackend::new(client.clone()));
        (client, MetadataStore::new(backend, "out"))
    }

    fn fp(seed: &str) -> Fingerprint {
        Fingerprint::from(seed.repeat(64 / seed.len()).as_str())
    }

    fn success(store: &MetadataStore, name: &str, fingerprint: &Fingerprint, value: i64) -> Metadata {
        let codec = FormatCodec::json();
        let encoded = codec.encode(&Payload::Json(serde_json::json!(value))).unwrap();
        store
            .record(
                name,
                name,
                fingerprint,
                Attempt::Success {
                    codec: &codec,
                    encoded: &encoded,
                },
                serde_json::Map::new(),
            )
            .unwrap()
    }

    #[test]
    fn test_record_writes_artifact_and_metadata() {
        let (client, store) = store();
        let record = success(&store, "f", &fp("a"), 1);

        assert_eq!(client.object_count(), 3); // folder marker, artifact, metadata
        let path = record.result_path().unwrap();
        assert!(path.starts_with("out/f/f_"));
        assert!(path.ends_with(".resnap.json"));

        let payload = store.read_result(&record, &FormatCodec::json()).unwrap();
        assert_eq!(payload, Payload::Json(serde_json::json!(1)));
    }

    #[test]
    fn test_lookup_prefers_most_recent() {
        let (_, store) = store();
        success(&store, "f", &fp("a"), 1);
        std::thread::sleep(std::time::Duration::from_millis(2));
        let newest = success(&store, "f", &fp("a"), 2);
        success(&store, "f", &fp("b"), 3);

        let hit = store.lookup("f", &fp("a")).unwrap().unwrap();
        assert_eq!(hit, newest);
        assert!(store.lookup("f", &fp("c")).unwrap().is_none());
    }

    #[test]
    fn test_failures_are_never_returned_by_lookup() {
        let (_, store) = store();
        let record = store
            .record(
                "f",
                "f",
                &fp("a"),
                Attempt::Failure { format: "json" },
                serde_json::Map::new(),
            )
            .unwrap();
        assert_eq!(record.status(), Status::Failure);
        assert!(record.result_path().is_none());

        assert!(store.lookup("f", &fp("a")).unwrap().is_none());
        assert_eq!(store.list_records_in("f", "f").unwrap().len(), 1);
        assert!(store.read_result(&record, &FormatCodec::json()).is_err());
    }

    #[test]
    fn test_corrupt_metadata_is_skipped() {
        let (_, store) = store();
        success(&store, "f", &fp("a"), 1);
        store
            .backend()
            .write("out/f/f_2021-01-01T00:00:00.000000.resnap", b"{ not json")
            .unwrap();

        let successes = store.list_successes("f").unwrap();
        assert_eq!(successes.len(), 1);
    }

    #[test]
    fn test_shared_folder_keeps_functions_apart() {
        let (_, store) = store();
        let codec = FormatCodec::json();
        let encoded = codec.encode(&Payload::Json(serde_json::json!(0))).unwrap();
        for name in ["f", "ff"] {
            store
                .record(
                    name,
                    "shared",
                    &fp("a"),
                    Attempt::Success {
                        codec: &codec,
                        encoded: &encoded,
                    },
                    serde_json::Map::new(),
                )
                .unwrap();
        }
        let hit = store.lookup_in("f", "shared", &fp("a")).unwrap().unwrap();
        assert_eq!(hit.function_name(), "f");
        assert_eq!(store.list_successes_in("f", "shared").unwrap().len(), 1);
    }

    #[test]
    fn test_missing_folder_is_empty_history() {
        let (client, store) = store();
        assert!(store.list_successes("never_called").unwrap().is_empty());
        assert_eq!(client.object_count(), 0);
    }
}
