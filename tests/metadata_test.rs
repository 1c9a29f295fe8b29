//! Metadata record and store tests
//!
//! Records are immutable JSON documents; the store ranks them newest first
//! and only ever returns successes for replay.

use chrono::{SubsecRound, TimeZone, Utc};
use resnap::backend::{Backend, LocalBackend};
use resnap::format::FormatCodec;
use resnap::metadata::{is_metadata_file, metadata_file_name};
use resnap::payload::Payload;
use resnap::store::{Attempt, MetadataStore};
use resnap::{Fingerprint, Metadata, Status};
use std::sync::Arc;

fn fp(c: char) -> Fingerprint {
    Fingerprint::from(c.to_string().repeat(64).as_str())
}

fn local_store() -> (tempfile::TempDir, MetadataStore) {
    let dir = tempfile::tempdir().unwrap();
    let base = dir.path().to_string_lossy().into_owned();
    (dir, MetadataStore::new(Arc::new(LocalBackend::new()), base))
}

// =============================================================================
// Metadata Tests
// =============================================================================

#[test]
fn test_success_record_fields() {
    let ts = Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 0).unwrap();
    let record = Metadata::success("train", fp('a'), ts, "parquet", "out/train/x.resnap.parquet");

    assert_eq!(record.function_name(), "train");
    assert_eq!(record.argument_fingerprint(), &fp('a'));
    assert_eq!(record.timestamp(), ts);
    assert_eq!(record.status(), Status::Success);
    assert_eq!(record.result_format(), "parquet");
    assert_eq!(record.result_path(), Some("out/train/x.resnap.parquet"));
    assert!(record.extra_metadata().is_empty());
}

#[test]
fn test_record_json_shape() {
    let ts = Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 0).unwrap();
    let record = Metadata::success("train", fp('a'), ts, "json", "p");
    let json: serde_json::Value = serde_json::from_slice(&record.to_bytes().unwrap()).unwrap();

    assert_eq!(json["function_name"], "train");
    assert_eq!(json["argument_fingerprint"], "a".repeat(64));
    assert_eq!(json["status"], "success");
    assert_eq!(json["result_format"], "json");
    assert_eq!(json["result_path"], "p");
    assert!(json["timestamp"].as_str().unwrap().starts_with("2024-05-01T12:30:00"));
}

#[test]
fn test_malformed_record_is_error() {
    assert!(Metadata::from_bytes(b"{\"function_name\": 3}").is_err());
}

// =============================================================================
// MetadataStore Tests
// =============================================================================

#[test]
fn test_store_layout_on_disk() {
    let (dir, store) = local_store();
    let codec = FormatCodec::text();
    let encoded = codec.encode(&Payload::Text("hello".into())).unwrap();
    let record = store
        .record(
            "greet",
            "greet",
            &fp('b'),
            Attempt::Success {
                codec: &codec,
                encoded: &encoded,
            },
            serde_json::Map::new(),
        )
        .unwrap();

    let folder = dir.path().join("greet");
    let names: Vec<String> = std::fs::read_dir(&folder)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names.len(), 2);
    let metadata_name = metadata_file_name("greet", record.timestamp());
    assert!(names.contains(&metadata_name));
    assert!(names.contains(&format!("{metadata_name}.txt")));
    assert_eq!(names.iter().filter(|n| is_metadata_file(n)).count(), 1);

    assert_eq!(
        std::fs::read_to_string(record.result_path().unwrap()).unwrap(),
        "hello"
    );
}

#[test]
fn test_store_ranks_newest_first() {
    let (_dir, store) = local_store();
    let codec = FormatCodec::json();
    for i in 0..3 {
        let encoded = codec.encode(&Payload::Json(serde_json::json!(i))).unwrap();
        store
            .record(
                "rank",
                "rank",
                &fp('c'),
                Attempt::Success {
                    codec: &codec,
                    encoded: &encoded,
                },
                serde_json::Map::new(),
            )
            .unwrap();
    }
    store
        .record(
            "rank",
            "rank",
            &fp('c'),
            Attempt::Failure { format: "json" },
            serde_json::Map::new(),
        )
        .unwrap();

    let successes = store.list_successes("rank").unwrap();
    assert_eq!(successes.len(), 3);
    assert!(successes.windows(2).all(|w| w[0].timestamp() > w[1].timestamp()));

    let hit = store.lookup("rank", &fp('c')).unwrap().unwrap();
    assert_eq!(hit, successes[0]);
    let payload = store.read_result(&hit, &codec).unwrap();
    assert_eq!(payload, Payload::Json(serde_json::json!(2)));
}

#[test]
fn test_unrelated_files_are_ignored() {
    let (dir, store) = local_store();
    let backend = LocalBackend::new();
    let folder = dir.path().join("f");
    backend
        .write(&folder.join("README.md").to_string_lossy(), b"notes")
        .unwrap();
    let ts = Utc::now().trunc_subsecs(6);
    let other = Metadata::success("g", fp('d'), ts, "json", "x");
    backend
        .write(
            &folder.join(metadata_file_name("g", ts)).to_string_lossy(),
            &other.to_bytes().unwrap(),
        )
        .unwrap();

    assert!(store.list_successes("f").unwrap().is_empty());
}
