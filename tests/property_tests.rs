//! Property-based tests for resnap
//!
//! - Fingerprint determinism and order sensitivity
//! - File name timestamp round-trip
//! - Compression round-trip through registered codecs
//! - Run with ProptestConfig::with_cases(100)

use chrono::{DateTime, TimeZone, Utc};
use proptest::prelude::*;
use resnap::format::{Compression, FormatCodec};
use resnap::metadata::{artifact_file_name, metadata_file_name, timestamp_from_file_name};
use resnap::payload::Payload;
use resnap::{fingerprint, ArgValue, Arguments};

// ============================================================================
// Property Test Generators (Strategies)
// ============================================================================

/// Scalar argument values
fn arb_arg_value() -> impl Strategy<Value = ArgValue> {
    prop_oneof![
        Just(ArgValue::Null),
        any::<bool>().prop_map(ArgValue::Bool),
        any::<i64>().prop_map(ArgValue::Int),
        (-1.0e12f64..1.0e12).prop_map(ArgValue::Float),
        "[a-z0-9 _-]{0,16}".prop_map(ArgValue::Str),
    ]
}

/// Argument lists with unique names
fn arb_arguments() -> impl Strategy<Value = Vec<(String, ArgValue)>> {
    proptest::collection::btree_map("[a-z]{1,8}", arb_arg_value(), 0..6)
        .prop_map(|map| map.into_iter().collect())
}

/// Instants between 2000 and 2100 with microsecond precision
fn arb_timestamp() -> impl Strategy<Value = DateTime<Utc>> {
    (946_684_800i64..4_102_444_800, 0u32..1_000_000).prop_map(|(secs, micros)| {
        Utc.timestamp_opt(secs, micros * 1_000).unwrap()
    })
}

/// Function names, underscores included
fn arb_function_name() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9_]{0,20}"
}

fn to_arguments(pairs: &[(String, ArgValue)]) -> Arguments {
    pairs.iter().cloned().collect()
}

// ============================================================================
// Property Tests
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// Property: the same ordered arguments always hash the same
    #[test]
    fn prop_fingerprint_deterministic(pairs in arb_arguments()) {
        let first = fingerprint(&to_arguments(&pairs).into_bound()).unwrap();
        let second = fingerprint(&to_arguments(&pairs).into_bound()).unwrap();
        prop_assert_eq!(first.as_str().len(), 64);
        prop_assert_eq!(first, second);
    }

    /// Property: reordering distinct arguments changes the fingerprint
    #[test]
    fn prop_fingerprint_order_sensitive(pairs in arb_arguments()) {
        prop_assume!(pairs.len() >= 2);
        let mut reversed = pairs.clone();
        reversed.reverse();
        let forward = fingerprint(&to_arguments(&pairs).into_bound()).unwrap();
        let backward = fingerprint(&to_arguments(&reversed).into_bound()).unwrap();
        prop_assert_ne!(forward, backward);
    }

    /// Property: changing one value changes the fingerprint
    #[test]
    fn prop_fingerprint_value_sensitive(pairs in arb_arguments(), bump in 1i64..1000) {
        prop_assume!(!pairs.is_empty());
        let mut changed = pairs.clone();
        changed[0].1 = match &changed[0].1 {
            ArgValue::Int(i) => ArgValue::Int(i.wrapping_add(bump)),
            _ => ArgValue::Int(bump),
        };
        let before = fingerprint(&to_arguments(&pairs).into_bound()).unwrap();
        let after = fingerprint(&to_arguments(&changed).into_bound()).unwrap();
        prop_assert_ne!(before, after);
    }

    /// Property: a metadata name parses back to the instant that named it
    #[test]
    fn prop_metadata_name_round_trip(name in arb_function_name(), ts in arb_timestamp()) {
        let file = metadata_file_name(&name, ts);
        prop_assert_eq!(timestamp_from_file_name(&file).unwrap(), ts);
    }

    /// Property: artifact names and full paths parse the same way
    #[test]
    fn prop_artifact_path_round_trip(
        name in arb_function_name(),
        ts in arb_timestamp(),
        ext in prop::sample::select(vec![".json", ".parquet", ".csv.gz", ".txt.zst"]),
    ) {
        let path = format!("out_dir/{name}/{}", artifact_file_name(&name, ts, ext));
        prop_assert_eq!(timestamp_from_file_name(&path).unwrap(), ts);
    }

    /// Property: compressed text codecs return what they stored
    #[test]
    fn prop_compressed_text_round_trip(
        text in ".{0,512}",
        compression in prop::sample::select(vec![Compression::Gzip, Compression::Lz4, Compression::Zstd]),
    ) {
        let codec = FormatCodec::text().named("txt.c").with_compression(compression);
        let payload = Payload::Text(text);
        let encoded = codec.encode(&payload).unwrap();
        prop_assert_eq!(codec.decode(&encoded).unwrap(), payload);
    }
}

#[test]
fn test_non_finite_float_is_rejected() {
    for value in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
        let args = Arguments::new().with("x", value).into_bound();
        assert!(matches!(
            fingerprint(&args),
            Err(resnap::Error::Serialization(_))
        ));
    }
}
