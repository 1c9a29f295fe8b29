//! Checkpoint benchmarks
//!
//! Measures the fixed cost the engine adds to a call:
//! - fingerprinting scalar and tabular arguments
//! - a cache hit (prune + lookup + decode) against memory and disk
//! - encoding a table with each registered format
//!
//! Toyota Way: Genchi Genbutsu (measure, don't guess)
//!
//! Run with: cargo bench --bench checkpoint_benchmarks

use arrow::array::{Float64Array, Int64Array};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use resnap::backend::{MemoryObjectClient, ObjectStoreBackend};
use resnap::format::FormatRegistry;
use resnap::payload::Payload;
use resnap::{fingerprint, Arguments, Config, Resnap};
use std::sync::Arc;

#[allow(clippy::cast_precision_loss)]
fn create_batch(rows: i64) -> RecordBatch {
    let schema = Schema::new(vec![
        Field::new("id", DataType::Int64, false),
        Field::new("value", DataType::Float64, false),
    ]);
    RecordBatch::try_new(
        Arc::new(schema),
        vec![
            Arc::new(Int64Array::from_iter_values(0..rows)),
            Arc::new(Float64Array::from_iter_values((0..rows).map(|i| i as f64 * 0.5))),
        ],
    )
    .unwrap()
}

fn bench_fingerprint(c: &mut Criterion) {
    let mut group = c.benchmark_group("fingerprint");

    let scalars = Arguments::new()
        .with("path", "data/events.parquet")
        .with("limit", 1_000)
        .with("threshold", 0.25)
        .with("verbose", false)
        .into_bound();
    group.bench_function("scalars", |b| {
        b.iter(|| fingerprint(black_box(&scalars)).unwrap());
    });

    for rows in [100, 10_000] {
        let table = Arguments::new().with("table", create_batch(rows)).into_bound();
        group.bench_with_input(BenchmarkId::new("table", rows), &table, |b, args| {
            b.iter(|| fingerprint(black_box(args)).unwrap());
        });
    }

    group.finish();
}

fn bench_cache_hit(c: &mut Criterion) {
    let mut group = c.benchmark_group("cache_hit");

    let memory = Resnap::new(Config {
        output_base_path: "bench".into(),
        ..Config::default()
    });
    memory
        .factory()
        .set_backend(Arc::new(ObjectStoreBackend::new(MemoryObjectClient::new())))
        .unwrap();

    let dir = tempfile::tempdir().unwrap();
    let disk = Resnap::new(Config {
        output_base_path: dir.path().to_string_lossy().into_owned(),
        ..Config::default()
    });

    for (name, engine) in [("memory", &memory), ("local", &disk)] {
        let checkpoint = engine.checkpoint("bench_fn").format("json");
        let args = || Arguments::new().with("x", 42);
        let _: i64 = checkpoint.call(args(), || Ok::<_, String>(42)).unwrap();

        group.bench_function(name, |b| {
            b.iter(|| {
                let value: i64 = checkpoint
                    .call(args(), || Err::<i64, _>("miss".to_string()))
                    .unwrap();
                black_box(value)
            });
        });
    }

    group.finish();
}

fn bench_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("encode_table");
    let registry = FormatRegistry::new();
    let payload = Payload::Table(create_batch(10_000));

    for format in ["parquet", "csv"] {
        let codec = registry.get(format).unwrap();
        group.bench_with_input(BenchmarkId::new(format, 10_000), &payload, |b, payload| {
            b.iter(|| codec.encode(black_box(payload)).unwrap());
        });
    }

    group.finish();
}

criterion_group!(benches, bench_fingerprint, bench_cache_hit, bench_encode);
criterion_main!(benches);
