//! Checkpointing: replay expensive results across runs
//!
//! This demo checkpoints a slow tabular computation and a JSON summary,
//! first on the local filesystem and then on an in-memory object store.
//!
//! Run with: cargo run --example checkpointing
//! Verbose engine logs: RUST_LOG=resnap=debug cargo run --example checkpointing

use anyhow::Result;
use arrow::array::{Float64Array, Int64Array};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use resnap::backend::MemoryObjectClient;
use resnap::config::RemoteConfig;
use resnap::format::FormatRegistry;
use resnap::payload::Json;
use resnap::{Arguments, Config, Resnap, ServiceFactory, Services, Signature, TimeUnit};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[allow(clippy::cast_precision_loss)]
fn simulate(rows: i64) -> Result<RecordBatch> {
    std::thread::sleep(Duration::from_millis(500));
    let schema = Schema::new(vec![
        Field::new("step", DataType::Int64, false),
        Field::new("loss", DataType::Float64, false),
    ]);
    Ok(RecordBatch::try_new(
        Arc::new(schema),
        vec![
            Arc::new(Int64Array::from_iter_values(0..rows)),
            Arc::new(Float64Array::from_iter_values(
                (0..rows).map(|i| 1.0 / (i as f64 + 1.0)),
            )),
        ],
    )?)
}

fn local_demo(base: &str) -> Result<()> {
    println!("=== Local filesystem ({base}) ===\n");
    let resnap = Resnap::new(Config {
        output_base_path: base.to_string(),
        max_history_files_length: 1,
        max_history_files_time_unit: TimeUnit::Hour,
        ..Config::default()
    });

    let train = resnap
        .checkpoint("train")
        .signature(Signature::new().param("rows").param_with_default("seed", 7))
        .format("parquet");

    for attempt in 1..=2 {
        let start = Instant::now();
        let batch: RecordBatch = train.call(Arguments::new().with("rows", 1_000), || simulate(1_000))?;
        println!(
            "  attempt {attempt}: {} rows in {:?}",
            batch.num_rows(),
            start.elapsed()
        );
    }

    let summary = resnap.checkpoint("summary").format("json");
    let Json(stats): Json<(f64, f64)> = summary.call_with_context(Arguments::new(), |ctx| {
        ctx.add_metadata("source", "train");
        Ok::<_, anyhow::Error>(Json((1.0, 0.001)))
    })?;
    println!("  summary: max={} min={}", stats.0, stats.1);

    let history = resnap.store()?.list_successes("train")?;
    println!("  train history: {} success record(s)\n", history.len());
    Ok(())
}

fn remote_demo() -> Result<()> {
    println!("=== In-memory object store ===\n");
    let client = MemoryObjectClient::new();
    let config = Config {
        save_to: Services::Remote,
        output_base_path: "/demo".to_string(),
        remote: Some(RemoteConfig {
            access_key: "demo".to_string(),
            secret_key: "demo-secret".to_string(),
            bucket_name: "checkpoints".to_string(),
            region_name: None,
            endpoint_url: None,
            force_path_style: true,
            signature_version: "s3v4".to_string(),
        }),
        ..Config::default()
    };
    let factory = ServiceFactory::new(config).with_object_client(client.clone());
    let resnap = Resnap::with_parts(factory, FormatRegistry::new());

    let greet = resnap
        .checkpoint("greet")
        .signature(Signature::new().param("name"));
    for _ in 0..2 {
        let text: String = greet.call(Arguments::new().with("name", "world"), || {
            println!("  (computing greeting)");
            Ok::<_, anyhow::Error>("hello, world".to_string())
        })?;
        println!("  {text}");
    }

    println!("\n  stored objects:");
    for key in client.keys() {
        println!("    {key}");
    }
    println!("  open sessions: {}", client.open_sessions());
    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "resnap=info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let dir = std::env::temp_dir().join("resnap-demo");
    local_demo(&dir.to_string_lossy())?;
    remote_demo()?;
    Ok(())
}
