//! Tabular codecs (Arrow `RecordBatch` as CSV or Parquet)
//!
//! Results are single record batches; readers that yield several batches
//! are concatenated back into one.

use super::Compression;
use crate::payload::Payload;
use crate::{Error, Result};
use arrow::compute::concat_batches;
use arrow::datatypes::SchemaRef;
use arrow::record_batch::RecordBatch;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ArrowWriter;
use parquet::basic::{Compression as ParquetCompression, GzipLevel, ZstdLevel};
use parquet::file::properties::WriterProperties;
use std::io::Cursor;
use std::sync::Arc;

fn table(payload: &Payload, format: &str) -> Result<RecordBatch> {
    match payload {
        Payload::Table(batch) => Ok(batch.clone()),
        other => Err(Error::UnsupportedFormat(format!(
            "format {format} cannot store a {} result",
            other.kind()
        ))),
    }
}

fn concat(schema: SchemaRef, batches: &[RecordBatch]) -> Result<RecordBatch> {
    if batches.len() == 1 {
        return Ok(batches[0].clone());
    }
    Ok(concat_batches(&schema, batches)?)
}

pub(super) fn encode_csv(payload: &Payload, compression: Option<Compression>) -> Result<Vec<u8>> {
    let batch = table(payload, "csv")?;
    let mut writer = arrow::csv::WriterBuilder::new()
        .with_header(true)
        .build(Vec::new());
    writer.write(&batch)?;
    let bytes = writer.into_inner();

    match compression {
        Some(c) => c.compress(&bytes),
        None => Ok(bytes),
    }
}

pub(super) fn decode_csv(bytes: &[u8], compression: Option<Compression>) -> Result<Payload> {
    let raw = match compression {
        Some(c) => c.decompress(bytes)?,
        None => bytes.to_vec(),
    };

    let format = arrow::csv::reader::Format::default().with_header(true);
    let (schema, _) = format.infer_schema(Cursor::new(&raw), None)?;
    let schema = Arc::new(schema);

    let reader = arrow::csv::ReaderBuilder::new(Arc::clone(&schema))
        .with_header(true)
        .build(Cursor::new(raw))?;

    let mut batches = Vec::new();
    for batch in reader {
        batches.push(batch?);
    }
    if batches.is_empty() {
        return Ok(Payload::Table(RecordBatch::new_empty(schema)));
    }
    Ok(Payload::Table(concat(schema, &batches)?))
}

fn parquet_compression(compression: Option<Compression>) -> ParquetCompression {
    match compression {
        None => ParquetCompression::UNCOMPRESSED,
        Some(Compression::Gzip) => ParquetCompression::GZIP(GzipLevel::default()),
        Some(Compression::Snappy) => ParquetCompression::SNAPPY,
        Some(Compression::Lz4) => ParquetCompression::LZ4_RAW,
        Some(Compression::Zstd) => ParquetCompression::ZSTD(ZstdLevel::default()),
    }
}

pub(super) fn encode_parquet(
    payload: &Payload,
    compression: Option<Compression>,
) -> Result<Vec<u8>> {
    let batch = table(payload, "parquet")?;
    let props = WriterProperties::builder()
        .set_compression(parquet_compression(compression))
        .build();

    let mut buffer = Vec::new();
    let mut writer = ArrowWriter::try_new(&mut buffer, batch.schema(), Some(props))?;
    writer.write(&batch)?;
    writer.close()?;
    Ok(buffer)
}

pub(super) fn decode_parquet(bytes: &[u8], _compression: Option<Compression>) -> Result<Payload> {
    // Compression is recorded per column chunk, the reader needs no hint
    let builder = ParquetRecordBatchReaderBuilder::try_new(bytes::Bytes::copy_from_slice(bytes))
        .map_err(|e| Error::Other(format!("Failed to parse Parquet artifact: {e}")))?;
    let schema = Arc::clone(builder.schema());
    let reader = builder.build()?;

    let mut batches = Vec::new();
    for batch in reader {
        batches.push(batch?);
    }
    if batches.is_empty() {
        return Ok(Payload::Table(RecordBatch::new_empty(schema)));
    }
    Ok(Payload::Table(concat(schema, &batches)?))
}
