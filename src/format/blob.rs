//! Blob codecs: json, txt, bin

use super::Compression;
use crate::payload::Payload;
use crate::{Error, Result};

fn compress(bytes: Vec<u8>, compression: Option<Compression>) -> Result<Vec<u8>> {
    match compression {
        Some(c) => c.compress(&bytes),
        None => Ok(bytes),
    }
}

fn decompress(bytes: &[u8], compression: Option<Compression>) -> Result<Vec<u8>> {
    match compression {
        Some(c) => c.decompress(bytes),
        None => Ok(bytes.to_vec()),
    }
}

fn rejected(format: &str, payload: &Payload) -> Error {
    Error::UnsupportedFormat(format!("format {format} cannot store a {} result", payload.kind()))
}

fn utf8(bytes: Vec<u8>) -> Result<String> {
    String::from_utf8(bytes).map_err(|e| Error::Other(format!("artifact is not UTF-8: {e}")))
}

pub(super) fn encode_json(payload: &Payload, compression: Option<Compression>) -> Result<Vec<u8>> {
    let bytes = match payload {
        Payload::Json(value) => serde_json::to_vec_pretty(value)?,
        Payload::Text(text) => serde_json::to_vec_pretty(text)?,
        other => return Err(rejected("json", other)),
    };
    compress(bytes, compression)
}

pub(super) fn decode_json(bytes: &[u8], compression: Option<Compression>) -> Result<Payload> {
    let raw = decompress(bytes, compression)?;
    Ok(Payload::Json(serde_json::from_slice(&raw)?))
}

pub(super) fn encode_text(payload: &Payload, compression: Option<Compression>) -> Result<Vec<u8>> {
    let text = match payload {
        Payload::Text(text) => text.clone(),
        other => return Err(rejected("txt", other)),
    };
    compress(text.into_bytes(), compression)
}

pub(super) fn decode_text(bytes: &[u8], compression: Option<Compression>) -> Result<Payload> {
    let raw = decompress(bytes, compression)?;
    Ok(Payload::Text(utf8(raw)?))
}

pub(super) fn encode_bytes(payload: &Payload, compression: Option<Compression>) -> Result<Vec<u8>> {
    let bytes = match payload {
        Payload::Bytes(bytes) => bytes.clone(),
        other => return Err(rejected("bin", other)),
    };
    compress(bytes, compression)
}

pub(super) fn decode_bytes(bytes: &[u8], compression: Option<Compression>) -> Result<Payload> {
    Ok(Payload::Bytes(decompress(bytes, compression)?))
}
