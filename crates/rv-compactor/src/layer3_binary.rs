//! Layer 3: Binary packing. JSON envelope, LZ4 for speed, zlib for size.
//!
//! Decoding runs strictly in reverse (inflate, LZ4, UTF-8, JSON) and each
//! step fails with its own error; there is no best-effort output.

use crate::layer2_dictionary::Dictionary;
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use rv_core::error::{DecompressionStage, Result, RvError};
use serde::{Deserialize, Serialize};
use std::io::{Read, Write};

const LZ4_MAX_EXPANSION: usize = 255;

#[derive(Serialize)]
struct EnvelopeRef<'a> {
    text: &'a str,
    dictionary: &'a Dictionary,
}

#[derive(Deserialize)]
struct Envelope {
    text: String,
    #[serde(default)]
    dictionary: Dictionary,
}

/// zlib-compress `data` at `level` (0-9).
pub fn deflate(data: &[u8], level: u32) -> Result<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::new(level.min(9)));
    encoder
        .write_all(data)
        .map_err(|e| RvError::Compression(format!("zlib write: {e}")))?;
    encoder
        .finish()
        .map_err(|e| RvError::Compression(format!("zlib finish: {e}")))
}

/// Inverse of [`deflate`].
pub fn inflate(data: &[u8]) -> Result<Vec<u8>> {
    let mut decoder = ZlibDecoder::new(data);
    let mut out = Vec::new();
    decoder
        .read_to_end(&mut out)
        .map_err(|_| RvError::stage(DecompressionStage::Inflate))?;
    Ok(out)
}

/// LZ4 block inverse. The prepended size is checked against the maximum
/// LZ4 expansion before anything is allocated for it.
fn lz_unpack(data: &[u8]) -> Result<Vec<u8>> {
    let header: [u8; 4] = data
        .get(..4)
        .and_then(|h| h.try_into().ok())
        .ok_or_else(|| RvError::stage(DecompressionStage::LzDecompress))?;
    let declared = u32::from_le_bytes(header) as usize;
    if declared > data.len().saturating_mul(LZ4_MAX_EXPANSION) {
        return Err(RvError::stage(DecompressionStage::LzDecompress));
    }
    lz4_flex::decompress_size_prepended(data).map_err(|_| RvError::stage(DecompressionStage::LzDecompress))
}

/// Pack `text` and its dictionary into one binary blob.
pub fn compress(text: &str, dictionary: &Dictionary) -> Result<Vec<u8>> {
    compress_with_limit(text, dictionary, None)
}

/// [`compress`], failing with [`RvError::Compression`] when the JSON
/// envelope is larger than `max_envelope_bytes`.
pub fn compress_with_limit(text: &str, dictionary: &Dictionary, max_envelope_bytes: Option<usize>) -> Result<Vec<u8>> {
    let json = serde_json::to_vec(&EnvelopeRef { text, dictionary })?;
    if let Some(limit) = max_envelope_bytes {
        if json.len() > limit {
            return Err(RvError::Compression(format!(
                "envelope of {} bytes exceeds limit of {limit}",
                json.len()
            )));
        }
    }
    let fast = lz4_flex::compress_prepend_size(&json);
    deflate(&fast, Compression::best().level())
}

/// Unpack a blob produced by [`compress`].
pub fn decompress(data: &[u8]) -> Result<(String, Dictionary)> {
    let inflated = inflate(data)?;
    if inflated.is_empty() {
        return Err(RvError::stage(DecompressionStage::Inflate));
    }

    let unpacked = lz_unpack(&inflated)?;
    if unpacked.is_empty() {
        return Err(RvError::stage(DecompressionStage::LzDecompress));
    }

    let decoded = String::from_utf8(unpacked)
        .map_err(|e| RvError::corrupt(format!("payload is not UTF-8: {e}")))?;
    if decoded.trim().is_empty() || decoded == "undefined" {
        return Err(RvError::corrupt("empty decoded payload"));
    }

    let envelope: Envelope = serde_json::from_str(&decoded)
        .map_err(|e| RvError::corrupt(format!("payload structure: {e}")))?;
    Ok((envelope.text, envelope.dictionary))
}
