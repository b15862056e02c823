//! Strategy selection: multi-stage for large payloads, single-stage zlib
//! otherwise or when the multi-stage path fails.

use crate::{layer1_preprocess, layer2_dictionary, layer3_binary};
use rv_core::clock::{Clock, SystemClock};
use rv_core::config::CompressionConfig;
use rv_core::error::{Result, RvError};
use rv_core::types::{Algorithm, CompressionLevel, CompressionMetadata};
use std::sync::Arc;

/// Output of one compression call.
#[derive(Debug, Clone)]
pub struct CompressionResult {
    pub compressed_data: Vec<u8>,
    pub original_size: u64,
    pub compressed_size: u64,
    pub compression_ratio: f64,
    pub algorithm: Algorithm,
    pub metadata: CompressionMetadata,
}

/// `original / compressed`, zero when nothing was written.
pub fn compression_ratio(original: u64, compressed: u64) -> f64 {
    if compressed == 0 {
        return 0.0;
    }
    original as f64 / compressed as f64
}

/// BLAKE3 hex digest stored as the metadata checksum.
pub fn checksum(data: &[u8]) -> String {
    blake3::hash(data).to_hex().to_string()
}

/// Compare `data` with the checksum in `metadata`, when there is one.
pub fn verify_checksum(data: &[u8], metadata: &CompressionMetadata) -> Result<()> {
    match &metadata.checksum {
        Some(expected) if *expected != checksum(data) => {
            Err(RvError::corrupt("checksum mismatch"))
        }
        _ => Ok(()),
    }
}

fn level_for(zlib_level: u32) -> CompressionLevel {
    match zlib_level {
        0..=3 => CompressionLevel::Fast,
        4..=6 => CompressionLevel::Balanced,
        _ => CompressionLevel::Maximum,
    }
}

/// The compression strategy selector.
pub struct CompressionPipeline {
    pub config: CompressionConfig,
    clock: Arc<dyn Clock>,
}

impl CompressionPipeline {
    pub fn new(config: CompressionConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: CompressionConfig, clock: Arc<dyn Clock>) -> Self {
        Self { config, clock }
    }

    /// Compress text, picking the pipeline by UTF-8 byte length.
    pub fn compress_auto(&self, text: &str) -> Result<CompressionResult> {
        let size = text.len();
        if size > self.config.extreme_threshold_bytes {
            match self.compress_extreme(text) {
                Ok(blob) => {
                    tracing::debug!(size, compressed = blob.len(), "extreme multi-stage compression");
                    return Ok(self.finish(
                        blob,
                        size,
                        Algorithm::ExtremeMultiStage,
                        CompressionLevel::Maximum,
                    ));
                }
                Err(e) => {
                    tracing::warn!(error = %e, size, "multi-stage compression failed, falling back to deflate");
                }
            }
        }
        self.compress_single(text.as_bytes())
    }

    /// Compress raw bytes. Valid UTF-8 goes through [`Self::compress_auto`],
    /// anything else is single-stage.
    pub fn compress_auto_bytes(&self, data: &[u8]) -> Result<CompressionResult> {
        match std::str::from_utf8(data) {
            Ok(text) => self.compress_auto(text),
            Err(_) => self.compress_single(data),
        }
    }

    /// Reverse [`Self::compress_auto`], dispatching on `metadata.algorithm`.
    pub fn decompress_auto(&self, data: &[u8], metadata: &CompressionMetadata) -> Result<String> {
        let bytes = self.decompress_auto_bytes(data, metadata)?;
        String::from_utf8(bytes).map_err(|e| RvError::corrupt(format!("payload is not UTF-8: {e}")))
    }

    pub fn decompress_auto_bytes(&self, data: &[u8], metadata: &CompressionMetadata) -> Result<Vec<u8>> {
        match metadata.algorithm {
            Algorithm::ExtremeMultiStage => match decompress_extreme(data) {
                Ok(text) => Ok(text.into_bytes()),
                // Only reachable for blobs tagged with the wrong algorithm.
                Err(e) => {
                    tracing::warn!(error = %e, "multi-stage decompression failed, trying deflate");
                    layer3_binary::inflate(data).map_err(|_| e)
                }
            },
            Algorithm::Deflate => layer3_binary::inflate(data),
        }
    }

    fn compress_extreme(&self, text: &str) -> Result<Vec<u8>> {
        let prepared = if self.config.preprocess {
            layer1_preprocess::preprocess(text)
        } else {
            text.to_string()
        };
        let (substituted, dictionary) =
            layer2_dictionary::compress_with_config(&prepared, &self.config.dictionary);
        layer3_binary::compress_with_limit(&substituted, &dictionary, self.config.max_envelope_bytes)
    }

    fn compress_single(&self, data: &[u8]) -> Result<CompressionResult> {
        let level = self.config.fallback_level;
        let blob = layer3_binary::deflate(data, level)?;
        tracing::debug!(size = data.len(), compressed = blob.len(), level, "deflate compression");
        Ok(self.finish(blob, data.len(), Algorithm::Deflate, level_for(level)))
    }

    fn finish(
        &self,
        blob: Vec<u8>,
        original_size: usize,
        algorithm: Algorithm,
        level: CompressionLevel,
    ) -> CompressionResult {
        let original_size = original_size as u64;
        let compressed_size = blob.len() as u64;
        CompressionResult {
            compression_ratio: compression_ratio(original_size, compressed_size),
            metadata: CompressionMetadata {
                algorithm,
                level,
                timestamp: self.clock.now_millis(),
                checksum: Some(checksum(&blob)),
            },
            compressed_data: blob,
            original_size,
            compressed_size,
            algorithm,
        }
    }
}

impl Default for CompressionPipeline {
    fn default() -> Self {
        Self::new(CompressionConfig::default())
    }
}

fn decompress_extreme(data: &[u8]) -> Result<String> {
    let (substituted, dictionary) = layer3_binary::decompress(data)?;
    let text = layer2_dictionary::decompress(&substituted, &dictionary)?;
    Ok(layer1_preprocess::postprocess(text))
}

/// [`CompressionPipeline::compress_auto`] with default settings.
pub fn compress_auto(text: &str) -> Result<CompressionResult> {
    CompressionPipeline::default().compress_auto(text)
}

/// [`CompressionPipeline::decompress_auto`] with default settings.
pub fn decompress_auto(data: &[u8], metadata: &CompressionMetadata) -> Result<String> {
    CompressionPipeline::default().decompress_auto(data, metadata)
}
