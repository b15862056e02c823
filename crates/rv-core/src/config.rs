use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RepoVaultConfig {
    pub cache: CacheConfig,
}

impl RepoVaultConfig {
    /// Parse a JSON config. Missing fields take their defaults.
    pub fn from_json_str(s: &str) -> Result<Self> {
        Ok(serde_json::from_str(s)?)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)?;
        let config = Self::from_json_str(&raw)?;
        tracing::debug!(path = %path.display(), "loaded config");
        Ok(config)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Entry cap enforced after every store.
    pub max_entries: usize,
    /// Entries older than this are dropped on read.
    pub max_age_hours: f64,
    /// Re-read each written record and check its blob length.
    pub verify_writes: bool,
    pub compression: CompressionConfig,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 10,
            max_age_hours: 24.0,
            verify_writes: true,
            compression: CompressionConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompressionConfig {
    /// Payloads strictly larger than this take the multi-stage pipeline.
    pub extreme_threshold_bytes: usize,
    /// zlib level for the single-stage path.
    pub fallback_level: u32,
    /// Run the lossy whitespace/comment preprocessor before dictionary coding.
    pub preprocess: bool,
    /// Upper bound on the serialized multi-stage envelope. Larger payloads
    /// fail the multi-stage path and fall back to single-stage.
    pub max_envelope_bytes: Option<usize>,
    pub dictionary: DictionaryConfig,
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            extreme_threshold_bytes: 100 * 1024,
            fallback_level: 6,
            preprocess: false,
            max_envelope_bytes: None,
            dictionary: DictionaryConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DictionaryConfig {
    /// Keyword candidates need strictly more occurrences than this.
    pub keyword_min_occurrences: usize,
    /// Scanned substrings need strictly more occurrences than this.
    pub substring_min_occurrences: usize,
    pub min_substring_len: usize,
    pub max_substring_len: usize,
    /// Most frequent scanned substrings kept before threshold filtering.
    pub max_substring_candidates: usize,
    /// Only this many leading bytes are scanned for repeated substrings.
    pub scan_window_bytes: usize,
}

impl Default for DictionaryConfig {
    fn default() -> Self {
        Self {
            keyword_min_occurrences: 3,
            substring_min_occurrences: 2,
            min_substring_len: 4,
            max_substring_len: 50,
            max_substring_candidates: 100,
            scan_window_bytes: 128 * 1024,
        }
    }
}
