use chrono::{DateTime, Utc};
use rv_core::types::ArchiveMetadata;
use serde::Serialize;

/// Aggregate view over every cached archive.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub total_archives: usize,
    pub total_original_size: u64,
    pub total_compressed_size: u64,
    pub average_compression_ratio: f64,
    /// Original minus compressed; negative if compression expanded the data.
    pub total_space_saved: i64,
    pub oldest_archive: Option<DateTime<Utc>>,
    pub newest_archive: Option<DateTime<Utc>>,
}

impl CacheStats {
    pub fn from_metadata(entries: &[ArchiveMetadata]) -> Self {
        if entries.is_empty() {
            return Self::default();
        }
        let total_original_size: u64 = entries.iter().map(|m| m.original_size).sum();
        let total_compressed_size: u64 = entries.iter().map(|m| m.compressed_size).sum();
        let ratio_sum: f64 = entries.iter().map(|m| m.compression_ratio).sum();
        let oldest = entries.iter().map(|m| m.downloaded_at).min();
        let newest = entries.iter().map(|m| m.downloaded_at).max();

        Self {
            total_archives: entries.len(),
            total_original_size,
            total_compressed_size,
            average_compression_ratio: ratio_sum / entries.len() as f64,
            total_space_saved: entries.iter().map(ArchiveMetadata::space_saved).sum(),
            oldest_archive: oldest.and_then(DateTime::from_timestamp_millis),
            newest_archive: newest.and_then(DateTime::from_timestamp_millis),
        }
    }
}
