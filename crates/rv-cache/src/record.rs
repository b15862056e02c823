//! Persisted record shape: metadata and blob always travel together.

use rv_compactor::storage_codec::serde_base64;
use rv_core::error::Result;
use rv_core::types::ArchiveMetadata;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchiveRecord {
    pub metadata: ArchiveMetadata,
    /// Base64 of the compressed file list.
    #[serde(default)]
    pub compressed_files_encoded: String,
    #[serde(default, skip_serializing_if = "Option::is_none", with = "serde_base64")]
    pub raw_archive: Option<Vec<u8>>,
}

impl ArchiveRecord {
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// Metadata-only view used by scans; the blob field is skipped.
#[derive(Debug, Deserialize)]
pub(crate) struct RecordHeader {
    pub metadata: ArchiveMetadata,
}

impl RecordHeader {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}
