use serde::{Deserialize, Serialize};
use std::fmt;

/// Pipeline that produced a compressed blob. Selects the decoder.
///
/// Serialized as its wire tag. Unknown tags decode as [`Algorithm::Deflate`],
/// the single-stage path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Algorithm {
    ExtremeMultiStage,
    Deflate,
}

impl Algorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ExtremeMultiStage => "extreme-multi-stage",
            Self::Deflate => "deflate",
        }
    }
}

impl From<String> for Algorithm {
    fn from(tag: String) -> Self {
        match tag.as_str() {
            "extreme-multi-stage" => Self::ExtremeMultiStage,
            _ => Self::Deflate,
        }
    }
}

impl From<Algorithm> for String {
    fn from(algo: Algorithm) -> Self {
        algo.as_str().to_string()
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Compression effort recorded alongside a blob.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompressionLevel {
    Fast,
    Balanced,
    Maximum,
}

/// Everything needed to decode a blob later. Travels with the blob.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompressionMetadata {
    pub algorithm: Algorithm,
    pub level: CompressionLevel,
    /// Epoch millis.
    pub timestamp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
}

/// Cache key for a repository snapshot: `<owner>/<repo>@<branch>`.
pub fn archive_key(owner: &str, repo: &str, branch: &str) -> String {
    format!("{owner}/{repo}@{branch}")
}

/// Metadata for one cached repository+branch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchiveMetadata {
    pub id: String,
    pub owner: String,
    pub repo: String,
    pub branch: String,
    /// Epoch millis.
    pub downloaded_at: i64,
    pub original_size: u64,
    pub compressed_size: u64,
    pub compression_ratio: f64,
    pub file_count: usize,
    pub compression_metadata: CompressionMetadata,
}

impl ArchiveMetadata {
    /// Age in hours relative to `now_ms`. Clock skew into the future counts as zero.
    pub fn age_hours(&self, now_ms: i64) -> f64 {
        (now_ms - self.downloaded_at).max(0) as f64 / 3_600_000.0
    }

    pub fn is_expired(&self, now_ms: i64, max_age_hours: f64) -> bool {
        self.age_hours(now_ms) > max_age_hours
    }

    /// Bytes saved by compression. Negative when compression expanded the payload.
    pub fn space_saved(&self) -> i64 {
        self.original_size as i64 - self.compressed_size as i64
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    File,
    Dir,
}

/// One entry of a repository file listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepositoryFile {
    pub path: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: FileKind,
    pub size: u64,
    #[serde(default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

impl RepositoryFile {
    /// A regular file; `name` is the last path component.
    pub fn file(path: impl Into<String>, content: impl Into<String>) -> Self {
        let path = path.into();
        let content = content.into();
        let name = path.rsplit('/').next().unwrap_or(&path).to_string();
        Self {
            size: content.len() as u64,
            path,
            name,
            kind: FileKind::File,
            content,
            language: None,
        }
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }
}
