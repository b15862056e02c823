use std::fmt;
use thiserror::Error;

/// Inner stage of the multi-stage pipeline that produced no usable output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecompressionStage {
    /// zlib/deflate inverse.
    Inflate,
    /// LZ4 block inverse.
    LzDecompress,
}

impl DecompressionStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Inflate => "inflate",
            Self::LzDecompress => "lz-decompress",
        }
    }
}

impl fmt::Display for DecompressionStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug)]
pub enum RvError {
    #[error("Decompression stage failed: {stage}")]
    DecompressionStageFailure { stage: DecompressionStage },
    #[error("Corrupt payload: {0}")]
    CorruptPayload(String),
    #[error("Storage integrity check failed for {key}: expected {expected} bytes, got {actual}")]
    StorageIntegrityFailure {
        key: String,
        expected: u64,
        actual: u64,
    },
    #[error("Compression error: {0}")]
    Compression(String),
    #[error("Storage error: {0}")]
    Storage(String),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl RvError {
    pub fn stage(stage: DecompressionStage) -> Self {
        Self::DecompressionStageFailure { stage }
    }

    pub fn corrupt(msg: impl Into<String>) -> Self {
        Self::CorruptPayload(msg.into())
    }

    /// True for errors that mean the stored bytes cannot be decoded.
    pub fn is_corruption(&self) -> bool {
        matches!(
            self,
            Self::DecompressionStageFailure { .. } | Self::CorruptPayload(_) | Self::Serialization(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, RvError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_display() {
        let err = RvError::stage(DecompressionStage::Inflate);
        assert_eq!(err.to_string(), "Decompression stage failed: inflate");
        let err = RvError::stage(DecompressionStage::LzDecompress);
        assert_eq!(err.to_string(), "Decompression stage failed: lz-decompress");
    }

    #[test]
    fn test_is_corruption() {
        assert!(RvError::corrupt("bad").is_corruption());
        assert!(RvError::stage(DecompressionStage::Inflate).is_corruption());
        let integrity = RvError::StorageIntegrityFailure {
            key: "a/b@main".into(),
            expected: 10,
            actual: 3,
        };
        assert!(!integrity.is_corruption());
        assert!(!RvError::Storage("down".into()).is_corruption());
    }

    #[test]
    fn test_integrity_message() {
        let err = RvError::StorageIntegrityFailure {
            key: "o/r@main".into(),
            expected: 12,
            actual: 0,
        };
        assert_eq!(
            err.to_string(),
            "Storage integrity check failed for o/r@main: expected 12 bytes, got 0"
        );
    }
}
