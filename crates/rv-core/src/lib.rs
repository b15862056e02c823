pub mod clock;
pub mod config;
pub mod error;
pub mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{CacheConfig, CompressionConfig, DictionaryConfig, RepoVaultConfig};
pub use error::{DecompressionStage, Result, RvError};
pub use types::{
    archive_key, Algorithm, ArchiveMetadata, CompressionLevel, CompressionMetadata, FileKind,
    RepositoryFile,
};
