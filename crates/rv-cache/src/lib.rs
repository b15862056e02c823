//! repovault archive cache.
//!
//! Stores compressed repository file lists in a [`rv_storage::KvStore`],
//! expires them by age and caps how many are kept.

pub mod manager;
pub mod record;
pub mod stats;

pub use manager::ArchiveCacheManager;
pub use record::ArchiveRecord;
pub use stats::CacheStats;
