//! Archive cache manager: compressed repository snapshots keyed by
//! `<owner>/<repo>@<branch>`, with expiry and a size cap.
//!
//! Reads never fail: a miss, an expired entry and a corrupt entry all come
//! back as `None`, and the latter two are deleted on the way. Writes fail
//! with [`RvError::StorageIntegrityFailure`] when the record read back does
//! not hold the blob that was written.
//!
//! Concurrent writers to one key are last-write-wins; the read-back only
//! guards against a backend that loses data. Running this against a store
//! shared by several processes needs a per-key lock first.

use crate::record::{ArchiveRecord, RecordHeader};
use crate::stats::CacheStats;
use rv_compactor::pipeline::verify_checksum;
use rv_compactor::storage_codec::{from_storable, to_storable};
use rv_compactor::CompressionPipeline;
use rv_core::clock::{Clock, SystemClock};
use rv_core::config::CacheConfig;
use rv_core::error::{Result, RvError};
use rv_core::types::{archive_key, ArchiveMetadata, RepositoryFile};
use rv_storage::KvStore;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

enum ScanEntry {
    Valid(String, ArchiveMetadata),
    Corrupt(String),
}

pub struct ArchiveCacheManager {
    store: Arc<dyn KvStore>,
    clock: Arc<dyn Clock>,
    config: CacheConfig,
    pipeline: CompressionPipeline,
    initialized: AtomicBool,
}

impl ArchiveCacheManager {
    pub fn new(store: Arc<dyn KvStore>, config: CacheConfig) -> Self {
        Self::with_clock(store, config, Arc::new(SystemClock))
    }

    pub fn with_clock(store: Arc<dyn KvStore>, config: CacheConfig, clock: Arc<dyn Clock>) -> Self {
        let pipeline = CompressionPipeline::with_clock(config.compression.clone(), clock.clone());
        Self {
            store,
            clock,
            config,
            pipeline,
            initialized: AtomicBool::new(false),
        }
    }

    // ========== Lifecycle ==========

    pub async fn initialize(&self) -> Result<()> {
        self.store.initialize().await?;
        self.initialized.store(true, Ordering::SeqCst);
        debug!(max_entries = self.config.max_entries, "archive cache initialized");
        Ok(())
    }

    pub async fn close(&self) -> Result<()> {
        if self.initialized.swap(false, Ordering::SeqCst) {
            self.store.close().await?;
            debug!("archive cache closed");
        }
        Ok(())
    }

    async fn ensure_initialized(&self) -> Result<()> {
        if self.initialized.load(Ordering::SeqCst) {
            return Ok(());
        }
        self.initialize().await
    }

    // ========== Reads ==========

    /// Cached file list for a repository+branch, or `None` on miss,
    /// expiry or corruption.
    pub async fn get_cached_archive(&self, owner: &str, repo: &str, branch: &str) -> Option<Vec<RepositoryFile>> {
        let key = archive_key(owner, repo, branch);
        let record = self.load_fresh(&key).await?;
        match self.decode_files(&record) {
            Ok(files) => {
                debug!(key = %key, files = files.len(), "cache hit");
                Some(files)
            }
            Err(e) => {
                warn!(key = %key, error = %e, "corrupt cache entry, removing");
                self.discard(&key).await;
                None
            }
        }
    }

    /// Present and not expired. Does not decompress.
    pub async fn is_cached(&self, owner: &str, repo: &str, branch: &str) -> bool {
        self.load_fresh(&archive_key(owner, repo, branch)).await.is_some()
    }

    pub async fn get_archive_metadata(&self, owner: &str, repo: &str, branch: &str) -> Option<ArchiveMetadata> {
        self.load_fresh(&archive_key(owner, repo, branch))
            .await
            .map(|r| r.metadata)
    }

    pub async fn get_raw_archive(&self, owner: &str, repo: &str, branch: &str) -> Option<Vec<u8>> {
        self.load_fresh(&archive_key(owner, repo, branch))
            .await
            .and_then(|r| r.raw_archive)
    }

    /// Every readable entry, newest first. Expired entries are listed until a
    /// read or [`Self::cleanup_expired`] removes them.
    pub async fn get_archive_list(&self) -> Result<Vec<ArchiveMetadata>> {
        let mut list: Vec<ArchiveMetadata> = self
            .scan()
            .await?
            .into_iter()
            .filter_map(|entry| match entry {
                ScanEntry::Valid(_, meta) => Some(meta),
                ScanEntry::Corrupt(_) => None,
            })
            .collect();
        list.sort_by(|a, b| b.downloaded_at.cmp(&a.downloaded_at).then_with(|| a.id.cmp(&b.id)));
        Ok(list)
    }

    /// Aggregates [`Self::get_archive_list`], so expired entries still in the
    /// store are counted.
    pub async fn get_cache_stats(&self) -> Result<CacheStats> {
        Ok(CacheStats::from_metadata(&self.get_archive_list().await?))
    }

    // ========== Writes ==========

    /// Compress and persist a file list, verify the write, then evict.
    pub async fn store_archive(
        &self,
        owner: &str,
        repo: &str,
        branch: &str,
        files: &[RepositoryFile],
        raw_archive: Option<Vec<u8>>,
    ) -> Result<ArchiveMetadata> {
        self.ensure_initialized().await?;
        let key = archive_key(owner, repo, branch);

        let json = serde_json::to_string(files)?;
        let result = self.pipeline.compress_auto(&json)?;
        let encoded = to_storable(&result.compressed_data);

        let metadata = ArchiveMetadata {
            id: key.clone(),
            owner: owner.to_string(),
            repo: repo.to_string(),
            branch: branch.to_string(),
            downloaded_at: self.clock.now_millis(),
            original_size: result.original_size,
            compressed_size: result.compressed_size,
            compression_ratio: result.compression_ratio,
            file_count: files.len(),
            compression_metadata: result.metadata,
        };
        let record = ArchiveRecord {
            metadata: metadata.clone(),
            compressed_files_encoded: encoded,
            raw_archive,
        };
        self.store.set(&key, record.to_bytes()?).await?;

        if self.config.verify_writes {
            self.verify_write(&key, &metadata).await?;
        }

        info!(
            key = %key,
            files = metadata.file_count,
            original = metadata.original_size,
            compressed = metadata.compressed_size,
            algorithm = %metadata.compression_metadata.algorithm,
            "archive stored"
        );

        if let Err(e) = self.evict().await {
            warn!(error = %e, "eviction pass failed");
        }
        Ok(metadata)
    }

    /// Returns whether an entry was removed.
    pub async fn remove_archive(&self, owner: &str, repo: &str, branch: &str) -> Result<bool> {
        self.ensure_initialized().await?;
        let key = archive_key(owner, repo, branch);
        let removed = self.store.delete(&key).await?;
        debug!(key = %key, removed, "archive removed");
        Ok(removed)
    }

    pub async fn clear_all_archives(&self) -> Result<()> {
        self.ensure_initialized().await?;
        self.store.clear().await?;
        info!("archive cache cleared");
        Ok(())
    }

    /// Delete every expired entry. Returns how many were removed.
    pub async fn cleanup_expired(&self) -> Result<usize> {
        let now = self.clock.now_millis();
        let mut removed = 0;
        for entry in self.scan().await? {
            if let ScanEntry::Valid(key, meta) = entry {
                if meta.is_expired(now, self.config.max_age_hours) && self.store.delete(&key).await? {
                    removed += 1;
                }
            }
        }
        if removed > 0 {
            info!(removed, "expired archives removed");
        }
        Ok(removed)
    }

    /// Enforce `max_entries`, oldest first. Unreadable records are removed
    /// regardless of the cap. Returns how many entries were deleted.
    pub async fn evict(&self) -> Result<usize> {
        let mut removed = 0;
        let mut valid = Vec::new();
        for entry in self.scan().await? {
            match entry {
                ScanEntry::Valid(key, meta) => valid.push((key, meta.downloaded_at)),
                ScanEntry::Corrupt(key) => {
                    warn!(key = %key, "unreadable cache record, removing");
                    if self.store.delete(&key).await? {
                        removed += 1;
                    }
                }
            }
        }

        if valid.len() > self.config.max_entries {
            valid.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(&b.0)));
            let excess = valid.len() - self.config.max_entries;
            for (key, _) in valid.into_iter().take(excess) {
                if self.store.delete(&key).await? {
                    debug!(key = %key, "evicted");
                    removed += 1;
                }
            }
        }
        Ok(removed)
    }

    // ========== Internals ==========

    async fn scan(&self) -> Result<Vec<ScanEntry>> {
        self.ensure_initialized().await?;
        let mut entries = Vec::new();
        for key in self.store.keys().await? {
            let Some(bytes) = self.store.get(&key).await? else { continue };
            match RecordHeader::from_bytes(&bytes) {
                Ok(header) => entries.push(ScanEntry::Valid(key, header.metadata)),
                Err(_) => entries.push(ScanEntry::Corrupt(key)),
            }
        }
        Ok(entries)
    }

    /// Record for `key` if it exists, parses, is fresh and has a blob.
    /// Anything else that is present gets deleted.
    async fn load_fresh(&self, key: &str) -> Option<ArchiveRecord> {
        if let Err(e) = self.ensure_initialized().await {
            warn!(error = %e, "archive cache unavailable");
            return None;
        }
        let bytes = match self.store.get(key).await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => {
                debug!(key = %key, "cache miss");
                return None;
            }
            Err(e) => {
                warn!(key = %key, error = %e, "cache read failed");
                return None;
            }
        };

        let record = match ArchiveRecord::from_bytes(&bytes) {
            Ok(record) => record,
            Err(e) => {
                warn!(key = %key, error = %e, "unreadable cache record, removing");
                self.discard(key).await;
                return None;
            }
        };

        let now = self.clock.now_millis();
        if record.metadata.is_expired(now, self.config.max_age_hours) {
            info!(key = %key, age_hours = record.metadata.age_hours(now), "cache entry expired");
            self.discard(key).await;
            return None;
        }

        if record.compressed_files_encoded.is_empty() {
            warn!(key = %key, "cache entry has no blob, removing");
            self.discard(key).await;
            return None;
        }
        Some(record)
    }

    fn decode_files(&self, record: &ArchiveRecord) -> Result<Vec<RepositoryFile>> {
        let blob = from_storable(&record.compressed_files_encoded)?;
        if blob.is_empty() {
            return Err(RvError::corrupt("empty blob"));
        }
        let meta = &record.metadata.compression_metadata;
        verify_checksum(&blob, meta)?;
        let json = self.pipeline.decompress_auto(&blob, meta)?;
        Ok(serde_json::from_str(&json)?)
    }

    async fn verify_write(&self, key: &str, metadata: &ArchiveMetadata) -> Result<()> {
        let actual = match self.store.get(key).await? {
            Some(bytes) => match ArchiveRecord::from_bytes(&bytes) {
                Ok(record) if !record.compressed_files_encoded.is_empty() => {
                    from_storable(&record.compressed_files_encoded).map_or(0, |b| b.len() as u64)
                }
                _ => 0,
            },
            None => 0,
        };
        if actual != metadata.compressed_size {
            warn!(key = %key, expected = metadata.compressed_size, actual, "write verification failed");
            self.discard(key).await;
            return Err(RvError::StorageIntegrityFailure {
                key: key.to_string(),
                expected: metadata.compressed_size,
                actual,
            });
        }
        Ok(())
    }

    async fn discard(&self, key: &str) {
        if let Err(e) = self.store.delete(key).await {
            warn!(key = %key, error = %e, "failed to delete cache entry");
        }
    }
}
