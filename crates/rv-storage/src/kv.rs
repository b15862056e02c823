use async_trait::async_trait;
use parking_lot::RwLock;
use rv_core::error::Result;
use std::collections::HashMap;

/// Async key-value persistence used by the archive cache.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Prepare the backend. Safe to call more than once.
    async fn initialize(&self) -> Result<()> {
        Ok(())
    }
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;
    async fn set(&self, key: &str, value: Vec<u8>) -> Result<()>;
    /// Returns whether the key existed.
    async fn delete(&self, key: &str) -> Result<bool>;
    async fn keys(&self) -> Result<Vec<String>>;
    async fn clear(&self) -> Result<()>;
    async fn close(&self) -> Result<()> {
        Ok(())
    }
    async fn len(&self) -> Result<usize> {
        Ok(self.keys().await?.len())
    }
}

/// In-memory KV store.
pub struct MemoryKvStore {
    data: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryKvStore {
    pub fn new() -> Self {
        Self { data: RwLock::new(HashMap::new()) }
    }
}

impl Default for MemoryKvStore {
    fn default() -> Self { Self::new() }
}

#[async_trait]
impl KvStore for MemoryKvStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.data.read().get(key).cloned())
    }

    async fn set(&self, key: &str, value: Vec<u8>) -> Result<()> {
        self.data.write().insert(key.to_string(), value);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        Ok(self.data.write().remove(key).is_some())
    }

    async fn keys(&self) -> Result<Vec<String>> {
        Ok(self.data.read().keys().cloned().collect())
    }

    async fn clear(&self) -> Result<()> {
        self.data.write().clear();
        Ok(())
    }

    async fn len(&self) -> Result<usize> {
        Ok(self.data.read().len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_crud() {
        let store = MemoryKvStore::new();
        store.initialize().await.unwrap();
        store.set("o/r@main", b"v1".to_vec()).await.unwrap();
        assert_eq!(store.get("o/r@main").await.unwrap().unwrap(), b"v1");
        assert_eq!(store.keys().await.unwrap(), vec!["o/r@main"]);
        assert!(store.delete("o/r@main").await.unwrap());
        assert!(!store.delete("o/r@main").await.unwrap());
        assert!(store.get("o/r@main").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_memory_overwrite_and_clear() {
        let store = MemoryKvStore::default();
        store.set("k", b"v1".to_vec()).await.unwrap();
        store.set("k", b"v2".to_vec()).await.unwrap();
        assert_eq!(store.get("k").await.unwrap().unwrap(), b"v2");
        store.set("k2", Vec::new()).await.unwrap();
        assert_eq!(store.len().await.unwrap(), 2);
        store.clear().await.unwrap();
        assert_eq!(store.len().await.unwrap(), 0);
        store.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_memory_binary() {
        let store = MemoryKvStore::new();
        let bytes: Vec<u8> = (0..=255u8).collect();
        store.set("bin", bytes.clone()).await.unwrap();
        assert_eq!(store.get("bin").await.unwrap().unwrap(), bytes);
    }
}
