//! repovault storage layer: async key-value backends.

pub mod file_store;
pub mod kv;

pub use file_store::FileKvStore;
pub use kv::{KvStore, MemoryKvStore};
