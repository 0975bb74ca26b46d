/// Short-lived cache of chunked comparison results, keyed `chunking:result:<comparisonId>:<chunkSize>`.
use crate::error::StorageError;
use constants::storage::{chunk_cache_comparison_prefix, chunk_cache_key};
use moka::sync::Cache;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

pub trait ChunkCache: Send + Sync {
    /// Store a serialized chunking result
    fn save(&self, comparison_id: u64, chunk_size: usize, value: Vec<u8>) -> Result<(), StorageError>;

    fn get(&self, comparison_id: u64, chunk_size: usize) -> Option<Arc<Vec<u8>>>;

    fn delete(&self, comparison_id: u64, chunk_size: usize) -> bool;

    /// Drop every chunk size cached for a comparison, returning how many went
    fn delete_all(&self, comparison_id: u64) -> usize;

    fn exists(&self, comparison_id: u64, chunk_size: usize) -> bool {
        self.get(comparison_id, chunk_size).is_some()
    }
}

/// In-process cache with a fixed time to live
pub struct MokaChunkCache {
    cache: Cache<String, Arc<Vec<u8>>>,
    ttl: Duration,
}

impl MokaChunkCache {
    pub fn new(ttl: Duration, max_entries: u64) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_entries)
            .time_to_live(ttl)
            .build();
        Self { cache, ttl }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }
}

impl ChunkCache for MokaChunkCache {
    fn save(&self, comparison_id: u64, chunk_size: usize, value: Vec<u8>) -> Result<(), StorageError> {
        self.cache
            .insert(chunk_cache_key(comparison_id, chunk_size), Arc::new(value));
        info!(
            comparison_id,
            chunk_size,
            ttl_secs = self.ttl.as_secs(),
            "Saved chunking result to cache"
        );
        Ok(())
    }

    fn get(&self, comparison_id: u64, chunk_size: usize) -> Option<Arc<Vec<u8>>> {
        self.cache.get(&chunk_cache_key(comparison_id, chunk_size))
    }

    fn delete(&self, comparison_id: u64, chunk_size: usize) -> bool {
        self.cache
            .remove(&chunk_cache_key(comparison_id, chunk_size))
            .is_some()
    }

    fn delete_all(&self, comparison_id: u64) -> usize {
        let prefix = chunk_cache_comparison_prefix(comparison_id);
        let keys: Vec<Arc<String>> = self
            .cache
            .iter()
            .map(|(key, _)| key)
            .filter(|key| key.starts_with(&prefix))
            .collect();
        for key in &keys {
            self.cache.invalidate(key.as_str());
        }
        info!(comparison_id, count = keys.len(), "Deleted cached chunking results");
        keys.len()
    }
}
