//! In-memory LRU byte store.
//!
//! Tracks the total size of stored values and evicts least-recently-used
//! entries when the capacity is exceeded. A second bound on the number of
//! entries keeps the LRU bookkeeping small when values are tiny.

use std::num::NonZeroUsize;

use async_trait::async_trait;
use bytes::Bytes;
use lru::LruCache;
use tokio::sync::RwLock;

use crate::error::StoreError;

use super::{ByteStore, StoreUsage};

/// Default capacity: 64MB
pub const DEFAULT_MEMORY_CAPACITY: usize = 64 * 1024 * 1024;

/// Default maximum number of entries
pub const DEFAULT_MEMORY_ENTRIES: usize = 10_000;

struct Inner {
    entries: LruCache<String, Bytes>,
    size: usize,
}

/// Size-bounded LRU store, shared across tasks via `Arc`.
pub struct MemoryStore {
    inner: RwLock<Inner>,
    max_size: usize,
}

impl MemoryStore {
    /// Store with default capacity and entry bound.
    pub fn new() -> Self {
        Self::with_capacity_and_entries(DEFAULT_MEMORY_CAPACITY, DEFAULT_MEMORY_ENTRIES)
    }

    /// Store holding at most `max_size` bytes in at most `max_entries` values.
    pub fn with_capacity_and_entries(max_size: usize, max_entries: usize) -> Self {
        let max_entries = NonZeroUsize::new(max_entries).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: RwLock::new(Inner {
                entries: LruCache::new(max_entries),
                size: 0,
            }),
            max_size,
        }
    }

    /// Check for a key without updating LRU order.
    pub async fn contains(&self, key: &str) -> bool {
        self.inner.read().await.entries.contains(key)
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.entries.is_empty()
    }

    /// Current total size of stored values in bytes.
    pub async fn size(&self) -> usize {
        self.inner.read().await.size
    }

    pub fn capacity(&self) -> usize {
        self.max_size
    }

    pub async fn clear(&self) {
        let mut inner = self.inner.write().await;
        inner.entries.clear();
        inner.size = 0;
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ByteStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Bytes>, StoreError> {
        // get() touches LRU order, so it needs the write lock
        let mut inner = self.inner.write().await;
        Ok(inner.entries.get(key).cloned())
    }

    async fn put(&self, key: &str, value: Bytes) -> Result<(), StoreError> {
        let value_size = value.len();
        let mut inner = self.inner.write().await;

        if let Some(old) = inner.entries.peek(key) {
            let old_size = old.len();
            inner.size = inner.size.saturating_sub(old_size);
        }

        // push() hands back whatever the entry bound pushed out
        if let Some((evicted_key, evicted)) = inner.entries.push(key.to_string(), value) {
            if evicted_key != key {
                inner.size = inner.size.saturating_sub(evicted.len());
            }
        }
        inner.size += value_size;

        while inner.size > self.max_size {
            let Some((_, evicted)) = inner.entries.pop_lru() else {
                break;
            };
            inner.size = inner.size.saturating_sub(evicted.len());
        }
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        if let Some(value) = inner.entries.pop(key) {
            inner.size = inner.size.saturating_sub(value.len());
        }
        Ok(())
    }

    async fn usage(&self) -> Result<StoreUsage, StoreError> {
        let inner = self.inner.read().await;
        Ok(StoreUsage {
            entries: inner.entries.len(),
            bytes: inner.size,
        })
    }

    fn name(&self) -> &str {
        "memory"
    }
}
