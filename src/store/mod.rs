//! Byte-store providers.
//!
//! The cache layer only needs "store/load bytes for key K". Each tier of the
//! tile cache is one [`ByteStore`]; tiers are chained fastest first by
//! [`crate::tile::CacheStore`].

mod disk;
mod memory;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::StoreError;

pub use disk::DiskStore;
pub use memory::{MemoryStore, DEFAULT_MEMORY_CAPACITY, DEFAULT_MEMORY_ENTRIES};

/// Size snapshot of one provider.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreUsage {
    pub entries: usize,
    pub bytes: usize,
}

/// Key/value byte storage used as one cache tier.
#[async_trait]
pub trait ByteStore: Send + Sync {
    /// Load the value for `key`, `Ok(None)` if absent.
    async fn get(&self, key: &str) -> Result<Option<Bytes>, StoreError>;

    /// Store `value` under `key`, replacing any previous value.
    async fn put(&self, key: &str, value: Bytes) -> Result<(), StoreError>;

    /// Remove `key`. Removing an absent key is not an error.
    async fn remove(&self, key: &str) -> Result<(), StoreError>;

    /// Current usage.
    async fn usage(&self) -> Result<StoreUsage, StoreError>;

    /// Short name used in logs and statistics.
    fn name(&self) -> &str;
}
