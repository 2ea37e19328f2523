//! Multi-tier tile cache.
//!
//! The cache stores whole importance groups as encoded [`CacheEntryGroup`]
//! records, keyed by the normalized (importance 0) descriptor. Tiers are
//! plain [`ByteStore`]s chained fastest first:
//!
//! ```text
//! lookup(key) ──► memory ──miss──► disk ──miss──► Miss
//!                   ▲                │
//!                   └──── copy ◄─────┘ hit
//! ```
//!
//! A hit in a lower tier is copied into every tier above it. A record that
//! does not decode, or whose members do not belong to the key, is corrupt:
//! it is deleted from all tiers and reported as [`CacheLookup::Corrupt`] so
//! the caller regenerates it.
//!
//! Keys are namespaced in the byte stores with the container tag `N`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use serde::Serialize;
use tracing::{debug, warn};

use crate::descriptor::{Descriptor, ResourceDescriptor, TileDescriptor};
use crate::store::{ByteStore, MemoryStore};

use super::record::CacheEntryGroup;

/// Prefix of every key written to a byte store.
pub const KEY_NAMESPACE: char = 'N';

/// Result of a cache lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheLookup {
    Hit(CacheEntryGroup),
    Miss,
    /// A record existed but was unusable; it has been deleted
    Corrupt,
}

impl CacheLookup {
    pub fn into_hit(self) -> Option<CacheEntryGroup> {
        match self {
            CacheLookup::Hit(group) => Some(group),
            _ => None,
        }
    }
}

// =============================================================================
// Statistics
// =============================================================================

#[derive(Debug, Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    corrupt: AtomicU64,
    stores: AtomicU64,
    rejected: AtomicU64,
    invalidations: AtomicU64,
}

/// Usage of one tier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TierStats {
    pub name: String,
    pub entries: usize,
    pub bytes: usize,
}

/// Point-in-time cache statistics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub corrupt: u64,
    pub stores: u64,
    pub rejected: u64,
    pub invalidations: u64,
    pub tiers: Vec<TierStats>,
}

// =============================================================================
// Cache Store
// =============================================================================

/// Chain of byte stores holding encoded tile groups.
pub struct CacheStore {
    tiers: Vec<Arc<dyn ByteStore>>,
    counters: Counters,
}

impl CacheStore {
    /// Cache over `tiers`, fastest first.
    pub fn new(tiers: Vec<Arc<dyn ByteStore>>) -> Self {
        Self {
            tiers,
            counters: Counters::default(),
        }
    }

    /// Single default-sized memory tier.
    pub fn memory_only() -> Self {
        Self::new(vec![Arc::new(MemoryStore::new())])
    }

    fn storage_key(key: &str) -> String {
        format!("{}{}", KEY_NAMESPACE, key)
    }

    /// Look up the group stored under `key`.
    pub async fn lookup(&self, key: &str) -> CacheLookup {
        let storage_key = Self::storage_key(key);

        for (depth, tier) in self.tiers.iter().enumerate() {
            let record = match tier.get(&storage_key).await {
                Ok(Some(record)) => record,
                Ok(None) => continue,
                Err(e) => {
                    warn!(tier = tier.name(), key, error = %e, "Cache tier read failed");
                    continue;
                }
            };

            let group = match check_record(key, &record) {
                Ok(group) => group,
                Err(reason) => {
                    warn!(tier = tier.name(), key, reason = %reason, "Corrupt cache record, deleting");
                    self.counters.corrupt.fetch_add(1, Ordering::Relaxed);
                    self.remove_everywhere(&storage_key).await;
                    return CacheLookup::Corrupt;
                }
            };

            for upper in &self.tiers[..depth] {
                // Each tier owns its copy
                let copy = Bytes::copy_from_slice(&record);
                if let Err(e) = upper.put(&storage_key, copy).await {
                    warn!(tier = upper.name(), key, error = %e, "Cache promotion failed");
                }
            }

            debug!(tier = tier.name(), key, buffers = group.len(), "Cache hit");
            self.counters.hits.fetch_add(1, Ordering::Relaxed);
            return CacheLookup::Hit(group);
        }

        self.counters.misses.fetch_add(1, Ordering::Relaxed);
        CacheLookup::Miss
    }

    /// Store `group` under `key` in every tier.
    ///
    /// Returns `false` without writing if the group may not be cached: it is
    /// empty, has a member that failed validation, or does not belong to an
    /// importance-0 key of a cacheable tile or resource.
    pub async fn store(&self, key: &str, group: &CacheEntryGroup) -> bool {
        if let Err(reason) = check_store_policy(key, group) {
            debug!(key, reason, "Not caching group");
            self.counters.rejected.fetch_add(1, Ordering::Relaxed);
            return false;
        }

        let storage_key = Self::storage_key(key);
        let record = group.encode();
        let mut written = false;
        for tier in &self.tiers {
            match tier.put(&storage_key, record.clone()).await {
                Ok(()) => written = true,
                Err(e) => warn!(tier = tier.name(), key, error = %e, "Cache tier write failed"),
            }
        }

        if written {
            self.counters.stores.fetch_add(1, Ordering::Relaxed);
        }
        written
    }

    /// Remove `key` from every tier.
    pub async fn invalidate(&self, key: &str) {
        debug!(key, "Invalidating cache group");
        self.counters.invalidations.fetch_add(1, Ordering::Relaxed);
        self.remove_everywhere(&Self::storage_key(key)).await;
    }

    async fn remove_everywhere(&self, storage_key: &str) {
        for tier in &self.tiers {
            if let Err(e) = tier.remove(storage_key).await {
                warn!(tier = tier.name(), key = storage_key, error = %e, "Cache tier remove failed");
            }
        }
    }

    pub async fn stats(&self) -> CacheStats {
        let mut tiers = Vec::with_capacity(self.tiers.len());
        for tier in &self.tiers {
            let usage = match tier.usage().await {
                Ok(usage) => usage,
                Err(e) => {
                    warn!(tier = tier.name(), error = %e, "Failed to read tier usage");
                    Default::default()
                }
            };
            tiers.push(TierStats {
                name: tier.name().to_string(),
                entries: usage.entries,
                bytes: usage.bytes,
            });
        }

        CacheStats {
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            corrupt: self.counters.corrupt.load(Ordering::Relaxed),
            stores: self.counters.stores.load(Ordering::Relaxed),
            rejected: self.counters.rejected.load(Ordering::Relaxed),
            invalidations: self.counters.invalidations.load(Ordering::Relaxed),
            tiers,
        }
    }
}

impl Default for CacheStore {
    fn default() -> Self {
        Self::memory_only()
    }
}

/// Decode a record and make sure it is the group stored under `key`.
fn check_record(key: &str, record: &Bytes) -> Result<CacheEntryGroup, String> {
    let group = CacheEntryGroup::decode(record).map_err(|e| e.to_string())?;
    if group.is_empty() {
        return Err("record holds no buffers".to_string());
    }
    check_members(key, &group)?;
    Ok(group)
}

fn check_store_policy(key: &str, group: &CacheEntryGroup) -> Result<(), &'static str> {
    if group.is_empty() {
        return Err("empty group");
    }
    if !group.all_good() {
        return Err("group has members that failed validation");
    }
    match Descriptor::parse(key) {
        Descriptor::Tile(tile) => {
            if tile.importance != 0 {
                return Err("key importance is not 0");
            }
            if !tile.is_cacheable() {
                return Err("descriptor is not cacheable");
            }
        }
        Descriptor::Resource(ResourceDescriptor::Container(_)) => {
            return Err("container keys are not cacheable")
        }
        Descriptor::Resource(_) => {}
        Descriptor::Invalid(_) => return Err("invalid key"),
    }
    check_members(key, group).map_err(|_| "group members do not match key")
}

/// Tile groups must hold importance `i` at position `i`, every member
/// normalizing back to `key`. Resource groups hold exactly the resource.
fn check_members(key: &str, group: &CacheEntryGroup) -> Result<(), String> {
    if TileDescriptor::parse(key).is_none() {
        return match group.buffers() {
            [only] if only.descriptor == key => Ok(()),
            _ => Err(format!("resource record does not hold exactly {}", key)),
        };
    }

    for (index, buffer) in group.buffers().iter().enumerate() {
        let tile = TileDescriptor::parse(&buffer.descriptor)
            .ok_or_else(|| format!("member {} has invalid descriptor", index))?;
        if tile.importance as usize != index {
            return Err(format!(
                "member {} has importance {}",
                index, tile.importance
            ));
        }
        if tile.normalize() != key {
            return Err(format!("member {} belongs to {}", index, tile.normalize()));
        }
    }
    Ok(())
}
