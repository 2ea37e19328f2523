//! Test utilities for integration tests.
//!
//! This module provides mock origins built on the synthetic renderer and
//! helpers for assembling a service and reading its batch output.

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashSet;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tilemap_cache::descriptor::{BitmapSize, Language, MapRights, StaticRights, TileKind};
use tilemap_cache::error::GenerateError;
use tilemap_cache::store::{ByteStore, DiskStore, MemoryStore};
use tilemap_cache::tile::{
    decode_batch, BatchResponse, BitmapTable, CacheStore, ServiceConfig, SyntheticOrigin,
    TileBuffer, TileOrigin, TileRequest, TileService,
};

/// Importance levels produced by the test origins
pub const IMPORTANCES: u32 = 3;

// =============================================================================
// Mock Origins
// =============================================================================

/// Synthetic origin that counts calls.
#[derive(Clone)]
pub struct CountingOrigin {
    inner: SyntheticOrigin,
    calls: Arc<AtomicUsize>,
}

impl CountingOrigin {
    pub fn new() -> Self {
        Self {
            inner: SyntheticOrigin::new(IMPORTANCES),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TileOrigin for CountingOrigin {
    async fn generate(&self, request: &TileRequest) -> Result<Vec<TileBuffer>, GenerateError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.generate(request).await
    }

    async fn format_descriptor(
        &self,
        language: Language,
        night: bool,
        server_prefix: u32,
    ) -> Result<Bytes, GenerateError> {
        self.inner
            .format_descriptor(language, night, server_prefix)
            .await
    }
}

/// Origin whose string tiles disagree with the geometry at one importance.
///
/// Languages in `broken` get a wrong checksum there. Leaving the canonical
/// language out of `broken` makes the fault repairable.
pub struct SkewedOrigin {
    inner: SyntheticOrigin,
    importance: u32,
    broken: HashSet<Language>,
}

impl SkewedOrigin {
    pub fn new(importance: u32, broken: impl IntoIterator<Item = Language>) -> Self {
        Self {
            inner: SyntheticOrigin::new(IMPORTANCES),
            importance,
            broken: broken.into_iter().collect(),
        }
    }
}

#[async_trait]
impl TileOrigin for SkewedOrigin {
    async fn generate(&self, request: &TileRequest) -> Result<Vec<TileBuffer>, GenerateError> {
        let mut buffers = self.inner.generate(request).await?;
        let descriptor = request.descriptor();
        if descriptor.kind == TileKind::Strings && self.broken.contains(&descriptor.language) {
            if let Some(buffer) = buffers.get_mut(self.importance as usize) {
                buffer.checksum ^= 0xdead_beef;
            }
        }
        Ok(buffers)
    }

    async fn format_descriptor(
        &self,
        language: Language,
        night: bool,
        server_prefix: u32,
    ) -> Result<Bytes, GenerateError> {
        self.inner
            .format_descriptor(language, night, server_prefix)
            .await
    }
}

/// Origin that cannot produce some rights slices.
pub struct GappyOrigin {
    inner: SyntheticOrigin,
    refused: MapRights,
}

impl GappyOrigin {
    pub fn new(refused: MapRights) -> Self {
        Self {
            inner: SyntheticOrigin::new(IMPORTANCES),
            refused,
        }
    }
}

#[async_trait]
impl TileOrigin for GappyOrigin {
    async fn generate(&self, request: &TileRequest) -> Result<Vec<TileBuffer>, GenerateError> {
        match request.slice() {
            Some(slice) if self.refused.contains(slice) => {
                Err(GenerateError::Unavailable(format!("slice {} offline", slice)))
            }
            _ => self.inner.generate(request).await,
        }
    }

    async fn format_descriptor(
        &self,
        language: Language,
        night: bool,
        server_prefix: u32,
    ) -> Result<Bytes, GenerateError> {
        self.inner
            .format_descriptor(language, night, server_prefix)
            .await
    }
}

/// Synthetic origin that takes `delay` per call.
pub struct SlowOrigin {
    inner: SyntheticOrigin,
    delay: Duration,
}

impl SlowOrigin {
    pub fn new(delay: Duration) -> Self {
        Self {
            inner: SyntheticOrigin::new(IMPORTANCES),
            delay,
        }
    }
}

#[async_trait]
impl TileOrigin for SlowOrigin {
    async fn generate(&self, request: &TileRequest) -> Result<Vec<TileBuffer>, GenerateError> {
        tokio::time::sleep(self.delay).await;
        self.inner.generate(request).await
    }

    async fn format_descriptor(
        &self,
        language: Language,
        night: bool,
        server_prefix: u32,
    ) -> Result<Bytes, GenerateError> {
        self.inner
            .format_descriptor(language, night, server_prefix)
            .await
    }
}

// =============================================================================
// Service Assembly
// =============================================================================

/// Rights used by the tests: alice holds bits 1 and 4, bob holds bit 2.
pub fn test_rights() -> StaticRights {
    StaticRights::new()
        .with_user("alice", MapRights::new(0b101))
        .with_user("bob", MapRights::new(0b010))
}

pub fn test_bitmaps() -> BitmapTable {
    BitmapTable::new()
        .with_bitmap(BitmapSize::Normal, "fuel", Bytes::from_static(b"fuel-icon"))
        .with_bitmap(BitmapSize::Large, "fuel", Bytes::from_static(b"fuel-icon-large"))
}

/// Service over a memory-only cache.
pub fn build_service(origin: Arc<dyn TileOrigin>, config: ServiceConfig) -> TileService {
    TileService::new(
        config,
        Arc::new(CacheStore::memory_only()),
        origin,
        test_bitmaps(),
        Arc::new(test_rights()),
    )
}

/// Memory tier over a disk tier rooted at `dir`.
pub fn two_tier_cache(dir: &Path) -> Arc<CacheStore> {
    let tiers: Vec<Arc<dyn ByteStore>> = vec![
        Arc::new(MemoryStore::new()),
        Arc::new(DiskStore::open(dir).unwrap()),
    ];
    Arc::new(CacheStore::new(tiers))
}

/// Service over an existing cache.
pub fn build_service_with_cache(
    origin: Arc<dyn TileOrigin>,
    config: ServiceConfig,
    cache: Arc<CacheStore>,
) -> TileService {
    TileService::new(
        config,
        cache,
        origin,
        test_bitmaps(),
        Arc::new(test_rights()),
    )
}

// =============================================================================
// Output Helpers
// =============================================================================

/// Decoded `(descriptor, payload)` pairs of a batch response.
pub fn entries(response: BatchResponse) -> Vec<(String, Bytes)> {
    entries_from_bytes(&response.output.into_bytes())
}

pub fn entries_from_bytes(data: &Bytes) -> Vec<(String, Bytes)> {
    decode_batch(data)
        .unwrap()
        .into_iter()
        .map(|entry| (entry.descriptor, entry.payload))
        .collect()
}

/// Payload sent for `descriptor`, if any.
pub fn payload_for<'a>(entries: &'a [(String, Bytes)], descriptor: &str) -> Option<&'a Bytes> {
    entries
        .iter()
        .find(|(name, _)| name == descriptor)
        .map(|(_, payload)| payload)
}
