//! Composition of access-controlled tiles from permission slices.
//!
//! An access-controlled tile is never cached as a whole: what a user sees
//! depends on their rights. Each permission bit has its own slice, cached
//! under the descriptor with that bit appended as a rights suffix
//! (`T1_4_2_0_5_5_en.8`). A request is answered by merging the slices of
//! every bit the user holds.
//!
//! Merged members use the length-framed layout
//!
//! ```text
//! repeated per contributing slice, lowest bit first:
//!     len:u32 (big-endian)  payload:[u8; len]
//! ```
//!
//! and carry the checksum of the concatenated big-endian slice checksums, so
//! a merged string group still agrees with the merged data group.

use std::sync::Arc;

use bytes::{BufMut, Bytes, BytesMut};
use tracing::{debug, warn};

use crate::descriptor::{MapRights, TileDescriptor};

use super::buffer::{checksum, TileBuffer};
use super::cache::{CacheLookup, CacheStore};
use super::origin::{Generator, TileRequest};
use super::record::CacheEntryGroup;
use super::validator::ConsistencyValidator;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ComposeOutcome {
    /// Every slice was available; members are the unsuffixed descriptors
    Composed(CacheEntryGroup),

    /// The user holds no rights on this layer
    Placeholder(CacheEntryGroup),

    /// Some slices could be neither loaded nor generated
    Failed { missing: Vec<String> },
}

pub struct RightsComposer {
    cache: Arc<CacheStore>,
    generator: Generator,
    validator: Arc<ConsistencyValidator>,
    /// Bits that have slices at all
    acp_rights: MapRights,
    /// Re-check cached string slices against their data slices
    verify_cached: bool,
}

impl RightsComposer {
    pub fn new(
        cache: Arc<CacheStore>,
        generator: Generator,
        validator: Arc<ConsistencyValidator>,
        acp_rights: MapRights,
    ) -> Self {
        Self {
            cache,
            generator,
            validator,
            acp_rights,
            verify_cached: true,
        }
    }

    /// Set whether cached string slices are checked against their data
    /// slices before merging.
    pub fn with_verify_cached(mut self, verify: bool) -> Self {
        self.verify_cached = verify;
        self
    }

    /// Cache keys of the slices `user_rights` gives access to, lowest bit
    /// first.
    pub fn slice_keys(
        &self,
        descriptor: &TileDescriptor,
        user_rights: MapRights,
    ) -> Vec<(MapRights, String)> {
        let base = descriptor.without_rights();
        (user_rights & self.acp_rights)
            .slices()
            .map(|slice| (slice, base.with_rights(slice).normalize()))
            .collect()
    }

    /// Build the group for `descriptor` as seen by a user holding
    /// `user_rights`.
    pub async fn compose_for_rights(
        &self,
        descriptor: &TileDescriptor,
        user_rights: MapRights,
    ) -> ComposeOutcome {
        let slices = self.slice_keys(descriptor, user_rights);
        if slices.is_empty() {
            debug!(descriptor = %descriptor, rights = %user_rights, "No slices for user");
            return ComposeOutcome::Placeholder(CacheEntryGroup::single(TileBuffer::placeholder(
                descriptor.without_rights().to_string(),
            )));
        }

        let mut groups = Vec::with_capacity(slices.len());
        let mut missing = Vec::new();
        for (slice, key) in slices {
            match self.load_slice(descriptor, slice, &key).await {
                Some(group) => groups.push(group),
                None => missing.push(key),
            }
        }

        if !missing.is_empty() {
            warn!(descriptor = %descriptor, missing = ?missing, "Cannot compose tile");
            return ComposeOutcome::Failed { missing };
        }

        ComposeOutcome::Composed(merge_slices(&descriptor.without_rights(), &groups))
    }

    /// Cached slice, generating it once on a miss.
    async fn load_slice(
        &self,
        descriptor: &TileDescriptor,
        slice: MapRights,
        key: &str,
    ) -> Option<CacheEntryGroup> {
        if let CacheLookup::Hit(group) = self.cache.lookup(key).await {
            if !self.verify_cached || self.validator.verify_cached(&group).await {
                return Some(group);
            }
            debug!(key, "Cached slice out of step with its data slice, regenerating");
        } else {
            debug!(key, "Slice not cached, generating");
        }

        let request = TileRequest::RightsScoped {
            descriptor: descriptor.without_rights().with_importance(0),
            slice,
        };
        match self.generator.generate(&request).await {
            Ok(group) => {
                self.validator.validate_and_store(group).await;
            }
            Err(e) => {
                warn!(key, error = %e, "Failed to generate slice");
                return None;
            }
        }

        self.cache.lookup(key).await.into_hit()
    }
}

/// Merge slice groups per importance.
pub fn merge_slices(descriptor: &TileDescriptor, groups: &[CacheEntryGroup]) -> CacheEntryGroup {
    let depth = groups.iter().map(CacheEntryGroup::len).max().unwrap_or(0);

    let merged = (0..depth)
        .map(|importance| {
            let parts: Vec<&TileBuffer> = groups.iter().filter_map(|g| g.get(importance)).collect();

            let size = parts.iter().map(|p| 4 + p.payload.len()).sum::<usize>();
            let mut payload = BytesMut::with_capacity(size);
            let mut checksums = BytesMut::with_capacity(parts.len() * 4);
            for part in &parts {
                payload.put_u32(part.payload.len() as u32);
                payload.put_slice(&part.payload);
                checksums.put_u32(part.checksum);
            }

            TileBuffer::with_checksum(
                descriptor.with_importance(importance as u32).to_string(),
                payload.freeze(),
                checksum(&checksums),
                parts.iter().all(|p| p.empty),
            )
        })
        .collect();

    CacheEntryGroup::new(merged)
}

/// Split a merged payload back into its slice payloads.
pub fn split_merged(payload: &Bytes) -> Option<Vec<Bytes>> {
    let mut parts = Vec::new();
    let mut offset = 0;
    while offset < payload.len() {
        let header = payload.get(offset..offset + 4)?;
        let len = u32::from_be_bytes([header[0], header[1], header[2], header[3]]) as usize;
        let start = offset + 4;
        let end = start.checked_add(len)?;
        if end > payload.len() {
            return None;
        }
        parts.push(payload.slice(start..end));
        offset = end;
    }
    Some(parts)
}
