//! Cross-checking of string tiles against their data tiles.
//!
//! Label (string) tiles are generated per language, but the labels are
//! placed on geometry that only exists once, in the data tile. Every string
//! buffer therefore carries the checksum of the geometry it was placed on,
//! and that checksum must equal the checksum of the data buffer of the same
//! importance. A group is cached only once every importance agrees.
//!
//! Repair, per mismatching importance:
//!
//! 1. take the string tile of the same importance from the group in
//!    [`Language::CANONICAL`] (generated once per round), which is always
//!    placed on the data tile's geometry, keeping the requested descriptor;
//! 2. if that still disagrees, purge the string group (all languages) and
//!    the data group from the cache and run the whole check once more;
//! 3. on the second failure give the client an empty placeholder and cache
//!    nothing.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::descriptor::{Language, TileDescriptor, TileKind};

use super::buffer::TileBuffer;
use super::cache::{CacheLookup, CacheStore};
use super::origin::{Generator, TileRequest};
use super::record::CacheEntryGroup;

/// Number of check rounds; only the last one replaces bad tiles.
const ROUNDS: u32 = 2;

/// Outcome of validating one freshly generated group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Validated {
    /// The group, repaired where possible. Members that could not be made
    /// consistent are placeholders or marked not good.
    pub group: CacheEntryGroup,
    /// Whether the group was written to the cache
    pub stored: bool,
}

enum Round {
    Stored,
    NotStored,
    Retry,
}

pub struct ConsistencyValidator {
    cache: Arc<CacheStore>,
    generator: Generator,
}

impl ConsistencyValidator {
    pub fn new(cache: Arc<CacheStore>, generator: Generator) -> Self {
        Self { cache, generator }
    }

    /// Check `group` against its data group, repair it, and cache it if it
    /// ends up fully consistent.
    pub async fn validate_and_store(&self, mut group: CacheEntryGroup) -> Validated {
        for round in 0..ROUNDS {
            let last = round + 1 == ROUNDS;
            match self.check_round(&mut group, last).await {
                Round::Stored => return Validated { group, stored: true },
                Round::NotStored => return Validated { group, stored: false },
                Round::Retry => debug!(round, "Group not consistent, checking again"),
            }
        }
        Validated {
            group,
            stored: false,
        }
    }

    async fn check_round(&self, group: &mut CacheEntryGroup, last: bool) -> Round {
        let Some(first) = group.get(0).and_then(TileBuffer::tile_descriptor) else {
            return Round::NotStored;
        };
        let key = first.normalize();

        if first.kind == TileKind::Data {
            return if self.store(&key, group).await {
                Round::Stored
            } else {
                Round::NotStored
            };
        }

        let data = match self.data_group(&first, group.len()).await {
            Some(data) => data,
            None => {
                warn!(key = %key, "No data group to check strings against");
                if last {
                    group.buffers_mut().iter_mut().for_each(TileBuffer::mark_bad);
                    return Round::NotStored;
                }
                return Round::Retry;
            }
        };

        let mut consistent = true;
        // generated on the first mismatch, then shared by every importance
        let mut canonical: Option<Option<CacheEntryGroup>> = None;
        for index in 0..group.len() {
            let wanted = data.get(index).map(|d| d.checksum);
            let buffer = &mut group.buffers_mut()[index];
            if wanted == Some(buffer.checksum) {
                buffer.good = true;
                continue;
            }
            buffer.mark_bad();
            debug!(
                descriptor = %buffer.descriptor,
                checksum = format_args!("{:08x}", buffer.checksum),
                "String tile checksum differs from data tile"
            );

            let descriptor = buffer.descriptor.clone();
            if canonical.is_none() && wanted.is_some() {
                canonical = Some(self.canonical_group(&first).await);
            }
            let repaired = canonical
                .as_ref()
                .and_then(Option::as_ref)
                .and_then(|g| g.get(index))
                .filter(|b| Some(b.checksum) == wanted)
                .cloned();
            if let Some(repaired) = repaired {
                debug!(descriptor = %descriptor, "Replaced with canonical-language tile");
                let buffer = &mut group.buffers_mut()[index];
                buffer.payload = repaired.payload;
                buffer.checksum = repaired.checksum;
                buffer.empty = repaired.empty;
                buffer.good = true;
                continue;
            }

            info!(descriptor = %descriptor, "String tile unrecoverable, purging group");
            self.purge(&first).await;
            if last {
                let mut placeholder = TileBuffer::placeholder(descriptor);
                placeholder.mark_bad();
                group.buffers_mut()[index] = placeholder;
            }
            consistent = false;
        }

        if !consistent {
            return if last { Round::NotStored } else { Round::Retry };
        }

        if self.store(&key, group).await {
            Round::Stored
        } else {
            Round::NotStored
        }
    }

    /// Fetch the data group paired with `strings`, generating and caching
    /// it on a miss.
    async fn data_group(
        &self,
        strings: &TileDescriptor,
        expected_len: usize,
    ) -> Option<CacheEntryGroup> {
        let paired = strings.paired_data();
        let key = paired.normalize();
        if let CacheLookup::Hit(data) = self.cache.lookup(&key).await {
            return Some(data);
        }

        debug!(key = %key, "Data group not cached, generating");
        let request = TileRequest::for_descriptor(&paired);
        match self
            .generator
            .generate_until(&request, |g| g.len() == expected_len)
            .await
        {
            Ok(data) => {
                if data.len() != expected_len {
                    warn!(
                        key = %key,
                        data = data.len(),
                        strings = expected_len,
                        "Data and string groups differ in size"
                    );
                }
                self.cache.store(&key, &data).await;
                Some(data)
            }
            Err(e) => {
                warn!(key = %key, error = %e, "Failed to generate data group");
                None
            }
        }
    }

    /// The string group in the canonical language, placed on the data
    /// tile's geometry.
    async fn canonical_group(&self, strings: &TileDescriptor) -> Option<CacheEntryGroup> {
        let canonical = strings.with_language(Language::CANONICAL);
        let request = TileRequest::for_descriptor(&canonical);
        match self.generator.generate(&request).await {
            Ok(group) => Some(group),
            Err(e) => {
                warn!(descriptor = %canonical, error = %e, "Failed to get replacement tile");
                None
            }
        }
    }

    /// Remove every language of the string group and the data group.
    pub async fn purge(&self, strings: &TileDescriptor) {
        let base = TileDescriptor {
            kind: TileKind::Strings,
            ..strings.with_importance(0)
        };
        for language in Language::ALL {
            self.cache
                .invalidate(&base.with_language(language).to_string())
                .await;
        }
        self.cache.invalidate(&strings.paired_data().normalize()).await;
    }

    /// Re-check a cached string group against the cached data group.
    ///
    /// Returns `false`, after purging, when the data group is missing or
    /// disagrees; the caller then treats the hit as a miss.
    pub async fn verify_cached(&self, group: &CacheEntryGroup) -> bool {
        let Some(first) = group.get(0).and_then(TileBuffer::tile_descriptor) else {
            return true;
        };
        if first.kind != TileKind::Strings {
            return true;
        }

        let data_key = first.paired_data().normalize();
        let reason = match self.cache.lookup(&data_key).await {
            CacheLookup::Hit(data) if data.len() != group.len() => "group sizes differ",
            CacheLookup::Hit(data) => {
                let agree = data
                    .buffers()
                    .iter()
                    .zip(group.buffers())
                    .all(|(d, s)| d.checksum == s.checksum);
                if agree {
                    return true;
                }
                "checksums differ"
            }
            CacheLookup::Miss | CacheLookup::Corrupt => "data group missing",
        };

        warn!(key = %first.normalize(), data_key = %data_key, reason, "Cached string group inconsistent, purging");
        self.purge(&first).await;
        false
    }

    /// Cache a group that is not validated against anything else.
    async fn store(&self, key: &str, group: &CacheEntryGroup) -> bool {
        self.cache.store(key, group).await
    }
}
