//! Origin generator interface.
//!
//! Map generation itself lives outside this crate. The cache consumes it
//! through [`TileOrigin`]: "produce the importance group for descriptor D".
//! [`Generator`] wraps an origin with the shared [`RetryPolicy`] and checks
//! what comes back before anything else sees it.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use serde::Serialize;

use crate::descriptor::{
    Language, MapRights, TileDescriptor, TileKind, EVENT_LAYER, MAP_LAYER, POI_LAYER,
    ROUTE_LAYER, TRAFFIC_LAYER,
};
use crate::error::GenerateError;

use super::buffer::{checksum, TileBuffer};
use super::record::CacheEntryGroup;
use super::retry::RetryPolicy;

/// Default number of importances the synthetic origin produces per group
pub const DEFAULT_IMPORTANCES: u32 = 4;

// =============================================================================
// Requests
// =============================================================================

/// What to ask the origin for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TileRequest {
    /// An ordinary tile group
    Plain(TileDescriptor),

    /// One permission slice of an access-controlled tile group. The origin
    /// sees the unsuffixed descriptor; the slice is re-applied to what it
    /// returns.
    RightsScoped {
        descriptor: TileDescriptor,
        slice: MapRights,
    },
}

impl TileRequest {
    /// Request for the group `descriptor` is cached under.
    pub fn for_descriptor(descriptor: &TileDescriptor) -> Self {
        let base = descriptor.with_importance(0);
        match base.rights {
            Some(slice) => TileRequest::RightsScoped {
                descriptor: base.without_rights(),
                slice,
            },
            None => TileRequest::Plain(base),
        }
    }

    /// Descriptor as the origin sees it, without any rights suffix.
    pub fn descriptor(&self) -> &TileDescriptor {
        match self {
            TileRequest::Plain(descriptor) => descriptor,
            TileRequest::RightsScoped { descriptor, .. } => descriptor,
        }
    }

    pub fn slice(&self) -> Option<MapRights> {
        match self {
            TileRequest::Plain(_) => None,
            TileRequest::RightsScoped { slice, .. } => Some(*slice),
        }
    }

    /// Descriptor the generated group is cached under.
    pub fn cache_descriptor(&self) -> TileDescriptor {
        match self {
            TileRequest::Plain(descriptor) => descriptor.with_importance(0),
            TileRequest::RightsScoped { descriptor, slice } => {
                descriptor.with_importance(0).with_rights(*slice)
            }
        }
    }
}

// =============================================================================
// Origin Trait
// =============================================================================

/// Producer of freshly generated tiles.
#[async_trait]
pub trait TileOrigin: Send + Sync {
    /// Generate every importance of the group `request` names, importance 0
    /// first. Returned descriptors must not carry a rights suffix.
    async fn generate(&self, request: &TileRequest) -> Result<Vec<TileBuffer>, GenerateError>;

    /// Produce the map format descriptor for a language.
    async fn format_descriptor(
        &self,
        language: Language,
        night: bool,
        server_prefix: u32,
    ) -> Result<Bytes, GenerateError>;
}

// =============================================================================
// Generator
// =============================================================================

/// Origin plus retry policy, shared by the validator, composer and service.
#[derive(Clone)]
pub struct Generator {
    origin: Arc<dyn TileOrigin>,
    policy: RetryPolicy,
}

impl Generator {
    pub fn new(origin: Arc<dyn TileOrigin>, policy: RetryPolicy) -> Self {
        Self { origin, policy }
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Generate the group for `request`, retrying failures.
    pub async fn generate(&self, request: &TileRequest) -> Result<CacheEntryGroup, GenerateError> {
        self.generate_until(request, |_| true).await
    }

    /// Generate until `accept` approves the group or attempts run out.
    pub async fn generate_until<A>(
        &self,
        request: &TileRequest,
        accept: A,
    ) -> Result<CacheEntryGroup, GenerateError>
    where
        A: Fn(&CacheEntryGroup) -> bool,
    {
        let label = request.cache_descriptor().to_string();
        self.policy
            .run_until(&label, || self.generate_once(request), accept)
            .await
    }

    async fn generate_once(&self, request: &TileRequest) -> Result<CacheEntryGroup, GenerateError> {
        let label = request.cache_descriptor().to_string();
        let buffers = self.origin.generate(request).await?;
        if buffers.is_empty() {
            return Err(GenerateError::Empty(label));
        }
        adopt_buffers(request, buffers).map_err(|reason| GenerateError::Rejected {
            descriptor: label,
            reason,
        })
    }

    pub async fn format_descriptor(
        &self,
        language: Language,
        night: bool,
        server_prefix: u32,
    ) -> Result<Bytes, GenerateError> {
        self.policy
            .run("format descriptor", || {
                self.origin.format_descriptor(language, night, server_prefix)
            })
            .await
    }
}

/// Order origin output by importance, check it belongs to the requested
/// group and re-apply the rights slice.
fn adopt_buffers(
    request: &TileRequest,
    buffers: Vec<TileBuffer>,
) -> Result<CacheEntryGroup, String> {
    let wanted = request.descriptor();
    let mut parsed = Vec::with_capacity(buffers.len());
    for buffer in buffers {
        let tile = buffer
            .tile_descriptor()
            .ok_or_else(|| format!("origin returned invalid descriptor {}", buffer.descriptor))?;
        if !tile.same_group(wanted) {
            return Err(format!("origin returned foreign descriptor {}", buffer.descriptor));
        }
        parsed.push((tile, buffer));
    }
    parsed.sort_by_key(|(tile, _)| tile.importance);

    let slice = request.slice();
    let mut group = Vec::with_capacity(parsed.len());
    for (index, (tile, mut buffer)) in parsed.into_iter().enumerate() {
        if tile.importance as usize != index {
            return Err(format!("origin skipped importance {}", index));
        }
        if let Some(slice) = slice {
            buffer.descriptor = tile.with_rights(slice).to_string();
        }
        group.push(buffer);
    }
    Ok(CacheEntryGroup::new(group))
}

// =============================================================================
// Synthetic Origin
// =============================================================================

/// Deterministic stand-in for a map renderer.
///
/// Every call for the same descriptor yields identical bytes. String tiles
/// carry the checksum of the geometry they were placed on, so a string group
/// always agrees with its data group.
#[derive(Debug, Clone)]
pub struct SyntheticOrigin {
    importances: u32,
}

#[derive(Serialize)]
struct FormatDescriptorBody<'a> {
    language: &'a str,
    night: bool,
    server_prefix: u32,
    layers: Vec<LayerEntry>,
}

#[derive(Serialize)]
struct LayerEntry {
    id: u32,
    name: &'static str,
}

impl SyntheticOrigin {
    pub fn new(importances: u32) -> Self {
        Self {
            importances: importances.max(1),
        }
    }

    fn geometry(descriptor: &TileDescriptor, slice: Option<MapRights>, importance: u32) -> Bytes {
        let base = descriptor.paired_data().with_importance(importance);
        let slice = slice.map(MapRights::bits).unwrap_or(0);
        Bytes::from(format!("geometry {} slice {}", base, slice))
    }
}

impl Default for SyntheticOrigin {
    fn default() -> Self {
        Self::new(DEFAULT_IMPORTANCES)
    }
}

#[async_trait]
impl TileOrigin for SyntheticOrigin {
    async fn generate(&self, request: &TileRequest) -> Result<Vec<TileBuffer>, GenerateError> {
        let descriptor = request.descriptor();
        let slice = request.slice();

        let buffers = (0..self.importances)
            .map(|importance| {
                let geometry = Self::geometry(descriptor, slice, importance);
                let tile = descriptor.with_importance(importance);
                match tile.kind {
                    TileKind::Data => TileBuffer::new(tile.to_string(), geometry),
                    TileKind::Strings => {
                        let labels = Bytes::from(format!(
                            "labels {} slice {}",
                            tile,
                            slice.map(MapRights::bits).unwrap_or(0)
                        ));
                        TileBuffer::with_checksum(tile.to_string(), labels, checksum(&geometry), false)
                    }
                }
            })
            .collect();
        Ok(buffers)
    }

    async fn format_descriptor(
        &self,
        language: Language,
        night: bool,
        server_prefix: u32,
    ) -> Result<Bytes, GenerateError> {
        let body = FormatDescriptorBody {
            language: language.code(),
            night,
            server_prefix,
            layers: vec![
                LayerEntry { id: MAP_LAYER, name: "map" },
                LayerEntry { id: ROUTE_LAYER, name: "route" },
                LayerEntry { id: POI_LAYER, name: "poi" },
                LayerEntry { id: TRAFFIC_LAYER, name: "traffic" },
                LayerEntry { id: EVENT_LAYER, name: "event" },
            ],
        };
        serde_json::to_vec(&body)
            .map(Bytes::from)
            .map_err(|e| GenerateError::Unavailable(e.to_string()))
    }
}
