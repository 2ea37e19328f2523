//! Tile descriptors.
//!
//! A tile descriptor names one rendered map fragment. Its text form is both
//! the request key sent by clients and, normalized to importance 0, the key
//! under which the whole importance group is cached:
//!
//! ```text
//! G<prefix>_<layer>_<detail>_<importance>_<lat>_<lon>[_r<route>][.<rights>]
//! T<prefix>_<layer>_<detail>_<importance>_<lat>_<lon>_<lang>[_r<route>][.<rights>]
//! ```

use std::fmt;

use super::language::Language;
use super::rights::MapRights;

/// Layer carrying base geometry.
pub const MAP_LAYER: u32 = 0;

/// Layer of route-bound tiles; these carry a route id and are never cached.
pub const ROUTE_LAYER: u32 = 1;

/// Points-of-interest layer.
pub const POI_LAYER: u32 = 2;

/// Live traffic layer; changes too fast to be cached.
pub const TRAFFIC_LAYER: u32 = 3;

/// Default layer of rights-scoped (access-controlled) tiles.
pub const DEFAULT_ACP_LAYER: u32 = 4;

/// Event layer.
pub const EVENT_LAYER: u32 = 5;

/// Highest accepted layer number.
pub const MAX_LAYER: u32 = 15;

/// Highest accepted detail level.
pub const MAX_DETAIL_LEVEL: u32 = 20;

/// Highest accepted importance.
pub const MAX_IMPORTANCE: u32 = 31;

/// Longest accepted route id.
const MAX_ROUTE_LEN: usize = 64;

/// Geometry or label payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TileKind {
    /// Geometry ("data") tile, tag `G`
    Data,
    /// Per-language label ("string") tile, tag `T`
    Strings,
}

impl TileKind {
    pub fn tag(self) -> char {
        match self {
            TileKind::Data => 'G',
            TileKind::Strings => 'T',
        }
    }

    fn from_tag(tag: char) -> Option<TileKind> {
        match tag {
            'G' => Some(TileKind::Data),
            'T' => Some(TileKind::Strings),
            _ => None,
        }
    }
}

/// Opaque identifier of the route a route-layer tile belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RouteId(String);

impl RouteId {
    /// Accepts non-empty ASCII alphanumeric ids (dashes allowed).
    pub fn new(id: &str) -> Option<RouteId> {
        let valid = !id.is_empty()
            && id.len() <= MAX_ROUTE_LEN
            && id.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-');
        valid.then(|| RouteId(id.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RouteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// =============================================================================
// TileDescriptor
// =============================================================================

/// Parsed geometry or string tile descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TileDescriptor {
    pub kind: TileKind,
    pub server_prefix: u32,
    pub layer: u32,
    pub detail_level: u32,
    pub importance: u32,
    pub lat_index: i32,
    pub lon_index: i32,
    /// Always [`Language::CANONICAL`] for data tiles
    pub language: Language,
    pub route: Option<RouteId>,
    pub rights: Option<MapRights>,
}

impl TileDescriptor {
    /// A data tile at importance 0.
    pub fn data(server_prefix: u32, layer: u32, detail_level: u32, lat: i32, lon: i32) -> Self {
        Self {
            kind: TileKind::Data,
            server_prefix,
            layer,
            detail_level,
            importance: 0,
            lat_index: lat,
            lon_index: lon,
            language: Language::CANONICAL,
            route: None,
            rights: None,
        }
    }

    /// A string tile at importance 0.
    pub fn strings(
        server_prefix: u32,
        layer: u32,
        detail_level: u32,
        lat: i32,
        lon: i32,
        language: Language,
    ) -> Self {
        Self {
            kind: TileKind::Strings,
            language,
            ..Self::data(server_prefix, layer, detail_level, lat, lon)
        }
    }

    /// Parse a tile descriptor.
    ///
    /// Returns `None` for anything that is not the canonical text of a tile,
    /// including numbers with leading zeros or a `+` sign.
    pub fn parse(text: &str) -> Option<TileDescriptor> {
        let (base, rights) = match text.rfind('.') {
            Some(pos) => (&text[..pos], Some(MapRights::parse_suffix(&text[pos + 1..])?)),
            None => (text, None),
        };

        let kind = TileKind::from_tag(base.chars().next()?)?;
        let mut fields = base[1..].split('_');

        let server_prefix = fields.next()?.parse().ok()?;
        let layer: u32 = fields.next()?.parse().ok()?;
        let detail_level: u32 = fields.next()?.parse().ok()?;
        let importance: u32 = fields.next()?.parse().ok()?;
        let lat_index = fields.next()?.parse().ok()?;
        let lon_index = fields.next()?.parse().ok()?;

        let language = match kind {
            TileKind::Strings => Language::from_code(fields.next()?)?,
            TileKind::Data => Language::CANONICAL,
        };

        let route = match fields.next() {
            Some(field) => Some(RouteId::new(field.strip_prefix('r')?)?),
            None => None,
        };

        if fields.next().is_some()
            || layer > MAX_LAYER
            || detail_level > MAX_DETAIL_LEVEL
            || importance > MAX_IMPORTANCE
            || route.is_some() != (layer == ROUTE_LAYER)
        {
            return None;
        }

        let descriptor = TileDescriptor {
            kind,
            server_prefix,
            layer,
            detail_level,
            importance,
            lat_index,
            lon_index,
            language,
            route,
            rights,
        };

        (descriptor.to_string() == text).then_some(descriptor)
    }

    /// The group cache key: canonical text at importance 0, rights kept.
    pub fn normalize(&self) -> String {
        self.with_importance(0).to_string()
    }

    /// Whether two descriptors belong to the same importance group.
    pub fn same_group(&self, other: &TileDescriptor) -> bool {
        self.with_importance(0) == other.with_importance(0)
    }

    /// Route-bound and live-traffic tiles are never persisted.
    pub fn is_cacheable(&self) -> bool {
        self.route.is_none() && self.layer != TRAFFIC_LAYER
    }

    /// Whether this descriptor still has to be split into rights slices.
    pub fn needs_rights_split(&self, acp_layer: u32) -> bool {
        self.layer == acp_layer && self.rights.is_none()
    }

    /// The data group a string group must agree with.
    pub fn paired_data(&self) -> TileDescriptor {
        TileDescriptor {
            kind: TileKind::Data,
            language: Language::CANONICAL,
            importance: 0,
            ..self.clone()
        }
    }

    /// Same tile in another language. Data tiles stay canonical.
    pub fn with_language(&self, language: Language) -> TileDescriptor {
        let language = match self.kind {
            TileKind::Data => Language::CANONICAL,
            TileKind::Strings => language,
        };
        TileDescriptor {
            language,
            ..self.clone()
        }
    }

    pub fn with_importance(&self, importance: u32) -> TileDescriptor {
        TileDescriptor {
            importance,
            ..self.clone()
        }
    }

    pub fn with_rights(&self, rights: MapRights) -> TileDescriptor {
        TileDescriptor {
            rights: (!rights.is_empty()).then_some(rights),
            ..self.clone()
        }
    }

    pub fn without_rights(&self) -> TileDescriptor {
        TileDescriptor {
            rights: None,
            ..self.clone()
        }
    }
}

impl fmt::Display for TileDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{}_{}_{}_{}_{}_{}",
            self.kind.tag(),
            self.server_prefix,
            self.layer,
            self.detail_level,
            self.importance,
            self.lat_index,
            self.lon_index
        )?;
        if self.kind == TileKind::Strings {
            write!(f, "_{}", self.language)?;
        }
        if let Some(route) = &self.route {
            write!(f, "_r{}", route)?;
        }
        if let Some(rights) = self.rights {
            write!(f, ".{}", rights)?;
        }
        Ok(())
    }
}
