//! Descriptor parsing and cache-key normalization.
//!
//! Every request a client makes is a short ASCII descriptor whose first
//! character selects the kind:
//!
//! | Tag | Kind |
//! |-----|------|
//! | `G` | geometry (data) tile |
//! | `T` | label (string) tile, per language |
//! | `B` / `Q` / `q` | bitmap icon (normal / large / small) |
//! | `D` / `d` | format descriptor (day / night) |
//! | `C` / `c` | format descriptor checksum |
//! | `N` | multi-buffer container |
//!
//! Parsing is strict: only canonical text is accepted, anything else is
//! [`Descriptor::Invalid`] and is answered with a placeholder tile.

mod kind;
mod language;
mod params;
mod rights;

pub use kind::{BitmapSize, Descriptor, ResourceDescriptor};
pub use language::Language;
pub use params::{
    RouteId, TileDescriptor, TileKind, DEFAULT_ACP_LAYER, EVENT_LAYER, MAP_LAYER,
    MAX_DETAIL_LEVEL, MAX_IMPORTANCE, MAX_LAYER, POI_LAYER, ROUTE_LAYER, TRAFFIC_LAYER,
};
pub use rights::{MapRights, RightsEvaluator, StaticRights};
