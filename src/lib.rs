//! # tilemap-cache
//!
//! A caching layer for a vector map tile server.
//!
//! Clients ask for tiles in batches of descriptors. The server answers from a
//! memory and disk cache where it can and asks the origin renderer for the
//! rest, while keeping every text tile consistent with the geometry it was
//! placed on.
//!
//! ## Features
//!
//! - **Tiered cache**: LRU memory tier over a file-per-group disk tier, with
//!   promotion on hit and corruption detection on decode
//! - **Pairing repair**: string tiles whose checksum disagrees with their
//!   data tile are repaired from the canonical language or purged
//! - **Rights composition**: access-controlled tiles are merged per user
//!   from per-bit slices, never served partially
//! - **Time-boxed batches**: answers stop at the client's time budget or byte
//!   limit; clients re-request the rest
//!
//! ## Architecture
//!
//! - [`descriptor`] - Tile and resource descriptor grammar, rights
//! - [`store`] - Byte store tiers (memory, disk)
//! - [`tile`] - Cache, validation, composition and the batch service
//! - [`server`] - Axum-based HTTP server and routes
//! - [`config`] - CLI and configuration types
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tilemap_cache::{
//!     create_router, BitmapTable, CacheStore, RouterConfig, ServiceConfig, StaticRights,
//!     SyntheticOrigin, TileService,
//! };
//!
//! #[tokio::main]
//! async fn main() {
//!     let service = TileService::new(
//!         ServiceConfig::default(),
//!         Arc::new(CacheStore::memory_only()),
//!         Arc::new(SyntheticOrigin::default()),
//!         BitmapTable::new(),
//!         Arc::new(StaticRights::new()),
//!     );
//!     let router = create_router(service, RouterConfig::new());
//!
//!     let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await.unwrap();
//!     axum::serve(listener, router).await.unwrap();
//! }
//! ```

pub mod config;
pub mod descriptor;
pub mod error;
pub mod server;
pub mod store;
pub mod tile;

// Re-export commonly used types
pub use config::Config;
pub use descriptor::{
    Descriptor, Language, MapRights, ResourceDescriptor, RightsEvaluator, StaticRights,
    TileDescriptor, TileKind,
};
pub use error::{GenerateError, RecordError, ResourceError, StoreError};
pub use server::{create_router, AppState, ErrorResponse, RouterConfig};
pub use store::{ByteStore, DiskStore, MemoryStore};
pub use tile::{
    decode_batch, BatchReport, BatchRequest, BatchResponse, BitmapTable, CacheEntryGroup,
    CacheStore, ConsistencyValidator, RetryPolicy, RightsComposer, ServiceConfig, StopReason,
    SyntheticOrigin, TileBuffer, TileOrigin, TileRequest, TileService,
};
