//! Tile service layer.
//!
//! This module answers batched tile requests from a tiered cache, falling
//! back to the origin renderer for whatever is missing.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │              HTTP Handlers              │
//! └────────────────────┬────────────────────┘
//!                      │
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │              Tile Service               │
//! │  ┌──────────────┐  ┌─────────────────┐  │
//! │  │  CacheStore  │  │   Consistency   │  │
//! │  │  (encoded    │  │   Validator     │  │
//! │  │   groups)    │  │                 │  │
//! │  └──────────────┘  └─────────────────┘  │
//! │  ┌──────────────┐  ┌─────────────────┐  │
//! │  │   Rights     │  │    Resource     │  │
//! │  │   Composer   │  │    Resolver     │  │
//! │  └──────────────┘  └─────────────────┘  │
//! └────────────────────┬────────────────────┘
//!                      │
//!                      ▼
//! ┌─────────────────────────────────────────┐
//! │       Generator (TileOrigin + retry)    │
//! └─────────────────────────────────────────┘
//! ```
//!
//! # Components
//!
//! - [`TileService`]: Main entry point, runs a batch group by group
//! - [`CacheStore`]: Tiered cache of encoded [`CacheEntryGroup`]s
//! - [`ConsistencyValidator`]: Keeps string groups paired with their data group
//! - [`RightsComposer`]: Merges access-controlled tiles from per-bit slices
//! - [`ResourceResolver`]: Bitmaps and format descriptors
//! - [`Generator`]: Origin renderer behind a [`RetryPolicy`]
//! - [`BatchOutput`]: Encoder for the client stream
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use tilemap_cache::descriptor::StaticRights;
//! use tilemap_cache::tile::{
//!     BatchRequest, BitmapTable, CacheStore, ServiceConfig, SyntheticOrigin, TileService,
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
//!
//!     let response = service
//!         .get_tiles(BatchRequest::new(["G1_0_2_0_5_5", "T1_0_2_0_5_5_en"]))
//!         .await;
//!     assert_eq!(response.report.added, 2);
//! }
//! ```

mod buffer;
mod cache;
mod compose;
mod origin;
mod record;
mod resources;
mod retry;
mod service;
mod stream;
mod validator;

pub use buffer::{checksum, TileBuffer, OCEAN_PAYLOAD};
pub use cache::{CacheLookup, CacheStats, CacheStore, TierStats, KEY_NAMESPACE};
pub use compose::{merge_slices, split_merged, ComposeOutcome, RightsComposer};
pub use origin::{Generator, SyntheticOrigin, TileOrigin, TileRequest, DEFAULT_IMPORTANCES};
pub use record::CacheEntryGroup;
pub use resources::{BitmapTable, ResourceResolver};
pub use retry::{RetryPolicy, DEFAULT_MAX_ATTEMPTS};
pub use service::{
    BatchPhase, BatchReport, BatchRequest, BatchResponse, ServiceConfig, StopReason, TileService,
    DEFAULT_GROUP_SIZE, DEFAULT_TIME_BUDGET,
};
pub use stream::{decode_batch, BatchEntry, BatchOutput, PushResult};
pub use validator::{ConsistencyValidator, Validated};
