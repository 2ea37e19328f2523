//! HTTP server layer for tilemap-cache.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                         HTTP Layer                              │
//! │           POST /tiles   GET /cache/stats   DELETE /cache/{key}  │
//! │                                                                 │
//! │  ┌──────────────────────────┐  ┌─────────────────────────────┐  │
//! │  │        handlers          │  │           routes            │  │
//! │  │ (batch, stats, purge)    │  │   (router config, CORS)     │  │
//! │  └──────────────────────────┘  └─────────────────────────────┘  │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

pub mod handlers;
pub mod routes;

pub use handlers::{
    cache_stats_handler, health_handler, invalidate_handler, report_headers, tiles_handler,
    ApiError, AppState, CacheStatsResponse, ErrorResponse, HealthResponse, InvalidateResponse,
    TilesQueryParams, MAX_BATCH_DESCRIPTORS,
};
pub use routes::{create_router, RouterConfig};
