//! HTTP request handlers for the tile batch API.
//!
//! # Endpoints
//!
//! - `POST /tiles` - Answer a batch of descriptors
//! - `GET /cache/stats` - Cache counters and tier usage
//! - `DELETE /cache/{key}` - Invalidate one cached group
//! - `GET /health` - Health check endpoint

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::{Body, Bytes},
    extract::{Path, Query, State},
    http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::tile::{BatchReport, BatchRequest, CacheStats, TileService};

/// Upper bound on descriptors accepted in one batch
pub const MAX_BATCH_DESCRIPTORS: usize = 10_000;

// =============================================================================
// Application State
// =============================================================================

/// Shared application state containing the tile service.
///
/// This is passed to all handlers via Axum's State extractor.
#[derive(Clone)]
pub struct AppState {
    pub tile_service: Arc<TileService>,
}

impl AppState {
    pub fn new(tile_service: TileService) -> Self {
        Self {
            tile_service: Arc::new(tile_service),
        }
    }
}

// =============================================================================
// Request Parameters
// =============================================================================

/// Query parameters for batch requests.
#[derive(Debug, Default, Deserialize)]
pub struct TilesQueryParams {
    /// User whose rights apply; anonymous if absent
    #[serde(default)]
    pub user: Option<String>,

    /// Time budget in milliseconds (defaults to the server setting)
    #[serde(default)]
    pub budget_ms: Option<u64>,

    /// Output byte limit (defaults to the server setting)
    #[serde(default)]
    pub max_bytes: Option<usize>,
}

// =============================================================================
// Response Types
// =============================================================================

/// JSON error response returned for all error conditions.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Error type identifier (e.g., "invalid_body", "invalid_key")
    pub error: String,

    /// Human-readable error message
    pub message: String,

    /// HTTP status code (included for convenience)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
            status: None,
        }
    }

    pub fn with_status(
        error: impl Into<String>,
        message: impl Into<String>,
        status: StatusCode,
    ) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
            status: Some(status.as_u16()),
        }
    }
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Response from the cache statistics endpoint.
#[derive(Debug, Serialize)]
pub struct CacheStatsResponse {
    pub server_prefix: u32,
    pub cache: CacheStats,
}

/// Response from the invalidation endpoint.
#[derive(Debug, Serialize)]
pub struct InvalidateResponse {
    pub key: String,
}

// =============================================================================
// Error Mapping
// =============================================================================

/// Errors surfaced to HTTP clients. Per-tile problems never get here; they
/// become placeholders or omissions in the batch.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Request body is not UTF-8 text")]
    InvalidBody,

    #[error("Request body contains no descriptors")]
    EmptyBatch,

    #[error("Batch of {count} descriptors exceeds the limit of {max}")]
    BatchTooLarge { count: usize, max: usize },

    #[error("Not a cacheable descriptor: {0}")]
    InvalidKey(String),
}

impl ApiError {
    fn error_type(&self) -> &'static str {
        match self {
            ApiError::InvalidBody => "invalid_body",
            ApiError::EmptyBatch => "empty_batch",
            ApiError::BatchTooLarge { .. } => "batch_too_large",
            ApiError::InvalidKey(_) => "invalid_key",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            ApiError::BatchTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            _ => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let error_type = self.error_type();
        let message = self.to_string();

        warn!(
            error_type = error_type,
            status = status.as_u16(),
            "Client error: {}",
            message
        );

        let error_response = ErrorResponse::with_status(error_type, message, status);
        (status, Json(error_response)).into_response()
    }
}

// =============================================================================
// Handlers
// =============================================================================

/// Handle batch requests.
///
/// # Endpoint
///
/// `POST /tiles`
///
/// The body lists one descriptor per line. Blank lines are ignored.
///
/// # Query Parameters
///
/// - `user`: User whose rights apply
/// - `budget_ms`: Time budget in milliseconds
/// - `max_bytes`: Output byte limit
///
/// # Response
///
/// - `200 OK`: Batch stream with `Content-Type: application/octet-stream`
/// - `400 Bad Request`: Body is not text or lists no descriptors
/// - `413 Payload Too Large`: Too many descriptors
///
/// # Headers
///
/// - `X-Tiles-Wanted`, `X-Tiles-Added`, `X-Tiles-Cached`,
///   `X-Tiles-Generated`, `X-Tiles-Failed`, `X-Tiles-Skipped`
/// - `X-Tiles-Stop`: Why the batch ended early, if it did
pub async fn tiles_handler(
    State(state): State<AppState>,
    Query(query): Query<TilesQueryParams>,
    body: Bytes,
) -> Result<Response, ApiError> {
    let text = std::str::from_utf8(&body).map_err(|_| ApiError::InvalidBody)?;
    let descriptors: Vec<String> = text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect();

    if descriptors.is_empty() {
        return Err(ApiError::EmptyBatch);
    }
    if descriptors.len() > MAX_BATCH_DESCRIPTORS {
        return Err(ApiError::BatchTooLarge {
            count: descriptors.len(),
            max: MAX_BATCH_DESCRIPTORS,
        });
    }

    let mut request = BatchRequest::new(descriptors);
    request.user = query.user;
    request.time_budget = query.budget_ms.map(Duration::from_millis);
    request.max_bytes = query.max_bytes;

    let response = state.tile_service.get_tiles(request).await;
    debug!(bytes = response.output.bytes(), "Sending batch");

    let mut headers = report_headers(&response.report);
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/octet-stream"),
    );
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));

    Ok((
        StatusCode::OK,
        headers,
        Body::from(response.output.into_bytes()),
    )
        .into_response())
}

/// `X-Tiles-*` headers describing a batch.
pub fn report_headers(report: &BatchReport) -> HeaderMap {
    let mut headers = HeaderMap::new();
    for (name, value) in [
        ("x-tiles-wanted", report.wanted),
        ("x-tiles-added", report.added),
        ("x-tiles-cached", report.cached),
        ("x-tiles-generated", report.generated),
        ("x-tiles-failed", report.failed),
        ("x-tiles-skipped", report.skipped),
    ] {
        headers.insert(HeaderName::from_static(name), HeaderValue::from(value));
    }
    if let Some(stop) = report.stop_reason {
        headers.insert(
            HeaderName::from_static("x-tiles-stop"),
            HeaderValue::from_static(stop.as_str()),
        );
    }
    headers
}

/// Handle cache statistics requests.
///
/// # Endpoint
///
/// `GET /cache/stats`
pub async fn cache_stats_handler(State(state): State<AppState>) -> Json<CacheStatsResponse> {
    Json(CacheStatsResponse {
        server_prefix: state.tile_service.config().server_prefix,
        cache: state.tile_service.cache_stats().await,
    })
}

/// Handle invalidation requests.
///
/// # Endpoint
///
/// `DELETE /cache/{key}`
///
/// `key` is any descriptor of the group; the group's cache key is derived
/// from it.
pub async fn invalidate_handler(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<InvalidateResponse>, ApiError> {
    match state.tile_service.invalidate(&key).await {
        Some(key) => Ok(Json(InvalidateResponse { key })),
        None => Err(ApiError::InvalidKey(key)),
    }
}

/// Handle health check requests.
///
/// # Endpoint
///
/// `GET /health`
///
/// # Response
///
/// `200 OK` with JSON body:
/// ```json
/// {
///   "status": "healthy",
///   "version": "0.1.0"
/// }
/// ```
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// =============================================================================
// Tests
// =============================================================================
