//! API integration tests for the HTTP surface.
//!
//! Tests verify:
//! - Batch endpoint body, headers and query parameters
//! - Error cases (non-text body, empty batch, uncacheable key)
//! - Cache statistics and invalidation endpoints

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use tower::ServiceExt;

use tilemap_cache::tile::ServiceConfig;
use tilemap_cache::{create_router, RouterConfig};

use super::test_utils::{build_service, entries_from_bytes, CountingOrigin};

fn test_router() -> Router {
    let service = build_service(Arc::new(CountingOrigin::new()), ServiceConfig::default());
    create_router(service, RouterConfig::new().with_tracing(false))
}

fn post_tiles(uri: &str, body: impl Into<Body>) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .body(body.into())
        .unwrap()
}

// =============================================================================
// Health
// =============================================================================

#[tokio::test]
async fn test_health() {
    let response = test_router()
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = response.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["status"], "healthy");
}

// =============================================================================
// Batch Endpoint
// =============================================================================

#[tokio::test]
async fn test_tiles_batch() {
    let response = test_router()
        .oneshot(post_tiles("/tiles", "G1_0_2_0_5_5\n\nT1_0_2_0_5_5_en\r\nBfuel\n"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let headers = response.headers();
    assert_eq!(headers["content-type"], "application/octet-stream");
    assert_eq!(headers["x-tiles-wanted"], "3");
    assert_eq!(headers["x-tiles-added"], "3");
    assert_eq!(headers["x-tiles-generated"], "2");
    assert!(headers.get("x-tiles-stop").is_none());

    let body = response.into_body().collect().await.unwrap().to_bytes();
    let names: Vec<String> = entries_from_bytes(&body)
        .into_iter()
        .map(|(name, _)| name)
        .collect();
    assert_eq!(names, vec!["G1_0_2_0_5_5", "T1_0_2_0_5_5_en", "Bfuel"]);
}

#[tokio::test]
async fn test_tiles_query_parameters() {
    let response = test_router()
        .oneshot(post_tiles(
            "/tiles?user=alice&max_bytes=1&budget_ms=1000",
            "G1_4_2_0_5_5\nG1_0_2_0_5_5\n",
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["x-tiles-added"], "1");
    assert_eq!(response.headers()["x-tiles-stop"], "byte_limit");

    let body = response.into_body().collect().await.unwrap().to_bytes();
    let entries = entries_from_bytes(&body);
    assert_eq!(entries[0].0, "G1_4_2_0_5_5");
    assert!(!entries[0].1.is_empty(), "alice holds rights on this layer");
}

#[tokio::test]
async fn test_tiles_rejects_binary_body() {
    let response = test_router()
        .oneshot(post_tiles("/tiles", vec![0xffu8, 0xfe, 0x00]))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body = response.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["error"], "invalid_body");
    assert_eq!(json["status"], 400);
}

#[tokio::test]
async fn test_tiles_rejects_empty_batch() {
    let response = test_router()
        .oneshot(post_tiles("/tiles", " \n\n"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_tiles_requires_post() {
    let response = test_router()
        .oneshot(Request::builder().uri("/tiles").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
}

// =============================================================================
// Cache Endpoints
// =============================================================================

#[tokio::test]
async fn test_cache_stats_and_invalidate() {
    let router = test_router();

    let response = router
        .clone()
        .oneshot(post_tiles("/tiles", "G1_0_2_1_5_5\n"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = router
        .clone()
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri("/cache/G1_0_2_1_5_5")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = response.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["key"], "G1_0_2_0_5_5");

    let response = router
        .oneshot(
            Request::builder()
                .uri("/cache/stats")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = response.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["server_prefix"], 1);
    assert_eq!(json["cache"]["stores"], 1);
    assert_eq!(json["cache"]["invalidations"], 1);
}

#[tokio::test]
async fn test_invalidate_rejects_uncacheable_key() {
    let response = test_router()
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri("/cache/Bfuel")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
