//! Batch orchestration tests.
//!
//! Tests verify:
//! - Repeated requests give identical bytes, from the cache the second time
//! - Time budget and byte limit end a batch between groups
//! - Disk tier survives a restart of the service
//! - Invalid descriptors, resources and stale prefixes

use std::sync::Arc;
use std::time::Duration;

use tilemap_cache::tile::{BatchRequest, ServiceConfig, StopReason, OCEAN_PAYLOAD};

use super::test_utils::{
    build_service, build_service_with_cache, entries, payload_for, two_tier_cache,
    CountingOrigin, SlowOrigin,
};

// =============================================================================
// Idempotence
// =============================================================================

#[tokio::test]
async fn test_repeated_batch_is_identical() {
    let origin = CountingOrigin::new();
    let service = build_service(Arc::new(origin.clone()), ServiceConfig::default());
    let descriptors = ["G1_0_2_0_5_5", "T1_0_2_1_5_5_en", "T1_0_2_0_5_5_fr"];

    let first = service.get_tiles(BatchRequest::new(descriptors)).await;
    assert_eq!(first.report.generated, 3);
    let calls = origin.calls();

    let second = service.get_tiles(BatchRequest::new(descriptors)).await;
    assert_eq!(second.report.cached, 3);
    assert_eq!(origin.calls(), calls, "second batch must not reach the origin");

    assert_eq!(first.output.into_bytes(), second.output.into_bytes());
}

#[tokio::test]
async fn test_group_members_share_one_generation() {
    let origin = CountingOrigin::new();
    let service = build_service(Arc::new(origin.clone()), ServiceConfig::default());

    let response = service
        .get_tiles(BatchRequest::new(["G1_2_5_0_9_9", "G1_2_5_1_9_9", "G1_2_5_2_9_9"]))
        .await;

    assert_eq!(response.report.added, 3);
    assert_eq!(origin.calls(), 1);
}

// =============================================================================
// Budget and Limits
// =============================================================================

#[tokio::test]
async fn test_time_budget_stops_between_groups() {
    let config = ServiceConfig {
        group_size: 1,
        ..ServiceConfig::default()
    };
    let service = build_service(Arc::new(SlowOrigin::new(Duration::from_millis(50))), config);

    let request = BatchRequest::new(["G1_0_2_0_1_1", "G1_0_2_0_2_2", "G1_0_2_0_3_3", "G1_0_2_0_4_4"])
        .with_time_budget(Duration::from_millis(20));
    let response = service.get_tiles(request).await;

    assert_eq!(response.report.stop_reason, Some(StopReason::TimeBudget));
    assert_eq!(response.report.added, 1, "the dispatched group completes");
    assert_eq!(response.report.skipped, 3);
    assert_eq!(entries(response)[0].0, "G1_0_2_0_1_1");
}

#[tokio::test]
async fn test_generous_budget_completes() {
    let config = ServiceConfig {
        group_size: 1,
        ..ServiceConfig::default()
    };
    let service = build_service(Arc::new(SlowOrigin::new(Duration::from_millis(1))), config);

    let request = BatchRequest::new(["G1_0_2_0_1_1", "G1_0_2_0_2_2"])
        .with_time_budget(Duration::from_secs(30));
    let response = service.get_tiles(request).await;

    assert_eq!(response.report.stop_reason, None);
    assert_eq!(response.report.added, 2);
}

#[tokio::test]
async fn test_byte_limit_stops_batch() {
    let service = build_service(Arc::new(CountingOrigin::new()), ServiceConfig::default());
    let request = BatchRequest::new(["G1_0_2_0_5_5", "G1_0_2_1_5_5", "G1_0_2_2_5_5"])
        .with_max_bytes(60);
    let response = service.get_tiles(request).await;

    assert_eq!(response.report.stop_reason, Some(StopReason::ByteLimit));
    assert_eq!(response.report.added, 1);
    assert!(response.output.bytes() <= 60);
}

// =============================================================================
// Tiers
// =============================================================================

#[tokio::test]
async fn test_disk_tier_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let descriptors = ["G1_0_3_0_7_7", "T1_0_3_0_7_7_de"];

    let first = build_service_with_cache(
        Arc::new(CountingOrigin::new()),
        ServiceConfig::default(),
        two_tier_cache(dir.path()),
    );
    let generated = first.get_tiles(BatchRequest::new(descriptors)).await;
    assert_eq!(generated.report.generated, 2);

    // fresh memory tier, same directory
    let origin = CountingOrigin::new();
    let second = build_service_with_cache(
        Arc::new(origin.clone()),
        ServiceConfig::default(),
        two_tier_cache(dir.path()),
    );
    let cached = second.get_tiles(BatchRequest::new(descriptors)).await;

    assert_eq!(cached.report.cached, 2);
    assert_eq!(origin.calls(), 0);
    assert_eq!(generated.output.into_bytes(), cached.output.into_bytes());
}

// =============================================================================
// Descriptor Classes
// =============================================================================

#[tokio::test]
async fn test_invalid_descriptor_gets_ocean() {
    let service = build_service(Arc::new(CountingOrigin::new()), ServiceConfig::default());
    let response = service
        .get_tiles(BatchRequest::new(["G1_0_2_0_5", "Bfuel"]))
        .await;

    let entries = entries(response);
    assert_eq!(&payload_for(&entries, "G1_0_2_0_5").unwrap()[..], OCEAN_PAYLOAD);
    assert_eq!(&payload_for(&entries, "Bfuel").unwrap()[..], b"fuel-icon");
}

#[tokio::test]
async fn test_resources_in_request_order() {
    let service = build_service(Arc::new(CountingOrigin::new()), ServiceConfig::default());
    let response = service
        .get_tiles(BatchRequest::new(["Qfuel", "Dde", "cde", "Bfuel"]))
        .await;
    assert_eq!(response.report.non_tiles, 4);

    let names: Vec<String> = entries(response).into_iter().map(|(name, _)| name).collect();
    assert_eq!(names, vec!["Qfuel", "Dde", "cde", "Bfuel"]);
}

#[tokio::test]
async fn test_stale_prefix_sends_format_descriptor() {
    let config = ServiceConfig {
        server_prefix: 4,
        ..ServiceConfig::default()
    };
    let service = build_service(Arc::new(CountingOrigin::new()), config);
    let response = service
        .get_tiles(BatchRequest::new(["G4_0_2_0_5_5", "T3_0_2_0_5_5_fr", "G4_0_2_1_5_5"]))
        .await;

    assert_eq!(response.report.stop_reason, Some(StopReason::StalePrefix));
    let entries = entries(response);
    let names: Vec<&str> = entries.iter().map(|(name, _)| name.as_str()).collect();
    assert_eq!(names, vec!["G4_0_2_0_5_5", "Dfr"]);

    let body: serde_json::Value = serde_json::from_slice(&entries[1].1).unwrap();
    assert_eq!(body["server_prefix"], 4);
    assert_eq!(body["language"], "fr");
}

#[tokio::test]
async fn test_container_descriptor_counted_failed() {
    let service = build_service(Arc::new(CountingOrigin::new()), ServiceConfig::default());
    let response = service.get_tiles(BatchRequest::new(["Nsomething"])).await;
    assert_eq!(response.report.failed, 1);
    assert!(response.output.is_empty());
}
