//! Rights composition tests.
//!
//! Tests verify:
//! - A composed tile contains exactly the slices the user holds
//! - A missing slice yields a placeholder, never a partial merge
//! - Users without rights and unheld explicit slices get placeholders

use std::sync::Arc;

use tilemap_cache::descriptor::MapRights;
use tilemap_cache::tile::{split_merged, BatchRequest, CacheLookup, ServiceConfig};

use super::test_utils::{build_service, entries, payload_for, CountingOrigin, GappyOrigin};

#[tokio::test]
async fn test_composition_holds_every_user_slice() {
    let service = build_service(Arc::new(CountingOrigin::new()), ServiceConfig::default());

    let response = service
        .get_tiles(BatchRequest::new(["G1_4_2_1_5_5"]).with_user("alice"))
        .await;
    assert_eq!(response.report.generated, 1);

    let entries = entries(response);
    let merged = payload_for(&entries, "G1_4_2_1_5_5").unwrap();
    let parts = split_merged(merged).unwrap();

    // alice holds bits 1 and 4, lowest first
    let slice1 = service.cache().lookup("G1_4_2_0_5_5.1").await.into_hit().unwrap();
    let slice4 = service.cache().lookup("G1_4_2_0_5_5.4").await.into_hit().unwrap();
    assert_eq!(
        parts,
        vec![
            slice1.get(1).unwrap().payload.clone(),
            slice4.get(1).unwrap().payload.clone()
        ]
    );

    // merged tiles depend on the user and are never cached whole
    assert_eq!(service.cache().lookup("G1_4_2_0_5_5").await, CacheLookup::Miss);
}

#[tokio::test]
async fn test_users_see_different_compositions() {
    let service = build_service(Arc::new(CountingOrigin::new()), ServiceConfig::default());

    let alice = entries(
        service
            .get_tiles(BatchRequest::new(["T1_4_2_0_5_5_en"]).with_user("alice"))
            .await,
    );
    let bob = entries(
        service
            .get_tiles(BatchRequest::new(["T1_4_2_0_5_5_en"]).with_user("bob"))
            .await,
    );

    assert_eq!(split_merged(&alice[0].1).unwrap().len(), 2);
    assert_eq!(split_merged(&bob[0].1).unwrap().len(), 1);
    assert_ne!(alice[0].1, bob[0].1);
}

#[tokio::test]
async fn test_missing_slice_gives_placeholder() {
    let origin = GappyOrigin::new(MapRights::new(4));
    let service = build_service(Arc::new(origin), ServiceConfig::default());

    let response = service
        .get_tiles(BatchRequest::new(["G1_4_2_0_5_5"]).with_user("alice"))
        .await;
    assert_eq!(response.report.placeholders, 1);

    let entries = entries(response);
    assert!(payload_for(&entries, "G1_4_2_0_5_5").unwrap().is_empty());

    // the slice that could be generated is still cached for next time
    assert!(service
        .cache()
        .lookup("G1_4_2_0_5_5.1")
        .await
        .into_hit()
        .is_some());
}

#[tokio::test]
async fn test_anonymous_user_gets_placeholder() {
    let origin = CountingOrigin::new();
    let service = build_service(Arc::new(origin.clone()), ServiceConfig::default());

    let response = service.get_tiles(BatchRequest::new(["G1_4_2_0_5_5"])).await;
    assert_eq!(response.report.placeholders, 1);
    assert_eq!(origin.calls(), 0);
}

#[tokio::test]
async fn test_explicit_slice_requires_rights() {
    let service = build_service(Arc::new(CountingOrigin::new()), ServiceConfig::default());

    let held = service
        .get_tiles(BatchRequest::new(["G1_4_2_0_5_5.4"]).with_user("alice"))
        .await;
    assert_eq!(held.report.generated, 1);
    let held = entries(held);
    assert_eq!(
        payload_for(&held, "G1_4_2_0_5_5.4").unwrap(),
        &bytes::Bytes::from("geometry G1_4_2_0_5_5 slice 4")
    );

    let unheld = service
        .get_tiles(BatchRequest::new(["G1_4_2_0_5_5.2"]).with_user("alice"))
        .await;
    assert_eq!(unheld.report.placeholders, 1);
    assert!(entries(unheld)[0].1.is_empty());
}

#[tokio::test]
async fn test_acp_slices_limited_by_configured_rights() {
    let config = ServiceConfig {
        acp_rights: MapRights::new(0b100),
        ..ServiceConfig::default()
    };
    let service = build_service(Arc::new(CountingOrigin::new()), config);

    let response = service
        .get_tiles(BatchRequest::new(["G1_4_2_0_5_5"]).with_user("alice"))
        .await;
    let entries = entries(response);
    let parts = split_merged(payload_for(&entries, "G1_4_2_0_5_5").unwrap()).unwrap();
    assert_eq!(parts.len(), 1);
}
