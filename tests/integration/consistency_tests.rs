//! String/data pairing tests.
//!
//! Tests verify:
//! - Cached string groups always agree with their cached data group
//! - A mismatching string tile is repaired from the canonical language
//! - An unrepairable group is purged and answered with a placeholder
//! - Inconsistent cache contents are caught on a hit

use std::sync::Arc;

use bytes::Bytes;
use tilemap_cache::descriptor::Language;
use tilemap_cache::tile::{BatchRequest, CacheEntryGroup, CacheLookup, ServiceConfig, TileBuffer};

use super::test_utils::{build_service, entries, payload_for, CountingOrigin, SkewedOrigin};

#[tokio::test]
async fn test_cached_strings_agree_with_data() {
    let service = build_service(Arc::new(CountingOrigin::new()), ServiceConfig::default());
    service
        .get_tiles(BatchRequest::new(["T1_0_4_0_3_3_it", "T1_0_4_0_3_3_pl"]))
        .await;

    let data = service
        .cache()
        .lookup("G1_0_4_0_3_3")
        .await
        .into_hit()
        .unwrap();
    for key in ["T1_0_4_0_3_3_it", "T1_0_4_0_3_3_pl"] {
        let strings = service.cache().lookup(key).await.into_hit().unwrap();
        assert_eq!(strings.len(), data.len());
        for (s, d) in strings.buffers().iter().zip(data.buffers()) {
            assert_eq!(s.checksum, d.checksum, "{} out of step with geometry", s.descriptor);
        }
    }
}

#[tokio::test]
async fn test_mismatch_repaired_from_canonical_language() {
    let origin = SkewedOrigin::new(1, [Language::German]);
    let service = build_service(Arc::new(origin), ServiceConfig::default());

    let response = service
        .get_tiles(BatchRequest::new(["T1_0_2_1_5_5_de"]))
        .await;
    assert_eq!(response.report.generated, 1);

    let entries = entries(response);
    assert_eq!(
        payload_for(&entries, "T1_0_2_1_5_5_de").unwrap(),
        &Bytes::from("labels T1_0_2_1_5_5_sv slice 0")
    );

    // the repaired group is consistent, so it was cached
    let cached = service
        .cache()
        .lookup("T1_0_2_0_5_5_de")
        .await
        .into_hit()
        .unwrap();
    assert_eq!(cached.get(1).unwrap().descriptor, "T1_0_2_1_5_5_de");
}

#[tokio::test]
async fn test_unrepairable_group_purged() {
    let origin = SkewedOrigin::new(1, Language::ALL);
    let service = build_service(Arc::new(origin), ServiceConfig::default());

    let response = service
        .get_tiles(BatchRequest::new(["T1_0_2_0_5_5_en", "T1_0_2_1_5_5_en"]))
        .await;
    assert_eq!(response.report.added, 2);
    assert_eq!(response.report.placeholders, 1);

    let entries = entries(response);
    assert!(!payload_for(&entries, "T1_0_2_0_5_5_en").unwrap().is_empty());
    assert!(payload_for(&entries, "T1_0_2_1_5_5_en").unwrap().is_empty());

    let cache = service.cache();
    assert_eq!(cache.lookup("T1_0_2_0_5_5_en").await, CacheLookup::Miss);
    assert_eq!(cache.lookup("T1_0_2_0_5_5_sv").await, CacheLookup::Miss);
    assert_eq!(cache.lookup("G1_0_2_0_5_5").await, CacheLookup::Miss);
}

#[tokio::test]
async fn test_inconsistent_hit_regenerated() {
    let service = build_service(Arc::new(CountingOrigin::new()), ServiceConfig::default());

    // plant a string group whose checksums match nothing
    let planted = CacheEntryGroup::new(
        (0..3)
            .map(|i| {
                TileBuffer::with_checksum(
                    format!("T1_0_2_{}_5_5_nl", i),
                    Bytes::from_static(b"stale labels"),
                    0x1234_5678,
                    false,
                )
            })
            .collect(),
    );
    assert!(service.cache().store("T1_0_2_0_5_5_nl", &planted).await);

    let response = service
        .get_tiles(BatchRequest::new(["T1_0_2_2_5_5_nl"]))
        .await;
    assert_eq!(response.report.cached, 0);
    assert_eq!(response.report.generated, 1);

    let entries = entries(response);
    assert_eq!(
        payload_for(&entries, "T1_0_2_2_5_5_nl").unwrap(),
        &Bytes::from("labels T1_0_2_2_5_5_nl slice 0")
    );
}

#[tokio::test]
async fn test_hit_not_verified_when_disabled() {
    let config = ServiceConfig {
        verify_cached: false,
        ..ServiceConfig::default()
    };
    let service = build_service(Arc::new(CountingOrigin::new()), config);

    let planted = CacheEntryGroup::single(TileBuffer::with_checksum(
        "T1_0_2_0_5_5_nl",
        Bytes::from_static(b"stale labels"),
        7,
        false,
    ));
    service.cache().store("T1_0_2_0_5_5_nl", &planted).await;

    let response = service
        .get_tiles(BatchRequest::new(["T1_0_2_0_5_5_nl"]))
        .await;
    assert_eq!(response.report.cached, 1);
    assert_eq!(
        payload_for(&entries(response), "T1_0_2_0_5_5_nl").unwrap(),
        &Bytes::from_static(b"stale labels")
    );
}
