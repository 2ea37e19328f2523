//! Integration tests for tilemap-cache.
//!
//! These tests verify end-to-end functionality including:
//! - Batch answers from cache and origin, time budget and byte limit
//! - String/data pairing, repair and purge
//! - Rights composition per user
//! - The HTTP surface

mod integration {
    pub mod test_utils;

    pub mod api_tests;
    pub mod batch_tests;
    pub mod consistency_tests;
    pub mod rights_tests;
}
