//! Service Comprehensive Test Suite
//!
//! Exercises the service layer end to end through the public `graphd`
//! facade: one activated `GraphService` per test over a temp directory.
//!
//! ## Test Organization
//!
//! - `registry_tests.rs` - session registry properties (proptest)
//! - `cache_tests.rs` - open/shutdown/delete/export/list through the service
//! - `call_protocol_tests.rs` - the per-call envelope, permissions, cursors
//! - `reaper_tests.rs` - zombie session termination
//! - `scenario_tests.rs` - multi-caller scenarios across threads
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test --test service_comprehensive
//!
//! # With engine/session logging
//! GRAPHD_TEST_LOG=debug cargo test --test service_comprehensive -- --nocapture
//! ```

#[path = "../common/mod.rs"]
mod common;

mod cache_tests;
mod call_protocol_tests;
mod reaper_tests;
mod registry_tests;
mod scenario_tests;
