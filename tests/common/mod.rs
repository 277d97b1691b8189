//! Shared test utilities for the integration suites.
//!
//! Import via `#[path = "../common/mod.rs"] mod common;` from a suite's main.rs.

#![allow(dead_code)]
#![allow(unused_imports)]

use std::sync::Once;
use std::time::{Duration, Instant};
pub use graphd::{
    CallError, CallerContext, DbHandle, ErrorCode, GraphService, NodeId, Properties,
    PropertyValue, ServiceConfig, TxOutcome,
};
use tempfile::TempDir;

static INIT_TRACING: Once = Once::new();

/// Route `tracing` output through the test harness writer.
///
/// Set `RUST_LOG`-style filtering via `GRAPHD_TEST_LOG=debug` when needed.
pub fn init_tracing() {
    INIT_TRACING.call_once(|| {
        let level = match std::env::var("GRAPHD_TEST_LOG").as_deref() {
            Ok("trace") => tracing::Level::TRACE,
            Ok("debug") => tracing::Level::DEBUG,
            Ok("info") => tracing::Level::INFO,
            _ => tracing::Level::WARN,
        };
        let _ = tracing_subscriber::fmt()
            .with_max_level(level)
            .with_test_writer()
            .try_init();
    });
}

// ============================================================================
// TestService - activated service over a temp directory
// ============================================================================

/// Activated service whose data directory is removed on drop
pub struct TestService {
    pub service: GraphService,
    pub dir: TempDir,
}

impl TestService {
    /// Service with a long session lifetime; the reaper never fires.
    pub fn new() -> Self {
        Self::with_config(|cfg| cfg)
    }

    /// Service with an aggressive reaper.
    pub fn with_reaper(interval: Duration, lifetime: Duration) -> Self {
        Self::with_config(|cfg| cfg.reaper_interval(interval).max_session_lifetime(lifetime))
    }

    /// Service with a customized configuration
    pub fn with_config(f: impl FnOnce(ServiceConfig) -> ServiceConfig) -> Self {
        init_tracing();
        let dir = TempDir::new().expect("temp dir");
        let base = ServiceConfig::new(dir.path().join("data"))
            .reaper_interval(Duration::from_millis(50))
            .max_session_lifetime(Duration::from_secs(600));
        let service = GraphService::activate(f(base)).expect("activate");
        Self { service, dir }
    }

    /// Read/write handle on `name`
    pub fn open(&self, name: &str) -> DbHandle {
        self.service
            .open_or_create(name, CallerContext::read_write())
            .expect("open_or_create")
    }
}

/// Properties with a single string entry
pub fn props(key: &str, value: &str) -> Properties {
    let mut props = Properties::new();
    props.insert(key.to_string(), PropertyValue::from(value));
    props
}

/// Poll `f` until it holds or `deadline` passes
pub fn wait_until(deadline: Duration, mut f: impl FnMut() -> bool) -> bool {
    let start = Instant::now();
    while start.elapsed() < deadline {
        if f() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    f()
}
