//! Zombie session termination

use crate::common::*;
use std::time::Duration;

const INTERVAL: Duration = Duration::from_millis(20);
const LIFETIME: Duration = Duration::from_millis(100);

#[test]
fn test_abandoned_session_rolled_back() {
    let ts = TestService::with_reaper(INTERVAL, LIFETIME);
    let handle = ts.open("social");
    handle.begin_tx().unwrap();
    let id = handle.create_node(props("name", "ghost")).unwrap();
    handle.tx_success().unwrap();

    // The caller goes away without finishing
    assert!(wait_until(Duration::from_secs(5), || !handle.has_transaction()));
    assert!(handle.get_node(id).is_err(), "abandoned work never commits");
    assert!(ts.service.reaper().reaped_count() >= 1);

    let err = handle.tx_finish().unwrap_err();
    assert_eq!(err.code, ErrorCode::Transaction);
}

#[test]
fn test_active_session_survives() {
    let ts = TestService::with_reaper(INTERVAL, Duration::from_millis(300));
    let handle = ts.open("social");
    handle.begin_tx().unwrap();

    // Keep touching the session well inside the deadline
    for _ in 0..10 {
        handle.create_node(Properties::new()).unwrap();
        std::thread::sleep(Duration::from_millis(50));
    }
    assert!(handle.has_transaction());
    handle.tx_success().unwrap();
    assert_eq!(handle.tx_finish().unwrap(), TxOutcome::Committed);
    assert_eq!(handle.all_nodes().unwrap().remaining(), 11);
}

#[test]
fn test_reaper_releases_database() {
    let ts = TestService::with_reaper(INTERVAL, LIFETIME);
    {
        let handle = ts.open("social");
        handle.begin_tx().unwrap();
    }
    // Only the parked session keeps the instance alive
    assert!(ts.service.is_database_open("social").unwrap());
    assert!(wait_until(Duration::from_secs(5), || ts.service.registry().is_empty()));
    assert!(!ts.service.is_database_open("social").unwrap());
    assert!(ts.service.delete_database("social").unwrap());
}

#[test]
fn test_sweep_now_uses_configured_lifetime() {
    let ts = TestService::new();
    let handle = ts.open("social");
    handle.begin_tx().unwrap();

    assert!(ts.service.sweep_now().is_empty());
    assert!(handle.has_transaction());
    handle.tx_finish().unwrap();
}

#[test]
fn test_many_zombies_in_one_sweep() {
    let ts = TestService::with_reaper(INTERVAL, LIFETIME);
    let handles: Vec<_> = (0..8).map(|_| ts.open("social")).collect();
    for handle in &handles {
        handle.begin_tx().unwrap();
        handle.create_node(Properties::new()).unwrap();
    }
    assert_eq!(ts.service.registry().len(), 8);

    assert!(wait_until(Duration::from_secs(5), || ts.service.registry().is_empty()));
    assert_eq!(handles[0].all_nodes().unwrap().remaining(), 1);
}
