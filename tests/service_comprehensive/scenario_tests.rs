//! Multi-caller scenarios

use crate::common::*;
use std::sync::{Arc, Barrier};
use std::thread;

#[test]
fn test_failure_then_finish_leaves_nothing() {
    let ts = TestService::new();
    let a = ts.open("social");
    a.begin_tx().unwrap();
    let id = a.create_node(props("name", "temp")).unwrap();
    a.tx_failure().unwrap();
    assert_eq!(a.tx_finish().unwrap(), TxOutcome::RolledBack);
    assert!(a.get_node(id).is_err());

    // The same caller can start over immediately
    a.begin_tx().unwrap();
    a.tx_finish().unwrap();
}

#[test]
fn test_failure_overrides_success() {
    let ts = TestService::new();
    let a = ts.open("social");
    a.begin_tx().unwrap();
    let id = a.create_node(Properties::new()).unwrap();
    a.tx_success().unwrap();
    a.tx_failure().unwrap();
    assert_eq!(a.tx_finish().unwrap(), TxOutcome::RolledBack);
    assert!(a.get_node(id).is_err());
}

#[test]
fn test_finish_without_marking_rolls_back() {
    let ts = TestService::new();
    let a = ts.open("social");
    a.begin_tx().unwrap();
    let id = a.create_node(Properties::new()).unwrap();
    assert_eq!(a.tx_finish().unwrap(), TxOutcome::RolledBack);
    assert!(a.get_node(id).is_err());
}

#[test]
fn test_calls_hop_across_threads() {
    let ts = TestService::new();
    let handle = Arc::new(ts.open("social"));
    handle.begin_tx().unwrap();

    let mut ids = Vec::new();
    for i in 0..6 {
        let handle = Arc::clone(&handle);
        let id = thread::spawn(move || handle.create_node(props("n", &i.to_string())).unwrap())
            .join()
            .unwrap();
        ids.push(id);
    }

    let committer = Arc::clone(&handle);
    let outcome = thread::spawn(move || {
        committer.tx_success().unwrap();
        committer.tx_finish().unwrap()
    })
    .join()
    .unwrap();
    assert_eq!(outcome, TxOutcome::Committed);

    for id in ids {
        assert!(handle.get_node(id).is_ok());
    }
}

#[test]
fn test_concurrent_callers_commit_independently() {
    let ts = Arc::new(TestService::new());
    let callers = 8;
    let barrier = Arc::new(Barrier::new(callers));

    let threads: Vec<_> = (0..callers)
        .map(|i| {
            let ts = Arc::clone(&ts);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                let handle = ts.open("shared");
                barrier.wait();
                handle.begin_tx().unwrap();
                for _ in 0..5 {
                    handle.create_node(Properties::new()).unwrap();
                }
                if i % 2 == 0 {
                    handle.tx_success().unwrap();
                }
                handle.tx_finish().unwrap()
            })
        })
        .collect();

    let committed = threads
        .into_iter()
        .map(|t| t.join().unwrap())
        .filter(|outcome| *outcome == TxOutcome::Committed)
        .count();
    assert_eq!(committed, callers / 2);

    let reader = ts.open("shared");
    assert_eq!(reader.all_nodes().unwrap().remaining(), 1 + committed * 5);
    assert!(ts.service.registry().is_empty());
}

#[test]
fn test_concurrent_same_caller_calls_never_corrupt() {
    let ts = TestService::new();
    let handle = Arc::new(ts.open("social"));
    handle.begin_tx().unwrap();
    let barrier = Arc::new(Barrier::new(4));

    let threads: Vec<_> = (0..4)
        .map(|_| {
            let handle = Arc::clone(&handle);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                (0..20)
                    .filter(|_| handle.create_node(Properties::new()).is_ok())
                    .count()
            })
        })
        .collect();
    let succeeded: usize = threads.into_iter().map(|t| t.join().unwrap()).sum();

    // Losers of a concurrent resume fail fast; winners all land in the one transaction
    assert!(succeeded >= 1);
    handle.tx_success().unwrap();
    assert_eq!(handle.tx_finish().unwrap(), TxOutcome::Committed);
    assert_eq!(handle.all_nodes().unwrap().remaining(), 1 + succeeded);
}

#[test]
fn test_data_survives_service_restart() {
    let ts = TestService::new();
    let data_dir = ts.service.config().data_dir.clone();
    let handle = ts.open("social");
    handle.begin_tx().unwrap();
    let id = handle.create_node(props("name", "alice")).unwrap();
    handle.tx_success().unwrap();
    handle.tx_finish().unwrap();
    drop(handle);
    ts.service.deactivate();

    let restarted = GraphService::activate(ServiceConfig::new(&data_dir)).unwrap();
    let handle = restarted
        .open_or_create("social", CallerContext::read_write())
        .unwrap();
    assert_eq!(
        handle.get_node(id).unwrap().property("name"),
        Some(&PropertyValue::from("alice"))
    );
}
