//! Session registry properties
//!
//! A random sequence of registry calls over a handful of callers must agree
//! with a trivial model: the set of callers that currently have a session.

use graphd::{CallerId, GraphDatabase, Properties, SessionError, SessionRegistry, TxOutcome};
use proptest::prelude::*;
use std::collections::HashSet;

#[derive(Debug, Clone)]
enum Op {
    Begin(usize),
    Write(usize),
    ResumeIfPresent(usize),
    Commit(usize),
    Finish(usize),
}

fn op() -> impl Strategy<Value = Op> {
    let caller = 0..4usize;
    prop_oneof![
        caller.clone().prop_map(Op::Begin),
        caller.clone().prop_map(Op::Write),
        caller.clone().prop_map(Op::ResumeIfPresent),
        caller.clone().prop_map(Op::Commit),
        caller.prop_map(Op::Finish),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn registry_matches_model(ops in proptest::collection::vec(op(), 1..40)) {
        let db = GraphDatabase::in_memory();
        let registry = SessionRegistry::new();
        let callers: Vec<CallerId> = (0..4).map(|_| CallerId::new()).collect();
        let mut model: HashSet<usize> = HashSet::new();
        let mut committed_writes = 0usize;
        let mut pending: Vec<usize> = vec![0; 4];

        for op in ops {
            match op {
                Op::Begin(i) => {
                    let result = registry.begin(callers[i], &db);
                    if model.contains(&i) {
                        prop_assert!(matches!(result, Err(SessionError::AlreadyAssociated(_))));
                    } else {
                        prop_assert!(result.is_ok());
                        model.insert(i);
                        pending[i] = 0;
                    }
                }
                Op::Write(i) => {
                    let result = registry.resume(callers[i]);
                    if model.contains(&i) {
                        prop_assert!(result.is_ok());
                        db.create_node(Properties::new()).unwrap();
                        pending[i] += 1;
                        registry.suspend(callers[i], "create_node");
                    } else {
                        prop_assert!(
                            matches!(result, Err(SessionError::NoAssociatedSession(_))),
                            "resume without session must fail"
                        );
                    }
                }
                Op::ResumeIfPresent(i) => {
                    let tx = registry.resume_if_present(callers[i]).unwrap();
                    prop_assert_eq!(tx.is_some(), model.contains(&i));
                    registry.suspend(callers[i], "read");
                }
                Op::Commit(i) => {
                    if model.contains(&i) {
                        registry.resume(callers[i]).unwrap();
                        registry.mark_success(callers[i]).unwrap();
                        prop_assert_eq!(registry.finish(callers[i]).unwrap(), TxOutcome::Committed);
                        committed_writes += pending[i];
                        model.remove(&i);
                    } else {
                        prop_assert!(registry.mark_success(callers[i]).is_err());
                    }
                }
                Op::Finish(i) => {
                    let result = registry.finish(callers[i]);
                    if model.remove(&i) {
                        prop_assert_eq!(result.unwrap(), TxOutcome::RolledBack);
                    } else {
                        prop_assert!(matches!(result, Err(SessionError::NoAssociatedSession(_))));
                    }
                }
            }

            prop_assert_eq!(registry.len(), model.len());
            for (i, caller) in callers.iter().enumerate() {
                prop_assert_eq!(registry.contains(*caller), model.contains(&i));
            }
            prop_assert!(db.current_transaction().is_none(), "nothing left bound between calls");
        }

        // Reference node plus every committed write
        prop_assert_eq!(db.node_count(), 1 + committed_writes);
    }
}

#[test]
fn test_finish_removes_session_when_commit_fails() {
    let db = GraphDatabase::in_memory();
    let registry = SessionRegistry::new();
    let caller = CallerId::new();
    registry.begin(caller, &db).unwrap();
    registry.resume(caller).unwrap();
    registry.mark_success(caller).unwrap();
    registry.suspend(caller, "mark_success");

    db.shutdown();
    assert!(registry.finish(caller).is_err());
    assert!(!registry.contains(caller));
    assert!(matches!(
        registry.finish(caller),
        Err(SessionError::NoAssociatedSession(_))
    ));
}

#[test]
fn test_resume_across_threads() {
    let db = GraphDatabase::in_memory();
    let registry = std::sync::Arc::new(SessionRegistry::new());
    let caller = CallerId::new();
    registry.begin(caller, &db).unwrap();

    for round in 0..4 {
        let registry = std::sync::Arc::clone(&registry);
        let db = std::sync::Arc::clone(&db);
        std::thread::spawn(move || {
            registry.resume(caller).unwrap();
            let mut props = Properties::new();
            props.insert("round".to_string(), (round as i64).into());
            db.create_node(props).unwrap();
            registry.suspend(caller, "create_node");
        })
        .join()
        .unwrap();
    }

    registry.resume(caller).unwrap();
    assert_eq!(db.all_nodes().unwrap().len(), 5, "working copy holds every round");
    assert_eq!(db.node_count(), 1, "nothing committed yet");
    registry.mark_success(caller).unwrap();
    assert_eq!(registry.finish(caller).unwrap(), TxOutcome::Committed);
    assert_eq!(db.node_count(), 5);
}
