//! The per-call envelope as seen by a remote caller

use crate::common::*;
use graphd::{Direction, TraversalDescription, Uniqueness};

#[test]
fn test_read_without_begin_sees_committed_state() {
    let ts = TestService::new();
    let handle = ts.open("social");
    assert!(!handle.has_transaction());
    assert_eq!(handle.reference_node().unwrap().id, NodeId(0));

    let mut cursor = handle.all_nodes().unwrap();
    assert_eq!(cursor.next_node().unwrap().id, NodeId(0));
    assert_eq!(cursor.next_node().unwrap_err().code, ErrorCode::NodeIterator);
}

#[test]
fn test_write_without_begin_is_reported() {
    let ts = TestService::new();
    let handle = ts.open("social");
    let err = handle.create_node(Properties::new()).unwrap_err();
    assert_eq!(err.code, ErrorCode::Transaction);
    assert_eq!(err.code.as_u32(), 1);
    assert!(!handle.has_transaction());
}

#[test]
fn test_begin_twice_is_reported() {
    let ts = TestService::new();
    let handle = ts.open("social");
    handle.begin_tx().unwrap();
    let err = handle.begin_tx().unwrap_err();
    assert_eq!(err.code, ErrorCode::Transaction);
    assert!(err.message.contains("already has an associated transaction"));
    handle.tx_finish().unwrap();
}

#[test]
fn test_read_only_caller() {
    let ts = TestService::new();
    let writer = ts.open("social");
    writer.begin_tx().unwrap();
    let id = writer.create_node(props("name", "alice")).unwrap();
    writer.tx_success().unwrap();
    writer.tx_finish().unwrap();

    let reader = ts
        .service
        .open_or_create("social", CallerContext::read_only().with_principal("auditor"))
        .unwrap();
    for err in [
        reader.begin_tx().unwrap_err(),
        reader.create_node(Properties::new()).unwrap_err(),
        reader.delete_node(id).unwrap_err(),
        reader.create_node_index("people").unwrap_err(),
    ] {
        assert_eq!(err.code, ErrorCode::PermissionDenied);
        assert_eq!(err.code.as_u32(), 6);
    }
    assert!(!reader.has_transaction());
    assert_eq!(
        reader.get_node(id).unwrap().property("name"),
        Some(&PropertyValue::from("alice"))
    );
}

#[test]
fn test_uncommitted_writes_private_to_caller() {
    let ts = TestService::new();
    let a = ts.open("social");
    let b = ts.open("social");

    a.begin_tx().unwrap();
    let id = a.create_node(props("name", "alice")).unwrap();
    assert!(a.get_node(id).is_ok());
    assert!(b.get_node(id).is_err());

    a.tx_success().unwrap();
    assert_eq!(a.tx_finish().unwrap(), TxOutcome::Committed);
    assert!(b.get_node(id).is_ok());
}

#[test]
fn test_relationships_and_traversal() {
    let ts = TestService::new();
    let handle = ts.open("social");
    handle.begin_tx().unwrap();

    let root = handle.reference_node().unwrap().id;
    let alice = handle.create_node(props("name", "alice")).unwrap();
    let bob = handle.create_node(props("name", "bob")).unwrap();
    handle
        .create_relationship(root, alice, "KNOWS", Properties::new())
        .unwrap();
    let ab = handle
        .create_relationship(alice, bob, "KNOWS", props("since", "2001"))
        .unwrap();

    let mut rels = handle.relationships_of(alice, Direction::Outgoing).unwrap();
    assert_eq!(rels.next_relationship().unwrap().id, ab);
    assert_eq!(
        rels.next_relationship().unwrap_err().code,
        ErrorCode::RelationshipIterator
    );
    assert_eq!(handle.relationship_types().unwrap(), vec!["KNOWS".to_string()]);

    let desc = TraversalDescription::new()
        .breadth_first()
        .uniqueness(Uniqueness::NodeGlobal)
        .relationships("KNOWS", Direction::Outgoing);
    let visited: Vec<NodeId> = handle.traverse(&desc, root).unwrap().map(|n| n.id).collect();
    assert_eq!(visited, vec![root, alice, bob]);

    let shallow = desc.clone().max_depth(1);
    assert_eq!(handle.traverse(&shallow, root).unwrap().remaining(), 2);

    // Nodes with relationships cannot be deleted
    assert_eq!(handle.delete_node(alice).unwrap_err().code, ErrorCode::Transaction);
    handle.delete_relationship(ab).unwrap();
    handle.delete_node(bob).unwrap();

    handle.tx_success().unwrap();
    handle.tx_finish().unwrap();
    assert_eq!(handle.all_nodes().unwrap().remaining(), 2);
}

#[test]
fn test_update_relationship_properties() {
    let ts = TestService::new();
    let handle = ts.open("social");
    handle.begin_tx().unwrap();
    let a = handle.create_node(Properties::new()).unwrap();
    let b = handle.create_node(Properties::new()).unwrap();
    let id = handle
        .create_relationship(a, b, "LIKES", props("weight", "low"))
        .unwrap();

    let mut rel = handle.get_relationship(id).unwrap();
    rel.properties = props("weight", "high");
    handle.update_relationship(&rel).unwrap();
    handle.tx_success().unwrap();
    handle.tx_finish().unwrap();

    assert_eq!(
        handle.get_relationship(id).unwrap().property("weight"),
        Some(&PropertyValue::from("high"))
    );
}

#[test]
fn test_relationship_index_lifecycle() {
    let ts = TestService::new();
    let handle = ts.open("social");
    handle.begin_tx().unwrap();
    let a = handle.create_node(Properties::new()).unwrap();
    let b = handle.create_node(Properties::new()).unwrap();
    let rel = handle
        .create_relationship(a, b, "KNOWS", Properties::new())
        .unwrap();

    handle.create_relationship_index("edges").unwrap();
    assert!(handle.relationship_index_exists("edges").unwrap());
    handle
        .add_relationship_to_index("edges", rel, "kind", "friend".into())
        .unwrap();
    handle
        .add_relationship_to_index("edges", rel, "year", 2001i64.into())
        .unwrap();

    let mut found = handle
        .relationships_from_index("edges", "kind", &"friend".into())
        .unwrap();
    assert_eq!(found.next_relationship().unwrap().id, rel);

    handle
        .remove_relationship_key_value_from_index("edges", rel, "kind", "friend".into())
        .unwrap();
    assert!(!handle
        .relationships_from_index("edges", "kind", &"friend".into())
        .unwrap()
        .has_next());
    assert!(handle
        .relationships_from_index("edges", "year", &2001i64.into())
        .unwrap()
        .has_next());

    handle.remove_relationship_from_index("edges", rel).unwrap();
    assert!(!handle
        .relationships_from_index("edges", "year", &2001i64.into())
        .unwrap()
        .has_next());

    handle.delete_relationship_index("edges").unwrap();
    assert!(!handle.relationship_index_exists("edges").unwrap());
    handle.tx_finish().unwrap();
}

#[test]
fn test_node_index_survives_commit() {
    let ts = TestService::new();
    let handle = ts.open("social");
    handle.begin_tx().unwrap();
    handle.create_node_index("people").unwrap();
    let alice = handle.create_node(props("name", "alice")).unwrap();
    handle
        .add_node_to_index("people", alice, "name", "alice".into())
        .unwrap();
    handle.tx_success().unwrap();
    handle.tx_finish().unwrap();

    let other = ts.open("social");
    assert!(other.node_index_exists("people").unwrap());
    let mut found = other.nodes_from_index("people", "name", &"alice".into()).unwrap();
    assert_eq!(found.next_node().unwrap().id, alice);

    other.begin_tx().unwrap();
    other.remove_node_from_index("people", alice).unwrap();
    other.delete_node_index("people").unwrap();
    other.tx_success().unwrap();
    other.tx_finish().unwrap();
    assert!(!handle.node_index_exists("people").unwrap());
}

#[test]
fn test_session_terminated_between_calls() {
    let ts = TestService::new();
    let handle = ts.open("social");
    handle.begin_tx().unwrap();
    handle.create_node(Properties::new()).unwrap();

    let registry = std::sync::Arc::clone(ts.service.registry());
    let caller = handle.caller();
    std::thread::spawn(move || registry.force_terminate(caller).unwrap())
        .join()
        .unwrap();

    assert!(!handle.has_transaction());
    let err = handle.create_node(Properties::new()).unwrap_err();
    assert_eq!(err.code, ErrorCode::Transaction);
    assert_eq!(handle.all_nodes().unwrap().remaining(), 1);

    // A fresh transaction can start right away
    handle.begin_tx().unwrap();
    handle.tx_finish().unwrap();
}

#[test]
fn test_error_display_carries_code() {
    let ts = TestService::new();
    let handle = ts.open("social");
    let err = handle.get_node(NodeId(404)).unwrap_err();
    let text = err.to_string();
    assert!(text.starts_with("TRANSACTION(1)"), "{}", text);
}
