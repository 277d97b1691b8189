//! Database cache behaviour through the service

use crate::common::*;
use graphd::{ExportManifest, MANIFEST_FILE_NAME};
use std::io::Read;
use std::sync::Arc;

#[test]
fn test_open_twice_shares_instance() {
    let ts = TestService::new();
    let a = ts.open("social");
    let b = ts.open("social");
    assert_ne!(a.caller(), b.caller());

    // Writes committed through one handle are visible through the other
    a.begin_tx().unwrap();
    let id = a.create_node(props("name", "alice")).unwrap();
    a.tx_success().unwrap();
    a.tx_finish().unwrap();
    assert_eq!(
        b.get_node(id).unwrap().property("name"),
        Some(&PropertyValue::from("alice"))
    );

    let first = ts.service.cache().open_or_create("social").unwrap();
    let second = ts.service.cache().open_or_create("social").unwrap();
    assert!(Arc::ptr_eq(&first, &second));
}

#[test]
fn test_is_open_follows_handles() {
    let ts = TestService::new();
    assert!(!ts.service.is_database_open("social").unwrap());
    let handle = ts.open("social");
    assert!(ts.service.is_database_open("social").unwrap());
    assert!(ts.service.database_exists("social").unwrap());

    drop(handle);
    assert!(!ts.service.is_database_open("social").unwrap());
    assert!(ts.service.database_exists("social").unwrap());
}

#[test]
fn test_open_session_keeps_database_open() {
    let ts = TestService::new();
    let handle = ts.open("social");
    handle.begin_tx().unwrap();
    let caller = handle.caller();
    drop(handle);

    // The parked transaction still holds the instance
    assert!(ts.service.is_database_open("social").unwrap());
    assert!(!ts.service.delete_database("social").unwrap());

    ts.service.registry().finish(caller).unwrap();
    assert!(!ts.service.is_database_open("social").unwrap());
    assert!(ts.service.delete_database("social").unwrap());
}

#[test]
fn test_delete_declines_while_open() {
    let ts = TestService::new();
    let handle = ts.open("social");
    assert!(!ts.service.delete_database("social").unwrap());
    assert!(ts.service.database_exists("social").unwrap());

    ts.service.shutdown_database("social").unwrap();
    assert!(ts.service.delete_database("social").unwrap());
    assert!(!ts.service.database_exists("social").unwrap());
    assert!(!ts.dir.path().join("data").join("social").exists());

    // The stale handle reports errors instead of touching deleted storage
    assert_eq!(handle.reference_node().unwrap_err().code, ErrorCode::Transaction);
}

#[test]
fn test_delete_missing_database() {
    let ts = TestService::new();
    assert!(!ts.service.delete_database("ghost").unwrap());
    assert_eq!(
        ts.service.delete_database("").unwrap_err().code,
        ErrorCode::MissingDatabaseName
    );
}

#[test]
fn test_export_archive_contents() {
    let ts = TestService::new();
    {
        let handle = ts.open("social");
        handle.begin_tx().unwrap();
        handle.create_node(props("name", "alice")).unwrap();
        handle.tx_success().unwrap();
        handle.tx_finish().unwrap();

        assert!(ts.service.export_database("social").unwrap().is_none());
    }

    let info = ts.service.export_database("social").unwrap().unwrap();
    assert_eq!(info.name, "social");
    assert!(info.path.exists());
    assert!(info.archive_size_bytes > 0);
    assert!(info.path.starts_with(ts.service.config().resolved_export_dir()));

    let file = std::fs::File::open(&info.path).unwrap();
    let mut archive = tar::Archive::new(zstd::Decoder::new(file).unwrap());
    let mut names = Vec::new();
    let mut manifest = None;
    for entry in archive.entries().unwrap() {
        let mut entry = entry.unwrap();
        let name = entry.path().unwrap().to_string_lossy().to_string();
        if name == MANIFEST_FILE_NAME {
            let mut buf = String::new();
            entry.read_to_string(&mut buf).unwrap();
            manifest = Some(serde_json::from_str::<ExportManifest>(&buf).unwrap());
        }
        names.push(name);
    }

    assert!(!names.iter().any(|n| n.ends_with(".lock")));
    let manifest = manifest.expect("manifest present");
    assert_eq!(manifest.database, "social");
    assert_eq!(manifest.checksums.len() + 1, names.len());

    // Source storage untouched
    assert!(ts.service.database_exists("social").unwrap());
    let reopened = ts.open("social");
    assert_eq!(reopened.all_nodes().unwrap().remaining(), 2);
}

#[test]
fn test_list_databases() {
    let ts = TestService::new();
    assert!(ts.service.list_databases().unwrap().is_empty());
    let _b = ts.open("beta");
    let _a = ts.open("alpha");
    assert_eq!(ts.service.list_databases().unwrap(), vec!["alpha", "beta"]);
}

#[test]
fn test_reopen_after_shutdown_sees_committed_data() {
    let ts = TestService::new();
    let handle = ts.open("social");
    handle.begin_tx().unwrap();
    let id = handle.create_node(props("k", "v")).unwrap();
    handle.tx_success().unwrap();
    handle.tx_finish().unwrap();
    ts.service.shutdown_database("social").unwrap();

    let handle = ts.open("social");
    assert_eq!(
        handle.get_node(id).unwrap().property("k"),
        Some(&PropertyValue::from("v"))
    );
}
