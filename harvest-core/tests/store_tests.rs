//! Store and config integration tests: journal durability across reopen,
//! content store layout, and config error messages.

use assert_fs::prelude::*;
use chrono::{TimeZone, Utc};
use harvest_core::{
    config, ConfigError, ContentRecord, ContentStore, DocId, DocStatus, DocumentRecord,
    FsContentStore, JournalRecordStore, Mutation, RecordStore, RunStamp, StoreError,
};
use predicates::prelude::predicate;
use std::fs;

fn stamp(hour: u32) -> RunStamp {
    RunStamp::new(
        Utc.with_ymd_and_hms(2024, 6, 1, hour, 0, 0).unwrap(),
        "aheadofprint",
        "tester",
    )
}

// ---------------------------------------------------------------------------
// 1. Journal store
// ---------------------------------------------------------------------------

#[test]
fn batch_survives_reopen() {
    let dir = assert_fs::TempDir::new().expect("tempdir");
    let path = dir.child("state").child("records.jsonl");
    {
        let mut store = JournalRecordStore::open(path.path()).expect("open");
        let batch = (1..=10)
            .map(|n| {
                Mutation::Upsert(DocumentRecord::new(
                    DocId::from(n.to_string()),
                    DocStatus::Pending,
                    &stamp(1),
                ))
            })
            .collect();
        store.apply(batch).expect("apply");
    }
    path.assert(predicate::path::is_file());

    let store = JournalRecordStore::open(path.path()).expect("reopen");
    assert_eq!(store.len(), 10);
    assert_eq!(store.ids_with_status(DocStatus::Pending).unwrap().len(), 10);
}

#[test]
fn failed_batch_leaves_store_untouched() {
    let dir = assert_fs::TempDir::new().expect("tempdir");
    let path = dir.child("records.jsonl");
    let mut store = JournalRecordStore::open(path.path()).expect("open");
    store
        .upsert(DocumentRecord::new(DocId::from("1"), DocStatus::Present, &stamp(1)))
        .unwrap();

    let err = store
        .apply(vec![
            Mutation::SetStatus { id: DocId::from("1"), status: DocStatus::Absent, stamp: stamp(2) },
            Mutation::SetStatus { id: DocId::from("ghost"), status: DocStatus::Absent, stamp: stamp(2) },
        ])
        .unwrap_err();
    assert!(matches!(err, StoreError::MissingRecord(_)), "got: {err}");

    assert_eq!(store.get(&DocId::from("1")).unwrap().unwrap().status, DocStatus::Present);
    drop(store);
    let reopened = JournalRecordStore::open(path.path()).expect("reopen");
    assert_eq!(reopened.get(&DocId::from("1")).unwrap().unwrap().status, DocStatus::Present);
}

#[test]
fn set_status_restamps_the_record() {
    let dir = assert_fs::TempDir::new().expect("tempdir");
    let mut store = JournalRecordStore::open(dir.child("r.jsonl").path()).expect("open");
    store
        .upsert(DocumentRecord::new(DocId::from("5"), DocStatus::Pending, &stamp(1)))
        .unwrap();
    store
        .apply(vec![Mutation::SetStatus {
            id: DocId::from("5"),
            status: DocStatus::Present,
            stamp: stamp(9),
        }])
        .unwrap();
    let record = store.get(&DocId::from("5")).unwrap().unwrap();
    assert_eq!(record.batch_hour, chrono::NaiveTime::from_hms_opt(9, 0, 0).unwrap());
}

// ---------------------------------------------------------------------------
// 2. Content store
// ---------------------------------------------------------------------------

#[test]
fn content_lands_at_id_json() {
    let dir = assert_fs::TempDir::new().expect("tempdir");
    let mut store = FsContentStore::open(dir.child("content").path()).expect("open");
    store
        .put(ContentRecord {
            id: DocId::from("38000001"),
            sha256: "ff".repeat(32),
            size: 3,
            stored_at: Utc::now(),
            content: b"abc".to_vec(),
        })
        .unwrap();
    dir.child("content")
        .child("38000001.json")
        .assert(predicate::str::contains("\"content\":\"YWJj\""));
}

// ---------------------------------------------------------------------------
// 3. Config
// ---------------------------------------------------------------------------

#[test]
fn corrupt_config_reports_path() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    let file = home.child(".harvest").child("config.yaml");
    file.write_str("- this is a list, not a mapping\n").unwrap();

    let err = config::load_at(home.path()).unwrap_err();
    assert!(matches!(err, ConfigError::Parse { .. }), "got: {err}");
    assert!(err.to_string().contains("config.yaml"));
}

#[test]
fn invalid_values_are_rejected_on_load() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    home.child(".harvest")
        .child("config.yaml")
        .write_str("batch_size: 9000\n")
        .unwrap();
    let err = config::load_at(home.path()).unwrap_err();
    assert!(matches!(err, ConfigError::Invalid { field: "batch_size", .. }), "got: {err}");
}

#[cfg(unix)]
#[test]
fn saved_config_is_owner_only() {
    use std::os::unix::fs::PermissionsExt;
    let home = assert_fs::TempDir::new().expect("tempdir");
    config::save_at(home.path(), &harvest_core::HarvestConfig::default()).unwrap();
    let mode = fs::metadata(config::config_path_at(home.path()))
        .unwrap()
        .permissions()
        .mode();
    assert_eq!(mode & 0o777, 0o600);
}
