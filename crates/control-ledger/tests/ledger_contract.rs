//! End-to-end behaviour of the control ledger against an on-disk database.

use control_ledger::{ControlLedger, LedgerError, StatusEntry};

#[test]
fn job_status_lifecycle() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let ledger = ControlLedger::open(&tmp.path().join("control.db")).expect("open");

    ledger
        .record_status("job1", "pending", "2024-01-01T00:00:00")
        .expect("pending");
    ledger
        .record_status("job1", "done", "2024-01-02T00:00:00")
        .expect("done");

    assert_eq!(ledger.latest_status("job1").expect("latest"), "done");
    assert_eq!(
        ledger.history("job1").to_vec().expect("history"),
        vec![
            StatusEntry::new("pending", "2024-01-01T00:00:00"),
            StatusEntry::new("done", "2024-01-02T00:00:00"),
        ]
    );
}

#[test]
fn reopening_existing_database_keeps_rows() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let path = tmp.path().join("control.db");

    {
        let ledger = ControlLedger::open(&path).expect("first open");
        ledger.record_status("A", "ok", "t1").expect("t1");
        ledger.record_status("A", "fail", "t2").expect("t2");
    }

    // Second provisioning pass against the same file.
    let ledger = ControlLedger::open(&path).expect("second open");
    assert_eq!(
        ledger.history("A").to_vec().expect("history"),
        vec![StatusEntry::new("ok", "t1"), StatusEntry::new("fail", "t2")]
    );
    assert_eq!(ledger.latest_status("A").expect("latest"), "fail");
}

#[test]
fn duplicate_insert_survives_reopen_as_error() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let path = tmp.path().join("control.db");

    ControlLedger::open(&path)
        .expect("open")
        .record_status("A", "ok", "t1")
        .expect("insert");

    let ledger = ControlLedger::open(&path).expect("reopen");
    let err = ledger.record_status("A", "ok", "t1").unwrap_err();
    assert!(matches!(err, LedgerError::DuplicateKey { .. }));
    assert_eq!(
        err.to_string(),
        "duplicate key: status for A at t1 already recorded"
    );
}

#[test]
fn history_serializes_as_status_timestamp_pairs() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let ledger = ControlLedger::open(&tmp.path().join("control.db")).expect("open");
    ledger.record_status("job1", "pending", "t1").expect("insert");

    let json = serde_json::to_value(ledger.history("job1").to_vec().expect("history"))
        .expect("json");
    assert_eq!(
        json,
        serde_json::json!([{ "status": "pending", "last_modified": "t1" }])
    );
}
