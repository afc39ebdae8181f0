//! End-to-end reconcile tests against the in-memory store

use editgrid_core::{
    BatchStatus, ConflictMode, GridConfig, InMemoryRecordStore, IssueKind, ReconcileError,
    ReconcileOptions, RowIssue, WriteOp, WriteSummary, MSG_RECORD_CHANGED, MSG_RECORD_DELETED,
};
use editgrid_model::{ColumnSchema, ColumnType, Value};
use editgrid_test_utils::{
    failing_engine, item, items_columns, items_config, items_schema, key, mark_deleted,
    seeded_store, set_field, FailingStore, TestGrid,
};
use pretty_assertions::assert_eq;

#[tokio::test]
async fn test_unchanged_resubmission_writes_nothing() {
    let grid = TestGrid::default();
    let rendered = grid.render().await;

    let report = grid
        .engine
        .reconcile(&grid.session, &rendered.echo_submission(), &grid.engine.default_options())
        .await
        .unwrap();

    assert_eq!(report.status, BatchStatus::Committed);
    assert_eq!(report.writes, WriteSummary::default());
    assert!(report.issues.is_empty());
    assert!(report.rows.iter().all(|r| r.is_unchanged()));
    assert_eq!(grid.store.transactions_begun(), 0);
    assert_eq!(grid.store.committed_writes(), 0);
}

#[tokio::test]
async fn test_unset_boolean_resubmits_without_writes() {
    let mut unset = item(4, "fig", 1, 0.5, false, &[]);
    unset.insert("done".into(), Value::Null);
    let store = InMemoryRecordStore::from_schema(&items_schema())
        .with_records(vec![unset])
        .unwrap();
    let grid = TestGrid::with_store(items_config(), store);
    let rendered = grid.render().await;

    let report = grid
        .engine
        .reconcile(&grid.session, &rendered.echo_submission(), &grid.engine.default_options())
        .await
        .unwrap();

    assert_eq!(report.status, BatchStatus::Committed);
    assert_eq!(report.writes, WriteSummary::default());
    assert!(report.rows.iter().all(|r| r.is_unchanged()));
    assert_eq!(grid.store.transactions_begun(), 0);
    assert_eq!(grid.store.get(&key(4)).unwrap().get("done"), Some(&Value::Null));
}

#[tokio::test]
async fn test_concurrently_deleted_row_is_stale() {
    let grid = TestGrid::default();
    let rendered = grid.render().await;
    let mut submission = rendered.echo_submission();
    set_field(&mut submission, 0, "name", "green apple");

    grid.store.delete_record(&key(1)).unwrap();

    let report = grid
        .engine
        .reconcile(&grid.session, &submission, &grid.engine.default_options())
        .await
        .unwrap();

    assert_eq!(report.status, BatchStatus::Rejected);
    assert_eq!(
        report.issues,
        vec![RowIssue::row(0, IssueKind::StaleDeleted, MSG_RECORD_DELETED)]
    );
    assert_eq!(report.messages, vec![MSG_RECORD_DELETED.to_string()]);
    assert_eq!(grid.store.len(), 2);
    assert_eq!(grid.store.transactions_begun(), 0);
}

#[tokio::test]
async fn test_invalid_new_row_rejects_batch() {
    let grid = TestGrid::new(items_config().with_max_rows(5));
    let rendered = grid.render().await;
    let mut submission = rendered.echo_submission();
    set_field(&mut submission, 3, "name", "kiwi");
    set_field(&mut submission, 3, "qty", "abc");

    let report = grid
        .engine
        .reconcile(&grid.session, &submission, &grid.engine.default_options())
        .await
        .unwrap();

    assert_eq!(report.status, BatchStatus::Rejected);
    assert_eq!(report.issues, vec![RowIssue::cell(3, "qty", "enter an integer")]);
    assert!(report.rows.get(3).unwrap().is_new());
    assert!(report.rows.get(4).unwrap().is_unchanged());
    assert_eq!(grid.store.len(), 3);
}

#[tokio::test]
async fn test_messages_are_distinct() {
    let grid = TestGrid::default();
    let rendered = grid.render().await;
    let mut submission = rendered.echo_submission();
    set_field(&mut submission, 0, "qty", "many");
    set_field(&mut submission, 1, "qty", "lots");
    set_field(&mut submission, 2, "qty", "500");

    let report = grid
        .engine
        .reconcile(&grid.session, &submission, &grid.engine.default_options())
        .await
        .unwrap();

    assert_eq!(report.issues.len(), 3);
    assert_eq!(
        report.messages,
        vec![
            "enter an integer".to_string(),
            "enter a value between 0 and 100".to_string()
        ]
    );
    assert_eq!(report.issues_for(2).count(), 1);
}

#[tokio::test]
async fn test_update_commits_and_refreshes_digests() {
    let grid = TestGrid::default();
    let rendered = grid.render().await;
    let before = rendered.rows[1].record_digest.clone();
    let mut submission = rendered.echo_submission();
    set_field(&mut submission, 1, "qty", "42");
    set_field(&mut submission, 1, "tags", "green,blue");

    let report = grid
        .engine
        .reconcile(&grid.session, &submission, &grid.engine.default_options())
        .await
        .unwrap();

    assert!(report.is_committed());
    assert_eq!(
        report.writes,
        WriteSummary {
            inserted: 0,
            updated: 1,
            deleted: 0
        }
    );

    let stored = grid.store.get(&key(2)).unwrap();
    assert_eq!(stored.get("qty"), Some(&Value::Integer(42)));
    assert_eq!(stored.get("tags"), Some(&Value::text("|green|blue|")));

    let row = report.rows.get(1).unwrap();
    assert_eq!(
        row.get("tags"),
        Some(Value::List(vec!["green".into(), "blue".into()]))
    );
    assert!(row.meta().record_digest.is_some());
    assert_ne!(row.meta().record_digest, before);
}

#[tokio::test]
async fn test_insert_writes_back_generated_key() {
    let grid = TestGrid::new(items_config().with_max_rows(4));
    let rendered = grid.render().await;
    assert!(rendered.rows[3].is_new);

    let mut submission = rendered.echo_submission();
    set_field(&mut submission, 3, "name", "kiwi");
    set_field(&mut submission, 3, "qty", "4");
    set_field(&mut submission, 3, "price", "1.25");
    set_field(&mut submission, 3, "tags", "red,blue");

    let report = grid
        .engine
        .reconcile(&grid.session, &submission, &grid.engine.default_options())
        .await
        .unwrap();

    assert!(report.is_committed());
    assert_eq!(report.writes.inserted, 1);

    let row = report.rows.get(3).unwrap();
    assert_eq!(row.get("id"), Some(Value::Integer(4)));
    assert!(!row.is_new());
    assert!(row.meta().record_digest.is_some());
    assert!(!row.is_tombstone());

    let stored = grid.store.get(&key(4)).unwrap();
    assert_eq!(stored.get("name"), Some(&Value::text("kiwi")));
    assert_eq!(stored.get("tags"), Some(&Value::text("|red|blue|")));

    let next = grid.engine.continuation(&report);
    assert_eq!(next.rows[3].key_marker, editgrid_integrity::encode_key_marker("4"));
}

#[tokio::test]
async fn test_delete_tombstones_row_for_next_submit() {
    let grid = TestGrid::default();
    let rendered = grid.render().await;
    let mut submission = rendered.echo_submission();
    mark_deleted(&mut submission, 1);

    let report = grid
        .engine
        .reconcile(&grid.session, &submission, &grid.engine.default_options())
        .await
        .unwrap();
    assert!(report.is_committed());
    assert_eq!(report.writes.deleted, 1);
    assert!(grid.store.get(&key(2)).is_none());

    let row = report.rows.get(1).unwrap();
    assert!(row.is_tombstone());
    assert!(row.meta().input_digest.is_none());

    let next = grid.engine.continuation(&report);
    let mut submission = next.echo_submission();
    mark_deleted(&mut submission, 1);
    let report = grid
        .engine
        .reconcile(&grid.session, &submission, &grid.engine.default_options())
        .await
        .unwrap();

    assert!(report.is_committed());
    assert_eq!(report.writes.total(), 0);
    assert_eq!(grid.store.len(), 2);
}

#[tokio::test]
async fn test_deleted_new_row_needs_no_write() {
    let grid = TestGrid::new(items_config().with_max_rows(4));
    let rendered = grid.render().await;
    let mut submission = rendered.echo_submission();
    set_field(&mut submission, 3, "name", "ghost");
    mark_deleted(&mut submission, 3);

    let report = grid
        .engine
        .reconcile(&grid.session, &submission, &grid.engine.default_options())
        .await
        .unwrap();

    assert!(report.is_committed());
    assert_eq!(report.writes.total(), 0);
    assert!(report.rows.get(3).unwrap().is_tombstone());
    assert_eq!(grid.store.transactions_begun(), 0);
}

async fn stale_pair(options: ReconcileOptions) -> Vec<RowIssue> {
    let grid = TestGrid::default();
    let rendered = grid.render().await;
    let mut submission = rendered.echo_submission();
    set_field(&mut submission, 0, "name", "");
    set_field(&mut submission, 1, "name", "nashi");

    grid.store.update_record(&key(1), "qty", 9_i64).unwrap();
    grid.store.update_record(&key(2), "qty", 9_i64).unwrap();

    let report = grid
        .engine
        .reconcile(&grid.session, &submission, &options)
        .await
        .unwrap();
    assert_eq!(report.status, BatchStatus::Rejected);
    assert_eq!(grid.store.transactions_begun(), 0);
    report.issues
}

#[tokio::test]
async fn test_parcel_mode_reports_every_conflict() {
    let issues = stale_pair(ReconcileOptions::default()).await;
    assert_eq!(
        issues,
        vec![
            RowIssue::row(0, IssueKind::StaleModified, MSG_RECORD_CHANGED),
            RowIssue::row(1, IssueKind::StaleModified, MSG_RECORD_CHANGED),
        ]
    );
}

#[tokio::test]
async fn test_strict_mode_stops_at_first_conflict() {
    let issues = stale_pair(ReconcileOptions::default().strict()).await;
    assert_eq!(
        issues,
        vec![RowIssue::row(0, IssueKind::StaleModified, MSG_RECORD_CHANGED)]
    );

    let issues = stale_pair(ReconcileOptions::default().strict().with_validate_all(true)).await;
    assert_eq!(issues.len(), 1);
}

#[tokio::test]
async fn test_validate_all_checks_conflicted_rows() {
    let issues = stale_pair(ReconcileOptions::default().with_validate_all(true)).await;
    assert_eq!(issues.len(), 3);
    assert!(issues.contains(&RowIssue::cell(0, "name", "enter from 1 to 32 characters")));
}

#[tokio::test]
async fn test_config_defaults_drive_options() {
    let grid = TestGrid::new(items_config().with_conflict_mode(ConflictMode::Strict));
    assert_eq!(grid.engine.default_options().conflict_mode, ConflictMode::Strict);
}

#[tokio::test]
async fn test_record_digest_disabled_skips_conflicts() {
    let grid = TestGrid::new(items_config().with_record_digest(false));
    let rendered = grid.render().await;
    assert!(rendered.rows[0].record_digest.is_none());

    let mut submission = rendered.echo_submission();
    set_field(&mut submission, 0, "name", "crab apple");
    grid.store.update_record(&key(1), "qty", 9_i64).unwrap();

    let report = grid
        .engine
        .reconcile(&grid.session, &submission, &grid.engine.default_options())
        .await
        .unwrap();
    assert!(report.is_committed());
    assert_eq!(
        grid.store.get(&key(1)).unwrap().get("name"),
        Some(&Value::text("crab apple"))
    );
}

#[tokio::test]
async fn test_write_failure_rolls_back_everything() {
    let store = FailingStore::new(seeded_store()).fail_write_at(1);
    let engine = failing_engine(store.clone());
    let session = editgrid_integrity::SessionId::new("s");
    let rendered = engine
        .render(&session, &editgrid_core::RowSelection::all())
        .await
        .unwrap();

    let mut submission = rendered.echo_submission();
    set_field(&mut submission, 0, "name", "one");
    set_field(&mut submission, 1, "name", "two");

    let err = engine
        .reconcile(&session, &submission, &engine.default_options())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        ReconcileError::StoreWriteFailed {
            op: WriteOp::Update,
            row: Some(1),
            ..
        }
    ));
    assert!(!err.is_fail_fast());
    assert_eq!(err.user_message(), "[db update error] injected update failure");
    assert_eq!(store.rollbacks(), 1);
    assert_eq!(store.inner().committed_writes(), 0);
    assert_eq!(
        store.inner().get(&key(1)).unwrap().get("name"),
        Some(&Value::text("apple"))
    );
}

fn editable_key_config() -> GridConfig {
    let mut columns = items_columns();
    columns[0] = ColumnSchema::new("id", ColumnType::Integer);
    GridConfig::new("items").with_columns(columns).with_keys(["id"])
}

fn store_ids(grid: &TestGrid) -> Vec<String> {
    grid.store
        .records()
        .iter()
        .map(|r| r.get("id").unwrap().to_string())
        .collect()
}

#[tokio::test]
async fn test_key_edit_onto_existing_key_is_refused() {
    let grid = TestGrid::new(editable_key_config());
    let rendered = grid.render().await;
    let mut submission = rendered.echo_submission();
    set_field(&mut submission, 0, "id", "2");

    let err = grid
        .engine
        .reconcile(&grid.session, &submission, &grid.engine.default_options())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        ReconcileError::StoreWriteFailed {
            op: WriteOp::Update,
            row: Some(0),
            ..
        }
    ));
    assert_eq!(err.user_message(), "[db update error] duplicate key");
    assert_eq!(grid.store.committed_writes(), 0);
    assert_eq!(store_ids(&grid), vec!["1", "2", "3"]);
}

#[tokio::test]
async fn test_key_edit_onto_free_key_commits() {
    let grid = TestGrid::new(editable_key_config());
    let rendered = grid.render().await;
    let mut submission = rendered.echo_submission();
    set_field(&mut submission, 0, "id", "9");

    let report = grid
        .engine
        .reconcile(&grid.session, &submission, &grid.engine.default_options())
        .await
        .unwrap();

    assert!(report.is_committed());
    assert_eq!(report.writes.updated, 1);
    assert_eq!(store_ids(&grid), vec!["9", "2", "3"]);
    assert_eq!(report.rows.get(0).unwrap().get("name"), Some(Value::text("apple")));
}

#[tokio::test]
async fn test_commit_failure_is_reported() {
    let store = FailingStore::new(seeded_store()).fail_commit();
    let engine = failing_engine(store.clone());
    let session = editgrid_integrity::SessionId::new("s");
    let rendered = engine
        .render(&session, &editgrid_core::RowSelection::all())
        .await
        .unwrap();

    let mut submission = rendered.echo_submission();
    mark_deleted(&mut submission, 2);

    let err = engine
        .reconcile(&session, &submission, &engine.default_options())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ReconcileError::StoreWriteFailed {
            op: WriteOp::Commit,
            row: None,
            ..
        }
    ));
    assert_eq!(store.inner().len(), 3);
}

#[tokio::test]
async fn test_read_failure_during_conflict_check() {
    let store = FailingStore::new(seeded_store()).fail_reads();
    let engine = failing_engine(store);
    let session = editgrid_integrity::SessionId::new("s");
    let rendered = engine
        .render(&session, &editgrid_core::RowSelection::all())
        .await
        .unwrap();

    let mut submission = rendered.echo_submission();
    set_field(&mut submission, 0, "qty", "1");

    let err = engine
        .reconcile(&session, &submission, &engine.default_options())
        .await
        .unwrap_err();
    assert!(matches!(err, ReconcileError::StoreReadFailed(_)));
    assert_eq!(err.user_message(), "[db read error] connection reset");
}

#[tokio::test]
async fn test_rejected_batch_can_be_fixed_and_resubmitted() {
    let grid = TestGrid::default();
    let rendered = grid.render().await;
    let mut submission = rendered.echo_submission();
    set_field(&mut submission, 0, "qty", "abc");

    let report = grid
        .engine
        .reconcile(&grid.session, &submission, &grid.engine.default_options())
        .await
        .unwrap();
    assert_eq!(report.status, BatchStatus::Rejected);
    assert_eq!(report.reissue.table_digest, rendered.table_digest);

    let next = grid.engine.continuation(&report);
    assert_eq!(next.rows[0].value("qty"), Some(&Value::text("abc")));

    let mut submission = next.echo_submission();
    set_field(&mut submission, 0, "qty", "7");
    let report = grid
        .engine
        .reconcile(&grid.session, &submission, &grid.engine.default_options())
        .await
        .unwrap();

    assert!(report.is_committed());
    assert_eq!(report.writes.updated, 1);
    assert_eq!(
        grid.store.get(&key(1)).unwrap().get("qty"),
        Some(&Value::Integer(7))
    );

    let third = grid.engine.continuation(&report);
    let report = grid
        .engine
        .reconcile(&grid.session, &third.echo_submission(), &grid.engine.default_options())
        .await
        .unwrap();
    assert!(report.is_committed());
    assert_eq!(report.writes.total(), 0);
}

#[tokio::test]
async fn test_report_summary_serializes() {
    let grid = TestGrid::default();
    let rendered = grid.render().await;
    let mut submission = rendered.echo_submission();
    set_field(&mut submission, 2, "qty", "-1");

    let report = grid
        .engine
        .reconcile(&grid.session, &submission, &grid.engine.default_options())
        .await
        .unwrap();

    let json = serde_json::to_value(report.summary()).unwrap();
    assert_eq!(json["status"], "rejected");
    assert_eq!(json["rows"], 3);
    assert_eq!(json["issues"][0]["kind"], "validation_failed");
    assert_eq!(json["issues"][0]["field"], "qty");
    assert_eq!(json["reissue"]["form_name"], "tb_items");
}
