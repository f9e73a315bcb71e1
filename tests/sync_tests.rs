/*!
 * Warehouse Sync Tests
 *
 * Exercise the checkpointed drain, anti-join idempotence, and the
 * cross-process lock - DuckDB and file locks only, no external services.
 */

use std::collections::BTreeMap;
use std::time::Duration;

use pulse_common::NamedFileLock;
use pulse_domain::{EventRow, SyncConfig, SyncStatus};
use pulse_storage::{HotStore, Warehouse};
use pulse_sync::{EventSource, SyncJob, SyncStore};

struct Harness {
    dir: tempfile::TempDir,
    hot: HotStore,
    warehouse: Warehouse,
    store: SyncStore,
    config: SyncConfig,
}

fn event_row(i: usize) -> EventRow {
    EventRow {
        id: format!("17000000000{i:02}-0"),
        site: "s1".to_string(),
        name: "login".to_string(),
        timestamp: format!("2025-01-01 00:00:{i:02}"),
        app: Some("frappe".to_string()),
        app_version: None,
        frappe_version: None,
        data: BTreeMap::new(),
    }
}

async fn harness(rows: usize) -> Harness {
    let dir = tempfile::tempdir().unwrap();

    let hot = HotStore::new(dir.path().join("pulse.duckdb"));
    let batch: Vec<EventRow> = (0..rows).map(event_row).collect();
    hot.store_batch(&batch).unwrap();

    let store = SyncStore::connect("sqlite::memory:").await.unwrap();
    let mut config = SyncConfig::new("event", "event");
    config.creation_key = "timestamp".to_string();
    config.primary_key = "id".to_string();
    let config = store.ensure_config(&config).await.unwrap();

    let warehouse = Warehouse::new(dir.path().join("duckdb").join("warehouse.ducklake"));

    Harness {
        dir,
        hot,
        warehouse,
        store,
        config,
    }
}

fn job_for(h: &Harness, lock_timeout: Duration) -> SyncJob {
    SyncJob::new(
        h.store.clone(),
        h.warehouse.clone(),
        h.dir.path().join("locks"),
        lock_timeout,
    )
}

fn source_for(h: &Harness) -> EventSource {
    EventSource::hot(h.hot.clone(), "timestamp", "id")
}

// Scenario: source rows [t1, t2, t3], checkpoint null, two back-to-back
// runs. First mirrors all three, second inserts zero, checkpoint lands on
// t3 both times.
#[tokio::test]
async fn test_idempotent_warehouse_sync() {
    let h = harness(3).await;
    let job = job_for(&h, Duration::from_secs(5));
    let source = source_for(&h);

    let run1 = job.run(&h.config, &source).await.unwrap();
    assert_eq!(run1.status, SyncStatus::Completed);
    assert_eq!(run1.total_inserted, 3);

    // a single connection may hold the warehouse file; release before the
    // next run
    {
        let conn = h.warehouse.connect().unwrap();
        assert_eq!(Warehouse::count(&conn, "event").unwrap(), 3);
    }

    let after_first = h.store.get_config("event").await.unwrap().unwrap();
    assert_eq!(
        after_first.checkpoint.as_deref(),
        Some("2025-01-01 00:00:02")
    );

    // rewind the checkpoint to replay the same input: anti-join keeps the
    // row counts untouched
    h.store.set_checkpoint(h.config.id, None).await.unwrap();
    let mut rewound = after_first.clone();
    rewound.checkpoint = None;

    let run2 = job.run(&rewound, &source).await.unwrap();
    assert_eq!(run2.status, SyncStatus::Completed);
    assert_eq!(run2.total_inserted, 0);

    let conn = h.warehouse.connect().unwrap();
    assert_eq!(Warehouse::count(&conn, "event").unwrap(), 3);

    let after_second = h.store.get_config("event").await.unwrap().unwrap();
    assert_eq!(
        after_second.checkpoint.as_deref(),
        Some("2025-01-01 00:00:02")
    );
}

// Scenario: a second run on the same table while the lock is held ends
// Skipped with a lock-timeout log line; the source still gets mirrored by
// the first run.
#[tokio::test]
async fn test_lock_contention_skips_second_run() {
    let h = harness(3).await;
    let source = source_for(&h);

    // a competing process holds the per-table lock
    let held = NamedFileLock::acquire(
        &h.dir.path().join("locks"),
        "duckdb_sync:event",
        Duration::from_secs(1),
    )
    .unwrap();

    // the bounded wait expires while the lock is held
    let contended = job_for(&h, Duration::from_millis(400));
    let run = contended.run(&h.config, &source).await.unwrap();

    assert_eq!(run.status, SyncStatus::Skipped);
    assert!(run.log.contains("another sync already running"));

    {
        let conn = h.warehouse.connect().unwrap();
        assert_eq!(
            Warehouse::count(&conn, "event").unwrap_or(0),
            0,
            "no rows written while locked out"
        );
    }

    drop(held);

    // with the lock released, the retry completes and mirrors the source
    let job = job_for(&h, Duration::from_secs(5));
    let run = job.run(&h.config, &source).await.unwrap();
    assert_eq!(run.status, SyncStatus::Completed);
    assert_eq!(run.total_inserted, 3);
}

// Checkpoint monotonicity across incremental runs.
#[tokio::test]
async fn test_checkpoint_advances_monotonically() {
    let h = harness(2).await;
    let job = job_for(&h, Duration::from_secs(5));
    let source = source_for(&h);

    job.run(&h.config, &source).await.unwrap();
    let first = h
        .store
        .get_config("event")
        .await
        .unwrap()
        .unwrap()
        .checkpoint
        .unwrap();

    // two more rows past the checkpoint
    h.hot.store_batch(&[event_row(2), event_row(3)]).unwrap();

    let config = h.store.get_config("event").await.unwrap().unwrap();
    let run = job.run(&config, &source).await.unwrap();
    assert_eq!(run.total_inserted, 2);

    let second = h
        .store
        .get_config("event")
        .await
        .unwrap()
        .unwrap()
        .checkpoint
        .unwrap();
    assert!(second > first, "checkpoint must never move backwards");

    let conn = h.warehouse.connect().unwrap();
    assert_eq!(Warehouse::count(&conn, "event").unwrap(), 4);
}

// A run against an exhausted source is Skipped and leaves no run side
// effects beyond the record itself.
#[tokio::test]
async fn test_caught_up_source_skips() {
    let h = harness(1).await;
    let job = job_for(&h, Duration::from_secs(5));
    let source = source_for(&h);

    let run1 = job.run(&h.config, &source).await.unwrap();
    assert_eq!(run1.status, SyncStatus::Completed);

    let config = h.store.get_config("event").await.unwrap().unwrap();
    let run2 = job.run(&config, &source).await.unwrap();
    assert_eq!(run2.status, SyncStatus::Skipped);
    assert!(run2.log.contains("No new rows to sync"));
}
