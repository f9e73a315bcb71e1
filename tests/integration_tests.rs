/*!
 * Full-Cycle Integration Tests
 *
 * Covers the complete Pulse cycle against a real Redis instance:
 *
 * 1. Events appended to the stream
 * 2. Drain cycle: sanitize, persist, acknowledge
 * 3. Rows in the DuckDB hot store
 * 4. Dead-letter deposits on storage failure
 * 5. Crash recovery via the stale-claim phase
 *
 * Run with: cargo test -p pulse-tests --test integration_tests -- --ignored
 * (requires Redis on localhost:6379)
 */

use std::collections::BTreeMap;
use std::time::Duration;

use pulse_config::{CONSUMER_GROUP_NAME, StreamConfig};
use pulse_processor::EventProcessor;
use pulse_storage::HotStore;
use pulse_stream::{DeadLetterQueue, EventStream};

const REDIS_URL: &str = "redis://localhost:6379";

struct Harness {
    _dir: tempfile::TempDir,
    stream: EventStream,
    dlq: DeadLetterQueue,
    store: HotStore,
    config: StreamConfig,
}

fn stream_config(consumer: &str) -> StreamConfig {
    StreamConfig {
        tenant: "test".to_string(),
        name: format!("pulse:events:{}", uuid::Uuid::new_v4().simple()),
        max_length: 1000,
        pending_min_idle_ms: 300,
        group: CONSUMER_GROUP_NAME.to_string(),
        consumer: consumer.to_string(),
    }
}

async fn harness(consumer: &str) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let config = stream_config(consumer);

    let stream = EventStream::connect(REDIS_URL, &config).await.unwrap();
    let dlq = DeadLetterQueue::connect(REDIS_URL, &config.key())
        .await
        .unwrap();
    let store = HotStore::new(dir.path().join("pulse.duckdb"));

    Harness {
        _dir: dir,
        stream,
        dlq,
        store,
        config,
    }
}

fn fields(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

async fn cleanup(h: &mut Harness) {
    h.stream.delete_stream().await.ok();
    h.dlq.delete().await.ok();
}

#[tokio::test]
#[ignore] // Requires Redis
async fn test_happy_path_persists_and_acks() {
    let mut h = harness("worker_a").await;

    h.stream
        .append(&fields(&[
            ("name", "login"),
            ("site", "s1"),
            ("timestamp", "2025-01-01 00:00:00"),
        ]))
        .await
        .unwrap();

    let mut processor = EventProcessor::new(
        h.stream.clone(),
        h.dlq.clone(),
        h.store.clone(),
        h.config.max_length,
    );
    let outcome = processor.process().await;

    assert_eq!(outcome.processed, 1);
    assert_eq!(outcome.discarded, 0);
    assert_eq!(outcome.failed, 0);

    // exactly one row, with the fixed columns mapped
    let conn = h.store.open(true).unwrap();
    let (name, site): (String, String) = conn
        .query_row("SELECT name, site FROM event", [], |r| {
            Ok((r.get(0)?, r.get(1)?))
        })
        .unwrap();
    assert_eq!(name, "login");
    assert_eq!(site, "s1");

    // acked, and the trim has not touched a single entry
    assert_eq!(h.stream.unacked_length().await, 0);
    assert_eq!(h.stream.length().await, 1);

    cleanup(&mut h).await;
}

#[tokio::test]
#[ignore] // Requires Redis
async fn test_malformed_entry_discarded_and_acked() {
    let mut h = harness("worker_a").await;

    // missing site and timestamp: passes the append, fails sanitize
    h.stream
        .append(&fields(&[("name", "x")]))
        .await
        .unwrap();

    let mut processor = EventProcessor::new(
        h.stream.clone(),
        h.dlq.clone(),
        h.store.clone(),
        h.config.max_length,
    );
    let outcome = processor.process().await;

    assert_eq!(outcome.processed, 0);
    assert_eq!(outcome.discarded, 1);

    // no rows, and the entry was ACKed as discarded (never redelivered)
    assert_eq!(h.store.count_all(), 0);
    assert_eq!(h.stream.unacked_length().await, 0);

    let second = processor.process().await;
    assert_eq!(second.discarded, 0, "discarded entry must not come back");

    cleanup(&mut h).await;
}

#[tokio::test]
#[ignore] // Requires Redis
async fn test_crash_recovery_via_stale_claim() {
    let mut h = harness("worker_a").await;

    h.stream
        .append(&fields(&[
            ("name", "crash_case"),
            ("site", "s1"),
            ("timestamp", "2025-01-01 00:00:00"),
        ]))
        .await
        .unwrap();

    // consumer A takes delivery and "crashes" before ACK
    let delivered = h.stream.read(10).await;
    assert_eq!(delivered.len(), 1);

    tokio::time::sleep(Duration::from_millis(h.config.pending_min_idle_ms + 500)).await;

    // consumer B drains: the entry arrives via the stale-claim phase
    let mut config_b = h.config.clone();
    config_b.consumer = "worker_b".to_string();
    let stream_b = EventStream::connect(REDIS_URL, &config_b).await.unwrap();

    let mut processor_b = EventProcessor::new(
        stream_b.clone(),
        h.dlq.clone(),
        h.store.clone(),
        h.config.max_length,
    );
    let outcome = processor_b.process().await;

    assert_eq!(outcome.processed, 1);
    assert_eq!(h.store.count_all(), 1);
    assert_eq!(h.stream.unacked_length().await, 0);

    cleanup(&mut h).await;
}

#[tokio::test]
#[ignore] // Requires Redis
async fn test_storage_failure_dead_letters_batch() {
    let mut h = harness("worker_a").await;

    for i in 0..2 {
        h.stream
            .append(&fields(&[
                ("name", "dlq_case"),
                ("site", "s1"),
                ("timestamp", &format!("2025-01-01 00:00:0{i}")),
            ]))
            .await
            .unwrap();
    }

    // a directory at the DB path makes every open fail
    let broken_dir = tempfile::tempdir().unwrap();
    let broken_store = HotStore::new(broken_dir.path());

    let mut processor = EventProcessor::new(
        h.stream.clone(),
        h.dlq.clone(),
        broken_store,
        h.config.max_length,
    );
    let outcome = processor.process().await;

    assert_eq!(outcome.processed, 0);
    assert_eq!(outcome.failed, 2);

    // whole batch deposited as one atomic DLQ entry carrying both events
    assert_eq!(h.dlq.length().await, 1);

    // ids ACKed regardless, nothing pending, no rows anywhere
    assert_eq!(h.stream.unacked_length().await, 0);
    assert_eq!(h.store.count_all(), 0);

    // a second cycle must not double-deposit
    let second = processor.process().await;
    assert_eq!(second.failed, 0);
    assert_eq!(h.dlq.length().await, 1);

    cleanup(&mut h).await;
}

#[tokio::test]
#[ignore] // Requires Redis
async fn test_drain_cycles_are_idempotent() {
    let mut h = harness("worker_a").await;

    for i in 0..3 {
        h.stream
            .append(&fields(&[
                ("name", "cycle_case"),
                ("site", "s1"),
                ("timestamp", &format!("2025-01-01 00:00:0{i}")),
            ]))
            .await
            .unwrap();
    }

    let mut processor = EventProcessor::new(
        h.stream.clone(),
        h.dlq.clone(),
        h.store.clone(),
        h.config.max_length,
    );

    let first = processor.process().await;
    assert_eq!(first.processed, 3);

    // no appends in between: the second cycle must persist nothing
    let second = processor.process().await;
    assert_eq!(second.processed, 0);
    assert_eq!(h.store.count_all(), 3);

    cleanup(&mut h).await;
}
