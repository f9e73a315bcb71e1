/*!
 * Drain Cycle
 *
 * The engine of the pipeline. `process()` performs one cycle: read up to
 * `max_stream_length / 2` entries (pending first, then stale claims, then
 * new deliveries), split them into accepted rows and discarded ids, write
 * the accepted batch in a single transaction, dead-letter it if the write
 * fails, and acknowledge every id either way.
 */

use tracing::{debug, error, info};

use pulse_domain::{EventRow, StreamEntry};
use pulse_storage::HotStore;
use pulse_stream::{DeadLetterQueue, EventStream};

use crate::metrics;

/// Outcome of sanitizing one raw entry.
#[derive(Debug, Clone)]
pub enum Prepared {
    /// Fixed columns extracted, overflow folded into the data map.
    Accepted(EventRow),
    /// Permanently unprocessable; ACKed without persisting.
    Discarded { id: String, missing: Vec<String> },
}

/// Counters from one drain cycle.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ProcessOutcome {
    pub processed: usize,
    pub discarded: usize,
    pub failed: usize,
}

/// Sanitize raw entries into tagged results.
pub fn prepare_entries(entries: &[StreamEntry]) -> Vec<Prepared> {
    entries
        .iter()
        .map(|entry| match EventRow::from_entry(entry) {
            Ok(row) => Prepared::Accepted(row),
            Err(missing) => {
                debug!(
                    "Skipping entry {} with missing required fields: {}",
                    entry.id,
                    missing.join(", ")
                );
                Prepared::Discarded {
                    id: entry.id.clone(),
                    missing,
                }
            }
        })
        .collect()
}

/// The event processor worker.
pub struct EventProcessor {
    stream: EventStream,
    dlq: DeadLetterQueue,
    store: HotStore,
    read_count: usize,
}

impl EventProcessor {
    /// # Arguments
    ///
    /// * `stream` - the event log to drain
    /// * `dlq` - dead-letter sink for unpersistable batches
    /// * `store` - hot columnar store
    /// * `max_stream_length` - stream soft cap; one cycle reads half of it
    pub fn new(
        stream: EventStream,
        dlq: DeadLetterQueue,
        store: HotStore,
        max_stream_length: i64,
    ) -> Self {
        Self {
            stream,
            dlq,
            store,
            read_count: (max_stream_length / 2).max(1) as usize,
        }
    }

    /// Run one drain cycle and return its counters.
    ///
    /// Never propagates an error to the scheduler: transient read failures
    /// yield an empty cycle (the pending-reclaim phase retries next tick),
    /// and storage failures are converted into a dead-letter deposit.
    pub async fn process(&mut self) -> ProcessOutcome {
        let entries = self.stream.read(self.read_count).await;
        if entries.is_empty() {
            debug!("No entries to process");
            return ProcessOutcome::default();
        }

        let mut accepted = Vec::new();
        let mut discarded_ids = Vec::new();
        for prepared in prepare_entries(&entries) {
            match prepared {
                Prepared::Accepted(row) => accepted.push(row),
                Prepared::Discarded { id, .. } => discarded_ids.push(id),
            }
        }

        let mut outcome = ProcessOutcome {
            processed: 0,
            discarded: discarded_ids.len(),
            failed: 0,
        };

        // Single transaction: either every accepted row is durable or none.
        // DuckDB I/O is blocking, keep it off the async workers.
        let store = self.store.clone();
        let batch = accepted.clone();
        let stored = tokio::task::spawn_blocking(move || store.store_batch(&batch))
            .await
            .map_err(|e| pulse_common::Error::Internal(e.into()))
            .and_then(|r| r);

        match stored {
            Ok(()) => {
                outcome.processed = accepted.len();
            }
            Err(e) => {
                error!("Error storing events: {}", e);
                outcome.failed = accepted.len();

                // Best-effort deposit; losing an already-failed batch is
                // acceptable, redelivering it forever is not.
                if let Err(dlq_err) = self.dlq.push(&accepted).await {
                    error!("Failed to dead-letter batch: {}", dlq_err);
                }
            }
        }

        // ACK all read entries: accepted ones are stored or dead-lettered,
        // discarded ones must never be redelivered.
        let mut ids: Vec<String> = accepted.iter().map(|row| row.id.clone()).collect();
        ids.extend(discarded_ids);
        if let Err(e) = self.stream.ack(&ids).await {
            error!("Failed to acknowledge entries: {}", e);
        }

        metrics::EVENTS_PROCESSED_TOTAL.inc_by(outcome.processed as u64);
        metrics::EVENTS_DISCARDED_TOTAL.inc_by(outcome.discarded as u64);
        metrics::EVENTS_DEADLETTERED_TOTAL.inc_by(outcome.failed as u64);

        info!(
            "Processed {} events successfully. Discarded {} events. Dead-lettered {} events.",
            outcome.processed, outcome.discarded, outcome.failed
        );

        outcome
    }
}
