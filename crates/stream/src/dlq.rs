/*!
 * Dead-Letter Sink
 *
 * Terminal store for batches the processor cannot persist after best-effort
 * handling. Lives on a sibling stream key (`<stream>:dlq`); each deposit is
 * a single entry carrying the whole batch as a JSON array, so appends are
 * atomic per batch. Replay is manual.
 */

use chrono::Utc;
use tracing::{error, info};

use pulse_common::Result;
use pulse_domain::EventRow;

/// Dead-letter queue on a sibling stream key.
#[derive(Clone)]
pub struct DeadLetterQueue {
    conn: redis::aio::ConnectionManager,
    key: String,
}

impl DeadLetterQueue {
    /// Bind to the DLQ key for a given stream.
    pub async fn connect(redis_url: &str, stream_key: &str) -> Result<Self> {
        let client = redis::Client::open(redis_url)?;
        let conn = redis::aio::ConnectionManager::new(client).await?;

        Ok(Self {
            conn,
            key: format!("{stream_key}:dlq"),
        })
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Deposit a failed batch as one entry.
    ///
    /// Failure to deposit is logged but must not block the ACK of the
    /// originating ids - dropping an already-failed batch is acceptable,
    /// infinite redelivery is not. Callers treat the returned error as
    /// advisory.
    pub async fn push(&mut self, batch: &[EventRow]) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }

        let payload = serde_json::to_string(batch)?;
        let result: std::result::Result<String, redis::RedisError> = redis::cmd("XADD")
            .arg(&self.key)
            .arg("*")
            .arg("batch")
            .arg(&payload)
            .arg("count")
            .arg(batch.len())
            .arg("deposited_at")
            .arg(Utc::now().to_rfc3339())
            .query_async(&mut self.conn)
            .await;

        match result {
            Ok(id) => {
                info!(
                    "Deposited batch of {} events to DLQ '{}' as {}",
                    batch.len(),
                    self.key,
                    id
                );
                Ok(())
            }
            Err(e) => {
                error!("Failed to deposit batch to DLQ '{}': {}", self.key, e);
                Err(e.into())
            }
        }
    }

    /// Number of deposited batches. 0 on failure.
    pub async fn length(&mut self) -> i64 {
        let result: std::result::Result<i64, redis::RedisError> = redis::cmd("XLEN")
            .arg(&self.key)
            .query_async(&mut self.conn)
            .await;

        result.unwrap_or(0)
    }

    /// Delete the DLQ key (test cleanup).
    pub async fn delete(&mut self) -> Result<()> {
        let _: i64 = redis::cmd("DEL")
            .arg(&self.key)
            .query_async(&mut self.conn)
            .await?;
        Ok(())
    }
}
