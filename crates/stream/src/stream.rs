/*!
 * Event Stream Log
 *
 * Append-only event log over a Redis Stream with consumer-group semantics
 * for horizontal scaling.
 *
 * ## Consumer Groups Architecture
 *
 * ```text
 * Stream: <tenant>:pulse:events
 *    │
 *    ├──> Consumer Group "event_processors"
 *         │
 *         ├──> worker-1 (this instance)
 *         ├──> worker-2 (another process)
 *         └──> worker-3 (another process)
 * ```
 *
 * Each appended entry is delivered to exactly one consumer until that
 * consumer ACKs it or a peer claims it after `pending_min_idle_ms`.
 *
 * ## Commands Used
 *
 * - **XADD** (MAXLEN ~): append with approximate trimming
 * - **XGROUP CREATE**: create consumer group (idempotent)
 * - **XREADGROUP** (`0` / `>`): pending reclaim / new delivery
 * - **XAUTOCLAIM**: steal stale pending entries from dead peers
 * - **XACK / XDEL / XLEN / XRANGE / XINFO / MEMORY USAGE**
 */

use std::collections::BTreeMap;
use std::time::Duration;

use anyhow::Context;
use redis::Value;
use tracing::{debug, error, info};

use pulse_common::Result;
use pulse_config::{CONSUMER_GROUP_EXISTS_ERROR, StreamConfig};
use pulse_domain::StreamEntry;

use crate::codec::{
    pairs_to_map, parse_autoclaim_reply, parse_entry_list, parse_read_reply, value_to_json,
};

/// Direction for `range` queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeOrder {
    Ascending,
    Descending,
}

/// One consumer of this stream's group, as reported by XINFO CONSUMERS.
#[derive(Debug, Clone)]
pub struct ConsumerInfo {
    pub name: String,
    pub idle_secs: f64,
    pub pending: i64,
}

/// The event stream log.
///
/// Cheap to clone (the underlying `ConnectionManager` multiplexes a single
/// connection); each service constructs one at startup and passes it down.
#[derive(Clone)]
pub struct EventStream {
    conn: redis::aio::ConnectionManager,
    key: String,
    group: String,
    consumer: String,
    max_length: i64,
    pending_min_idle_ms: u64,
}

impl EventStream {
    /// Connect to Redis and bind to the configured stream key.
    ///
    /// # Arguments
    ///
    /// * `redis_url` - Redis connection URL
    /// * `config` - stream key parts, group, consumer identity, caps
    pub async fn connect(redis_url: &str, config: &StreamConfig) -> Result<Self> {
        info!(
            "Connecting to Redis at {} (stream: {}, consumer: {})",
            redis_url,
            config.key(),
            config.consumer
        );

        let client = redis::Client::open(redis_url)?;
        let conn = redis::aio::ConnectionManager::new(client).await?;

        info!("✅ Connected to Redis successfully");

        Ok(Self {
            conn,
            key: config.key(),
            group: config.group.clone(),
            consumer: config.consumer.clone(),
            max_length: config.max_length,
            pending_min_idle_ms: config.pending_min_idle_ms,
        })
    }

    /// Full stream key (`<tenant>:<stream-name>`).
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Consumer name of this worker.
    pub fn consumer(&self) -> &str {
        &self.consumer
    }

    /// Ensure the consumer group exists, creating the stream if needed.
    ///
    /// XGROUP CREATE with `id=0` so the group sees entries appended before
    /// the first processor came up. BUSYGROUP means it already exists.
    pub async fn ensure_group(&mut self) -> Result<()> {
        let result: std::result::Result<String, redis::RedisError> = redis::cmd("XGROUP")
            .arg("CREATE")
            .arg(&self.key)
            .arg(&self.group)
            .arg("0")
            .arg("MKSTREAM")
            .query_async(&mut self.conn)
            .await;

        match result {
            Ok(_) => {
                info!(
                    "✅ Created consumer group '{}' for stream '{}'",
                    self.group, self.key
                );
                Ok(())
            }
            Err(e) if e.to_string().contains(CONSUMER_GROUP_EXISTS_ERROR) => {
                debug!(
                    "Consumer group '{}' already exists for stream '{}'",
                    self.group, self.key
                );
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Append an event to the stream with approximate maxlen trimming.
    ///
    /// Empty field values are dropped before the append; all remaining
    /// values are already strings. Fails with a transport error on
    /// connection loss - callers may re-raise or swallow.
    ///
    /// # Returns
    ///
    /// The server-assigned entry id (`<ms>-<seq>`).
    pub async fn append(&mut self, fields: &BTreeMap<String, String>) -> Result<String> {
        let mut cmd = redis::cmd("XADD");
        cmd.arg(&self.key)
            .arg("MAXLEN")
            .arg("~")
            .arg(self.max_length)
            .arg("*");

        for (field, value) in fields {
            if value.is_empty() {
                continue;
            }
            cmd.arg(field).arg(value);
        }

        let id: String = cmd.query_async(&mut self.conn).await.inspect_err(|e| {
            error!("Failed to add entry to stream '{}': {}", self.key, e);
        })?;

        Ok(id)
    }

    /// The processing read: up to `count` entries in three phases, in order,
    /// stopping once the count is met.
    ///
    /// 1. **Pending reclaim** - entries already delivered to *this* consumer
    ///    and not ACKed (crash recovery).
    /// 2. **Stale claim** - pending entries of dead or slow peers, idle for
    ///    at least `pending_min_idle_ms`.
    /// 3. **New delivery** - fresh entries.
    ///
    /// Each phase is best-effort: a failure in one is logged and does not
    /// abort the others.
    pub async fn read(&mut self, count: usize) -> Vec<StreamEntry> {
        if let Err(e) = self.ensure_group().await {
            debug!("Failed to ensure consumer group: {}", e);
            return Vec::new();
        }

        let mut entries = Vec::new();

        match self.read_pending(count).await {
            Ok(pending) => entries.extend(pending),
            Err(e) => debug!("Failed to read pending entries: {}", e),
        }

        if entries.len() < count {
            match self.read_stale(count - entries.len()).await {
                Ok(stale) => entries.extend(stale),
                Err(e) => debug!("Failed to claim stale entries: {}", e),
            }
        }

        if entries.len() < count {
            match self.read_new(count - entries.len()).await {
                Ok(new) => entries.extend(new),
                Err(e) => debug!("Failed to read new entries: {}", e),
            }
        }

        entries
    }

    /// Phase 1: re-read this consumer's own pending entries (XREADGROUP id `0`).
    pub async fn read_pending(&mut self, count: usize) -> Result<Vec<StreamEntry>> {
        let reply: Value = redis::cmd("XREADGROUP")
            .arg("GROUP")
            .arg(&self.group)
            .arg(&self.consumer)
            .arg("COUNT")
            .arg(count)
            .arg("STREAMS")
            .arg(&self.key)
            .arg("0")
            .query_async(&mut self.conn)
            .await?;

        Ok(parse_read_reply(&reply))
    }

    /// Phase 2: take over pending entries from idle peers (XAUTOCLAIM).
    pub async fn read_stale(&mut self, count: usize) -> Result<Vec<StreamEntry>> {
        let reply: Value = redis::cmd("XAUTOCLAIM")
            .arg(&self.key)
            .arg(&self.group)
            .arg(&self.consumer)
            .arg(self.pending_min_idle_ms)
            .arg("0-0")
            .arg("COUNT")
            .arg(count)
            .query_async(&mut self.conn)
            .await?;

        Ok(parse_autoclaim_reply(&reply))
    }

    /// Phase 3: fresh entries never delivered to any consumer (id `>`).
    pub async fn read_new(&mut self, count: usize) -> Result<Vec<StreamEntry>> {
        let reply: Value = redis::cmd("XREADGROUP")
            .arg("GROUP")
            .arg(&self.group)
            .arg(&self.consumer)
            .arg("COUNT")
            .arg(count)
            .arg("STREAMS")
            .arg(&self.key)
            .arg(">")
            .query_async(&mut self.conn)
            .await?;

        Ok(parse_read_reply(&reply))
    }

    /// Acknowledge processed entries. No-op on an empty list; safe to call
    /// with ids from any phase of `read`.
    pub async fn ack(&mut self, ids: &[String]) -> Result<usize> {
        if ids.is_empty() {
            debug!("[{}] No entries to acknowledge (empty list)", self.key);
            return Ok(0);
        }

        let mut cmd = redis::cmd("XACK");
        cmd.arg(&self.key).arg(&self.group);
        for id in ids {
            cmd.arg(id);
        }

        let acked: usize = cmd
            .query_async(&mut self.conn)
            .await
            .context("Failed to acknowledge entries")?;

        debug!(
            "[{}] Acknowledged {} entries (expected {})",
            self.key,
            acked,
            ids.len()
        );

        Ok(acked)
    }

    /// Delete a single entry (XDEL).
    pub async fn delete_entry(&mut self, id: &str) -> Result<()> {
        let _: i64 = redis::cmd("XDEL")
            .arg(&self.key)
            .arg(id)
            .query_async(&mut self.conn)
            .await?;
        Ok(())
    }

    /// Delete the whole stream key.
    pub async fn delete_stream(&mut self) -> Result<()> {
        let _: i64 = redis::cmd("DEL")
            .arg(&self.key)
            .query_async(&mut self.conn)
            .await?;
        Ok(())
    }

    /// Stream length. Returns 0 on failure - introspection never raises.
    pub async fn length(&mut self) -> i64 {
        let result: std::result::Result<i64, redis::RedisError> = redis::cmd("XLEN")
            .arg(&self.key)
            .query_async(&mut self.conn)
            .await;

        match result {
            Ok(len) => len,
            Err(e) => {
                error!("Failed to get stream length: {}", e);
                0
            }
        }
    }

    /// Redis memory usage of the stream key, 0 on failure.
    pub async fn memory_bytes(&mut self) -> i64 {
        let result: std::result::Result<Option<i64>, redis::RedisError> = redis::cmd("MEMORY")
            .arg("USAGE")
            .arg(&self.key)
            .query_async(&mut self.conn)
            .await;

        result.ok().flatten().unwrap_or(0)
    }

    /// Number of entries appended within the trailing `interval`, derived
    /// from the ms prefix of entry ids. 0 on failure.
    pub async fn rate_last(&mut self, interval: Duration) -> i64 {
        let now_ms = chrono::Utc::now().timestamp_millis();
        let start_id = format!("{}-0", now_ms - interval.as_millis() as i64);

        let result: std::result::Result<Value, redis::RedisError> = redis::cmd("XRANGE")
            .arg(&self.key)
            .arg(&start_id)
            .arg("+")
            .query_async(&mut self.conn)
            .await;

        match result {
            Ok(reply) => parse_entry_list(&reply).len() as i64,
            Err(_) => 0,
        }
    }

    /// Delivered-but-unacknowledged count for our group (PEL size), 0 on failure.
    pub async fn pending_length(&mut self) -> i64 {
        let result: std::result::Result<Value, redis::RedisError> = redis::cmd("XPENDING")
            .arg(&self.key)
            .arg(&self.group)
            .query_async(&mut self.conn)
            .await;

        if let Ok(Value::Bulk(parts)) = result {
            if let Some(Value::Int(count)) = parts.first() {
                return *count;
            }
        }
        0
    }

    /// Appended-but-undelivered count for our group (lag), 0 on failure.
    pub async fn unread_length(&mut self) -> i64 {
        for group in self.group_maps().await {
            if group.get("name").map(String::as_str) == Some(self.group.as_str()) {
                return group
                    .get("lag")
                    .and_then(|v| v.parse::<i64>().ok())
                    .unwrap_or(0);
            }
        }
        0
    }

    /// Total backlog not yet acknowledged for our group: pending + lag.
    pub async fn unacked_length(&mut self) -> i64 {
        let mut length = 0;
        for group in self.group_maps().await {
            if group.get("name").map(String::as_str) == Some(self.group.as_str()) {
                length += group
                    .get("pending")
                    .and_then(|v| v.parse::<i64>().ok())
                    .unwrap_or(0);
                length += group
                    .get("lag")
                    .and_then(|v| v.parse::<i64>().ok())
                    .unwrap_or(0);
            }
        }
        length
    }

    /// XRANGE / XREVRANGE normalized to entries. `-` / `+` denote the
    /// stream extremes.
    pub async fn range(
        &mut self,
        min_id: &str,
        max_id: &str,
        count: Option<usize>,
        order: RangeOrder,
    ) -> Result<Vec<StreamEntry>> {
        let mut cmd = match order {
            RangeOrder::Ascending => {
                let mut c = redis::cmd("XRANGE");
                c.arg(&self.key).arg(min_id).arg(max_id);
                c
            }
            // XREVRANGE takes max first
            RangeOrder::Descending => {
                let mut c = redis::cmd("XREVRANGE");
                c.arg(&self.key).arg(max_id).arg(min_id);
                c
            }
        };
        if let Some(count) = count {
            cmd.arg("COUNT").arg(count);
        }

        let reply: Value = cmd.query_async(&mut self.conn).await?;
        Ok(parse_entry_list(&reply))
    }

    /// Most recent `count` entries, newest first. Empty on failure.
    pub async fn latest(&mut self, count: usize) -> Vec<StreamEntry> {
        self.range("-", "+", Some(count), RangeOrder::Descending)
            .await
            .unwrap_or_default()
    }

    /// Decoded XINFO STREAM reply, `None` on failure.
    pub async fn info(&mut self) -> Option<serde_json::Value> {
        let result: std::result::Result<Value, redis::RedisError> = redis::cmd("XINFO")
            .arg("STREAM")
            .arg(&self.key)
            .query_async(&mut self.conn)
            .await;

        result.ok().map(|reply| value_to_json(&reply))
    }

    /// Consumers of our group with idle seconds and pending counts.
    /// Empty on failure.
    pub async fn consumers(&mut self) -> Vec<ConsumerInfo> {
        let result: std::result::Result<Value, redis::RedisError> = redis::cmd("XINFO")
            .arg("CONSUMERS")
            .arg(&self.key)
            .arg(&self.group)
            .query_async(&mut self.conn)
            .await;

        let Ok(Value::Bulk(items)) = result else {
            return Vec::new();
        };

        items
            .iter()
            .map(pairs_to_map)
            .map(|map| ConsumerInfo {
                name: map.get("name").cloned().unwrap_or_default(),
                idle_secs: map
                    .get("idle")
                    .and_then(|v| v.parse::<f64>().ok())
                    .unwrap_or(0.0)
                    / 1000.0,
                pending: map
                    .get("pending")
                    .and_then(|v| v.parse::<i64>().ok())
                    .unwrap_or(0),
            })
            .collect()
    }

    async fn group_maps(&mut self) -> Vec<std::collections::HashMap<String, String>> {
        let result: std::result::Result<Value, redis::RedisError> = redis::cmd("XINFO")
            .arg("GROUPS")
            .arg(&self.key)
            .query_async(&mut self.conn)
            .await;

        match result {
            Ok(Value::Bulk(groups)) => groups.iter().map(pairs_to_map).collect(),
            _ => Vec::new(),
        }
    }
}
