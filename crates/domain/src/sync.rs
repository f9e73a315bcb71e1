/*!
 * Warehouse Sync Types
 *
 * A `SyncConfig` is durable, one per reference entity, and owns the
 * checkpoint. A `SyncRun` records a single invocation: status, counters,
 * and a human-readable log.
 */

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Terminal and transitional states of a sync run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncStatus {
    Queued,
    InProgress,
    Completed,
    Failed,
    Skipped,
}

impl SyncStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::Queued => "Queued",
            SyncStatus::InProgress => "In Progress",
            SyncStatus::Completed => "Completed",
            SyncStatus::Failed => "Failed",
            SyncStatus::Skipped => "Skipped",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "Queued" => Some(SyncStatus::Queued),
            "In Progress" => Some(SyncStatus::InProgress),
            "Completed" => Some(SyncStatus::Completed),
            "Failed" => Some(SyncStatus::Failed),
            "Skipped" => Some(SyncStatus::Skipped),
            _ => None,
        }
    }
}

impl std::fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Durable per-entity sync configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    pub id: i64,
    /// Source entity this config mirrors (e.g. "event").
    pub reference_type: String,
    /// Monotonically non-decreasing cursor column.
    pub creation_key: String,
    /// De-dup key; unique in the warehouse table.
    pub primary_key: String,
    /// Largest `creation_key` value successfully mirrored so far.
    pub checkpoint: Option<String>,
    /// Estimated bytes per source row (10-row sample).
    pub row_size: i64,
    pub table_name: String,
    pub enabled: bool,
}

impl SyncConfig {
    /// A fresh config with the conventional defaults for cursor and key.
    pub fn new(reference_type: &str, table_name: &str) -> Self {
        SyncConfig {
            id: 0,
            reference_type: reference_type.to_string(),
            creation_key: "creation".to_string(),
            primary_key: "name".to_string(),
            checkpoint: None,
            row_size: 0,
            table_name: table_name.to_string(),
            enabled: true,
        }
    }

    /// Batch size targeting ~256 MiB per batch, 1000 when no estimate exists.
    pub fn batch_size(&self) -> i64 {
        if self.row_size <= 0 {
            return 1000;
        }
        ((256 * 1024 * 1024) / self.row_size).max(1)
    }
}

/// One sync invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncRun {
    pub id: i64,
    pub config_id: i64,
    pub batch_size: i64,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub status: SyncStatus,
    pub total_inserted: i64,
    pub log: String,
}

impl SyncRun {
    pub fn new(config_id: i64) -> Self {
        SyncRun {
            id: 0,
            config_id,
            batch_size: 1000,
            started_at: None,
            ended_at: None,
            status: SyncStatus::Queued,
            total_inserted: 0,
            log: String::new(),
        }
    }

    /// Append a timestamped line to the run log.
    pub fn log_msg(&mut self, msg: &str) {
        let line = format!("{}: {msg}\n", Utc::now().format("%Y-%m-%d %H:%M:%S"));
        self.log.push_str(&line);
    }
}
