/*!
 * Hot Columnar Store
 *
 * Embedded analytical store backed by a single DuckDB file. The processor
 * is the sole writer; introspection and the warehouse synchronizer open
 * read-only connections. Concurrent writers from different processes are
 * not supported - the sync job uses a file lock for its own exclusion.
 */

use std::path::{Path, PathBuf};

use duckdb::{AccessMode, Config, Connection, params};
use tracing::{debug, error};

use pulse_common::Result;
use pulse_domain::EventRow;

use crate::warehouse::SourceBatch;

/// Hot event store on `<data_dir>/pulse.duckdb`.
#[derive(Debug, Clone)]
pub struct HotStore {
    path: PathBuf,
}

impl HotStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Open a connection; read-only by default.
    pub fn open(&self, read_only: bool) -> Result<Connection> {
        if read_only {
            let config = Config::default().access_mode(AccessMode::ReadOnly)?;
            Ok(Connection::open_with_flags(&self.path, config)?)
        } else {
            if let Some(parent) = self.path.parent() {
                std::fs::create_dir_all(parent).ok();
            }
            Ok(Connection::open(&self.path)?)
        }
    }

    /// Idempotent DDL for the `event` table.
    pub fn ensure_table(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS event (
                id TEXT,
                site TEXT,
                name TEXT,
                timestamp TIMESTAMP,
                app TEXT,
                app_version TEXT,
                frappe_version TEXT,
                data JSON,
                stored_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
            )",
        )?;
        Ok(())
    }

    /// Write a batch of rows in a single transaction.
    ///
    /// Empty input is a no-op. On any error the transaction rolls back and
    /// the error propagates so the caller can dead-letter the batch.
    pub fn store_batch(&self, batch: &[EventRow]) -> Result<()> {
        let mut conn = self.open(false)?;
        Self::ensure_table(&conn)?;

        if batch.is_empty() {
            return Ok(());
        }

        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO event
                    (id, site, name, timestamp, app, app_version, frappe_version, data)
                 VALUES (?, ?, ?, CAST(? AS TIMESTAMP), ?, ?, ?, ?)",
            )?;

            for row in batch {
                stmt.execute(params![
                    row.id,
                    row.site,
                    row.name,
                    row.timestamp,
                    row.app,
                    row.app_version,
                    row.frappe_version,
                    row.data_json(),
                ])?;
            }
        }
        tx.commit()?;

        debug!("Stored batch of {} events", batch.len());
        Ok(())
    }

    /// Best-effort file size; 0 on error.
    pub fn size_bytes(&self) -> i64 {
        std::fs::metadata(&self.path)
            .map(|m| m.len() as i64)
            .unwrap_or(0)
    }

    /// Events persisted whose `timestamp` falls in the trailing window.
    /// 0 on any failure - metric readers never raise.
    pub fn count_recent(&self, window_minutes: i64) -> i64 {
        let result: Result<i64> = (|| {
            let conn = self.open(true)?;
            let count = conn.query_row(
                &format!(
                    "SELECT COUNT(*) FROM event
                     WHERE timestamp >= now() - INTERVAL '{window_minutes} minutes'"
                ),
                [],
                |row| row.get(0),
            )?;
            Ok(count)
        })();

        match result {
            Ok(count) => count,
            Err(e) => {
                debug!("Failed to count recent events: {}", e);
                0
            }
        }
    }

    /// `(id, timestamp-as-epoch-seconds)` samples from the trailing window,
    /// for the processing-lag metric. Empty on any failure.
    pub fn lag_samples(&self, window_minutes: i64, limit: usize) -> Vec<(String, i64)> {
        let result: Result<Vec<(String, i64)>> = (|| {
            let conn = self.open(true)?;
            let mut stmt = conn.prepare(&format!(
                "SELECT id, CAST(epoch(timestamp) AS BIGINT) FROM event
                 WHERE timestamp >= now() - INTERVAL '{window_minutes} minutes'
                 LIMIT {limit}"
            ))?;
            let rows = stmt
                .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })();

        match result {
            Ok(rows) => rows,
            Err(e) => {
                debug!("Failed to sample lag rows: {}", e);
                Vec::new()
            }
        }
    }

    /// Total row count; 0 on failure (missing file included).
    pub fn count_all(&self) -> i64 {
        let result: Result<i64> = (|| {
            let conn = self.open(true)?;
            Ok(conn.query_row("SELECT COUNT(*) FROM event", [], |row| row.get(0))?)
        })();
        result.unwrap_or(0)
    }

    /// Fetch a sync batch: rows strictly past the checkpoint, ordered by
    /// `(creation_key, primary_key)` ascending, every column stringified.
    pub fn fetch_batch(
        &self,
        creation_key: &str,
        primary_key: &str,
        checkpoint: Option<&str>,
        limit: i64,
    ) -> Result<SourceBatch> {
        let conn = self.open(true).inspect_err(|e| {
            error!("Failed to open hot store for sync fetch: {}", e);
        })?;
        crate::warehouse::fetch_table_batch(&conn, "event", creation_key, primary_key, checkpoint, limit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn row(id: &str, name: &str, timestamp: &str) -> EventRow {
        let mut data = BTreeMap::new();
        data.insert("session_id".to_string(), "sess_123".to_string());
        EventRow {
            id: id.to_string(),
            site: "s1".to_string(),
            name: name.to_string(),
            timestamp: timestamp.to_string(),
            app: Some("frappe".to_string()),
            app_version: Some("14.0.0".to_string()),
            frappe_version: None,
            data,
        }
    }

    fn temp_store() -> (tempfile::TempDir, HotStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = HotStore::new(dir.path().join("pulse.duckdb"));
        (dir, store)
    }

    #[test]
    fn test_store_batch_and_count() {
        let (_dir, store) = temp_store();

        store
            .store_batch(&[
                row("1-0", "login", "2025-01-01 00:00:00"),
                row("1-1", "page_view", "2025-01-01 00:00:01"),
            ])
            .unwrap();

        assert_eq!(store.count_all(), 2);
        assert!(store.size_bytes() > 0);
    }

    #[test]
    fn test_empty_batch_is_noop() {
        let (_dir, store) = temp_store();
        store.store_batch(&[]).unwrap();
        assert_eq!(store.count_all(), 0);
    }

    #[test]
    fn test_data_column_holds_overflow_json() {
        let (_dir, store) = temp_store();
        store
            .store_batch(&[row("1-0", "login", "2025-01-01 00:00:00")])
            .unwrap();

        let conn = store.open(true).unwrap();
        let data: String = conn
            .query_row("SELECT CAST(data AS VARCHAR) FROM event", [], |r| r.get(0))
            .unwrap();
        let json: serde_json::Value = serde_json::from_str(&data).unwrap();
        assert_eq!(json["session_id"], "sess_123");
    }

    #[test]
    fn test_sentinels_on_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = HotStore::new(dir.path().join("missing.duckdb"));

        assert_eq!(store.size_bytes(), 0);
        assert_eq!(store.count_recent(10), 0);
        assert!(store.lag_samples(10, 100).is_empty());
        assert_eq!(store.count_all(), 0);
    }

    #[test]
    fn test_fetch_batch_orders_and_filters() {
        let (_dir, store) = temp_store();
        store
            .store_batch(&[
                row("1-0", "a", "2025-01-01 00:00:00"),
                row("1-1", "b", "2025-01-01 00:00:01"),
                row("1-2", "c", "2025-01-01 00:00:02"),
            ])
            .unwrap();

        let batch = store.fetch_batch("timestamp", "id", None, 10).unwrap();
        assert_eq!(batch.rows.len(), 3);

        let ck_idx = batch.column_index("timestamp").unwrap();
        let first = batch.rows[0][ck_idx].clone().unwrap();
        let checkpoint = batch.rows[1][ck_idx].clone().unwrap();
        assert!(first <= checkpoint);

        // strictly-greater filter excludes the checkpoint row itself
        let after = store
            .fetch_batch("timestamp", "id", Some(&checkpoint), 10)
            .unwrap();
        assert_eq!(after.rows.len(), 1);
    }
}
