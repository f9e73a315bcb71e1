/*!
 * Sync Config & Run Persistence
 *
 * SQLite-backed storage for sync configurations (durable, one per
 * reference entity, owns the checkpoint) and sync runs (one per
 * invocation).
 */

use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use tracing::info;

use pulse_common::Result;
use pulse_domain::{SyncConfig, SyncRun, SyncStatus};

/// SQLite store for sync configs and runs.
#[derive(Clone)]
pub struct SyncStore {
    pool: SqlitePool,
}

impl SyncStore {
    /// Connect and ensure the schema exists.
    pub async fn connect(db_url: &str) -> Result<Self> {
        info!("Initializing sync database: {}", db_url);

        // One writer is plenty here, and a single connection keeps
        // in-memory databases coherent across calls.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect(db_url)
            .await?;
        let store = Self { pool };
        store.ensure_schema().await?;

        Ok(store)
    }

    async fn ensure_schema(&self) -> Result<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS sync_config (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                reference_type TEXT NOT NULL UNIQUE,
                creation_key TEXT NOT NULL DEFAULT 'creation',
                primary_key TEXT NOT NULL DEFAULT 'name',
                checkpoint TEXT,
                row_size INTEGER NOT NULL DEFAULT 0,
                table_name TEXT NOT NULL,
                enabled INTEGER NOT NULL DEFAULT 1
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS sync_run (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                config_id INTEGER NOT NULL,
                batch_size INTEGER NOT NULL DEFAULT 1000,
                started_at TEXT,
                ended_at TEXT,
                status TEXT NOT NULL DEFAULT 'Queued',
                total_inserted INTEGER NOT NULL DEFAULT 0,
                log TEXT NOT NULL DEFAULT ''
            )",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Insert a config if none exists for its reference type; returns the
    /// stored config either way.
    pub async fn ensure_config(&self, config: &SyncConfig) -> Result<SyncConfig> {
        if let Some(existing) = self.get_config(&config.reference_type).await? {
            return Ok(existing);
        }

        sqlx::query(
            "INSERT INTO sync_config
                (reference_type, creation_key, primary_key, checkpoint, row_size, table_name, enabled)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&config.reference_type)
        .bind(&config.creation_key)
        .bind(&config.primary_key)
        .bind(&config.checkpoint)
        .bind(config.row_size)
        .bind(&config.table_name)
        .bind(config.enabled)
        .execute(&self.pool)
        .await?;

        info!("Registered sync config for '{}'", config.reference_type);
        self.get_config(&config.reference_type)
            .await?
            .ok_or_else(|| sqlx::Error::RowNotFound.into())
    }

    pub async fn get_config(&self, reference_type: &str) -> Result<Option<SyncConfig>> {
        let row = sqlx::query("SELECT * FROM sync_config WHERE reference_type = ?")
            .bind(reference_type)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|r| config_from_row(&r)))
    }

    pub async fn enabled_configs(&self) -> Result<Vec<SyncConfig>> {
        let rows = sqlx::query("SELECT * FROM sync_config WHERE enabled = 1 ORDER BY id")
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.iter().map(config_from_row).collect())
    }

    /// Persist a new checkpoint. Called after each batch lands so a failed
    /// run resumes without gap or duplicate.
    pub async fn set_checkpoint(&self, config_id: i64, checkpoint: Option<&str>) -> Result<()> {
        sqlx::query("UPDATE sync_config SET checkpoint = ? WHERE id = ?")
            .bind(checkpoint)
            .bind(config_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn set_row_size(&self, config_id: i64, row_size: i64) -> Result<()> {
        sqlx::query("UPDATE sync_config SET row_size = ? WHERE id = ?")
            .bind(row_size)
            .bind(config_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Insert a run record and return it with its assigned id.
    pub async fn create_run(&self, run: &SyncRun) -> Result<SyncRun> {
        let result = sqlx::query(
            "INSERT INTO sync_run (config_id, batch_size, status, total_inserted, log)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(run.config_id)
        .bind(run.batch_size)
        .bind(run.status.as_str())
        .bind(run.total_inserted)
        .bind(&run.log)
        .execute(&self.pool)
        .await?;

        let mut created = run.clone();
        created.id = result.last_insert_rowid();
        Ok(created)
    }

    /// Persist the run's current state (status, counters, log, timestamps).
    pub async fn update_run(&self, run: &SyncRun) -> Result<()> {
        sqlx::query(
            "UPDATE sync_run
             SET batch_size = ?, started_at = ?, ended_at = ?, status = ?,
                 total_inserted = ?, log = ?
             WHERE id = ?",
        )
        .bind(run.batch_size)
        .bind(run.started_at.map(|t| t.to_rfc3339()))
        .bind(run.ended_at.map(|t| t.to_rfc3339()))
        .bind(run.status.as_str())
        .bind(run.total_inserted)
        .bind(&run.log)
        .bind(run.id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_run(&self, id: i64) -> Result<Option<SyncRun>> {
        let row = sqlx::query("SELECT * FROM sync_run WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|r| run_from_row(&r)))
    }
}

fn config_from_row(row: &SqliteRow) -> SyncConfig {
    SyncConfig {
        id: row.get("id"),
        reference_type: row.get("reference_type"),
        creation_key: row.get("creation_key"),
        primary_key: row.get("primary_key"),
        checkpoint: row.get("checkpoint"),
        row_size: row.get("row_size"),
        table_name: row.get("table_name"),
        enabled: row.get("enabled"),
    }
}

fn run_from_row(row: &SqliteRow) -> SyncRun {
    let parse_ts = |value: Option<String>| -> Option<DateTime<Utc>> {
        value
            .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
            .map(|t| t.with_timezone(&Utc))
    };

    SyncRun {
        id: row.get("id"),
        config_id: row.get("config_id"),
        batch_size: row.get("batch_size"),
        started_at: parse_ts(row.get("started_at")),
        ended_at: parse_ts(row.get("ended_at")),
        status: SyncStatus::parse(row.get::<String, _>("status").as_str())
            .unwrap_or(SyncStatus::Queued),
        total_inserted: row.get("total_inserted"),
        log: row.get("log"),
    }
}
