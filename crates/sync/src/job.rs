/*!
 * Sync Job
 *
 * One invocation of the warehouse synchronizer for a single config. Holds
 * the cross-process file lock for the whole drain loop and advances the
 * checkpoint only after the batch carrying it has been inserted.
 */

use std::path::PathBuf;
use std::time::Duration;

use chrono::Utc;
use tracing::error;

use pulse_common::{Error, NamedFileLock, Result};
use pulse_domain::{SyncConfig, SyncRun, SyncStatus};
use pulse_storage::Warehouse;

use crate::source::EventSource;
use crate::store::SyncStore;

/// Rows sampled when estimating bytes per row.
const ROW_SIZE_SAMPLE: i64 = 10;

/// Pause between drained batches.
const BATCH_PAUSE: Duration = Duration::from_millis(10);

pub struct SyncJob {
    store: SyncStore,
    warehouse: Warehouse,
    lock_dir: PathBuf,
    lock_timeout: Duration,
}

impl SyncJob {
    pub fn new(
        store: SyncStore,
        warehouse: Warehouse,
        lock_dir: PathBuf,
        lock_timeout: Duration,
    ) -> Self {
        Self {
            store,
            warehouse,
            lock_dir,
            lock_timeout,
        }
    }

    /// Execute one run for `config` against `source`.
    ///
    /// Always returns the persisted run record; failures are captured in
    /// its status and log rather than propagated, so the scheduler treats
    /// every tick as complete.
    pub async fn run(&self, config: &SyncConfig, source: &EventSource) -> Result<SyncRun> {
        let mut run = self.store.create_run(&SyncRun::new(config.id)).await?;

        if !self.should_sync(config, source) {
            run.log_msg("No new rows to sync or job is disabled.");
            run.status = SyncStatus::Skipped;
            self.store.update_run(&run).await?;
            return Ok(run);
        }

        // Refresh the per-row estimate and derive the batch size from it
        let mut config = config.clone();
        if let Ok(sample) = source.sample(ROW_SIZE_SAMPLE) {
            let row_size = sample.estimated_row_bytes();
            if row_size > 0 {
                config.row_size = row_size;
                self.store.set_row_size(config.id, row_size).await?;
            }
        }
        run.batch_size = config.batch_size();
        run.started_at = Some(Utc::now());
        run.status = SyncStatus::InProgress;
        self.store.update_run(&run).await?;

        match self.drain(&config, source, &mut run).await {
            Ok(()) => {
                run.ended_at = Some(Utc::now());
                run.status = SyncStatus::Completed;
            }
            Err(Error::LockTimeout(_)) => {
                run.status = SyncStatus::Skipped;
                run.log_msg(&format!(
                    "Failed to acquire lock for {}, another sync already running.",
                    config.reference_type
                ));
            }
            Err(e) => {
                error!(
                    "Error occurred while synchronizing {} to warehouse: {}",
                    config.reference_type, e
                );
                run.status = SyncStatus::Failed;
                run.log_msg(&format!("Error occurred: {e}"));
            }
        }

        self.store.update_run(&run).await?;
        Ok(run)
    }

    /// Preconditions: enabled config and at least one row past the checkpoint.
    fn should_sync(&self, config: &SyncConfig, source: &EventSource) -> bool {
        if !config.enabled {
            return false;
        }
        match source.fetch(config.checkpoint.as_deref(), 1) {
            Ok(batch) => !batch.is_empty(),
            Err(e) => {
                error!("Failed to probe source for {}: {}", config.reference_type, e);
                false
            }
        }
    }

    /// The lock-guarded drain loop.
    async fn drain(
        &self,
        config: &SyncConfig,
        source: &EventSource,
        run: &mut SyncRun,
    ) -> Result<()> {
        // The named lock guards the warehouse attach as well: DuckDB holds
        // its own exclusive file lock, so a second attach would fail hard
        // where we want a clean Skipped.
        let lock_name = format!("duckdb_sync:{}", config.table_name);
        let _lock = NamedFileLock::acquire(&self.lock_dir, &lock_name, self.lock_timeout)?;

        let mut conn = self.warehouse.connect()?;

        if !Warehouse::table_exists(&conn, &config.table_name)? {
            let sample = source.sample(1)?;
            Warehouse::create_table_from_sample(&conn, &config.table_name, &sample)?;
            run.log_msg(&format!(
                "Created table {} in warehouse.",
                config.table_name
            ));
            self.store.update_run(run).await?;
        }

        let mut checkpoint = config.checkpoint.clone();
        loop {
            let batch = source.fetch(checkpoint.as_deref(), run.batch_size)?;
            if batch.is_empty() {
                run.log_msg(&format!(
                    "No new data to insert after {}",
                    checkpoint.as_deref().unwrap_or("start")
                ));
                self.store.update_run(run).await?;
                break;
            }

            let batch_count = batch.len() as i64;
            let inserted = Warehouse::insert_new_rows(
                &mut conn,
                &config.table_name,
                &batch,
                &config.primary_key,
            )?;
            let skipped = batch_count - inserted;

            checkpoint = batch.last_value(&config.creation_key).or(checkpoint);
            self.store
                .set_checkpoint(config.id, checkpoint.as_deref())
                .await?;

            let mut line = format!(
                "Inserted {inserted} rows up to {}",
                checkpoint.as_deref().unwrap_or("start")
            );
            if skipped > 0 {
                line.push_str(&format!(" (Skipped: {skipped})"));
            }
            run.log_msg(&line);
            run.total_inserted += inserted;
            self.store.update_run(run).await?;

            if batch_count < run.batch_size {
                break;
            }
            tokio::time::sleep(BATCH_PAUSE).await;
        }

        Ok(())
    }
}
