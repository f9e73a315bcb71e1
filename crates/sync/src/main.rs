/*!
 * Warehouse Sync Service
 *
 * Periodically mirrors enabled sources into the warehouse. Each tick runs
 * one sync job per enabled config; cross-process exclusion per target
 * table comes from the named file lock inside the job.
 */

use anyhow::{Context, Result};
use std::time::Duration;
use tokio::signal;
use tracing::{error, info};

use pulse_domain::SyncConfig;
use pulse_storage::{HotStore, Warehouse};
use pulse_sync::{EventSource, SyncJob, SyncStore};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    pulse_common::init_tracing();

    info!("🚀 Starting Warehouse Sync Service");

    // Load configuration
    let config = pulse_config::Config::load().context("Failed to load configuration")?;

    std::fs::create_dir_all(&config.storage.data_dir)
        .context("Failed to create data directory")?;

    info!("📋 Configuration loaded:");
    info!("   - Sync DB: {}", config.sync.db_url);
    info!(
        "   - Warehouse: {}",
        config.storage.warehouse_db_path().display()
    );
    info!("   - Interval: {}s", config.sync.interval_secs);
    info!("   - Lock Timeout: {}s", config.sync.lock_timeout_secs);

    let store = SyncStore::connect(&config.sync.db_url)
        .await
        .context("Failed to connect to sync database")?;

    // The hot event table is the one built-in source; stored_at is its
    // monotonic cursor and the entry id its de-dup key.
    let mut event_config = SyncConfig::new("event", "event");
    event_config.creation_key = "stored_at".to_string();
    event_config.primary_key = "id".to_string();
    store
        .ensure_config(&event_config)
        .await
        .context("Failed to register event sync config")?;

    let warehouse = Warehouse::new(config.storage.warehouse_db_path());
    let hot_store = HotStore::new(config.storage.hot_db_path());
    let job = SyncJob::new(
        store.clone(),
        warehouse,
        config.storage.lock_dir(),
        Duration::from_secs(config.sync.lock_timeout_secs),
    );

    info!("✅ Warehouse Sync is running");
    info!("   - Press Ctrl+C to shutdown gracefully");

    let mut interval = tokio::time::interval(Duration::from_secs(config.sync.interval_secs));
    loop {
        tokio::select! {
            _ = interval.tick() => {
                sync_all(&store, &job, &hot_store, &config).await;
            }
            _ = shutdown_signal() => {
                info!("🛑 Shutting down Warehouse Sync...");
                break;
            }
        }
    }

    info!("Warehouse Sync shutdown complete");
    Ok(())
}

/// Run every enabled config once. Per-config failures are contained in the
/// run records; a broken config never blocks its siblings.
async fn sync_all(
    store: &SyncStore,
    job: &SyncJob,
    hot_store: &HotStore,
    config: &pulse_config::Config,
) {
    let configs = match store.enabled_configs().await {
        Ok(configs) => configs,
        Err(e) => {
            error!("Failed to load sync configs: {}", e);
            return;
        }
    };

    for sync_config in configs {
        let source = source_for(&sync_config, hot_store, config);
        match job.run(&sync_config, &source).await {
            Ok(run) => {
                info!(
                    "Sync '{}' finished: {} ({} inserted)",
                    sync_config.reference_type, run.status, run.total_inserted
                );
            }
            Err(e) => {
                error!("Sync '{}' failed to record: {}", sync_config.reference_type, e);
            }
        }
    }
}

/// Resolve a config's source. `stream:<suffix>` references read the event
/// log directly; everything else reads the hot store table.
fn source_for(
    sync_config: &SyncConfig,
    hot_store: &HotStore,
    config: &pulse_config::Config,
) -> EventSource {
    match sync_config.reference_type.strip_prefix("stream:") {
        Some(_) => EventSource::stream(&config.redis.url, &config.stream.key()),
        None => EventSource::hot(
            hot_store.clone(),
            &sync_config.creation_key,
            &sync_config.primary_key,
        ),
    }
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
