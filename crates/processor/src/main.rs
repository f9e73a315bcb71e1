/*!
 * Event Processor Service
 *
 * Drains the event stream into the hot columnar store on a fixed cadence.
 *
 * ## Service Flow
 *
 * ```text
 * 1. read(max_stream_length / 2) from the stream
 *    ├─> pending entries of this consumer (crash recovery)
 *    ├─> stale entries claimed from idle peers (XAUTOCLAIM)
 *    └─> new deliveries
 *
 * 2. Sanitize -> accepted rows + discarded ids
 *
 * 3. store_batch() to DuckDB in one transaction
 *    └─> on failure: deposit batch to the DLQ
 *
 * 4. XACK everything read this cycle
 * ```
 *
 * ## Horizontal Scaling
 *
 * Multiple worker processes share the consumer group; each must carry a
 * distinct RQ_WORKER_ID. Crash recovery comes from the pending entry list
 * plus the idle-claim threshold.
 */

use anyhow::{Context, Result};
use std::time::Duration;
use tokio::signal;
use tracing::{error, info};

use pulse_processor::{EventProcessor, health, metrics};
use pulse_storage::HotStore;
use pulse_stream::{DeadLetterQueue, EventStream};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    pulse_common::init_tracing();

    info!("🚀 Starting Event Processor Service");

    // Load configuration
    let config = pulse_config::Config::load().context("Failed to load configuration")?;

    info!("📋 Configuration loaded:");
    info!("   - Stream: {}", config.stream.key());
    info!("   - Consumer Group: {}", config.stream.group);
    info!("   - Consumer Name: {}", config.stream.consumer);
    info!("   - Max Stream Length: {}", config.stream.max_length);
    info!("   - Drain Interval: {}s", config.processor.interval_secs);

    // Connect to the event stream
    info!("📡 Connecting to Redis Streams...");
    let mut stream = EventStream::connect(&config.redis.url, &config.stream)
        .await
        .context("Failed to connect to event stream")?;
    stream
        .ensure_group()
        .await
        .context("Failed to ensure consumer group")?;
    info!("✅ Redis Streams connected");

    let dlq = DeadLetterQueue::connect(&config.redis.url, &config.stream.key())
        .await
        .context("Failed to connect to dead-letter stream")?;

    let store = HotStore::new(config.storage.hot_db_path());
    info!("🗄️  Hot store: {}", store.path().display());

    let mut event_processor =
        EventProcessor::new(stream.clone(), dlq, store, config.stream.max_length);

    // Start health + metrics server
    let metrics_port = config.observability.metrics_port;
    let _metrics_handle = tokio::spawn(async move {
        let app = axum::Router::new()
            .route("/health", axum::routing::get(health::health_check))
            .route("/ready", axum::routing::get(health::readiness_check))
            .route("/metrics", axum::routing::get(metrics_handler));

        let addr = format!("0.0.0.0:{metrics_port}");
        let listener = tokio::net::TcpListener::bind(&addr).await.unwrap();
        info!("✅ Metrics server listening on {}", addr);

        axum::serve(listener, app).await.unwrap();
    });

    info!("✅ Event Processor is running");
    info!("   - Press Ctrl+C to shutdown gracefully");

    // Drain cycles on a fixed cadence; the shutdown signal interrupts
    // between cycles, never mid-batch.
    let mut interval = tokio::time::interval(Duration::from_secs(config.processor.interval_secs));
    loop {
        tokio::select! {
            _ = interval.tick() => {
                let timer = metrics::DRAIN_DURATION.start_timer();
                let outcome = event_processor.process().await;
                timer.observe_duration();

                if outcome.failed > 0 {
                    error!("Drain cycle dead-lettered {} events", outcome.failed);
                }

                metrics::STREAM_BACKLOG.set(stream.unacked_length().await);
            }
            _ = shutdown_signal() => {
                info!("🛑 Shutting down Event Processor...");
                break;
            }
        }
    }

    info!("Event Processor shutdown complete");
    Ok(())
}

/// Metrics endpoint handler
async fn metrics_handler() -> std::result::Result<String, (axum::http::StatusCode, String)> {
    metrics::render_metrics()
        .map_err(|e| (axum::http::StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))
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
