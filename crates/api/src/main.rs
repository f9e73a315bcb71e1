use std::net::SocketAddr;

use anyhow::{Context, Result};
use axum::{Router, routing::get};
use tokio::signal;
use tracing::{info, warn};

use pulse_api::{AppState, create_router, metrics, rate_limit};
use pulse_storage::HotStore;
use pulse_stream::EventStream;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    pulse_common::init_tracing();

    info!("🚀 Starting Pulse API server...");

    // Load configuration
    let config = pulse_config::Config::load().context("Failed to load configuration")?;
    info!(
        "Configuration loaded - server will bind to {}:{}",
        config.api.host, config.api.port
    );

    // Connect to the event stream and make sure the group exists so the
    // introspection counters are meaningful from the first request on.
    let mut stream = EventStream::connect(&config.redis.url, &config.stream)
        .await
        .context("Failed to connect to event stream")?;
    stream
        .ensure_group()
        .await
        .context("Failed to ensure consumer group")?;

    let hot = HotStore::new(config.storage.hot_db_path());
    let limiter = rate_limit::build_limiter(config.api.rate_limit_per_hour);

    let state = AppState::new(stream, hot, config.api.clone(), limiter);

    // Build application router
    let app = create_router(state);

    // Create metrics router (separate server on the metrics port)
    let metrics_app = Router::new().route("/metrics", get(metrics_handler));

    let addr = format!("{}:{}", config.api.host, config.api.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    let metrics_addr = format!("{}:{}", config.api.host, config.observability.metrics_port);
    let metrics_listener = tokio::net::TcpListener::bind(&metrics_addr).await?;

    info!("Pulse API server listening on {}", addr);
    info!("Metrics server listening on {}", metrics_addr);

    // Start both servers concurrently with graceful shutdown
    tokio::select! {
        res = axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown_signal()) => {
            res?;
        }
        res = axum::serve(metrics_listener, metrics_app)
            .with_graceful_shutdown(shutdown_signal()) => {
            res?;
        }
    }

    info!("Pulse API server shut down gracefully");

    Ok(())
}

/// Metrics endpoint handler
async fn metrics_handler() -> Result<String, (axum::http::StatusCode, String)> {
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
        _ = ctrl_c => {
            warn!("Received Ctrl+C, shutting down...");
        },
        _ = terminate => {
            warn!("Received terminate signal, shutting down...");
        },
    }
}
