//! Logging and tracing setup
//!
//! Provides structured logging configuration using tracing.

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize tracing/logging for the application
///
/// Reads the log level from the RUST_LOG env var, defaults to info.
///
/// Usage:
/// ```no_run
/// // In main.rs
/// pulse_common::init_tracing();
///
/// // Then in your code:
/// tracing::info!("Server starting on port 8080");
/// ```
pub fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_level(true)
                .compact(),
        )
        .init();
}

/// Initialize tracing with JSON output (for production)
///
/// Outputs logs in JSON format, better for log aggregation systems.
pub fn init_tracing_json() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_target(true)
                .with_level(true)
                .with_current_span(true),
        )
        .init();
}
