/*!
 * Pulse API Service
 *
 * The collector's HTTP surface:
 *
 * - `POST /ingest` - one authenticated, rate-limited event
 * - `POST /bulk_ingest` - a list of events; partial failures keep the
 *   successful appends on the stream
 * - `POST /stats` - live ingestion health (read-only, never errors)
 * - `POST /stream_info` - stream internals: consumers, recent entries
 */

pub mod auth;
pub mod error;
pub mod handlers;
pub mod health;
pub mod metrics;
pub mod rate_limit;
pub mod state;

pub use error::ApiError;
pub use state::AppState;

use axum::{Router, routing::get, routing::post};
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

/// Create the application router with all routes and middleware
pub fn create_router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/health", get(health::health_check))
        .route("/ingest", post(handlers::ingest::ingest))
        .route("/bulk_ingest", post(handlers::ingest::bulk_ingest))
        .route("/stats", post(handlers::stats::get_stats))
        .route("/stream_info", post(handlers::stats::get_stream_info))
        .with_state(state);

    Router::new().merge(api_routes).layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive()),
    )
}
