use axum::Json;
use serde_json::{Value, json};

/// Health check endpoint for the processor
pub async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "service": "pulse-processor",
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

/// Readiness probe
pub async fn readiness_check() -> Json<Value> {
    Json(json!({
        "ready": true,
        "service": "pulse-processor",
    }))
}
