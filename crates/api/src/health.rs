use axum::Json;
use serde_json::{Value, json};

/// Health check endpoint for the API service
pub async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "service": "pulse-api",
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}
