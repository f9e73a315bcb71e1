/*!
 * Ingest Handlers
 *
 * `POST /ingest` accepts one event, `POST /bulk_ingest` a list. Both are
 * authenticated with the shared secret and rate-limited per remote
 * address. Each accepted event becomes one XADD with `received_at` set to
 * the server clock; responses never contain entry ids.
 */

use std::net::SocketAddr;

use axum::{
    Json,
    extract::{ConnectInfo, State},
    http::HeaderMap,
};
use chrono::{DateTime, Local, NaiveDateTime};
use serde_json::{Value, json};
use tracing::error;

use pulse_domain::IngestEvent;

use crate::error::ApiError;
use crate::state::AppState;
use crate::{auth, metrics, rate_limit};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

/// Ingest a single event.
pub async fn ingest(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Result<Json<Value>, ApiError> {
    auth::check_auth(&headers, &state.api.api_key)?;
    rate_limit::check(&state.limiter, addr.ip())?;

    let event: IngestEvent =
        serde_json::from_value(body).map_err(|e| ApiError::Internal(e.to_string()))?;

    append_event(&state, &event).await?;

    Ok(Json(json!({
        "status": "success",
        "message": "Event tracked successfully",
    })))
}

/// Ingest a list of events.
///
/// On partial failure, successfully appended events are retained on the
/// stream and the call fails with the count of failed items.
pub async fn bulk_ingest(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Result<Json<Value>, ApiError> {
    auth::check_auth(&headers, &state.api.api_key)?;
    rate_limit::check(&state.limiter, addr.ip())?;

    let Value::Array(items) = body else {
        return Err(ApiError::NotAList);
    };

    let total = items.len();
    let mut failed = 0usize;
    for item in items {
        let appended = match serde_json::from_value::<IngestEvent>(item) {
            Ok(event) => append_event(&state, &event).await,
            Err(e) => Err(ApiError::Internal(e.to_string())),
        };
        if let Err(e) = appended {
            // the offending event body is not logged, only the failure
            error!("Failed to insert event: {:?}", e);
            failed += 1;
        }
    }

    if failed > 0 {
        return Err(ApiError::BulkFailures { failed, total });
    }

    Ok(Json(json!({
        "status": "success",
        "message": format!("Tracked {total} events"),
    })))
}

/// Validate, normalize, and append one event to the stream.
async fn append_event(state: &AppState, event: &IngestEvent) -> Result<(), ApiError> {
    let missing = event.missing_required();
    if !missing.is_empty() {
        metrics::REJECTED_EVENTS_TOTAL.inc();
        return Err(ApiError::Validation { missing });
    }

    let captured_at = normalize_captured_at(&event.captured_at).ok_or_else(|| {
        metrics::REJECTED_EVENTS_TOTAL.inc();
        ApiError::Validation {
            missing: vec!["captured_at".to_string()],
        }
    })?;

    let received_at = Local::now().format(TIMESTAMP_FORMAT).to_string();
    let fields = event.stream_fields(&captured_at, &received_at);

    let mut stream = state.stream.clone();
    stream.append(&fields).await.map_err(|e| {
        error!("Failed to insert event: {}, Error: {}", event.event_name, e);
        metrics::REJECTED_EVENTS_TOTAL.inc();
        ApiError::Internal("Failed to track event".to_string())
    })?;

    metrics::INGESTED_EVENTS_TOTAL.inc();
    Ok(())
}

/// Interpret `captured_at` as ISO-8601 with optional timezone. Zoned
/// values are normalized to the system timezone; naive values pass
/// through. Returns `None` when the value is not a datetime at all.
fn normalize_captured_at(value: &str) -> Option<String> {
    if let Ok(zoned) = DateTime::parse_from_rfc3339(value) {
        return Some(
            zoned
                .with_timezone(&Local)
                .format(TIMESTAMP_FORMAT)
                .to_string(),
        );
    }

    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, format) {
            return Some(naive.format(TIMESTAMP_FORMAT).to_string());
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_accepts_rfc3339() {
        let normalized = normalize_captured_at("2025-01-01T00:00:00Z").unwrap();
        // exact value depends on the host timezone; the shape does not
        assert_eq!(normalized.len(), "2025-01-01 00:00:00.000000".len());
        assert!(normalized.contains(' '));
    }

    #[test]
    fn test_normalize_accepts_naive_forms() {
        assert_eq!(
            normalize_captured_at("2025-01-01 12:30:45").unwrap(),
            "2025-01-01 12:30:45.000000"
        );
        assert_eq!(
            normalize_captured_at("2025-01-01T12:30:45.5").unwrap(),
            "2025-01-01 12:30:45.500000"
        );
    }

    #[test]
    fn test_normalize_rejects_garbage() {
        assert!(normalize_captured_at("not a date").is_none());
        assert!(normalize_captured_at("").is_none());
    }
}
