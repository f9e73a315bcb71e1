/*!
 * Introspection Handlers
 *
 * Live ingestion health for the dashboard. Every metric accessor degrades
 * to 0 (or an empty list) on failure - this surface never errors.
 */

use std::time::Duration;

use axum::{Json, extract::State, http::HeaderMap};
use chrono::{SecondsFormat, Utc};
use serde_json::{Value, json};

use pulse_domain::entry_ms;

use crate::auth;
use crate::error::ApiError;
use crate::state::AppState;

/// Window for the rate metrics.
const INTERVAL: Duration = Duration::from_secs(600);

/// Window (in minutes) for the hot-store queries.
const WINDOW_MINUTES: i64 = 10;

/// Rows sampled for the lag estimate.
const MAX_SAMPLE_ROWS: usize = 2000;

/// Compute and return live ingestion/processing stats.
pub async fn get_stats(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Value>, ApiError> {
    auth::check_auth(&headers, &state.api.api_key)?;

    let mut stream = state.stream.clone();

    let received = stream.rate_last(INTERVAL).await;
    let processed = state.hot.count_recent(WINDOW_MINUTES);
    let processing_rate = if received > 0 {
        (processed as f64 / received as f64 * 10_000.0).round() / 10_000.0
    } else {
        0.0
    };

    Ok(Json(json!({
        // ingestion stats
        "events_received_per_hour": received,
        "events_processed_per_hour": processed,
        "processing_rate": processing_rate,
        "processing_lag_seconds": processing_lag_seconds(&state),
        "events_in_stream": stream.length().await,
        "events_pending": stream.unacked_length().await,
        // resource usage
        "stream_memory_bytes": stream.memory_bytes().await,
        "duckdb_size_bytes": state.hot.size_bytes(),
        "last_updated": Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true),
    })))
}

/// Stream internals: length, consumers, and the most recent entries.
pub async fn get_stream_info(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Value>, ApiError> {
    auth::check_auth(&headers, &state.api.api_key)?;

    let mut stream = state.stream.clone();

    let consumers: Vec<Value> = stream
        .consumers()
        .await
        .into_iter()
        .map(|c| {
            json!({
                "name": c.name,
                "idle": c.idle_secs,
                "pending": c.pending,
            })
        })
        .collect();

    let entries: Vec<Value> = stream
        .latest(10)
        .await
        .into_iter()
        .map(|e| json!({ "id": e.id, "data": e.data }))
        .collect();

    Ok(Json(json!({
        "name": stream.key(),
        "length": stream.length().await,
        "lag": stream.unacked_length().await,
        "memory_usage": stream.memory_bytes().await,
        "entries_per_minute": stream.rate_last(Duration::from_secs(60)).await,
        "consumers": consumers,
        "entries": entries,
        "info": stream.info().await,
    })))
}

/// Mean of (row timestamp - entry-id receipt time) over the recent window,
/// clamped non-negative; 0 when the window is empty.
///
/// The entry id's ms prefix approximates receipt time - only meaningful
/// when clocks are comparable.
fn processing_lag_seconds(state: &AppState) -> i64 {
    let samples = state.hot.lag_samples(WINDOW_MINUTES, MAX_SAMPLE_ROWS);

    let lags: Vec<f64> = samples
        .iter()
        .filter_map(|(id, stored_epoch)| {
            let receipt_ms = entry_ms(id)?;
            let delta = *stored_epoch as f64 - receipt_ms as f64 / 1000.0;
            (delta >= 0.0).then_some(delta)
        })
        .collect();

    if lags.is_empty() {
        return 0;
    }
    (lags.iter().sum::<f64>() / lags.len() as f64) as i64
}
