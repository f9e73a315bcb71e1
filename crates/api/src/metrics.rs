/*!
 * Prometheus Metrics for the API Service
 */

use lazy_static::lazy_static;
use prometheus::{
    Encoder, IntCounter, TextEncoder, opts, register_int_counter,
};

lazy_static! {
    /// Events accepted onto the stream
    pub static ref INGESTED_EVENTS_TOTAL: IntCounter = register_int_counter!(
        opts!("pulse_api_ingested_events_total", "Total number of events appended to the stream")
    )
    .expect("metric can be created");

    /// Events rejected by validation or append failure
    pub static ref REJECTED_EVENTS_TOTAL: IntCounter = register_int_counter!(
        opts!("pulse_api_rejected_events_total", "Total number of events rejected at ingest")
    )
    .expect("metric can be created");

    /// Requests refused by the rate limiter
    pub static ref RATE_LIMITED_TOTAL: IntCounter = register_int_counter!(
        opts!("pulse_api_rate_limited_total", "Total number of rate-limited requests")
    )
    .expect("metric can be created");
}

/// Render metrics in Prometheus format
pub fn render_metrics() -> Result<String, Box<dyn std::error::Error>> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = vec![];
    encoder.encode(&metric_families, &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}
