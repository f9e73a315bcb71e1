/*!
 * Prometheus Metrics for the Event Processor
 *
 * Exposed on /metrics for Prometheus scraping
 */

use lazy_static::lazy_static;
use prometheus::{
    Encoder, Histogram, IntCounter, IntGauge, TextEncoder, histogram_opts, opts,
    register_histogram, register_int_counter, register_int_gauge,
};

lazy_static! {
    /// Events persisted to the hot store
    pub static ref EVENTS_PROCESSED_TOTAL: IntCounter = register_int_counter!(
        opts!("pulse_processor_events_processed_total", "Total number of events persisted to the hot store")
    )
    .expect("metric can be created");

    /// Events discarded during sanitization
    pub static ref EVENTS_DISCARDED_TOTAL: IntCounter = register_int_counter!(
        opts!("pulse_processor_events_discarded_total", "Total number of events discarded as unprocessable")
    )
    .expect("metric can be created");

    /// Events diverted to the dead-letter sink
    pub static ref EVENTS_DEADLETTERED_TOTAL: IntCounter = register_int_counter!(
        opts!("pulse_processor_events_deadlettered_total", "Total number of events dead-lettered after storage failure")
    )
    .expect("metric can be created");

    /// Drain cycle duration
    pub static ref DRAIN_DURATION: Histogram = register_histogram!(histogram_opts!(
        "pulse_processor_drain_duration_seconds",
        "Drain cycle duration in seconds",
        vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]
    ))
    .expect("metric can be created");

    /// Unacknowledged backlog observed at the end of each cycle
    pub static ref STREAM_BACKLOG: IntGauge = register_int_gauge!(
        opts!("pulse_processor_stream_backlog", "Pending + lag of the consumer group")
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
