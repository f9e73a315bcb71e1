/*!
 * Application State
 *
 * Shared state for the API server. Everything here is constructed once at
 * process start and injected - no global singletons, no lazy caches.
 */

use std::sync::Arc;

use pulse_config::ApiConfig;
use pulse_storage::HotStore;
use pulse_stream::EventStream;

use crate::rate_limit::IngestLimiter;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub stream: EventStream,
    pub hot: HotStore,
    pub api: ApiConfig,
    pub limiter: Arc<IngestLimiter>,
}

impl AppState {
    pub fn new(
        stream: EventStream,
        hot: HotStore,
        api: ApiConfig,
        limiter: Arc<IngestLimiter>,
    ) -> Self {
        Self {
            stream,
            hot,
            api,
            limiter,
        }
    }
}
