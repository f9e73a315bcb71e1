/*!
 * Per-Address Rate Limiting
 *
 * A keyed governor limiter with an hourly quota from configuration
 * (default ten per hour). Keys are remote IP addresses; the limiter state
 * lives in process memory, per API instance.
 */

use std::net::IpAddr;
use std::num::NonZeroU32;
use std::sync::Arc;

use governor::{
    Quota, RateLimiter,
    clock::DefaultClock,
    state::keyed::DefaultKeyedStateStore,
};
use tracing::warn;

use crate::error::ApiError;

pub type IngestLimiter = RateLimiter<IpAddr, DefaultKeyedStateStore<IpAddr>, DefaultClock>;

/// Build the keyed limiter for `per_hour` requests per remote address.
pub fn build_limiter(per_hour: u32) -> Arc<IngestLimiter> {
    let quota = Quota::per_hour(NonZeroU32::new(per_hour.max(1)).unwrap());
    Arc::new(RateLimiter::keyed(quota))
}

/// Check one request from `addr` against the quota.
pub fn check(limiter: &IngestLimiter, addr: IpAddr) -> Result<(), ApiError> {
    if limiter.check_key(&addr).is_err() {
        warn!("Rate limit exceeded for {}", addr);
        crate::metrics::RATE_LIMITED_TOTAL.inc();
        return Err(ApiError::RateLimited);
    }
    Ok(())
}
