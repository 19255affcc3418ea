use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use governor::clock::DefaultClock;
use governor::state::direct::NotKeyed;
use governor::state::InMemoryState;
use governor::{Quota, RateLimiter};

type DirectRateLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Outbound call budget for a quota-limited API.
///
/// Calls are admitted while the budget lasts; once it is spent, `acquire`
/// reports how long one call slot takes to replenish. Callers decide whether
/// to fail or wait.
#[derive(Clone)]
pub struct RateBudget {
    limiter: Arc<DirectRateLimiter>,
    replenish_interval: Duration,
}

impl RateBudget {
    pub fn new(quota_window: Duration, quota_limit: u32) -> Self {
        let safe_limit = quota_limit.max(1);
        let burst = NonZeroU32::new(safe_limit).unwrap_or(NonZeroU32::MIN);
        let seconds_per_cell = (quota_window.as_secs_f64() / f64::from(safe_limit)).max(0.001);
        let replenish_interval = Duration::from_secs_f64(seconds_per_cell);

        let quota = Quota::with_period(replenish_interval)
            .unwrap_or_else(|| Quota::per_second(NonZeroU32::MIN))
            .allow_burst(burst);
        Self {
            limiter: Arc::new(RateLimiter::direct(quota)),
            replenish_interval,
        }
    }

    /// Alpha Vantage free tier: 5 calls per minute.
    pub fn alphavantage_free_tier() -> Self {
        Self::new(Duration::from_secs(60), 5)
    }

    /// Take one call slot, or return the replenish interval when none is left.
    pub fn acquire(&self) -> Result<(), Duration> {
        self.limiter
            .check()
            .map_err(|_| self.replenish_interval)
    }
}
