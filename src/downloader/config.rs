//! Download configuration constants

use std::time::Duration;

/// Minimum interval between any two requests issued by any fetcher.
/// The API starts throttling well before its documented quota when requests
/// arrive back to back; 2.5 seconds keeps a two-worker run under the radar.
pub const MIN_REQUEST_INTERVAL: Duration = Duration::from_millis(2500);

/// Cooldown after a throttle signal before the gate reopens.
pub const RATE_LIMIT_COOLDOWN: Duration = Duration::from_secs(15);

/// Partitions fetched concurrently.
pub const MAX_CONCURRENT_PARTITIONS: usize = 2;

/// Delay before the single transport retry.
pub const RETRY_DELAY: Duration = Duration::from_secs(1);

/// Throttle retries allowed for one page before the partition fails.
pub const MAX_RATE_LIMIT_RETRIES: u32 = 5;

/// `X-RateLimit-Remaining` at or below this logs a warning.
pub const LOW_QUOTA_WARNING: i64 = 5;

/// Timing knobs for the shared rate-limit coordinator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitConfig {
    /// Floor between consecutive requests across all fetchers
    pub min_interval: Duration,
    /// Pause after a throttle signal
    pub cooldown: Duration,
    /// Throttle retries per page
    pub max_retries: u32,
    /// Remaining-quota level that triggers a warning
    pub low_quota_warning: i64,
}

impl RateLimitConfig {
    /// Override the inter-request floor
    pub fn with_min_interval(mut self, interval: Duration) -> Self {
        self.min_interval = interval;
        self
    }

    /// Override the cooldown
    pub fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = cooldown;
        self
    }

    /// Override the per-page throttle retry budget
    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            min_interval: MIN_REQUEST_INTERVAL,
            cooldown: RATE_LIMIT_COOLDOWN,
            max_retries: MAX_RATE_LIMIT_RETRIES,
            low_quota_warning: LOW_QUOTA_WARNING,
        }
    }
}
