use std::time::Duration;

use crate::models::Config;

/// Deterministic exponential backoff with rate-limit overrides.
///
/// Attempt 0 is immediate; attempt `n >= 1` waits `base_delay * 2^(n-1)`.
/// No jitter is applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackoffPolicy {
    max_attempts: u32,
    base_delay: Duration,
    default_rate_limit_delay: Duration,
    max_rate_limit_waits: u32,
}

impl BackoffPolicy {
    pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
    pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(1000);
    pub const DEFAULT_RATE_LIMIT_DELAY: Duration = Duration::from_secs(5);
    pub const DEFAULT_MAX_RATE_LIMIT_WAITS: u32 = 10;

    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            default_rate_limit_delay: Self::DEFAULT_RATE_LIMIT_DELAY,
            max_rate_limit_waits: Self::DEFAULT_MAX_RATE_LIMIT_WAITS,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.max_attempts, config.retry_base_delay)
            .with_rate_limit_delay(config.rate_limit_delay)
            .with_max_rate_limit_waits(config.max_rate_limit_waits)
    }

    /// Wait used when a 429 carries no usable `Retry-After`
    pub fn with_rate_limit_delay(mut self, delay: Duration) -> Self {
        self.default_rate_limit_delay = delay;
        self
    }

    pub fn with_max_rate_limit_waits(mut self, waits: u32) -> Self {
        self.max_rate_limit_waits = waits;
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn max_rate_limit_waits(&self) -> u32 {
        self.max_rate_limit_waits
    }

    pub fn delay_for_attempt(&self, attempt_index: u32) -> Duration {
        if attempt_index == 0 {
            return Duration::ZERO;
        }
        let factor = 2u32.saturating_pow(attempt_index - 1);
        self.base_delay.saturating_mul(factor)
    }

    /// Interpret a `Retry-After` header value given in whole seconds
    pub fn rate_limit_delay(&self, retry_after: Option<&str>) -> Duration {
        retry_after
            .and_then(|value| value.trim().parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or(self.default_rate_limit_delay)
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::new(Self::DEFAULT_MAX_ATTEMPTS, Self::DEFAULT_BASE_DELAY)
    }
}
