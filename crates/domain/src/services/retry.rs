//! Retry schedule for dispatch jobs.

use rand::Rng;
use std::time::Duration;

/// Default number of delivery passes before a job is failed.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;
/// Default delay before the second pass.
pub const DEFAULT_BASE_DELAY_SECS: u64 = 30;
/// Default ceiling on the delay between passes.
pub const DEFAULT_MAX_DELAY_SECS: u64 = 3600;
/// Default upper bound of the random jitter, as a fraction of the delay.
pub const DEFAULT_JITTER_RATIO: f64 = 0.1;

/// Exponential backoff with a cap and proportional random jitter.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub jitter_ratio: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: Duration::from_secs(DEFAULT_BASE_DELAY_SECS),
            max_delay: Duration::from_secs(DEFAULT_MAX_DELAY_SECS),
            jitter_ratio: DEFAULT_JITTER_RATIO,
        }
    }
}

impl RetryPolicy {
    /// Whether a job that has made `attempts` passes may not be retried.
    pub fn is_exhausted(&self, attempts: u32) -> bool {
        attempts >= self.max_attempts
    }

    /// Delay after the given pass without jitter: `base × 2^(attempt−1)`,
    /// capped at `max_delay`.
    pub fn base_backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.base_delay
            .checked_mul(1u32 << exponent)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    /// Delay after the given pass, plus jitter in `[0, jitter_ratio × delay]`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let delay = self.base_backoff(attempt);
        if self.jitter_ratio <= 0.0 {
            return delay;
        }
        let factor = rand::thread_rng().gen_range(0.0..=self.jitter_ratio);
        delay + delay.mul_f64(factor)
    }
}
