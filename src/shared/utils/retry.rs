//! Retry policies for transient source failures
//!
//! Read errors mid-stream are often transient (a file on removable or
//! network-backed storage blinking out); imports retry a bounded number of
//! times with backoff before giving up and surfacing `SourceUnavailable`.

use rand::Rng;
use std::time::Duration;

/// Configuration for retry behavior
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of retry attempts
    pub max_retries: u32,
    /// Base delay between retries
    pub base_delay: Duration,
    /// Maximum delay to wait (prevents excessive waits)
    pub max_delay: Duration,
    /// Whether to use exponential backoff
    pub exponential_backoff: bool,
    /// Multiplier for exponential backoff
    pub backoff_multiplier: f64,
    /// Whether to jitter delays to avoid lockstep retries
    pub jitter: bool,
}

impl RetryPolicy {
    /// Policy for re-reading an import source after a transient I/O error
    pub fn source_read() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(5),
            exponential_backoff: true,
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }

    /// Policy that never retries, for tests and dry runs
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            exponential_backoff: false,
            backoff_multiplier: 1.0,
            jitter: false,
        }
    }

    /// Calculate delay for the given retry attempt (1-based)
    pub fn calculate_delay(&self, attempt: u32) -> Duration {
        let delay = if self.exponential_backoff {
            let multiplier = self.backoff_multiplier.powi(attempt.saturating_sub(1) as i32);
            Duration::from_millis((self.base_delay.as_millis() as f64 * multiplier) as u64)
        } else {
            self.base_delay
        };

        let delay = delay.min(self.max_delay);

        if self.jitter && !delay.is_zero() {
            // +/- 20% keeps retries spread out without distorting the budget
            let factor = rand::thread_rng().gen_range(0.8..=1.2);
            Duration::from_millis((delay.as_millis() as f64 * factor) as u64).min(self.max_delay)
        } else {
            delay
        }
    }
}
