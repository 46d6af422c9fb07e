//! Reconnect backoff with jitter.

use std::time::Duration;

use rand::Rng;

/// Reconnect delay policy for the live channel.
///
/// The delay before retry `n` (zero-based) is `min(max_delay, base_delay * 2^n)`
/// scaled by a random factor in `[1 - jitter_ratio, 1 + jitter_ratio]`, then
/// capped at `max_delay` again.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectPolicy {
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Symmetric jitter as a fraction of the delay (0.2 = ±20%).
    pub jitter_ratio: f64,
    /// Consecutive failed attempts allowed before giving up. 0 = unbounded.
    pub max_attempts: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(30_000),
            jitter_ratio: 0.2,
            max_attempts: 0,
        }
    }
}

impl ReconnectPolicy {
    pub fn new(base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            base_delay,
            max_delay,
            ..Self::default()
        }
    }

    pub fn with_jitter_ratio(mut self, ratio: f64) -> Self {
        self.jitter_ratio = ratio.clamp(0.0, 1.0);
        self
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Delay before retry `attempt`, without jitter.
    pub fn nominal_delay(&self, attempt: u32) -> Duration {
        let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    /// Delay before retry `attempt`, with jitter drawn from `rng`.
    pub fn delay_for<R: Rng>(&self, attempt: u32, rng: &mut R) -> Duration {
        let nominal = self.nominal_delay(attempt);
        if self.jitter_ratio <= 0.0 {
            return nominal;
        }
        let factor = 1.0 + rng.random_range(-self.jitter_ratio..=self.jitter_ratio);
        nominal.mul_f64(factor.max(0.0)).min(self.max_delay)
    }

    /// Whether another retry is allowed after `attempts` consecutive failures.
    pub fn allows_retry(&self, attempts: u32) -> bool {
        self.max_attempts == 0 || attempts < self.max_attempts
    }
}
