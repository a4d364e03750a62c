//! Retry policy: exponential backoff with jitter, and the transient/permanent
//! classification that decides whether a failed batch attempt should retry.

use crate::error::Error;
use fastrand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Exponential backoff with jitter, matching §4.3: `initial_delay_ms ·
/// backoff_multiplier^attempt + U(−jitter_ms, +jitter_ms)`, clamped to ≥ 0.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_delay_ms: u64,
    pub backoff_multiplier: f64,
    pub jitter_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay_ms: 1000,
            backoff_multiplier: 2.0,
            jitter_ms: 500,
        }
    }
}

impl RetryPolicy {
    #[must_use]
    pub const fn new(max_retries: u32, initial_delay_ms: u64, backoff_multiplier: f64, jitter_ms: u64) -> Self {
        Self {
            max_retries,
            initial_delay_ms,
            backoff_multiplier,
            jitter_ms,
        }
    }

    /// Total number of attempts the wrapper will make, including the first.
    #[must_use]
    pub const fn total_attempts(&self) -> u32 {
        self.max_retries + 1
    }

    /// Base (jitter-free) delay before retrying after `attempt` (0-indexed).
    #[must_use]
    #[allow(clippy::cast_precision_loss, clippy::cast_sign_loss, clippy::cast_possible_truncation)]
    fn base_delay_ms(&self, attempt: u32) -> u64 {
        let attempt = attempt.min(30); // guards against overflow in powi
        let delay = self.initial_delay_ms as f64 * self.backoff_multiplier.powi(attempt as i32);
        delay.round() as u64
    }

    /// Delay before the retry following `attempt` (0-indexed), with jitter
    /// drawn from the supplied RNG and clamped to `>= 0`.
    #[must_use]
    pub fn delay_for(&self, attempt: u32, rng: &mut Rng) -> Duration {
        let base = self.base_delay_ms(attempt) as i64;
        let jitter = if self.jitter_ms == 0 {
            0
        } else {
            rng.i64(-(self.jitter_ms as i64)..=(self.jitter_ms as i64))
        };
        let delayed = (base + jitter).max(0);
        #[allow(clippy::cast_sign_loss)]
        Duration::from_millis(delayed as u64)
    }
}

/// Retry decision table from §4.3: only errors classified [`Error::Transient`]
/// are retried, and only while attempts remain.
#[must_use]
pub fn should_retry(error: &Error, attempt: u32, policy: &RetryPolicy) -> bool {
    if attempt >= policy.max_retries {
        return false;
    }
    error.is_transient()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_delay_grows_exponentially() {
        let policy = RetryPolicy::new(5, 100, 2.0, 0);
        let mut rng = Rng::new();
        assert_eq!(policy.delay_for(0, &mut rng).as_millis(), 100);
        assert_eq!(policy.delay_for(1, &mut rng).as_millis(), 200);
        assert_eq!(policy.delay_for(2, &mut rng).as_millis(), 400);
    }

    #[test]
    fn jitter_stays_within_bounds() {
        let policy = RetryPolicy::new(5, 1000, 2.0, 250);
        let mut rng = Rng::new();
        for _ in 0..200 {
            let delay = policy.delay_for(3, &mut rng).as_millis() as i64;
            let base = policy.base_delay_ms(3) as i64;
            assert!(delay >= (base - 250).max(0));
            assert!(delay <= base + 250);
        }
    }

    #[test]
    fn does_not_retry_permanent_errors() {
        let policy = RetryPolicy::default();
        let err = Error::permanent_provider("bad request");
        assert!(!should_retry(&err, 0, &policy));
    }

    #[test]
    fn does_not_retry_once_attempts_exhausted() {
        let policy = RetryPolicy::new(2, 10, 2.0, 0);
        let err = Error::transient("503");
        assert!(should_retry(&err, 0, &policy));
        assert!(should_retry(&err, 1, &policy));
        assert!(!should_retry(&err, 2, &policy));
    }

    #[test]
    fn never_retries_cancellation() {
        let policy = RetryPolicy::default();
        assert!(!should_retry(&Error::Cancelled, 0, &policy));
    }
}
