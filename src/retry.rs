//! Exponential backoff with deterministic jitter.
//!
//! [`RetryPolicy`] re-runs an operation only while it fails with a
//! [`TransientContention`](crate::error::ErrorClass::TransientContention)
//! error. Every other failure, and the last transient failure once the
//! attempt budget is spent, is handed back to the caller unchanged.
//!
//! The delay before retry `k` (0-indexed) is
//!
//! ```text
//! delay  = min(base_delay * 2^k, max_delay)
//! jitter = delay * 0.1 * (0.5 + (hash(caller, k) % 100) / 200)
//! sleep  = delay + jitter
//! ```
//!
//! The jitter factor depends only on the caller identity and the attempt
//! number, so two runs with the same inputs sleep for exactly the same time.
//!
//! # Examples
//!
//! ```rust
//! use racecount::retry::RetryPolicy;
//! use std::time::Duration;
//!
//! let policy = RetryPolicy::new()
//!     .with_max_attempts(5)
//!     .with_base_delay(Duration::from_millis(10))
//!     .with_max_delay(Duration::from_millis(50));
//!
//! let d0 = policy.delay_for(0, "1");
//! assert!(d0 >= Duration::from_millis(10) && d0 <= Duration::from_millis(11));
//!
//! // Capped at max_delay (+ at most 10% jitter).
//! assert!(policy.delay_for(10, "1") <= Duration::from_millis(55));
//! ```

use std::hash::{DefaultHasher, Hash, Hasher};
use std::thread;
use std::time::Duration;

use crate::error::{CounterError, Result};

/// Backoff settings for transient contention.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
    max_delay: Duration,
}

/// Per-increment retry bookkeeping.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetryState {
    /// Attempt currently running (0-indexed).
    pub attempt: u32,
    /// Total time slept so far.
    pub total_delay: Duration,
}

impl RetryPolicy {
    /// Attempts made when retries are enabled.
    pub const DEFAULT_MAX_ATTEMPTS: u32 = 20;
    /// Delay before the first retry.
    pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(10);
    /// Upper bound of the exponential part of the delay.
    pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(5);

    /// Creates the default enabled policy: 20 attempts, 10 ms base, 5 s cap.
    pub const fn new() -> Self {
        Self {
            max_attempts: Self::DEFAULT_MAX_ATTEMPTS,
            base_delay: Self::DEFAULT_BASE_DELAY,
            max_delay: Self::DEFAULT_MAX_DELAY,
        }
    }

    /// A policy that makes exactly one attempt and never sleeps.
    pub const fn disabled() -> Self {
        Self {
            max_attempts: 1,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }

    /// Sets the total number of attempts. Values below 1 are treated as 1.
    pub const fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = if attempts == 0 { 1 } else { attempts };
        self
    }

    /// Sets the delay before the first retry.
    pub const fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    /// Sets the cap of the exponential delay.
    pub const fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Total number of attempts this policy allows.
    pub const fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Returns `true` if more than one attempt is allowed.
    pub const fn is_enabled(&self) -> bool {
        self.max_attempts > 1
    }

    /// Computes the sleep before retry number `attempt` for `caller`.
    pub fn delay_for(&self, attempt: u32, caller: &str) -> Duration {
        let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
        let delay = self
            .base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay);
        delay + delay.mul_f64(0.1 * jitter_factor(caller, attempt))
    }

    /// Runs `op` until it succeeds, fails with a non-transient error, or the
    /// attempt budget is spent.
    ///
    /// The last error is returned unchanged on exhaustion, so the caller
    /// still sees why the increment failed.
    pub fn run<T>(&self, caller: &str, mut op: impl FnMut() -> Result<T>) -> Result<T> {
        let mut state = RetryState::default();
        loop {
            let err = match op() {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            if !err.is_transient() {
                return Err(err);
            }

            if state.attempt + 1 >= self.max_attempts {
                if self.is_enabled() {
                    tracing::warn!(
                        caller,
                        attempts = state.attempt + 1,
                        total_delay_ms = state.total_delay.as_millis() as u64,
                        error = %err,
                        "giving up after transient contention"
                    );
                }
                return Err(err);
            }

            let delay = self.delay_for(state.attempt, caller);
            tracing::debug!(
                caller,
                attempt = state.attempt,
                delay_us = delay.as_micros() as u64,
                error = %err,
                "transient contention, backing off"
            );
            thread::sleep(delay);
            state.total_delay += delay;
            state.attempt += 1;
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new()
    }
}

/// Maps `(caller, attempt)` to a factor in `[0.5, 1.0)`.
fn jitter_factor(caller: &str, attempt: u32) -> f64 {
    let mut hasher = DefaultHasher::new();
    caller.hash(&mut hasher);
    attempt.hash(&mut hasher);
    0.5 + (hasher.finish() % 100) as f64 / 200.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn transient() -> CounterError {
        CounterError::SerializationFailure { key: "1".into() }
    }

    fn fast() -> RetryPolicy {
        RetryPolicy::new()
            .with_max_attempts(4)
            .with_base_delay(Duration::from_micros(10))
            .with_max_delay(Duration::from_micros(100))
    }

    #[test]
    fn test_delay_grows_exponentially() {
        let policy = RetryPolicy::new()
            .with_base_delay(Duration::from_millis(10))
            .with_max_delay(Duration::from_secs(5));

        for attempt in 0..5 {
            let exp = Duration::from_millis(10 * (1 << attempt));
            let delay = policy.delay_for(attempt, "worker");
            assert!(delay >= exp + exp.mul_f64(0.05), "attempt {attempt}: {delay:?}");
            assert!(delay < exp + exp.mul_f64(0.1), "attempt {attempt}: {delay:?}");
        }
    }

    #[test]
    fn test_delay_is_capped() {
        let policy = RetryPolicy::new()
            .with_base_delay(Duration::from_millis(10))
            .with_max_delay(Duration::from_millis(100));
        let delay = policy.delay_for(30, "worker");
        assert!(delay >= Duration::from_millis(105));
        assert!(delay < Duration::from_millis(110));
        // No overflow for absurd attempt numbers.
        assert!(policy.delay_for(u32::MAX, "worker") < Duration::from_millis(110));
    }

    #[test]
    fn test_jitter_is_deterministic() {
        let policy = RetryPolicy::new();
        for attempt in 0..8 {
            assert_eq!(policy.delay_for(attempt, "a"), policy.delay_for(attempt, "a"));
        }
        let factor = jitter_factor("a", 3);
        assert!((0.5..1.0).contains(&factor));
    }

    #[test]
    fn test_disabled_makes_one_attempt() {
        let calls = Cell::new(0);
        let result: Result<()> = RetryPolicy::disabled().run("1", || {
            calls.set(calls.get() + 1);
            Err(transient())
        });
        assert!(matches!(result, Err(CounterError::SerializationFailure { .. })));
        assert_eq!(calls.get(), 1);
        assert!(!RetryPolicy::disabled().is_enabled());
    }

    #[test]
    fn test_exhaustion_returns_last_error() {
        let calls = Cell::new(0);
        let result: Result<()> = fast().run("1", || {
            calls.set(calls.get() + 1);
            Err(transient())
        });
        assert!(result.unwrap_err().is_transient());
        assert_eq!(calls.get(), 4);
    }

    #[test]
    fn test_succeeds_after_transient_failures() {
        let calls = Cell::new(0);
        let result = fast().run("1", || {
            calls.set(calls.get() + 1);
            if calls.get() < 3 {
                Err(transient())
            } else {
                Ok(calls.get())
            }
        });
        assert_eq!(result.unwrap(), 3);
    }

    #[test]
    fn test_non_transient_is_not_retried() {
        let calls = Cell::new(0);
        let result: Result<()> = fast().run("1", || {
            calls.set(calls.get() + 1);
            Err(CounterError::Status(500))
        });
        assert!(matches!(result, Err(CounterError::Status(500))));
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn test_zero_attempts_means_one() {
        assert_eq!(RetryPolicy::new().with_max_attempts(0).max_attempts(), 1);
    }
}
