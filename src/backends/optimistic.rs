//! Versioned compare-and-swap.
//!
//! Each round loads `(value, version)` and tries to swap in
//! `(value + 1, version + 1)`. A lost swap means another writer committed in
//! between, so the round starts over from a fresh load. The loop is bounded
//! by an attempt cap and has no time budget: under heavy contention a single
//! increment can spin far longer than a lock hold would take.
//!
//! When every round of the loop loses, the increment fails with
//! [`CounterError::Contention`], which the outer [`RetryPolicy`] may retry
//! after a backoff.

use crate::backends::{BackendConfig, Method, Strategy};
use crate::error::{CounterError, Result};
use crate::retry::RetryPolicy;
use crate::store::Store;

/// Compare-and-swap loop with an attempt cap.
#[derive(Debug, Clone, Copy)]
pub struct Optimistic {
    max_cas_attempts: u32,
    retry: RetryPolicy,
}

impl Optimistic {
    /// Creates the strategy. A cap below 1 is treated as 1.
    pub fn new(max_cas_attempts: u32, retry: RetryPolicy) -> Self {
        Self {
            max_cas_attempts: max_cas_attempts.max(1),
            retry,
        }
    }

    /// Compare-and-swap attempts per round of the retry policy.
    pub fn max_cas_attempts(&self) -> u32 {
        self.max_cas_attempts
    }

    fn cas_loop<S: Store + ?Sized>(&self, store: &S, key: &str) -> Result<()> {
        for _ in 0..self.max_cas_attempts {
            let seen = store.load(key)?.ok_or_else(|| CounterError::Uninitialized {
                key: key.to_string(),
            })?;
            if store.compare_and_swap(key, seen, seen.value + 1)? {
                return Ok(());
            }
        }
        Err(CounterError::Contention {
            key: key.to_string(),
            attempts: self.max_cas_attempts,
        })
    }
}

impl Default for Optimistic {
    fn default() -> Self {
        Self::new(BackendConfig::DEFAULT_MAX_CAS_ATTEMPTS, RetryPolicy::disabled())
    }
}

impl Strategy for Optimistic {
    fn method(&self) -> Method {
        Method::Optimistic
    }

    fn increment<S: Store + ?Sized>(&self, store: &S, key: &str) -> Result<()> {
        self.retry.run(key, || self.cas_loop(store, key))
    }
}
