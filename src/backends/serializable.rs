//! Read and write inside a serializable transaction.
//!
//! The transaction reads a snapshot, buffers `value + 1` and validates the
//! snapshot at commit. A commit that finds the counter changed aborts with
//! [`CounterError::SerializationFailure`] and writes nothing, so no
//! increment is ever half applied. Aborted transactions are retried from
//! scratch by the [`RetryPolicy`]; with retries disabled the abort is a
//! failed increment.

use crate::backends::{Method, Strategy};
use crate::error::Result;
use crate::retry::RetryPolicy;
use crate::store::{Store, Transaction};

#[cfg(doc)]
use crate::error::CounterError;

/// One transaction per attempt.
#[derive(Debug, Clone, Copy, Default)]
pub struct Serializable {
    retry: RetryPolicy,
}

impl Serializable {
    /// Creates the strategy with the given retry policy.
    pub fn new(retry: RetryPolicy) -> Self {
        Self { retry }
    }
}

impl Strategy for Serializable {
    fn method(&self) -> Method {
        Method::Serializable
    }

    fn increment<S: Store + ?Sized>(&self, store: &S, key: &str) -> Result<()> {
        self.retry.run(key, || {
            let mut txn = Transaction::begin(store, key);
            let seen = txn.read()?;
            txn.write(seen.value + 1);
            txn.commit()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CounterError;
    use crate::store::MemoryStore;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_increment() {
        let store = MemoryStore::new();
        store.init("k").unwrap();
        Serializable::default().increment(&store, "k").unwrap();
        assert_eq!(store.load("k").unwrap().unwrap().value, 1);
    }

    #[test]
    fn test_requires_initialized_counter() {
        let store = MemoryStore::new();
        let err = Serializable::new(RetryPolicy::new())
            .increment(&store, "k")
            .unwrap_err();
        assert!(matches!(err, CounterError::Uninitialized { .. }));
    }

    #[test]
    fn test_retried_to_success_under_contention() {
        let store = Arc::new(MemoryStore::new().with_latency(Some(Duration::from_micros(20))));
        store.init("k").unwrap();
        let strategy = Serializable::new(
            RetryPolicy::new()
                .with_max_attempts(200)
                .with_base_delay(Duration::from_micros(50))
                .with_max_delay(Duration::from_millis(2)),
        );

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    for _ in 0..50 {
                        strategy.increment(&*store, "k").unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(store.load("k").unwrap().unwrap().value, 200);
    }
}
