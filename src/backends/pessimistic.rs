//! Read-modify-write under an exclusive key lock.
//!
//! The lock guard lives for the whole load/store pair and is dropped on
//! every exit path, so a failed store or a panicking worker never leaves the
//! key held. Writers serialize on the lock; throughput is bounded by the
//! hold time.

use crate::backends::{Method, Strategy};
use crate::error::{CounterError, Result};
use crate::store::{KeyLock, Store};

/// Lock the key, load, add one, store, unlock.
#[derive(Debug, Clone, Copy, Default)]
pub struct Pessimistic;

impl Strategy for Pessimistic {
    fn method(&self) -> Method {
        Method::Pessimistic
    }

    fn increment<S: Store + ?Sized>(&self, store: &S, key: &str) -> Result<()> {
        let _guard = store.key_lock().acquire(key)?;
        let record = store.load(key)?.ok_or_else(|| CounterError::Uninitialized {
            key: key.to_string(),
        })?;
        store.store(key, record.value + 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use std::time::Duration;

    #[test]
    fn test_requires_initialized_counter() {
        let store = MemoryStore::new();
        let err = Pessimistic.increment(&store, "k").unwrap_err();
        assert!(matches!(err, CounterError::Uninitialized { .. }));
        // The lock was released on the error path.
        Pessimistic.increment(&store, "k").unwrap_err();
        assert!(!store.key_lock().is_held("k"));
    }

    #[test]
    fn test_lock_timeout_fails_the_increment() {
        let store = MemoryStore::new().with_lock_timeout(Some(Duration::from_millis(10)));
        store.init("k").unwrap();

        let held = store.key_lock().acquire("k").unwrap();
        let err = Pessimistic.increment(&store, "k").unwrap_err();
        assert!(err.is_transient());
        drop(held);

        Pessimistic.increment(&store, "k").unwrap();
        assert_eq!(store.load("k").unwrap().unwrap().value, 1);
    }
}
