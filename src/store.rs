//! Storage capability the counter strategies run against.
//!
//! A [`Store`] keeps one [`Record`] per key and offers the primitives each
//! concurrency-control strategy needs:
//!
//! | Primitive | Used by |
//! |-----------|---------|
//! | [`load`](Store::load) / [`store`](Store::store) | no-lock, pessimistic |
//! | [`compare_and_swap`](Store::compare_and_swap) | optimistic, serializable commit |
//! | [`fetch_add`](Store::fetch_add) | atomic |
//! | [`key_lock`](Store::key_lock) | pessimistic |
//!
//! Every single call is atomic with respect to other calls on the same key.
//! Nothing more is promised: a load followed by a store is two calls, and a
//! concurrent writer may slip in between. Closing that window is the
//! strategy's job, not the store's.
//!
//! ```text
//!   no-lock       load ──────────────► store          (window open)
//!   pessimistic   lock ─ load ─ store ─ unlock        (window guarded)
//!   optimistic    load ──────────────► cas ─╮         (window detected)
//!                   ▲───── retry ───────────╯
//!   atomic        fetch_add                          (no window)
//! ```

pub mod file;
pub mod lock;
pub mod memory;

pub use file::FileStore;
pub use lock::{FileGuard, FileLocks, KeyGuard, KeyLock, LockTable};
pub use memory::MemoryStore;

use std::fmt::Debug;

use serde::{Deserialize, Serialize};

use crate::error::{CounterError, Result};

/// Value and version of a counter as seen by one read.
///
/// The version is bumped by every write, so two records compare equal only
/// if no write happened in between.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Record {
    /// Counter value.
    pub value: i64,
    /// Write count since the last reset.
    pub version: u64,
}

impl Record {
    /// The state right after `init`.
    pub const ZERO: Record = Record {
        value: 0,
        version: 0,
    };

    /// The record produced by writing `value` over `self`.
    pub const fn next(self, value: i64) -> Record {
        Record {
            value,
            version: self.version.wrapping_add(1),
        }
    }
}

/// A keyed counter store.
pub trait Store: Send + Sync + Debug {
    /// Key lock used by the pessimistic strategy.
    type Lock: KeyLock;

    /// Short name of the store kind, used in report labels.
    fn kind(&self) -> &'static str;

    /// Creates the counter, or overwrites it, with [`Record::ZERO`].
    fn init(&self, key: &str) -> Result<()>;

    /// Reads the counter. `None` if it was never initialized.
    fn load(&self, key: &str) -> Result<Option<Record>>;

    /// Writes `value` unconditionally, creating the counter if missing.
    fn store(&self, key: &str, value: i64) -> Result<()>;

    /// Writes `value` only if the counter still equals `current`.
    ///
    /// Returns `Ok(false)` when another write got there first. Fails with
    /// [`CounterError::Uninitialized`] if the counter does not exist.
    fn compare_and_swap(&self, key: &str, current: Record, value: i64) -> Result<bool>;

    /// Adds `delta` in one indivisible step and returns the new value. A
    /// missing counter starts from zero.
    fn fetch_add(&self, key: &str, delta: i64) -> Result<i64>;

    /// The lock protecting keys of this store.
    fn key_lock(&self) -> &Self::Lock;
}

/// A single-key transaction with serializable semantics.
///
/// Reads come from a snapshot taken on first [`read`](Transaction::read);
/// the write is buffered and applied at [`commit`](Transaction::commit) with
/// a compare-and-swap against that snapshot. If anyone else committed a
/// write to the key in the meantime, the commit aborts with
/// [`CounterError::SerializationFailure`] and nothing is written.
///
/// ```rust
/// use racecount::store::{MemoryStore, Store, Transaction};
///
/// let store = MemoryStore::new();
/// store.init("1").unwrap();
///
/// let mut txn = Transaction::begin(&store, "1");
/// let seen = txn.read().unwrap();
/// txn.write(seen.value + 1);
///
/// store.store("1", 41).unwrap(); // a concurrent writer commits first
/// assert!(txn.commit().unwrap_err().is_transient());
/// ```
#[derive(Debug)]
pub struct Transaction<'s, S: Store + ?Sized> {
    store: &'s S,
    key: &'s str,
    snapshot: Option<Record>,
    pending: Option<i64>,
}

impl<'s, S: Store + ?Sized> Transaction<'s, S> {
    /// Starts a transaction on `key`.
    pub fn begin(store: &'s S, key: &'s str) -> Self {
        Self {
            store,
            key,
            snapshot: None,
            pending: None,
        }
    }

    /// Returns the snapshot record, reading it on first use.
    pub fn read(&mut self) -> Result<Record> {
        if let Some(record) = self.snapshot {
            return Ok(record);
        }
        let record = self
            .store
            .load(self.key)?
            .ok_or_else(|| CounterError::Uninitialized {
                key: self.key.to_string(),
            })?;
        self.snapshot = Some(record);
        Ok(record)
    }

    /// Buffers a write of `value`.
    pub fn write(&mut self, value: i64) {
        self.pending = Some(value);
    }

    /// Applies the buffered write if the snapshot is still current.
    pub fn commit(self) -> Result<()> {
        let Some(value) = self.pending else {
            return Ok(());
        };
        match self.snapshot {
            Some(seen) => {
                if self.store.compare_and_swap(self.key, seen, value)? {
                    Ok(())
                } else {
                    Err(CounterError::SerializationFailure {
                        key: self.key.to_string(),
                    })
                }
            }
            None => self.store.store(self.key, value),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_next_bumps_version() {
        let next = Record::ZERO.next(7);
        assert_eq!(next, Record { value: 7, version: 1 });
        assert_eq!(next.next(8).version, 2);
    }

    #[test]
    fn test_transaction_commit() {
        let store = MemoryStore::new();
        store.init("t").unwrap();

        let mut txn = Transaction::begin(&store, "t");
        let seen = txn.read().unwrap();
        txn.write(seen.value + 1);
        txn.commit().unwrap();

        assert_eq!(store.load("t").unwrap(), Some(Record { value: 1, version: 1 }));
    }

    #[test]
    fn test_transaction_snapshot_is_stable() {
        let store = MemoryStore::new();
        store.init("t").unwrap();

        let mut txn = Transaction::begin(&store, "t");
        let first = txn.read().unwrap();
        store.store("t", 10).unwrap();
        assert_eq!(txn.read().unwrap(), first);
    }

    #[test]
    fn test_transaction_conflict_writes_nothing() {
        let store = MemoryStore::new();
        store.init("t").unwrap();

        let mut txn = Transaction::begin(&store, "t");
        let seen = txn.read().unwrap();
        txn.write(seen.value + 1);
        store.store("t", 5).unwrap();

        let err = txn.commit().unwrap_err();
        assert!(matches!(err, CounterError::SerializationFailure { .. }));
        assert_eq!(store.load("t").unwrap().unwrap().value, 5);
    }

    #[test]
    fn test_transaction_read_missing() {
        let store = MemoryStore::new();
        let mut txn = Transaction::begin(&store, "missing");
        assert!(matches!(
            txn.read(),
            Err(CounterError::Uninitialized { .. })
        ));
    }

    #[test]
    fn test_read_only_commit_is_noop() {
        let store = MemoryStore::new();
        store.init("t").unwrap();
        let mut txn = Transaction::begin(&store, "t");
        txn.read().unwrap();
        txn.commit().unwrap();
        assert_eq!(store.load("t").unwrap(), Some(Record::ZERO));
    }
}
