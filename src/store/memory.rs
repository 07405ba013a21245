//! In-process counter store.
//!
//! Records live in a map guarded by a reader/writer lock, each behind its
//! own short mutex that plays the role of a row latch: it makes single calls
//! atomic and is released before the call returns.
//!
//! [`MemoryStore::with_latency`] adds a sleep to every call. Real stores sit
//! behind a round trip, and the window between a load and a store is what
//! the no-lock strategy loses updates in; a pure in-memory map makes that
//! window a few nanoseconds wide.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::thread;
use std::time::Duration;

use crate::error::{CounterError, Result};
use crate::store::{LockTable, Record, Store};

/// A counter store held in memory.
///
/// # Examples
///
/// ```rust
/// use racecount::store::{MemoryStore, Record, Store};
///
/// let store = MemoryStore::new();
/// store.init("hits").unwrap();
/// assert_eq!(store.fetch_add("hits", 2).unwrap(), 2);
/// assert_eq!(store.load("hits").unwrap(), Some(Record { value: 2, version: 1 }));
/// ```
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: RwLock<HashMap<String, Arc<Mutex<Record>>>>,
    locks: LockTable,
    latency: Option<Duration>,
}

impl MemoryStore {
    /// Creates an empty store with no simulated latency.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleeps for `latency` at the start of every call.
    pub fn with_latency(mut self, latency: Option<Duration>) -> Self {
        self.latency = latency.filter(|latency| !latency.is_zero());
        self
    }

    /// Sets the key-lock acquisition timeout.
    pub fn with_lock_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.locks = LockTable::new().with_timeout(timeout);
        self
    }

    fn round_trip(&self) {
        if let Some(latency) = self.latency {
            thread::sleep(latency);
        }
    }

    fn record(&self, key: &str) -> Option<Arc<Mutex<Record>>> {
        self.records
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    fn record_or_insert(&self, key: &str) -> Arc<Mutex<Record>> {
        if let Some(record) = self.record(key) {
            return record;
        }
        let mut records = self.records.write().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(
            records
                .entry(key.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(Record::ZERO))),
        )
    }
}

impl Store for MemoryStore {
    type Lock = LockTable;

    fn kind(&self) -> &'static str {
        "memory"
    }

    fn init(&self, key: &str) -> Result<()> {
        self.round_trip();
        let record = self.record_or_insert(key);
        *record.lock().unwrap_or_else(PoisonError::into_inner) = Record::ZERO;
        Ok(())
    }

    fn load(&self, key: &str) -> Result<Option<Record>> {
        self.round_trip();
        Ok(self
            .record(key)
            .map(|record| *record.lock().unwrap_or_else(PoisonError::into_inner)))
    }

    fn store(&self, key: &str, value: i64) -> Result<()> {
        self.round_trip();
        let record = self.record_or_insert(key);
        let mut record = record.lock().unwrap_or_else(PoisonError::into_inner);
        *record = record.next(value);
        Ok(())
    }

    fn compare_and_swap(&self, key: &str, current: Record, value: i64) -> Result<bool> {
        self.round_trip();
        let record = self.record(key).ok_or_else(|| CounterError::Uninitialized {
            key: key.to_string(),
        })?;
        let mut record = record.lock().unwrap_or_else(PoisonError::into_inner);
        if *record != current {
            return Ok(false);
        }
        *record = record.next(value);
        Ok(true)
    }

    fn fetch_add(&self, key: &str, delta: i64) -> Result<i64> {
        self.round_trip();
        let record = self.record_or_insert(key);
        let mut record = record.lock().unwrap_or_else(PoisonError::into_inner);
        *record = record.next(record.value + delta);
        Ok(record.value)
    }

    fn key_lock(&self) -> &LockTable {
        &self.locks
    }
}
