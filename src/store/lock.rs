//! Scoped mutual exclusion on a key.
//!
//! [`KeyLock::acquire`] blocks until the caller holds the key and returns a
//! guard; dropping the guard releases the key. Release therefore happens on
//! every exit path of the critical section, early returns and panics
//! included.
//!
//! Two implementations are provided:
//!
//! - [`LockTable`]: in-process, a set of held keys behind a mutex/condvar.
//! - [`FileLocks`]: an exclusive advisory lock on `<dir>/<key>.lock`. Works
//!   across processes sharing the directory, and across threads of one
//!   process since every acquisition opens its own file handle.
//!
//! Both accept an optional acquisition timeout, surfaced as
//! [`CounterError::LockTimeout`].
//!
//! ```rust
//! use racecount::store::{KeyLock, LockTable};
//!
//! let locks = LockTable::new();
//! {
//!     let _guard = locks.acquire("1").unwrap();
//!     assert!(locks.is_held("1"));
//! }
//! assert!(!locks.is_held("1"));
//! ```

use std::collections::HashSet;
use std::fmt::Debug;
use std::fs::{File, OpenOptions, TryLockError};
use std::path::{Path, PathBuf};
use std::sync::{Condvar, Mutex, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use crate::error::{CounterError, Result};

/// Poll interval while waiting for a contended file lock with a timeout.
const FILE_LOCK_POLL: Duration = Duration::from_millis(1);

/// Local mutual exclusion on a key.
pub trait KeyLock: Send + Sync + Debug {
    /// Proof of ownership. The key is released when it is dropped.
    type Guard<'a>
    where
        Self: 'a;

    /// Blocks until `key` is held by the caller.
    fn acquire(&self, key: &str) -> Result<Self::Guard<'_>>;
}

/// In-process key lock.
#[derive(Debug, Default)]
pub struct LockTable {
    held: Mutex<HashSet<String>>,
    released: Condvar,
    timeout: Option<Duration>,
}

impl LockTable {
    /// Creates an empty table whose acquisitions wait forever.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the acquisition timeout.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Returns `true` if someone holds `key` right now.
    pub fn is_held(&self, key: &str) -> bool {
        self.held
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(key)
    }
}

impl KeyLock for LockTable {
    type Guard<'a> = KeyGuard<'a>;

    fn acquire(&self, key: &str) -> Result<KeyGuard<'_>> {
        let held = self.held.lock().unwrap_or_else(PoisonError::into_inner);
        let mut held = match self.timeout {
            None => self
                .released
                .wait_while(held, |held| held.contains(key))
                .unwrap_or_else(PoisonError::into_inner),
            Some(timeout) => {
                let (held, wait) = self
                    .released
                    .wait_timeout_while(held, timeout, |held| held.contains(key))
                    .unwrap_or_else(PoisonError::into_inner);
                if wait.timed_out() {
                    return Err(CounterError::LockTimeout {
                        key: key.to_string(),
                    });
                }
                held
            }
        };
        held.insert(key.to_string());
        Ok(KeyGuard {
            table: self,
            key: key.to_string(),
        })
    }
}

/// Guard of a [`LockTable`] key.
#[derive(Debug)]
pub struct KeyGuard<'a> {
    table: &'a LockTable,
    key: String,
}

impl KeyGuard<'_> {
    /// The key this guard holds.
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl Drop for KeyGuard<'_> {
    fn drop(&mut self) {
        self.table
            .held
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.key);
        self.table.released.notify_all();
    }
}

/// Advisory file lock per key.
#[derive(Debug, Clone)]
pub struct FileLocks {
    dir: PathBuf,
    timeout: Option<Duration>,
}

impl FileLocks {
    /// Creates lock files under `dir`.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            timeout: None,
        }
    }

    /// Sets the acquisition timeout.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Directory holding the lock files.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn open(&self, key: &str) -> Result<File> {
        let path = self.dir.join(format!("{key}.lock"));
        Ok(OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(path)?)
    }
}

impl KeyLock for FileLocks {
    type Guard<'a> = FileGuard;

    fn acquire(&self, key: &str) -> Result<FileGuard> {
        let file = self.open(key)?;
        let Some(timeout) = self.timeout else {
            file.lock()?;
            return Ok(FileGuard { file });
        };

        let deadline = Instant::now() + timeout;
        loop {
            match file.try_lock() {
                Ok(()) => return Ok(FileGuard { file }),
                Err(TryLockError::WouldBlock) if Instant::now() < deadline => {
                    thread::sleep(FILE_LOCK_POLL)
                }
                Err(TryLockError::WouldBlock) => {
                    return Err(CounterError::LockTimeout {
                        key: key.to_string(),
                    })
                }
                Err(TryLockError::Error(err)) => return Err(err.into()),
            }
        }
    }
}

/// Guard of a [`FileLocks`] key.
#[derive(Debug)]
pub struct FileGuard {
    file: File,
}

impl Drop for FileGuard {
    fn drop(&mut self) {
        if let Err(err) = self.file.unlock() {
            tracing::warn!(error = %err, "failed to release file lock");
        }
    }
}
