//! Counter store kept on disk.
//!
//! Each key maps to `<dir>/<key>.json` holding one serialized [`Record`].
//! Every call opens the file and takes an advisory lock on it for the
//! duration of the call: shared for reads, exclusive for writes. Writes are
//! flushed with `fsync` before the lock is released.
//!
//! The pessimistic strategy's key lock is a separate file,
//! `<dir>/<key>.lock` (see [`FileLocks`]), so holding the key lock does not
//! block the per-call latch on the record file.

use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{CounterError, Result};
use crate::store::{FileLocks, Record, Store};

/// A counter store backed by one file per key.
///
/// # Examples
///
/// ```rust
/// use racecount::store::{FileStore, Store};
///
/// let dir = tempfile::tempdir().unwrap();
/// let store = FileStore::open(dir.path()).unwrap();
/// store.init("hits").unwrap();
/// store.fetch_add("hits", 1).unwrap();
///
/// // A second handle on the same directory sees the same counter.
/// let other = FileStore::open(dir.path()).unwrap();
/// assert_eq!(other.load("hits").unwrap().unwrap().value, 1);
/// ```
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
    locks: FileLocks,
}

impl FileStore {
    /// Opens a store rooted at `dir`, creating the directory if needed.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|err| {
            CounterError::Connection(format!("cannot create {}: {err}", dir.display()))
        })?;
        Ok(Self {
            locks: FileLocks::new(&dir),
            dir,
        })
    }

    /// Sets the key-lock acquisition timeout.
    pub fn with_lock_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.locks = self.locks.with_timeout(timeout);
        self
    }

    /// Directory holding the record files.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path(&self, key: &str) -> Result<PathBuf> {
        let valid = !key.is_empty()
            && key
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-');
        if !valid {
            return Err(CounterError::Config(format!(
                "key '{key}' is not usable as a file name"
            )));
        }
        Ok(self.dir.join(format!("{key}.json")))
    }

    /// Opens the record file for writing and takes the exclusive latch.
    fn open_for_write(&self, key: &str, create: bool) -> Result<File> {
        let path = self.path(key)?;
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(create)
            .truncate(false)
            .open(path);
        let file = match file {
            Err(err) if err.kind() == ErrorKind::NotFound => {
                return Err(CounterError::Uninitialized {
                    key: key.to_string(),
                })
            }
            other => other?,
        };
        file.lock()?;
        Ok(file)
    }
}

/// Reads the record, `None` for an empty (just created) file.
fn read_record(file: &mut File) -> Result<Option<Record>> {
    let mut content = String::new();
    file.seek(SeekFrom::Start(0))?;
    file.read_to_string(&mut content)?;
    let content = content.trim();
    if content.is_empty() {
        return Ok(None);
    }
    serde_json::from_str(content)
        .map(Some)
        .map_err(|err| CounterError::Malformed(err.to_string()))
}

fn write_record(file: &mut File, record: Record) -> Result<()> {
    file.set_len(0)?;
    file.seek(SeekFrom::Start(0))?;
    serde_json::to_writer(&mut *file, &record)?;
    file.flush()?;
    file.sync_all()?;
    Ok(())
}

impl Store for FileStore {
    type Lock = FileLocks;

    fn kind(&self) -> &'static str {
        "file"
    }

    fn init(&self, key: &str) -> Result<()> {
        let mut file = self.open_for_write(key, true)?;
        write_record(&mut file, Record::ZERO)
    }

    fn load(&self, key: &str) -> Result<Option<Record>> {
        let mut file = match File::open(self.path(key)?) {
            Ok(file) => file,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        file.lock_shared()?;
        read_record(&mut file)
    }

    fn store(&self, key: &str, value: i64) -> Result<()> {
        let mut file = self.open_for_write(key, true)?;
        let current = read_record(&mut file)?.unwrap_or(Record::ZERO);
        write_record(&mut file, current.next(value))
    }

    fn compare_and_swap(&self, key: &str, current: Record, value: i64) -> Result<bool> {
        let mut file = self.open_for_write(key, false)?;
        let Some(stored) = read_record(&mut file)? else {
            return Err(CounterError::Uninitialized {
                key: key.to_string(),
            });
        };
        if stored != current {
            return Ok(false);
        }
        write_record(&mut file, stored.next(value))?;
        Ok(true)
    }

    fn fetch_add(&self, key: &str, delta: i64) -> Result<i64> {
        let mut file = self.open_for_write(key, true)?;
        let current = read_record(&mut file)?.unwrap_or(Record::ZERO);
        let next = current.next(current.value + delta);
        write_record(&mut file, next)?;
        Ok(next.value)
    }

    fn key_lock(&self) -> &FileLocks {
        &self.locks
    }
}
