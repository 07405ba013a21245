//! Unsynchronized read-modify-write.
//!
//! The load and the store are two separate store calls. A writer that slips
//! in between is overwritten, and its increment is lost. This is the
//! baseline the other strategies are measured against.

use crate::backends::{Method, Strategy};
use crate::error::Result;
use crate::store::Store;

/// Load, add one, store. No coordination at all.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoLock;

impl Strategy for NoLock {
    fn method(&self) -> Method {
        Method::NoLock
    }

    fn increment<S: Store + ?Sized>(&self, store: &S, key: &str) -> Result<()> {
        let current = store.load(key)?.map_or(0, |record| record.value);
        store.store(key, current + 1)
    }
}
