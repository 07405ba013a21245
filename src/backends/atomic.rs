//! Store-native atomic increment.

use crate::backends::{Method, Strategy};
use crate::error::Result;
use crate::store::Store;

/// Delegates to [`Store::fetch_add`]. Linearizable by construction.
#[derive(Debug, Clone, Copy, Default)]
pub struct Atomic;

impl Strategy for Atomic {
    fn method(&self) -> Method {
        Method::Atomic
    }

    fn increment<S: Store + ?Sized>(&self, store: &S, key: &str) -> Result<()> {
        store.fetch_add(key, 1).map(|_| ())
    }
}
