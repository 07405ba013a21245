//! Unified error type for stores, backends and runs.
//!
//! Every failure a backend can hit is a [`CounterError`]. Callers never match
//! on individual variants to decide what to do next; they ask for the
//! [`ErrorClass`] instead, which is what the retry policy and the workload
//! runner inspect.
//!
//! # Example
//!
//! ```rust
//! use racecount::error::{CounterError, ErrorClass};
//!
//! let err = CounterError::SerializationFailure { key: "1".into() };
//! assert_eq!(err.class(), ErrorClass::TransientContention);
//! assert!(err.is_transient());
//! ```

use thiserror::Error;

/// How a failure must be treated by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    /// A concurrent conflict. Retrying may succeed.
    TransientContention,
    /// The backend cannot serve requests at all (unreachable, misconfigured,
    /// counter missing, handle closed).
    Fatal,
    /// Any other per-call failure. Counted as a failed increment.
    Other,
}

/// Error type for every counter operation.
#[derive(Debug, Error)]
pub enum CounterError {
    /// The backing resource could not be reached.
    #[error("connection error: {0}")]
    Connection(String),

    /// The configuration cannot produce a working backend.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// The counter row/key does not exist.
    #[error("counter '{key}' is not initialized")]
    Uninitialized {
        /// The counter key.
        key: String,
    },

    /// The handle was shut down.
    #[error("counter handle is closed")]
    Closed,

    /// Resetting the counter failed, so its state is unknown.
    #[error("failed to reset counter '{key}'")]
    ResetFailed {
        /// The counter key.
        key: String,
    },

    /// Every compare-and-swap attempt lost against a concurrent writer.
    #[error("compare-and-swap on '{key}' lost {attempts} times in a row")]
    Contention {
        /// The counter key.
        key: String,
        /// Number of CAS attempts made.
        attempts: u32,
    },

    /// A transaction was aborted because a concurrent one committed first.
    #[error("serialization failure on '{key}'")]
    SerializationFailure {
        /// The counter key.
        key: String,
    },

    /// The key lock could not be acquired in time.
    #[error("timed out waiting for the lock on '{key}'")]
    LockTimeout {
        /// The counter key.
        key: String,
    },

    /// The stored value could not be decoded.
    #[error("malformed counter data: {0}")]
    Malformed(String),

    /// A remote counter answered with an unexpected status.
    #[error("unexpected status {0}")]
    Status(u16),

    /// I/O error from a file-backed store.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding or decoding error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP transport error.
    #[cfg(feature = "http")]
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
}

impl CounterError {
    /// Classifies the error for retry and propagation decisions.
    pub fn class(&self) -> ErrorClass {
        match self {
            CounterError::Contention { .. }
            | CounterError::SerializationFailure { .. }
            | CounterError::LockTimeout { .. } => ErrorClass::TransientContention,
            CounterError::Connection(_)
            | CounterError::Config(_)
            | CounterError::Uninitialized { .. }
            | CounterError::Closed
            | CounterError::ResetFailed { .. } => ErrorClass::Fatal,
            CounterError::Malformed(_)
            | CounterError::Status(_)
            | CounterError::Io(_)
            | CounterError::Json(_) => ErrorClass::Other,
            #[cfg(feature = "http")]
            CounterError::Http(_) => ErrorClass::Other,
        }
    }

    /// Returns `true` if retrying may succeed.
    pub fn is_transient(&self) -> bool {
        self.class() == ErrorClass::TransientContention
    }
}

/// Result type for counter operations.
pub type Result<T> = std::result::Result<T, CounterError>;
