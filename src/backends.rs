//! Counter backends: one contract, five concurrency-control strategies.
//!
//! A backend is a handle to a single counter. Every variant exposes the same
//! five operations, so the workload runner never needs to know which one it
//! is driving:
//!
//! | Operation | Returns | On failure |
//! |-----------|---------|------------|
//! | [`setup`] | boxed handle | [`CounterError::Connection`], fatal |
//! | [`reset`](CounterBackend::reset) | `bool` | `false`, abort the run |
//! | [`read`](CounterBackend::read) | `i64` | `0` |
//! | [`increment`](CounterBackend::increment) | `bool` | `false`, never partially applied |
//! | [`shutdown`](CounterBackend::shutdown) | `()` | idempotent |
//!
//! # Strategies
//!
//! | Method | Mechanism | Lost updates |
//! |--------|-----------|--------------|
//! | [`no-lock`](Method::NoLock) | load, +1, blind store | expected under contention |
//! | [`pessimistic`](Method::Pessimistic) | key lock around load/store | none |
//! | [`optimistic`](Method::Optimistic) | versioned compare-and-swap loop | none |
//! | [`serializable`](Method::Serializable) | snapshot transaction, retried on conflict | none when retried |
//! | [`atomic`](Method::Atomic) | store-native fetch-add | none |
//!
//! Store-backed variants are all [`StoreBackend`] instances, parameterized by
//! the store and by a [`Strategy`]. The `http` counter type talks to a remote
//! counter service instead and leaves the strategy to the server.
//!
//! # Examples
//!
//! ```rust
//! use racecount::backends::{self, BackendConfig, CounterType, Method};
//!
//! let config = BackendConfig::new(CounterType::Memory)
//!     .with_method(Method::Optimistic)
//!     .with_retries(true);
//!
//! let counter = backends::setup(&config).unwrap();
//! assert!(counter.increment());
//! assert!(counter.increment());
//! assert_eq!(counter.read(), 2);
//!
//! assert!(counter.reset());
//! assert_eq!(counter.read(), 0);
//! counter.shutdown();
//! ```

pub mod atomic;
#[cfg(feature = "http")]
pub mod http;
pub mod no_lock;
pub mod optimistic;
pub mod pessimistic;
pub mod serializable;

pub use atomic::Atomic;
#[cfg(feature = "http")]
pub use http::{CountResponse, HttpCounter};
pub use no_lock::NoLock;
pub use optimistic::Optimistic;
pub use pessimistic::Pessimistic;
pub use serializable::Serializable;

use std::fmt::{self, Debug};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{CounterError, ErrorClass, Result};
use crate::retry::RetryPolicy;
use crate::store::{FileStore, MemoryStore, Store};

/// Handle to one counter, safe to share across worker threads.
pub trait CounterBackend: Send + Sync + Debug {
    /// Label of the backend, `<store>/<method>`.
    fn name(&self) -> String;

    /// Sets the counter to zero. Idempotent.
    fn reset(&self) -> bool;

    /// Current value, `0` if it cannot be read.
    fn read(&self) -> i64;

    /// Applies exactly one increment. `true` only if it was applied.
    fn increment(&self) -> bool;

    /// Releases the handle. Later calls fail softly.
    fn shutdown(&self);
}

/// Concurrency-control strategy of a store-backed counter.
pub trait Strategy: Send + Sync + Debug {
    /// The method this strategy implements.
    fn method(&self) -> Method;

    /// Increments `key` by one.
    fn increment<S: Store + ?Sized>(&self, store: &S, key: &str) -> Result<()>;
}

/// Concurrency-control method selector.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "cli", derive(clap::ValueEnum))]
#[serde(rename_all = "kebab-case")]
pub enum Method {
    /// Unsynchronized read-modify-write.
    #[default]
    #[serde(alias = "lost_update", alias = "no_lock")]
    #[cfg_attr(feature = "cli", value(aliases = ["lost_update", "no_lock"]))]
    NoLock,
    /// Exclusive key lock around the read-modify-write.
    #[serde(alias = "row_level_locking")]
    #[cfg_attr(feature = "cli", value(alias = "row_level_locking"))]
    Pessimistic,
    /// Versioned compare-and-swap loop.
    #[serde(alias = "optimistic_concurrency_control")]
    #[cfg_attr(feature = "cli", value(alias = "optimistic_concurrency_control"))]
    Optimistic,
    /// Snapshot transaction validated at commit.
    #[serde(alias = "serializable_update")]
    #[cfg_attr(feature = "cli", value(alias = "serializable_update"))]
    Serializable,
    /// Store-native atomic increment.
    #[serde(alias = "inplace_update")]
    #[cfg_attr(feature = "cli", value(alias = "inplace_update"))]
    Atomic,
}

impl Method {
    /// All methods, in the order reports list them.
    pub const ALL: [Method; 5] = [
        Method::NoLock,
        Method::Pessimistic,
        Method::Optimistic,
        Method::Serializable,
        Method::Atomic,
    ];

    /// Canonical name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::NoLock => "no-lock",
            Method::Pessimistic => "pessimistic",
            Method::Optimistic => "optimistic",
            Method::Serializable => "serializable",
            Method::Atomic => "atomic",
        }
    }

    /// Returns `true` if this method never loses updates once its
    /// increments succeed.
    pub fn is_linearizable(&self) -> bool {
        !matches!(self, Method::NoLock)
    }

    /// Returns `true` if the retry policy applies to this method.
    pub fn retries(&self) -> bool {
        matches!(self, Method::Optimistic | Method::Serializable)
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where the counter lives.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "cli", derive(clap::ValueEnum))]
#[serde(rename_all = "lowercase")]
pub enum CounterType {
    /// In-process [`MemoryStore`].
    #[default]
    #[serde(alias = "shared_memory")]
    #[cfg_attr(feature = "cli", value(alias = "shared_memory"))]
    Memory,
    /// On-disk [`FileStore`].
    #[serde(alias = "disk")]
    #[cfg_attr(feature = "cli", value(alias = "disk"))]
    File,
    /// Remote counter service over HTTP.
    #[serde(alias = "web")]
    #[cfg_attr(feature = "cli", value(alias = "web"))]
    Http,
}

impl CounterType {
    /// Canonical name.
    pub fn as_str(&self) -> &'static str {
        match self {
            CounterType::Memory => "memory",
            CounterType::File => "file",
            CounterType::Http => "http",
        }
    }
}

impl fmt::Display for CounterType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Configuration consumed by [`setup`].
#[derive(Debug, Clone)]
pub struct BackendConfig {
    /// Where the counter lives.
    pub counter_type: CounterType,
    /// Concurrency-control method (ignored by the `http` type).
    pub method: Method,
    /// Counter key.
    pub key: String,
    /// Backoff for transient contention (optimistic and serializable only).
    pub retry: RetryPolicy,
    /// Compare-and-swap attempts per optimistic increment.
    pub max_cas_attempts: u32,
    /// Key-lock acquisition timeout. `None` waits forever.
    pub lock_timeout: Option<Duration>,
    /// Simulated per-call latency of the memory store.
    pub store_latency: Option<Duration>,
    /// Directory of the file store.
    pub storage_path: Option<PathBuf>,
    /// Remote counter host.
    pub host: String,
    /// Remote counter port.
    pub port: u16,
    /// Timeout of a single remote request.
    pub request_timeout: Duration,
}

impl BackendConfig {
    /// Default counter key.
    pub const DEFAULT_KEY: &'static str = "1";
    /// Default compare-and-swap cap of the optimistic loop.
    pub const DEFAULT_MAX_CAS_ATTEMPTS: u32 = 1000;

    /// Creates a configuration for `counter_type` with default settings.
    pub fn new(counter_type: CounterType) -> Self {
        Self {
            counter_type,
            ..Self::default()
        }
    }

    /// Sets the method.
    pub fn with_method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    /// Sets the counter key.
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = key.into();
        self
    }

    /// Enables the default retry policy, or disables retries.
    pub fn with_retries(mut self, enabled: bool) -> Self {
        self.retry = if enabled {
            RetryPolicy::new()
        } else {
            RetryPolicy::disabled()
        };
        self
    }

    /// Sets a custom retry policy.
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry = policy;
        self
    }

    /// Sets the compare-and-swap cap. Values below 1 are treated as 1.
    pub fn with_max_cas_attempts(mut self, attempts: u32) -> Self {
        self.max_cas_attempts = attempts.max(1);
        self
    }

    /// Sets the key-lock timeout.
    pub fn with_lock_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.lock_timeout = timeout;
        self
    }

    /// Sets the simulated memory-store latency.
    pub fn with_store_latency(mut self, latency: Option<Duration>) -> Self {
        self.store_latency = latency;
        self
    }

    /// Sets the file-store directory.
    pub fn with_storage_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.storage_path = Some(path.into());
        self
    }

    /// Sets the remote host.
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// Sets the remote port.
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Sets the remote request timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Directory used by the file store.
    pub fn storage_dir(&self) -> PathBuf {
        self.storage_path
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join("racecount"))
    }
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            counter_type: CounterType::default(),
            method: Method::default(),
            key: Self::DEFAULT_KEY.to_string(),
            retry: RetryPolicy::disabled(),
            max_cas_attempts: Self::DEFAULT_MAX_CAS_ATTEMPTS,
            lock_timeout: None,
            store_latency: None,
            storage_path: None,
            host: "localhost".to_string(),
            port: 8080,
            request_timeout: Duration::from_secs(30),
        }
    }
}

/// Builds a backend and makes sure its counter exists with value 0.
///
/// Fails with [`CounterError::Connection`] if the resource cannot be
/// reached, and with [`CounterError::Config`] if the configuration cannot
/// produce a backend in this build.
pub fn setup(config: &BackendConfig) -> Result<Box<dyn CounterBackend>> {
    match config.counter_type {
        CounterType::Memory => {
            let store = MemoryStore::new()
                .with_latency(config.store_latency)
                .with_lock_timeout(config.lock_timeout);
            open(Arc::new(store), config)
        }
        CounterType::File => {
            let store =
                FileStore::open(config.storage_dir())?.with_lock_timeout(config.lock_timeout);
            open(Arc::new(store), config)
        }
        #[cfg(feature = "http")]
        CounterType::Http => Ok(Box::new(HttpCounter::from_config(config)?)),
        #[cfg(not(feature = "http"))]
        CounterType::Http => Err(CounterError::Config(
            "built without the `http` feature".to_string(),
        )),
    }
}

/// Initializes the counter in `store` and wraps it with the configured method.
fn open<S: Store + 'static>(
    store: Arc<S>,
    config: &BackendConfig,
) -> Result<Box<dyn CounterBackend>> {
    store.init(&config.key).map_err(|err| {
        CounterError::Connection(format!("cannot initialize counter '{}': {err}", config.key))
    })?;
    let backend = with_store(store, config);
    tracing::info!(backend = %backend.name(), key = %config.key, "counter ready");
    Ok(backend)
}

/// Wraps an existing store with the method selected in `config`.
///
/// The counter is not initialized; call [`CounterBackend::reset`] first if
/// it may not exist yet.
pub fn with_store<S: Store + 'static>(
    store: Arc<S>,
    config: &BackendConfig,
) -> Box<dyn CounterBackend> {
    let key = config.key.clone();
    match config.method {
        Method::NoLock => Box::new(StoreBackend::new(store, key, NoLock)),
        Method::Pessimistic => Box::new(StoreBackend::new(store, key, Pessimistic)),
        Method::Optimistic => Box::new(StoreBackend::new(
            store,
            key,
            Optimistic::new(config.max_cas_attempts, config.retry),
        )),
        Method::Serializable => Box::new(StoreBackend::new(
            store,
            key,
            Serializable::new(config.retry),
        )),
        Method::Atomic => Box::new(StoreBackend::new(store, key, Atomic)),
    }
}

/// A counter held in a [`Store`] and incremented with strategy `M`.
#[derive(Debug)]
pub struct StoreBackend<S: Store, M: Strategy> {
    store: Arc<S>,
    key: String,
    strategy: M,
    closed: AtomicBool,
}

impl<S: Store, M: Strategy> StoreBackend<S, M> {
    /// Creates a backend on `key`.
    pub fn new(store: Arc<S>, key: impl Into<String>, strategy: M) -> Self {
        Self {
            store,
            key: key.into(),
            strategy,
            closed: AtomicBool::new(false),
        }
    }

    /// The underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// The counter key.
    pub fn key(&self) -> &str {
        &self.key
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

impl<S: Store, M: Strategy> CounterBackend for StoreBackend<S, M> {
    fn name(&self) -> String {
        format!("{}/{}", self.store.kind(), self.strategy.method())
    }

    fn reset(&self) -> bool {
        if self.is_closed() {
            tracing::warn!(key = %self.key, "reset on a closed counter");
            return false;
        }
        match self.store.init(&self.key) {
            Ok(()) => true,
            Err(err) => {
                tracing::error!(key = %self.key, error = %err, "failed to reset counter");
                false
            }
        }
    }

    fn read(&self) -> i64 {
        if self.is_closed() {
            return 0;
        }
        match self.store.load(&self.key) {
            Ok(record) => record.map_or(0, |record| record.value),
            Err(err) => {
                tracing::warn!(key = %self.key, error = %err, "failed to read counter");
                0
            }
        }
    }

    fn increment(&self) -> bool {
        if self.is_closed() {
            return false;
        }
        match self.strategy.increment(&*self.store, &self.key) {
            Ok(()) => true,
            Err(err) => {
                let method = self.strategy.method();
                match err.class() {
                    ErrorClass::TransientContention => {
                        tracing::debug!(key = %self.key, %method, error = %err, "increment lost to contention")
                    }
                    ErrorClass::Fatal => {
                        tracing::error!(key = %self.key, %method, error = %err, "increment failed")
                    }
                    ErrorClass::Other => {
                        tracing::warn!(key = %self.key, %method, error = %err, "increment failed")
                    }
                }
                false
            }
        }
    }

    fn shutdown(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            tracing::debug!(backend = %self.name(), "counter closed");
        }
    }
}
