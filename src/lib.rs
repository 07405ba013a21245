//! # Racecount - Lost-Update Benchmark for Shared Counters
//!
//! A Rust library and pair of binaries that hammer one shared counter from
//! many threads and report two things: how fast each concurrency-control
//! strategy is, and whether it lost increments along the way.
//!
//! ## The Problem
//!
//! The obvious way to bump a counter kept in a store is to read it, add one
//! and write it back. With a single client that is correct. With many
//! clients it is not: two of them read the same value, both write `value + 1`,
//! and one increment silently disappears. This is the **lost update**.
//!
//! Every fix trades something for correctness. Locks serialize writers.
//! Compare-and-swap spins under contention. Serializable transactions abort
//! and have to be retried. Store-native atomics are fast but not always
//! available. This crate measures those trade-offs side by side.
//!
//! ## Strategies
//!
//! | Method | Mechanism | Lost updates |
//! |--------|-----------|--------------|
//! | [`no-lock`](backends::NoLock) | load, +1, blind store | yes, under contention |
//! | [`pessimistic`](backends::Pessimistic) | exclusive key lock around the read-modify-write | no |
//! | [`optimistic`](backends::Optimistic) | versioned compare-and-swap loop, capped | no |
//! | [`serializable`](backends::Serializable) | snapshot transaction, retried with backoff | no, when retried |
//! | [`atomic`](backends::Atomic) | store-native fetch-add | no |
//!
//! Retries for the optimistic and serializable methods follow
//! [`RetryPolicy`](retry::RetryPolicy): exponential backoff with a
//! deterministic jitter, applied only to transient contention.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   reset / read    ┌──────────────────────────┐
//! │    Runner    │──────────────────►│  dyn CounterBackend       │
//! │  (workload)  │                   │  ├─ StoreBackend<S, M>    │
//! │              │  n_workers ×      │  │    M: Strategy          │
//! │ ┌──────────┐ │  increment()      │  │    S: Store             │
//! │ │ worker 0 │─┼──────────────────►│  │       ├─ MemoryStore    │
//! │ │ worker 1 │─┼──────────────────►│  │       └─ FileStore      │
//! │ │   ...    │ │                   │  └─ HttpCounter ──► server │
//! │ └──────────┘ │                   └──────────────────────────┘
//! └──────┬───────┘
//!        │ outcomes + counts
//!        ▼
//! ┌──────────────┐
//! │  Aggregator  │──► RunReport ──► text / table / JSON
//! └──────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust
//! use racecount::backends::{self, BackendConfig, CounterType, Method};
//! use racecount::workload::{Runner, Workload};
//!
//! let config = BackendConfig::new(CounterType::Memory).with_method(Method::Pessimistic);
//! let counter = backends::setup(&config).unwrap();
//!
//! let report = Runner::new(counter.as_ref(), Workload::new(8, 500)).run().unwrap();
//! assert_eq!(report.observed, 4000);
//! assert!(!report.has_lost_updates());
//! println!("{report}");
//! ```
//!
//! ## Stores
//!
//! Strategies run against the [`Store`](store::Store) trait:
//!
//! | Store | Where | Key lock |
//! |-------|-------|----------|
//! | [`MemoryStore`](store::MemoryStore) | in process, optional simulated latency | [`LockTable`](store::LockTable) |
//! | [`FileStore`](store::FileStore) | one JSON file per key | [`FileLocks`](store::FileLocks) |
//!
//! Any store-backed counter can also be served over HTTP (feature `server`)
//! and driven remotely with [`HttpCounter`](backends::HttpCounter) (feature
//! `http`).
//!
//! ## Features
//!
//! | Feature | Enables |
//! |---------|---------|
//! | `table` | [`report::TableRenderer`] |
//! | `http` | the remote counter client |
//! | `server` | the axum counter service |
//! | `cli` | the `racecount` and `racecount-server` binaries |
//! | `full` | everything |

pub mod backends;
pub mod error;
pub mod report;
pub mod retry;
pub mod store;
pub mod workload;

#[cfg(feature = "cli")]
pub mod logging;
#[cfg(feature = "server")]
pub mod server;

pub use error::{CounterError, ErrorClass, Result};
