use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use racecount::backends::{self, BackendConfig, CounterBackend, CounterType, Method};
use racecount::report::Consistency;
use racecount::retry::RetryPolicy;
use racecount::store::{KeyLock, LockTable, MemoryStore, Record, Store};
use racecount::workload::{Runner, Workload};
use racecount::Result;

fn fast_retries() -> RetryPolicy {
    RetryPolicy::new()
        .with_max_attempts(1000)
        .with_base_delay(Duration::from_micros(20))
        .with_max_delay(Duration::from_millis(2))
}

fn memory(method: Method) -> Box<dyn CounterBackend> {
    let config = BackendConfig::new(CounterType::Memory)
        .with_method(method)
        .with_retry_policy(fast_retries());
    backends::setup(&config).unwrap()
}

#[test]
fn test_no_contention_every_method() {
    for method in Method::ALL {
        let counter = memory(method);
        let report = Runner::new(counter.as_ref(), Workload::new(1, 500))
            .run()
            .unwrap();
        assert_eq!(report.observed, 500, "{method}");
        assert_eq!(report.consistency, Consistency::Exact, "{method}");
    }
}

#[test]
fn test_linearizable_methods_under_contention() {
    for method in Method::ALL.into_iter().filter(Method::is_linearizable) {
        let counter = memory(method);
        let report = Runner::new(counter.as_ref(), Workload::new(8, 500))
            .run()
            .unwrap();
        assert_eq!(report.expected, 4000, "{method}");
        assert_eq!(report.observed, 4000, "{method}");
        assert_eq!(report.successful_calls, 4000, "{method}");
    }
}

#[test]
fn test_linearizable_methods_on_file_store() {
    let dir = tempfile::tempdir().unwrap();
    for method in Method::ALL.into_iter().filter(Method::is_linearizable) {
        let config = BackendConfig::new(CounterType::File)
            .with_method(method)
            .with_key(method.as_str())
            .with_storage_path(dir.path())
            .with_retry_policy(fast_retries());
        let counter = backends::setup(&config).unwrap();
        let report = Runner::new(counter.as_ref(), Workload::new(4, 25))
            .run()
            .unwrap();
        assert_eq!(report.observed, 100, "{method}");
    }
}

#[test]
fn test_pessimistic_ten_by_thousand() {
    let counter = memory(Method::Pessimistic);
    let report = Runner::new(counter.as_ref(), Workload::new(10, 1000))
        .run()
        .unwrap();
    assert_eq!(report.expected, 10_000);
    assert_eq!(report.observed, 10_000);
    assert!(!report.has_lost_updates());
}

#[test]
fn test_no_lock_loses_updates() {
    let config = BackendConfig::new(CounterType::Memory)
        .with_method(Method::NoLock)
        .with_store_latency(Some(Duration::from_micros(5)));
    let counter = backends::setup(&config).unwrap();

    let report = Runner::new(counter.as_ref(), Workload::new(50, 2000))
        .run()
        .unwrap();
    assert_eq!(report.expected, 100_000);
    assert!(report.observed < 100_000);
    assert!(report.has_lost_updates());
    // Every call reported success even though increments vanished.
    assert_eq!(report.successful_calls, 100_000);
}

#[test]
fn test_reset_then_read() {
    for method in Method::ALL {
        let counter = memory(method);
        for _ in 0..3 {
            counter.increment();
        }
        assert!(counter.reset());
        assert_eq!(counter.read(), 0, "{method}");
    }
}

#[test]
fn test_reset_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let config = BackendConfig::new(CounterType::File)
        .with_method(Method::Optimistic)
        .with_storage_path(dir.path());
    let counter = backends::setup(&config).unwrap();
    counter.increment();

    assert!(counter.reset());
    assert!(counter.reset());
    assert_eq!(counter.read(), 0);
}

#[test]
fn test_without_retries_only_successes_land() {
    for method in [Method::Optimistic, Method::Serializable] {
        let config = BackendConfig::new(CounterType::Memory)
            .with_method(method)
            .with_max_cas_attempts(1)
            .with_store_latency(Some(Duration::from_micros(5)));
        let counter = backends::setup(&config).unwrap();

        let report = Runner::new(counter.as_ref(), Workload::new(8, 100))
            .run()
            .unwrap();
        assert_eq!(report.observed, report.successful_calls as i64, "{method}");
        assert_eq!(
            report.failed_calls,
            report.expected - report.successful_calls,
            "{method}"
        );
    }
}

/// A store where every compare-and-swap loses.
#[derive(Debug, Default)]
struct AlwaysConflicting {
    cas_calls: AtomicU64,
    locks: LockTable,
}

impl Store for AlwaysConflicting {
    type Lock = LockTable;

    fn kind(&self) -> &'static str {
        "conflicting"
    }

    fn init(&self, _key: &str) -> Result<()> {
        Ok(())
    }

    fn load(&self, _key: &str) -> Result<Option<Record>> {
        Ok(Some(Record::ZERO))
    }

    fn store(&self, _key: &str, _value: i64) -> Result<()> {
        Ok(())
    }

    fn compare_and_swap(&self, _key: &str, _current: Record, _value: i64) -> Result<bool> {
        self.cas_calls.fetch_add(1, Ordering::SeqCst);
        Ok(false)
    }

    fn fetch_add(&self, _key: &str, delta: i64) -> Result<i64> {
        Ok(delta)
    }

    fn key_lock(&self) -> &LockTable {
        &self.locks
    }
}

#[test]
fn test_persistent_conflict_without_retries_stops_after_one_attempt() {
    let store = Arc::new(AlwaysConflicting::default());
    let config = BackendConfig::default()
        .with_method(Method::Optimistic)
        .with_max_cas_attempts(1)
        .with_retries(false);
    let counter = backends::with_store(Arc::clone(&store), &config);

    assert!(!counter.increment());
    assert_eq!(store.cas_calls.load(Ordering::SeqCst), 1);
}

#[test]
fn test_persistent_conflict_is_bounded() {
    let store = Arc::new(AlwaysConflicting::default());
    let config = BackendConfig::default()
        .with_method(Method::Optimistic)
        .with_max_cas_attempts(5)
        .with_retry_policy(
            RetryPolicy::new()
                .with_max_attempts(3)
                .with_base_delay(Duration::from_millis(1)),
        );
    let counter = backends::with_store(Arc::clone(&store), &config);

    assert!(!counter.increment());
    assert_eq!(store.cas_calls.load(Ordering::SeqCst), 15);
}

#[test]
fn test_serializable_conflict_without_retries() {
    let store = Arc::new(AlwaysConflicting::default());
    let config = BackendConfig::default().with_method(Method::Serializable);
    let counter = backends::with_store(Arc::clone(&store), &config);

    assert!(!counter.increment());
    assert_eq!(store.cas_calls.load(Ordering::SeqCst), 1);
}

#[test]
fn test_lock_timeout_counts_as_failed_increment() {
    let store = Arc::new(MemoryStore::new().with_lock_timeout(Some(Duration::from_millis(5))));
    let config = BackendConfig::default().with_method(Method::Pessimistic);
    let counter = backends::with_store(Arc::clone(&store), &config);
    assert!(counter.reset());

    let held = store.key_lock().acquire("1").unwrap();
    assert!(!counter.increment());
    drop(held);
    assert!(counter.increment());
    assert_eq!(counter.read(), 1);
}
