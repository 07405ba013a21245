//! Concurrent workload driver.
//!
//! A [`Runner`] takes one backend handle through a fixed sequence of phases:
//!
//! ```text
//! Initializing ─► Resetting ─► Warming ─► Running ─► Draining ─► Reporting ─► Done
//!                    │            │          │           │
//!               reset counter  baseline   n workers   join all
//!                             read
//! ```
//!
//! `Running` starts exactly `n_workers` threads. Each one issues
//! `calls_per_worker` sequential increments against the same handle and
//! counts its own successes; a failed increment is skipped, never retried
//! here and never fatal to the worker. `Draining` joins every worker before
//! anything is reported. A worker that panics is caught at the join and
//! counted as zero successes.
//!
//! Only an invalid workload or a failed reset stops a run, and both happen
//! before any worker starts.
//!
//! # Examples
//!
//! ```rust
//! use racecount::backends::{self, BackendConfig, CounterType, Method};
//! use racecount::workload::{Phase, Runner, Workload};
//!
//! let counter = backends::setup(
//!     &BackendConfig::new(CounterType::Memory).with_method(Method::Atomic),
//! )
//! .unwrap();
//!
//! let mut runner = Runner::new(counter.as_ref(), Workload::new(4, 250));
//! let report = runner.run().unwrap();
//!
//! assert_eq!(runner.phase(), Phase::Done);
//! assert_eq!(report.expected, 1000);
//! assert_eq!(report.observed, 1000);
//! ```

use std::time::{Duration, Instant};

use crossbeam_utils::thread;
use serde::{Deserialize, Serialize};

use crate::backends::CounterBackend;
use crate::error::{CounterError, Result};
use crate::report::{Aggregator, RunReport};

/// Shape of one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Workload {
    /// Number of concurrent workers.
    pub n_workers: usize,
    /// Sequential increments per worker.
    pub calls_per_worker: u64,
}

impl Workload {
    /// Creates a workload.
    pub fn new(n_workers: usize, calls_per_worker: u64) -> Self {
        Self {
            n_workers,
            calls_per_worker,
        }
    }

    /// Increments the run should add to the counter.
    pub fn expected(&self) -> u64 {
        (self.n_workers as u64).saturating_mul(self.calls_per_worker)
    }

    /// Rejects empty workloads.
    pub fn validate(&self) -> Result<()> {
        if self.n_workers == 0 {
            return Err(CounterError::Config("at least one worker is required".into()));
        }
        if self.calls_per_worker == 0 {
            return Err(CounterError::Config(
                "at least one call per worker is required".into(),
            ));
        }
        Ok(())
    }
}

/// Run phase, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Validating the workload.
    Initializing,
    /// Resetting the counter.
    Resetting,
    /// Reading the baseline.
    Warming,
    /// Workers are issuing increments.
    Running,
    /// Joining workers.
    Draining,
    /// Reading the final count and aggregating.
    Reporting,
    /// Report produced.
    Done,
}

/// What one worker did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerOutcome {
    /// Worker index, `0..n_workers`.
    pub worker_id: usize,
    /// Increments issued.
    pub attempted: u64,
    /// Increments that reported success.
    pub succeeded: u64,
    /// Start and finish of the worker's loop. `None` if it panicked.
    pub span: Option<(Instant, Instant)>,
    /// Whether the worker panicked.
    pub panicked: bool,
}

impl WorkerOutcome {
    /// Outcome of a worker that died before reporting.
    pub fn panicked(worker_id: usize) -> Self {
        Self {
            worker_id,
            attempted: 0,
            succeeded: 0,
            span: None,
            panicked: true,
        }
    }

    /// Calls that did not succeed.
    pub fn failed(&self) -> u64 {
        self.attempted - self.succeeded
    }

    /// Time the worker spent in its loop.
    pub fn elapsed(&self) -> Option<Duration> {
        self.span.map(|(start, end)| end.duration_since(start))
    }
}

/// Drives one run against a backend.
#[derive(Debug)]
pub struct Runner<'b> {
    backend: &'b dyn CounterBackend,
    workload: Workload,
    label: String,
    phase: Phase,
}

impl<'b> Runner<'b> {
    /// Creates a runner labelled with the backend name.
    pub fn new(backend: &'b dyn CounterBackend, workload: Workload) -> Self {
        Self {
            label: backend.name(),
            backend,
            workload,
            phase: Phase::Initializing,
        }
    }

    /// Overrides the report label.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    /// Phase reached so far. A failed run stays at the phase that failed.
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// The workload this runner executes.
    pub fn workload(&self) -> Workload {
        self.workload
    }

    /// Executes the run to completion.
    ///
    /// Fails only if the workload is empty or the counter cannot be reset;
    /// individual increment failures show up in the report instead.
    pub fn run(&mut self) -> Result<RunReport> {
        self.phase = Phase::Initializing;
        self.workload.validate()?;
        let aggregator = Aggregator::new(self.label.clone(), self.workload);
        tracing::info!(
            label = %self.label,
            n_workers = self.workload.n_workers,
            calls_per_worker = self.workload.calls_per_worker,
            "starting run"
        );

        self.phase = Phase::Resetting;
        if !self.backend.reset() {
            tracing::error!(label = %self.label, "counter reset failed, aborting run");
            return Err(CounterError::ResetFailed {
                key: self.label.clone(),
            });
        }

        self.phase = Phase::Warming;
        let initial = self.backend.read();
        tracing::info!(initial, "baseline read");

        self.phase = Phase::Running;
        let outcomes = self.spawn_and_drain();

        self.phase = Phase::Reporting;
        let final_count = self.backend.read();
        let report = aggregator.aggregate(initial, final_count, &outcomes);
        tracing::info!(
            label = %report.label,
            expected = report.expected,
            observed = report.observed,
            elapsed_ms = report.elapsed.as_millis() as u64,
            throughput = report.throughput,
            "run finished"
        );

        self.phase = Phase::Done;
        Ok(report)
    }

    fn spawn_and_drain(&mut self) -> Vec<WorkerOutcome> {
        let backend = self.backend;
        let Workload {
            n_workers,
            calls_per_worker,
        } = self.workload;
        let phase = &mut self.phase;

        let outcomes = thread::scope(|scope| {
            let handles: Vec<_> = (0..n_workers)
                .map(|worker_id| {
                    scope.spawn(move |_| run_worker(backend, worker_id, calls_per_worker))
                })
                .collect();

            *phase = Phase::Draining;
            handles
                .into_iter()
                .enumerate()
                .map(|(worker_id, handle)| {
                    handle.join().unwrap_or_else(|_| {
                        tracing::error!(worker_id, "worker panicked, counting zero successes");
                        WorkerOutcome::panicked(worker_id)
                    })
                })
                .collect::<Vec<_>>()
        });

        // Every handle is joined above, so the scope itself has nothing left
        // to report.
        outcomes.unwrap_or_default()
    }
}

fn run_worker(backend: &dyn CounterBackend, worker_id: usize, calls: u64) -> WorkerOutcome {
    let progress_step = (calls / 10).max(1);
    tracing::debug!(worker_id, calls, "worker started");

    let start = Instant::now();
    let mut succeeded = 0;
    for call in 1..=calls {
        if backend.increment() {
            succeeded += 1;
        }
        if call % progress_step == 0 {
            tracing::debug!(worker_id, completed = call, total = calls, "worker progress");
        }
    }
    let end = Instant::now();

    tracing::debug!(worker_id, succeeded, calls, "worker finished");
    WorkerOutcome {
        worker_id,
        attempted: calls,
        succeeded,
        span: Some((start, end)),
        panicked: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::{self, BackendConfig, Method};
    use crate::report::Consistency;

    fn counter(method: Method) -> Box<dyn CounterBackend> {
        backends::setup(&BackendConfig::default().with_method(method)).unwrap()
    }

    #[test]
    fn test_expected() {
        assert_eq!(Workload::new(10, 1000).expected(), 10_000);
        assert_eq!(Workload::new(0, 1000).expected(), 0);
    }

    #[test]
    fn test_empty_workload_is_rejected() {
        let counter = counter(Method::Atomic);
        let mut runner = Runner::new(counter.as_ref(), Workload::new(0, 10));
        assert!(matches!(runner.run(), Err(CounterError::Config(_))));
        assert_eq!(runner.phase(), Phase::Initializing);

        let mut runner = Runner::new(counter.as_ref(), Workload::new(3, 0));
        assert!(runner.run().is_err());
    }

    #[test]
    fn test_single_worker_counts_every_call() {
        let counter = counter(Method::NoLock);
        let mut runner = Runner::new(counter.as_ref(), Workload::new(1, 300));
        let report = runner.run().unwrap();

        assert_eq!(report.observed, 300);
        assert_eq!(report.successful_calls, 300);
        assert_eq!(report.consistency, Consistency::Exact);
        assert_eq!(report.workers.len(), 1);
        assert_eq!(runner.phase(), Phase::Done);
    }

    #[test]
    fn test_run_resets_previous_value() {
        let counter = counter(Method::Pessimistic);
        for _ in 0..7 {
            counter.increment();
        }
        let report = Runner::new(counter.as_ref(), Workload::new(2, 10))
            .with_label("again")
            .run()
            .unwrap();
        assert_eq!(report.label, "again");
        assert_eq!(report.initial_count, 0);
        assert_eq!(report.final_count, 20);
    }

    #[test]
    fn test_phase_order() {
        assert!(Phase::Initializing < Phase::Resetting);
        assert!(Phase::Running < Phase::Draining);
        assert!(Phase::Reporting < Phase::Done);
    }

    #[test]
    fn test_outcome_failed() {
        let outcome = WorkerOutcome {
            worker_id: 0,
            attempted: 10,
            succeeded: 7,
            span: None,
            panicked: false,
        };
        assert_eq!(outcome.failed(), 3);
        assert_eq!(WorkerOutcome::panicked(4).succeeded, 0);
    }
}
