//! Run results.
//!
//! The [`Aggregator`] folds per-worker outcomes and the baseline/final
//! counter reads into one immutable [`RunReport`]:
//!
//! - `expected = n_workers × calls_per_worker`
//! - `observed = final_count − initial_count`
//! - `throughput = expected / elapsed_seconds`, `0` when nothing was measured
//!   or nothing succeeded
//!
//! A report is rendered as plain text by its [`Display`](fmt::Display) impl,
//! as a table by [`TableRenderer`] (feature `table`) and as JSON by
//! [`JsonRenderer`].
//!
//! # Consistency
//!
//! | Verdict | Condition | Meaning |
//! |---------|-----------|---------|
//! | [`Exact`](Consistency::Exact) | `observed == expected` | every increment landed |
//! | [`LostUpdates`](Consistency::LostUpdates) | `observed < expected` | increments failed or were overwritten |
//! | [`Anomaly`](Consistency::Anomaly) | `observed > expected` | something else wrote to the counter |

pub mod json;
#[cfg(feature = "table")]
pub mod table;

pub use json::JsonRenderer;
#[cfg(feature = "table")]
pub use table::{TableRenderer, TableStyle};

use std::fmt;
use std::time::Duration;

use serde::{Serialize, Serializer};

use crate::workload::{WorkerOutcome, Workload};

/// Whether the counter moved by exactly the expected amount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum Consistency {
    /// `observed == expected`.
    Exact,
    /// `observed < expected`.
    LostUpdates {
        /// `expected − observed`.
        lost: u64,
    },
    /// `observed > expected`. Never produced by a correct backend.
    Anomaly {
        /// `observed − expected`.
        excess: u64,
    },
}

impl Consistency {
    /// Classifies an observed increase against the expected one.
    pub fn classify(expected: u64, observed: i64) -> Self {
        let diff = i128::from(observed) - i128::from(expected);
        let magnitude = u64::try_from(diff.unsigned_abs()).unwrap_or(u64::MAX);
        match diff {
            0 => Consistency::Exact,
            d if d < 0 => Consistency::LostUpdates { lost: magnitude },
            _ => Consistency::Anomaly { excess: magnitude },
        }
    }

    /// Returns `true` if fewer increments landed than were issued.
    pub fn has_lost_updates(&self) -> bool {
        matches!(self, Consistency::LostUpdates { .. })
    }

    /// Returns `true` if more increments landed than were issued.
    pub fn is_anomaly(&self) -> bool {
        matches!(self, Consistency::Anomaly { .. })
    }
}

impl fmt::Display for Consistency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Consistency::Exact => f.write_str("exact"),
            Consistency::LostUpdates { lost } => write!(f, "lost updates ({lost})"),
            Consistency::Anomaly { excess } => write!(f, "anomaly (+{excess})"),
        }
    }
}

/// Per-worker line of a report.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct WorkerSummary {
    /// Worker index.
    pub worker_id: usize,
    /// Increments issued.
    pub attempted: u64,
    /// Increments that succeeded.
    pub succeeded: u64,
    /// Time spent in the worker loop, `None` if it panicked.
    #[serde(rename = "elapsed_secs", serialize_with = "serialize_opt_secs")]
    pub elapsed: Option<Duration>,
    /// Whether the worker panicked.
    pub panicked: bool,
}

impl From<&WorkerOutcome> for WorkerSummary {
    fn from(outcome: &WorkerOutcome) -> Self {
        Self {
            worker_id: outcome.worker_id,
            attempted: outcome.attempted,
            succeeded: outcome.succeeded,
            elapsed: outcome.elapsed(),
            panicked: outcome.panicked,
        }
    }
}

/// Result of one run. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunReport {
    /// Backend label, e.g. `memory/optimistic`.
    pub label: String,
    /// Workload that was run.
    pub workload: Workload,
    /// `n_workers × calls_per_worker`.
    pub expected: u64,
    /// `final_count − initial_count`.
    pub observed: i64,
    /// Counter value after the reset.
    pub initial_count: i64,
    /// Counter value after all workers finished.
    pub final_count: i64,
    /// Increments reported as applied.
    pub successful_calls: u64,
    /// Increments reported as failed, including those of panicked workers.
    pub failed_calls: u64,
    /// Workers that panicked.
    pub failed_workers: usize,
    /// Per-worker breakdown.
    pub workers: Vec<WorkerSummary>,
    /// First worker start to last worker finish.
    #[serde(rename = "elapsed_secs", serialize_with = "serialize_secs")]
    pub elapsed: Duration,
    /// Expected increments per second.
    pub throughput: f64,
    /// Consistency verdict.
    pub consistency: Consistency,
    /// Why the run stopped before any worker started.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aborted: Option<String>,
}

impl RunReport {
    /// Returns `true` if the counter lost increments.
    pub fn has_lost_updates(&self) -> bool {
        self.consistency.has_lost_updates()
    }

    /// Returns `true` if the run never started its workers.
    pub fn is_aborted(&self) -> bool {
        self.aborted.is_some()
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rule = "=".repeat(60);
        writeln!(f, "{rule}")?;
        writeln!(f, "RUN RESULTS: {}", self.label)?;
        writeln!(f, "{rule}")?;
        if let Some(reason) = &self.aborted {
            writeln!(f, "Aborted:                     {reason}")?;
        }
        writeln!(f, "Number of workers:           {}", self.workload.n_workers)?;
        writeln!(f, "Calls per worker:            {}", self.workload.calls_per_worker)?;
        writeln!(f, "Expected count increase:     {}", self.expected)?;
        writeln!(f, "Actual count increase:       {}", self.observed)?;
        writeln!(f, "Successful calls:            {}", self.successful_calls)?;
        writeln!(f, "Failed calls:                {}", self.failed_calls)?;
        if self.failed_workers > 0 {
            writeln!(f, "Failed workers:              {}", self.failed_workers)?;
        }
        writeln!(f, "Total time (seconds):        {:.2}", self.elapsed.as_secs_f64())?;
        writeln!(f, "Requests per second (RPS):   {:.2}", self.throughput)?;
        writeln!(f, "Final count:                 {}", self.final_count)?;
        writeln!(f, "Consistency:                 {}", self.consistency)?;
        write!(f, "{rule}")
    }
}

/// Builds [`RunReport`]s for one labelled workload.
#[derive(Debug, Clone)]
pub struct Aggregator {
    label: String,
    workload: Workload,
}

impl Aggregator {
    /// Creates an aggregator.
    pub fn new(label: impl Into<String>, workload: Workload) -> Self {
        Self {
            label: label.into(),
            workload,
        }
    }

    /// Merges the counter reads and worker outcomes into a report.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use racecount::report::{Aggregator, Consistency};
    /// use racecount::workload::Workload;
    ///
    /// let aggregator = Aggregator::new("memory/no-lock", Workload::new(2, 10));
    /// let report = aggregator.aggregate(0, 17, &[]);
    /// assert_eq!(report.expected, 20);
    /// assert_eq!(report.consistency, Consistency::LostUpdates { lost: 3 });
    /// ```
    pub fn aggregate(
        &self,
        initial_count: i64,
        final_count: i64,
        outcomes: &[WorkerOutcome],
    ) -> RunReport {
        let expected = self.workload.expected();
        let observed = final_count.saturating_sub(initial_count);

        let successful_calls: u64 = outcomes.iter().map(|o| o.succeeded).sum();
        let failed_calls = expected.saturating_sub(successful_calls);
        let failed_workers = outcomes.iter().filter(|o| o.panicked).count();

        let first_start = outcomes.iter().filter_map(|o| o.span).map(|(s, _)| s).min();
        let last_end = outcomes.iter().filter_map(|o| o.span).map(|(_, e)| e).max();
        let elapsed = match (first_start, last_end) {
            (Some(start), Some(end)) => end.duration_since(start),
            _ => Duration::ZERO,
        };

        let consistency = Consistency::classify(expected, observed);
        if consistency.is_anomaly() {
            tracing::warn!(label = %self.label, expected, observed, "counter grew more than expected");
        }

        RunReport {
            label: self.label.clone(),
            workload: self.workload,
            expected,
            observed,
            initial_count,
            final_count,
            successful_calls,
            failed_calls,
            failed_workers,
            workers: outcomes.iter().map(WorkerSummary::from).collect(),
            elapsed,
            throughput: throughput(expected, successful_calls, elapsed),
            consistency,
            aborted: None,
        }
    }

    /// Report of a run that stopped before its workers started.
    pub fn aborted(&self, reason: impl Into<String>) -> RunReport {
        let expected = self.workload.expected();
        RunReport {
            label: self.label.clone(),
            workload: self.workload,
            expected,
            observed: 0,
            initial_count: 0,
            final_count: 0,
            successful_calls: 0,
            failed_calls: expected,
            failed_workers: 0,
            workers: Vec::new(),
            elapsed: Duration::ZERO,
            throughput: 0.0,
            consistency: Consistency::classify(expected, 0),
            aborted: Some(reason.into()),
        }
    }
}

fn throughput(expected: u64, successful: u64, elapsed: Duration) -> f64 {
    let secs = elapsed.as_secs_f64();
    if secs <= 0.0 || successful == 0 {
        return 0.0;
    }
    expected as f64 / secs
}

fn serialize_secs<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64(duration.as_secs_f64())
}

fn serialize_opt_secs<S: Serializer>(
    duration: &Option<Duration>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match duration {
        Some(duration) => serializer.serialize_some(&duration.as_secs_f64()),
        None => serializer.serialize_none(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    fn outcome(worker_id: usize, succeeded: u64, start: Instant, ms: u64) -> WorkerOutcome {
        WorkerOutcome {
            worker_id,
            attempted: 100,
            succeeded,
            span: Some((start, start + Duration::from_millis(ms))),
            panicked: false,
        }
    }

    #[test]
    fn test_classify() {
        assert_eq!(Consistency::classify(10, 10), Consistency::Exact);
        assert_eq!(Consistency::classify(10, 4), Consistency::LostUpdates { lost: 6 });
        assert_eq!(Consistency::classify(10, 12), Consistency::Anomaly { excess: 2 });
        assert_eq!(Consistency::classify(10, -5), Consistency::LostUpdates { lost: 15 });
    }

    #[test]
    fn test_elapsed_spans_first_start_to_last_end() {
        let t0 = Instant::now();
        let outcomes = [
            outcome(0, 100, t0, 40),
            outcome(1, 100, t0 + Duration::from_millis(10), 50),
            WorkerOutcome::panicked(2),
        ];
        let report = Aggregator::new("x", Workload::new(3, 100)).aggregate(0, 200, &outcomes);

        assert_eq!(report.elapsed, Duration::from_millis(60));
        assert_eq!(report.successful_calls, 200);
        assert_eq!(report.failed_calls, 100);
        assert_eq!(report.failed_workers, 1);
        assert_eq!(report.consistency, Consistency::LostUpdates { lost: 100 });
        assert!((report.throughput - 300.0 / 0.06).abs() < 1e-6);
    }

    #[test]
    fn test_zero_elapsed_means_zero_throughput() {
        let report = Aggregator::new("x", Workload::new(1, 1)).aggregate(0, 1, &[]);
        assert_eq!(report.elapsed, Duration::ZERO);
        assert_eq!(report.throughput, 0.0);
    }

    #[test]
    fn test_fully_failed_run() {
        let t0 = Instant::now();
        let outcomes = [outcome(0, 0, t0, 5)];
        let report = Aggregator::new("x", Workload::new(1, 100)).aggregate(0, 0, &outcomes);
        assert_eq!(report.observed, 0);
        assert_eq!(report.throughput, 0.0);
        assert!(report.has_lost_updates());
    }

    #[test]
    fn test_aborted() {
        let report = Aggregator::new("x", Workload::new(2, 5)).aborted("reset failed");
        assert!(report.is_aborted());
        assert_eq!(report.observed, 0);
        assert_eq!(report.throughput, 0.0);
        assert!(report.to_string().contains("reset failed"));
    }

    #[test]
    fn test_display() {
        let report = Aggregator::new("memory/atomic", Workload::new(2, 5)).aggregate(0, 10, &[]);
        let text = report.to_string();
        assert!(text.contains("RUN RESULTS: memory/atomic"));
        assert!(text.contains("Expected count increase:     10"));
        assert!(text.contains("Consistency:                 exact"));
    }
}
