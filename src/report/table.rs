//! Table rendering of run reports.
//!
//! [`TableRenderer`] turns a [`RunReport`] into a metric/value table, and a
//! set of reports into one comparison row per backend, using the `tabled`
//! crate.
//!
//! # Feature Flag
//!
//! This module requires the `table` feature.
//!
//! # Examples
//!
//! ```rust
//! use racecount::report::{Aggregator, TableRenderer, TableStyle};
//! use racecount::workload::Workload;
//!
//! let report = Aggregator::new("memory/atomic", Workload::new(2, 50)).aggregate(0, 100, &[]);
//!
//! let output = TableRenderer::new().with_style(TableStyle::Ascii).render(&report);
//! assert!(output.contains("memory/atomic"));
//! // +-------------------+---------------+
//! // | Metric            | Value         |
//! // +-------------------+---------------+
//! // | Backend           | memory/atomic |
//! // | Workers           | 2             |
//! // ...
//! ```

use tabled::settings::object::Rows;
use tabled::settings::{Remove, Style};
use tabled::{Table, Tabled};

use crate::report::RunReport;

/// Available table styles.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TableStyle {
    /// ASCII table with simple characters: +, -, |
    Ascii,
    /// Modern rounded corners (default)
    #[default]
    Rounded,
    /// Sharp corners with box-drawing characters
    Sharp,
    /// Modern style with clean lines
    Modern,
    /// GitHub-flavored Markdown table
    Markdown,
    /// No borders, just spacing
    Blank,
}

/// Configuration for the table renderer.
#[derive(Debug, Clone)]
pub struct TableConfig {
    /// The style to use for rendering.
    pub style: TableStyle,
    /// Whether to show the header row.
    pub show_header: bool,
    /// Custom title printed above the table.
    pub title: Option<String>,
    /// Whether to append the per-worker breakdown.
    pub show_workers: bool,
}

impl Default for TableConfig {
    fn default() -> Self {
        Self {
            style: TableStyle::default(),
            show_header: true,
            title: None,
            show_workers: false,
        }
    }
}

#[derive(Tabled)]
struct MetricRow {
    #[tabled(rename = "Metric")]
    metric: &'static str,
    #[tabled(rename = "Value")]
    value: String,
}

#[derive(Tabled)]
struct WorkerRow {
    #[tabled(rename = "Worker")]
    worker: usize,
    #[tabled(rename = "Attempted")]
    attempted: u64,
    #[tabled(rename = "Succeeded")]
    succeeded: u64,
    #[tabled(rename = "Time (s)")]
    elapsed: String,
    #[tabled(rename = "Status")]
    status: &'static str,
}

#[derive(Tabled)]
struct ComparisonRow {
    #[tabled(rename = "Backend")]
    label: String,
    #[tabled(rename = "Expected")]
    expected: u64,
    #[tabled(rename = "Observed")]
    observed: i64,
    #[tabled(rename = "Failed calls")]
    failed: u64,
    #[tabled(rename = "Time (s)")]
    elapsed: String,
    #[tabled(rename = "RPS")]
    throughput: String,
    #[tabled(rename = "Consistency")]
    consistency: String,
}

/// Renders run reports as formatted tables.
#[derive(Debug, Clone, Default)]
pub struct TableRenderer {
    config: TableConfig,
}

impl TableRenderer {
    /// Creates a renderer with the rounded style and a header row.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a renderer with the specified configuration.
    pub fn with_config(config: TableConfig) -> Self {
        Self { config }
    }

    /// Sets the table style.
    pub fn with_style(mut self, style: TableStyle) -> Self {
        self.config.style = style;
        self
    }

    /// Sets whether to show the header row.
    pub fn with_header(mut self, show: bool) -> Self {
        self.config.show_header = show;
        self
    }

    /// Sets a title printed above the table.
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.config.title = Some(title.into());
        self
    }

    /// Appends a per-worker table to single-report output.
    pub fn with_workers(mut self, show: bool) -> Self {
        self.config.show_workers = show;
        self
    }

    fn apply_style(&self, table: &mut Table) {
        match self.config.style {
            TableStyle::Ascii => {
                table.with(Style::ascii());
            }
            TableStyle::Rounded => {
                table.with(Style::rounded());
            }
            TableStyle::Sharp => {
                table.with(Style::sharp());
            }
            TableStyle::Modern => {
                table.with(Style::modern());
            }
            TableStyle::Markdown => {
                table.with(Style::markdown());
            }
            TableStyle::Blank => {
                table.with(Style::blank());
            }
        }
    }

    fn finish(&self, mut table: Table) -> String {
        self.apply_style(&mut table);
        if !self.config.show_header {
            table.with(Remove::row(Rows::first()));
        }
        match &self.config.title {
            Some(title) => format!("{title}\n{table}"),
            None => table.to_string(),
        }
    }

    /// Renders one report as a metric/value table.
    pub fn render(&self, report: &RunReport) -> String {
        let mut rows = vec![
            MetricRow {
                metric: "Backend",
                value: report.label.clone(),
            },
            MetricRow {
                metric: "Workers",
                value: report.workload.n_workers.to_string(),
            },
            MetricRow {
                metric: "Calls per worker",
                value: report.workload.calls_per_worker.to_string(),
            },
            MetricRow {
                metric: "Expected increase",
                value: report.expected.to_string(),
            },
            MetricRow {
                metric: "Observed increase",
                value: report.observed.to_string(),
            },
            MetricRow {
                metric: "Successful calls",
                value: report.successful_calls.to_string(),
            },
            MetricRow {
                metric: "Failed calls",
                value: report.failed_calls.to_string(),
            },
            MetricRow {
                metric: "Time (s)",
                value: format!("{:.2}", report.elapsed.as_secs_f64()),
            },
            MetricRow {
                metric: "Requests per second",
                value: format!("{:.2}", report.throughput),
            },
            MetricRow {
                metric: "Final count",
                value: report.final_count.to_string(),
            },
            MetricRow {
                metric: "Consistency",
                value: report.consistency.to_string(),
            },
        ];
        if report.failed_workers > 0 {
            rows.push(MetricRow {
                metric: "Failed workers",
                value: report.failed_workers.to_string(),
            });
        }
        if let Some(reason) = &report.aborted {
            rows.push(MetricRow {
                metric: "Aborted",
                value: reason.clone(),
            });
        }

        let summary = self.finish(Table::new(rows));
        if !self.config.show_workers || report.workers.is_empty() {
            return summary;
        }

        let workers = report.workers.iter().map(|worker| WorkerRow {
            worker: worker.worker_id,
            attempted: worker.attempted,
            succeeded: worker.succeeded,
            elapsed: worker
                .elapsed
                .map(|elapsed| format!("{:.3}", elapsed.as_secs_f64()))
                .unwrap_or_default(),
            status: if worker.panicked { "panicked" } else { "ok" },
        });
        let mut table = Table::new(workers);
        self.apply_style(&mut table);
        format!("{summary}\n{table}")
    }

    /// Renders one comparison row per report.
    pub fn render_comparison<'a>(&self, reports: impl IntoIterator<Item = &'a RunReport>) -> String {
        let rows: Vec<ComparisonRow> = reports
            .into_iter()
            .map(|report| ComparisonRow {
                label: report.label.clone(),
                expected: report.expected,
                observed: report.observed,
                failed: report.failed_calls,
                elapsed: format!("{:.2}", report.elapsed.as_secs_f64()),
                throughput: format!("{:.2}", report.throughput),
                consistency: report.consistency.to_string(),
            })
            .collect();
        self.finish(Table::new(rows))
    }
}
