//! JSON rendering of run reports.
//!
//! ```rust
//! use racecount::report::{Aggregator, JsonRenderer};
//! use racecount::workload::Workload;
//!
//! let report = Aggregator::new("memory/atomic", Workload::new(1, 3)).aggregate(0, 3, &[]);
//! let json = JsonRenderer::new().render(&report).unwrap();
//!
//! let value: serde_json::Value = serde_json::from_str(&json).unwrap();
//! assert_eq!(value["observed"], 3);
//! assert_eq!(value["consistency"]["verdict"], "exact");
//! ```

use serde::Serialize;

use crate::error::Result;
use crate::report::RunReport;

/// Serializes reports with `serde_json`.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonRenderer {
    pretty: bool,
}

impl JsonRenderer {
    /// Creates a renderer producing compact JSON.
    pub fn new() -> Self {
        Self::default()
    }

    /// Enables indented output.
    pub fn pretty(mut self, enabled: bool) -> Self {
        self.pretty = enabled;
        self
    }

    /// Renders one report.
    pub fn render(&self, report: &RunReport) -> Result<String> {
        self.encode(report)
    }

    /// Renders several reports as a JSON array.
    pub fn render_all(&self, reports: &[RunReport]) -> Result<String> {
        self.encode(reports)
    }

    fn encode<T: Serialize + ?Sized>(&self, value: &T) -> Result<String> {
        let json = if self.pretty {
            serde_json::to_string_pretty(value)?
        } else {
            serde_json::to_string(value)?
        };
        Ok(json)
    }
}
