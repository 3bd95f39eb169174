//! Quantitative outcome of a load test run

use crate::metrics::MetricsSnapshot;
use crate::scheduler::{ScheduleSummary, VuSample};
use crate::threshold::ThresholdReport;
use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::time::Duration;
use uuid::Uuid;

/// Serialize a duration as fractional milliseconds.
pub(crate) fn duration_ms<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64(value.as_secs_f64() * 1000.0)
}

/// Everything a reporter needs about a finished run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub scenario: String,
    pub started_at: DateTime<Utc>,
    #[serde(rename = "elapsed_ms", serialize_with = "duration_ms")]
    pub elapsed: Duration,
    pub iterations: u64,
    pub failed_iterations: u64,
    pub peak_vus: usize,
    pub vu_samples: Vec<VuSample>,
    pub metrics: MetricsSnapshot,
    pub thresholds: ThresholdReport,
}

impl RunReport {
    pub fn new(
        scenario: impl Into<String>,
        started_at: DateTime<Utc>,
        schedule: ScheduleSummary,
        metrics: MetricsSnapshot,
        thresholds: ThresholdReport,
    ) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            scenario: scenario.into(),
            started_at,
            elapsed: schedule.elapsed,
            iterations: schedule.iterations,
            failed_iterations: schedule.failed_iterations,
            peak_vus: schedule.peak_vus,
            vu_samples: schedule.samples,
            metrics,
            thresholds,
        }
    }

    /// True when every threshold held.
    pub fn passed(&self) -> bool {
        self.thresholds.passed
    }

    /// Get failure summary
    pub fn failure_summary(&self) -> String {
        let failures: Vec<String> = self.thresholds.failures().map(ToString::to_string).collect();
        if failures.is_empty() {
            return "All thresholds passed".to_string();
        }
        failures.join("\n")
    }

    /// Completed iterations per second over the whole run.
    pub fn iterations_per_second(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs == 0.0 {
            return 0.0;
        }
        self.iterations as f64 / secs
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// Write the JSON report to `path`.
    pub fn write_json(&self, path: impl AsRef<Path>) -> std::io::Result<()> {
        let content = self.to_json()?;
        let mut file = File::create(path)?;
        file.write_all(content.as_bytes())?;
        Ok(())
    }
}
