//! Runtime metrics for program operations.
//!
//! Metrics go through the `metrics` crate facade; no exporter is installed
//! here, so without a recorder every call is a no-op.
//!
//! ## Metrics Exported
//!
//! | Metric | Type | Labels | Description |
//! |--------|------|--------|-------------|
//! | `tmi_program_operations_total` | Counter | `operation`, `kind` | Operations completed |
//! | `tmi_program_operation_duration_seconds` | Histogram | `operation` | Operation latency |
//! | `tmi_flights_controlled` | Gauge | `kind` | Controlled flights in the last plan |
//! | `tmi_flights_stacked` | Gauge | `kind` | Stacked flights in the last plan |
//! | `tmi_slot_utilization_percent` | Gauge | `program_id` | Slot utilization of the last plan |
//! | `tmi_commit_failures_total` | Counter | `operation`, `step` | Rolled-back commits |
//!
//! ## Usage
//!
//! ```rust,no_run
//! use tmi_flow::metrics::{time_operation, FlowMetrics};
//!
//! let metrics = FlowMetrics::new();
//! {
//!     let _guard = time_operation("simulate");
//!     metrics.record_operation("simulate", "GDP");
//! }
//! ```

use std::time::{Duration, Instant};

use metrics::{counter, gauge, histogram};

use crate::store::CommitStep;
use crate::summary::SimulationSummary;

/// Metric names as constants for consistency.
pub mod names {
    /// Counter: program operations completed.
    pub const OPERATIONS_TOTAL: &str = "tmi_program_operations_total";
    /// Histogram: operation duration in seconds.
    pub const OPERATION_DURATION_SECONDS: &str = "tmi_program_operation_duration_seconds";
    /// Gauge: controlled flights in the last plan.
    pub const FLIGHTS_CONTROLLED: &str = "tmi_flights_controlled";
    /// Gauge: stacked flights in the last plan.
    pub const FLIGHTS_STACKED: &str = "tmi_flights_stacked";
    /// Gauge: slot utilization of the last plan.
    pub const SLOT_UTILIZATION_PERCENT: &str = "tmi_slot_utilization_percent";
    /// Counter: commits rolled back.
    pub const COMMIT_FAILURES_TOTAL: &str = "tmi_commit_failures_total";
}

/// Label keys used across metrics.
pub mod labels {
    /// Operation (preview, simulate, apply, purge, purge_local, complete).
    pub const OPERATION: &str = "operation";
    /// Program type (GS, GDP, GDP-DAS, ...).
    pub const KIND: &str = "kind";
    /// Program identifier.
    pub const PROGRAM_ID: &str = "program_id";
    /// Commit step that failed.
    pub const STEP: &str = "step";
}

/// Records program operation metrics.
#[derive(Debug, Clone, Default)]
pub struct FlowMetrics;

impl FlowMetrics {
    /// Creates a new metrics recorder.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Increments `tmi_program_operations_total`.
    pub fn record_operation(&self, operation: &str, kind: &str) {
        counter!(
            names::OPERATIONS_TOTAL,
            labels::OPERATION => operation.to_string(),
            labels::KIND => kind.to_string(),
        )
        .increment(1);
    }

    /// Records the gauges describing a staged plan.
    #[allow(clippy::cast_precision_loss)]
    pub fn record_plan(&self, kind: &str, program_id: &str, summary: &SimulationSummary) {
        gauge!(names::FLIGHTS_CONTROLLED, labels::KIND => kind.to_string())
            .set(summary.controlled_flights as f64);
        gauge!(names::FLIGHTS_STACKED, labels::KIND => kind.to_string())
            .set(summary.stacked_flights as f64);
        gauge!(
            names::SLOT_UTILIZATION_PERCENT,
            labels::PROGRAM_ID => program_id.to_string(),
        )
        .set(summary.utilization_pct);
    }

    /// Increments `tmi_commit_failures_total`.
    pub fn record_commit_failure(&self, operation: &str, step: CommitStep) {
        counter!(
            names::COMMIT_FAILURES_TOTAL,
            labels::OPERATION => operation.to_string(),
            labels::STEP => step.as_str(),
        )
        .increment(1);
    }
}

/// RAII guard for timing operations.
///
/// Automatically records duration when dropped.
pub struct TimingGuard<F>
where
    F: FnOnce(Duration),
{
    start: Instant,
    on_drop: Option<F>,
}

impl<F> TimingGuard<F>
where
    F: FnOnce(Duration),
{
    /// Creates a guard that calls `on_drop` with the elapsed duration.
    pub fn new(on_drop: F) -> Self {
        Self {
            start: Instant::now(),
            on_drop: Some(on_drop),
        }
    }

    /// Returns the elapsed time since the guard was created.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

impl<F> Drop for TimingGuard<F>
where
    F: FnOnce(Duration),
{
    fn drop(&mut self) {
        if let Some(f) = self.on_drop.take() {
            f(self.start.elapsed());
        }
    }
}

/// Times an operation into `tmi_program_operation_duration_seconds`.
#[must_use]
pub fn time_operation(operation: &'static str) -> TimingGuard<impl FnOnce(Duration)> {
    TimingGuard::new(move |duration| {
        histogram!(
            names::OPERATION_DURATION_SECONDS,
            labels::OPERATION => operation,
        )
        .record(duration.as_secs_f64());
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_without_a_recorder_is_a_no_op() {
        let metrics = FlowMetrics::new();
        metrics.record_operation("simulate", "GDP");
        metrics.record_plan("GDP", "GDP-KJFK-1", &SimulationSummary::default());
        metrics.record_commit_failure("apply", CommitStep::CopyControlFields);
        drop(time_operation("apply"));
    }

    #[test]
    fn timing_guard_measures_duration() {
        let mut recorded = None;
        {
            let _guard = TimingGuard::new(|d| recorded = Some(d));
            std::thread::sleep(Duration::from_millis(5));
        }
        assert!(recorded.is_some_and(|d| d >= Duration::from_millis(5)));
    }
}
