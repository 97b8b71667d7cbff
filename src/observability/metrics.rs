//! Batch metrics for the meter ingest pipeline, recorded through the
//! `metrics` facade and rendered in Prometheus text format.

use std::fmt;
use std::sync::OnceLock;

use ::metrics::Unit;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing::info;

use crate::error::{IngestError, Result};

/// All metric names used by the crate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricName {
    // Batch metrics
    BatchesProcessed,
    BatchesRejected,
    BatchDuration,
    BatchSize,

    // Reading metrics
    ReadingsAccepted,
    ReadingsDropped,
    DiagnosticsEmitted,
    DstSplits,
    CounterResets,

    // Store metrics
    StoreCommitsSuccess,
    StoreCommitsError,
}

impl fmt::Display for MetricName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl MetricName {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricName::BatchesProcessed => "meter_ingest_batches_processed_total",
            MetricName::BatchesRejected => "meter_ingest_batches_rejected_total",
            MetricName::BatchDuration => "meter_ingest_batch_duration_seconds",
            MetricName::BatchSize => "meter_ingest_batch_size",

            MetricName::ReadingsAccepted => "meter_ingest_readings_accepted_total",
            MetricName::ReadingsDropped => "meter_ingest_readings_dropped_total",
            MetricName::DiagnosticsEmitted => "meter_ingest_diagnostics_total",
            MetricName::DstSplits => "meter_ingest_dst_splits_total",
            MetricName::CounterResets => "meter_ingest_counter_resets_total",

            MetricName::StoreCommitsSuccess => "meter_ingest_store_commits_success_total",
            MetricName::StoreCommitsError => "meter_ingest_store_commits_error_total",
        }
    }

    pub fn all_metrics() -> impl Iterator<Item = MetricName> {
        use MetricName::*;
        [
            BatchesProcessed,
            BatchesRejected,
            BatchDuration,
            BatchSize,
            ReadingsAccepted,
            ReadingsDropped,
            DiagnosticsEmitted,
            DstSplits,
            CounterResets,
            StoreCommitsSuccess,
            StoreCommitsError,
        ]
        .into_iter()
    }

    pub fn is_histogram(&self) -> bool {
        matches!(self, MetricName::BatchDuration | MetricName::BatchSize)
    }

    /// (description, unit)
    pub fn metadata(&self) -> (&'static str, Option<Unit>) {
        match self {
            MetricName::BatchesProcessed => ("Batches processed by status", None),
            MetricName::BatchesRejected => ("Batches rejected as a whole", None),
            MetricName::BatchDuration => ("Time spent running one batch", Some(Unit::Seconds)),
            MetricName::BatchSize => ("Raw rows per batch", Some(Unit::Count)),
            MetricName::ReadingsAccepted => ("Readings accepted for storage", None),
            MetricName::ReadingsDropped => ("Candidates dropped with an error", None),
            MetricName::DiagnosticsEmitted => ("Diagnostics by severity", None),
            MetricName::DstSplits => ("Candidates split at a DST transition", None),
            MetricName::CounterResets => ("Cumulative counter resets accepted", None),
            MetricName::StoreCommitsSuccess => ("Successful batch commits", None),
            MetricName::StoreCommitsError => ("Failed batch commits", None),
        }
    }
}

fn describe(metric: MetricName) {
    let name = metric.as_str();
    let (description, unit) = metric.metadata();
    match (metric.is_histogram(), unit) {
        (true, Some(unit)) => ::metrics::describe_histogram!(name, unit, description),
        (true, None) => ::metrics::describe_histogram!(name, description),
        (false, Some(unit)) => ::metrics::describe_counter!(name, unit, description),
        (false, None) => ::metrics::describe_counter!(name, description),
    }
}

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Install the Prometheus recorder. Later calls reuse the first handle.
pub fn init() -> Result<PrometheusHandle> {
    if let Some(handle) = METRICS_HANDLE.get() {
        return Ok(handle.clone());
    }
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| IngestError::Config(format!("Failed to install Prometheus recorder: {}", e)))?;
    MetricName::all_metrics().for_each(describe);
    info!("Metrics system initialized");
    Ok(METRICS_HANDLE.get_or_init(|| handle).clone())
}

/// Current metrics in Prometheus text format, if the recorder is installed
pub fn render() -> Option<String> {
    METRICS_HANDLE.get().map(PrometheusHandle::render)
}

// ============================================================================
// Pipeline Metrics
// ============================================================================

pub mod pipeline {
    use super::MetricName;
    use crate::pipeline::processing::outcome::{BatchResult, BatchStatus};

    fn status_label(status: BatchStatus) -> &'static str {
        match status {
            BatchStatus::Success => "success",
            BatchStatus::SuccessWithWarnings => "success_with_warnings",
            BatchStatus::PartialFailure => "partial_failure",
            BatchStatus::Rejected => "rejected",
        }
    }

    /// Record everything a finished batch reports
    pub fn batch_processed(result: &BatchResult, rows: usize, duration_secs: f64) {
        let status = status_label(result.status());
        ::metrics::counter!(MetricName::BatchesProcessed.as_str(), "status" => status).increment(1);
        if result.fatal {
            ::metrics::counter!(MetricName::BatchesRejected.as_str()).increment(1);
        }
        ::metrics::histogram!(MetricName::BatchDuration.as_str()).record(duration_secs);
        ::metrics::histogram!(MetricName::BatchSize.as_str()).record(rows as f64);

        ::metrics::counter!(MetricName::ReadingsAccepted.as_str())
            .increment(result.accepted.len() as u64);
        ::metrics::counter!(MetricName::ReadingsDropped.as_str()).increment(result.stats.dropped as u64);
        ::metrics::counter!(MetricName::DstSplits.as_str()).increment(result.stats.dst_splits as u64);
        ::metrics::counter!(MetricName::CounterResets.as_str())
            .increment(result.stats.counter_resets as u64);
        ::metrics::counter!(MetricName::DiagnosticsEmitted.as_str(), "severity" => "warning")
            .increment(result.stats.warnings as u64);
        ::metrics::counter!(MetricName::DiagnosticsEmitted.as_str(), "severity" => "error")
            .increment(result.stats.errors as u64);
    }

    pub fn commit_success() {
        ::metrics::counter!(MetricName::StoreCommitsSuccess.as_str()).increment(1);
    }

    pub fn commit_error() {
        ::metrics::counter!(MetricName::StoreCommitsError.as_str()).increment(1);
    }
}
