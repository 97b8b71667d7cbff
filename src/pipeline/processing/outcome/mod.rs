//! Batch outcome aggregation: collects diagnostics in candidate order,
//! decides between per-reading drop and whole-batch rejection, and produces
//! the committable reading set.

pub mod diagnostic;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::domain::{AcceptedReading, MeterId, MeterSeed};

pub use diagnostic::{ConfigSnapshot, Diagnostic, ReadingSnapshot, Severity};

/// Result of running one stage on one candidate
#[derive(Debug, Clone, PartialEq)]
pub enum Verdict<T> {
    /// Candidate proceeds, possibly with a warning attached
    Accept { value: T, warning: Option<Diagnostic> },
    /// Candidate is dropped, batch continues
    Drop(Diagnostic),
    /// Whole batch is voided
    Abort(Diagnostic),
}

impl<T> Verdict<T> {
    pub fn accept(value: T) -> Self {
        Verdict::Accept {
            value,
            warning: None,
        }
    }

    pub fn accept_with(value: T, warning: Option<Diagnostic>) -> Self {
        Verdict::Accept { value, warning }
    }
}

/// Caller-visible status of a batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BatchStatus {
    Success,
    SuccessWithWarnings,
    /// Some readings were dropped; the accepted subset is still stored
    PartialFailure,
    /// Fatal input problem; nothing is stored
    Rejected,
}

impl BatchStatus {
    pub fn is_success(self) -> bool {
        matches!(self, BatchStatus::Success | BatchStatus::SuccessWithWarnings)
    }
}

/// Counters for a processed batch
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchStats {
    /// Logical candidates examined (after deduplication)
    pub candidates: usize,
    /// Readings produced, counting each DST piece separately
    pub accepted_readings: usize,
    pub dropped: usize,
    pub warnings: usize,
    pub errors: usize,
    /// Candidates that were split into more than one reading
    pub dst_splits: usize,
    /// Accepted cumulative readings whose counter had reset
    pub counter_resets: usize,
}

impl BatchStats {
    /// Share of candidates that were not dropped, as a percentage
    pub fn acceptance_rate(&self) -> f64 {
        if self.candidates == 0 {
            return 0.0;
        }
        (self.candidates - self.dropped) as f64 / self.candidates as f64 * 100.0
    }
}

/// Everything the caller needs after a batch run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchResult {
    pub meter_id: MeterId,
    pub accepted: Vec<AcceptedReading>,
    pub diagnostics: Vec<Diagnostic>,
    pub fatal: bool,
    /// State to persist for the next batch; `None` when the batch was fatal
    pub checkpoint: Option<MeterSeed>,
    pub stats: BatchStats,
}

impl BatchResult {
    pub fn status(&self) -> BatchStatus {
        if self.fatal {
            BatchStatus::Rejected
        } else if self.diagnostics.iter().any(Diagnostic::is_error) {
            BatchStatus::PartialFailure
        } else if self.diagnostics.is_empty() {
            BatchStatus::Success
        } else {
            BatchStatus::SuccessWithWarnings
        }
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == Severity::Warning)
    }

    pub fn errors(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter().filter(|d| d.is_error())
    }

    /// Human-readable report of the whole batch
    pub fn render_report(&self) -> String {
        let mut report = format!(
            "Meter {}: {:?} - {} candidate(s), {} reading(s) accepted, {} dropped ({:.1}% kept), {} warning(s), {} error(s)\n",
            self.meter_id,
            self.status(),
            self.stats.candidates,
            self.accepted.len(),
            self.stats.dropped,
            self.stats.acceptance_rate(),
            self.stats.warnings,
            self.stats.errors
        );
        if self.fatal {
            report.push_str("The batch was rejected; no readings were stored.\n");
        }
        for diagnostic in &self.diagnostics {
            report.push_str(&diagnostic.to_string());
            report.push('\n');
        }
        report
    }
}

/// Accumulates the outcome of a batch while candidates are processed
#[derive(Debug)]
pub struct BatchOutcome {
    meter_id: MeterId,
    accepted: Vec<AcceptedReading>,
    diagnostics: Vec<Diagnostic>,
    stats: BatchStats,
    fatal: bool,
}

impl BatchOutcome {
    pub fn new(meter_id: MeterId) -> Self {
        Self {
            meter_id,
            accepted: Vec::new(),
            diagnostics: Vec::new(),
            stats: BatchStats::default(),
            fatal: false,
        }
    }

    pub fn candidate_seen(&mut self) {
        self.stats.candidates += 1;
    }

    /// Record a diagnostic, routing it by severity
    pub fn record(&mut self, diagnostic: Diagnostic) {
        match diagnostic.severity {
            Severity::Warning => self.stats.warnings += 1,
            Severity::Error => {
                self.stats.errors += 1;
                self.stats.dropped += 1;
            }
            Severity::Fatal => {
                self.stats.errors += 1;
                self.fatal = true;
            }
        }
        debug!(
            reading = diagnostic.reading_index,
            severity = %diagnostic.severity,
            "{}",
            diagnostic.message
        );
        self.diagnostics.push(diagnostic);
    }

    /// Record an optional warning attached to an accepted verdict
    pub fn record_warning(&mut self, warning: Option<Diagnostic>) {
        if let Some(warning) = warning {
            self.record(warning);
        }
    }

    /// Add the readings produced from one candidate
    pub fn accept(&mut self, readings: Vec<AcceptedReading>) {
        if readings.len() > 1 {
            self.stats.dst_splits += 1;
        }
        self.stats.accepted_readings += readings.len();
        self.accepted.extend(readings);
    }

    pub fn counter_reset(&mut self) {
        self.stats.counter_resets += 1;
    }

    pub fn is_fatal(&self) -> bool {
        self.fatal
    }

    pub fn finish(self, checkpoint: Option<MeterSeed>) -> BatchResult {
        if self.fatal {
            warn!(
                meter_id = self.meter_id,
                discarded = self.accepted.len(),
                "batch rejected, discarding accepted readings"
            );
            let stats = BatchStats {
                accepted_readings: 0,
                ..self.stats
            };
            return BatchResult {
                meter_id: self.meter_id,
                accepted: Vec::new(),
                diagnostics: self.diagnostics,
                fatal: true,
                checkpoint: None,
                stats,
            };
        }
        BatchResult {
            meter_id: self.meter_id,
            accepted: self.accepted,
            diagnostics: self.diagnostics,
            fatal: false,
            checkpoint,
            stats: self.stats,
        }
    }
}
