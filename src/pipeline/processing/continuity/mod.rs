//! Continuity and tolerance checks against the last accepted reading.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::CandidateReading;
use crate::pipeline::pipeline_config::PipelineConfig;
use crate::pipeline::processing::outcome::{ConfigSnapshot, Diagnostic, ReadingSnapshot, Verdict};
use crate::pipeline::state::PipelineState;

pub const MISSING_START_MESSAGE: &str =
    "first reading must be dropped when only end times are given since there is no previous end time to use as its start";

/// A resolved reading interval
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interval {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl Interval {
    pub fn duration_seconds(&self) -> f64 {
        seconds_between(self.start, self.end)
    }
}

fn seconds_between(from: DateTime<Utc>, to: DateTime<Utc>) -> f64 {
    (to - from).num_milliseconds() as f64 / 1000.0
}

pub struct ContinuityValidator {
    cumulative: bool,
    only_end_time: bool,
    length_gap_seconds: f64,
    length_variation_seconds: f64,
    config: ConfigSnapshot,
}

impl ContinuityValidator {
    pub fn new(config: &PipelineConfig) -> Self {
        Self {
            cumulative: config.cumulative,
            only_end_time: config.only_end_time,
            length_gap_seconds: config.length_gap_seconds,
            length_variation_seconds: config.length_variation_seconds,
            config: ConfigSnapshot::from(config),
        }
    }

    /// End-only rows need a previous end time before one can be accepted
    pub fn needs_priming(&self, state: &PipelineState) -> bool {
        self.only_end_time && state.anchor().is_none()
    }

    /// Resolve the candidate's interval and compare it with the anchor.
    ///
    /// Ordering, gap and variation findings are joined into one warning, in
    /// that order.
    pub fn check(&self, candidate: &CandidateReading, state: &PipelineState) -> Verdict<Interval> {
        let start = if self.only_end_time {
            state.anchor_end()
        } else {
            candidate.start
        };
        let Some(start) = start else {
            return Verdict::Drop(self.error(candidate, None, state, MISSING_START_MESSAGE.to_string()));
        };
        let interval = Interval {
            start,
            end: candidate.end,
        };

        if interval.end <= interval.start {
            let message = if self.only_end_time {
                "reading end time is not after the start time; the start time came from the previous reading's end time"
            } else {
                "reading end time is not after the start time"
            };
            return Verdict::Drop(self.error(candidate, Some(start), state, message.to_string()));
        }

        let Some(anchor) = state.anchor() else {
            return Verdict::accept(interval);
        };

        let mut findings = Vec::new();
        if interval.start < anchor.end {
            if self.cumulative {
                return Verdict::Drop(self.error(
                    candidate,
                    Some(start),
                    state,
                    "reading start time is before the previous reading's end time; \
                     cumulative usage cannot be computed over overlapping or out of order intervals"
                        .to_string(),
                ));
            }
            findings.push(
                "reading start time is before the previous reading's end time; \
                 readings may be out of order or overlapping"
                    .to_string(),
            );
        }

        let gap = seconds_between(anchor.end, interval.start);
        if gap > self.length_gap_seconds {
            findings.push(format!(
                "gap of {} seconds between the previous reading's end and this reading's start \
                 exceeds the allowed length gap of {} seconds",
                gap, self.length_gap_seconds
            ));
        }

        if let Some(previous_length) = anchor.duration_seconds() {
            let variation = (interval.duration_seconds() - previous_length).abs();
            if variation > self.length_variation_seconds {
                findings.push(format!(
                    "reading length of {} seconds differs from the previous reading's length of {} seconds \
                     by {} seconds, more than the allowed length variation of {} seconds",
                    interval.duration_seconds(),
                    previous_length,
                    variation,
                    self.length_variation_seconds
                ));
            }
        }

        if findings.is_empty() {
            return Verdict::accept(interval);
        }
        let warning = Diagnostic::warning(candidate.index, findings.join("; "), &self.config)
            .with_current(snapshot(candidate, Some(start)))
            .with_previous(state.previous_snapshot());
        Verdict::accept_with(interval, Some(warning))
    }

    fn error(
        &self,
        candidate: &CandidateReading,
        start: Option<DateTime<Utc>>,
        state: &PipelineState,
        message: String,
    ) -> Diagnostic {
        Diagnostic::error(candidate.index, message, &self.config)
            .with_current(snapshot(candidate, start.or(candidate.start)))
            .with_previous(state.previous_snapshot())
    }
}

fn snapshot(candidate: &CandidateReading, start: Option<DateTime<Utc>>) -> ReadingSnapshot {
    ReadingSnapshot {
        start,
        ..ReadingSnapshot::of_candidate(candidate)
    }
}
