//! Cumulative engine: turns ever-increasing counter values into interval
//! usage, recognising counter resets inside the configured daily window.

pub mod reset_window;

use chrono::{DateTime, NaiveDateTime, Utc};
use chrono_tz::Tz;
use tracing::debug;

use crate::domain::CandidateReading;
use crate::pipeline::pipeline_config::PipelineConfig;
use crate::pipeline::processing::dst::transition::wall_clock_of;
use crate::pipeline::processing::outcome::{ConfigSnapshot, Diagnostic, ReadingSnapshot, Verdict};
use crate::pipeline::state::PipelineState;

use reset_window::ResetWindow;

pub const FIRST_READING_MESSAGE: &str =
    "first reading must be dropped for cumulative data since there is no previous value to subtract";

/// Effective value produced for one candidate
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CumulativeValue {
    /// Usage over the candidate's interval
    pub value: f64,
    /// Counter value to remember if the candidate is accepted; `None` for
    /// non-cumulative meters
    pub raw: Option<f64>,
    /// The counter was treated as reset
    pub reset: bool,
}

pub struct CumulativeEngine {
    enabled: bool,
    reset_enabled: bool,
    window: ResetWindow,
    timezone: Option<Tz>,
    config: ConfigSnapshot,
}

impl CumulativeEngine {
    pub fn new(config: &PipelineConfig, timezone: Option<Tz>) -> Self {
        Self {
            enabled: config.cumulative,
            reset_enabled: config.cumulative_reset,
            window: ResetWindow::new(config.cumulative_reset_start, config.cumulative_reset_end),
            timezone,
            config: ConfigSnapshot::from(config),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// The run has no counter value to subtract from yet
    pub fn needs_priming(&self, state: &PipelineState) -> bool {
        self.enabled && state.last_raw_cumulative().is_none()
    }

    /// Convert the candidate's raw value into interval usage
    pub fn apply(&self, candidate: &CandidateReading, state: &PipelineState) -> Verdict<CumulativeValue> {
        if !self.enabled {
            return Verdict::accept(CumulativeValue {
                value: candidate.value,
                raw: None,
                reset: false,
            });
        }
        let Some(previous_raw) = state.last_raw_cumulative() else {
            return Verdict::Drop(self.error(candidate, state, FIRST_READING_MESSAGE.to_string()));
        };

        let raw = candidate.value;
        let delta = raw - previous_raw;
        if delta >= 0.0 {
            return Verdict::accept(CumulativeValue {
                value: delta,
                raw: Some(raw),
                reset: false,
            });
        }

        let start = candidate.start.or_else(|| state.anchor_end()).unwrap_or(candidate.end);
        if candidate.end <= start {
            // The continuity check drops this candidate for its interval
            return Verdict::accept(CumulativeValue {
                value: delta,
                raw: Some(raw),
                reset: false,
            });
        }
        if self.reset_enabled && self.window.intersects(self.wall(start), self.wall(candidate.end)) {
            if raw < 0.0 {
                return Verdict::Drop(self.error(
                    candidate,
                    state,
                    format!(
                        "negative value detected even after reset: cumulative value {} is below zero",
                        raw
                    ),
                ));
            }
            debug!(
                reading = candidate.index,
                previous = previous_raw,
                raw,
                "cumulative counter reset inside reset window"
            );
            return Verdict::accept(CumulativeValue {
                value: raw,
                raw: Some(raw),
                reset: true,
            });
        }

        Verdict::Drop(self.error(
            candidate,
            state,
            format!(
                "negative value detected; reset disabled or reading outside reset window: \
                 cumulative value {} is less than the previous value {}",
                raw, previous_raw
            ),
        ))
    }

    fn wall(&self, instant: DateTime<Utc>) -> NaiveDateTime {
        match &self.timezone {
            Some(tz) => wall_clock_of(tz, instant),
            None => instant.naive_utc(),
        }
    }

    fn error(&self, candidate: &CandidateReading, state: &PipelineState, message: String) -> Diagnostic {
        Diagnostic::error(candidate.index, message, &self.config)
            .with_current(ReadingSnapshot::of_candidate(candidate))
            .with_previous(state.previous_snapshot())
    }
}
