//! Optional value and date limits applied after the continuity checks.

use crate::domain::CandidateReading;
use crate::pipeline::pipeline_config::{PipelineConfig, ReadingBounds};
use crate::pipeline::processing::continuity::Interval;
use crate::pipeline::processing::outcome::{ConfigSnapshot, Diagnostic, ReadingSnapshot, Verdict};
use crate::pipeline::state::PipelineState;

pub struct BoundsCheck {
    bounds: Option<ReadingBounds>,
    config: ConfigSnapshot,
}

impl BoundsCheck {
    pub fn new(config: &PipelineConfig) -> Self {
        Self {
            bounds: config.bounds.clone(),
            config: ConfigSnapshot::from(config),
        }
    }

    /// Drop a reading whose effective value or interval falls outside the
    /// configured limits
    pub fn check(
        &self,
        candidate: &CandidateReading,
        interval: Interval,
        value: f64,
        state: &PipelineState,
    ) -> Verdict<()> {
        let Some(bounds) = &self.bounds else {
            return Verdict::accept(());
        };

        let mut problems = Vec::new();
        if let Some(min) = bounds.min_value {
            if value < min {
                problems.push(format!("value {} is below the minimum of {}", value, min));
            }
        }
        if let Some(max) = bounds.max_value {
            if value > max {
                problems.push(format!("value {} is above the maximum of {}", value, max));
            }
        }
        if let Some(min) = bounds.min_date {
            if interval.start < min {
                problems.push(format!(
                    "start time {} is before the earliest allowed date {}",
                    interval.start.to_rfc3339(),
                    min.to_rfc3339()
                ));
            }
        }
        if let Some(max) = bounds.max_date {
            if interval.end > max {
                problems.push(format!(
                    "end time {} is after the latest allowed date {}",
                    interval.end.to_rfc3339(),
                    max.to_rfc3339()
                ));
            }
        }

        if problems.is_empty() {
            return Verdict::accept(());
        }
        let diagnostic = Diagnostic::error(candidate.index, problems.join("; "), &self.config)
            .with_current(ReadingSnapshot {
                value,
                start: Some(interval.start),
                end: interval.end,
            })
            .with_previous(state.previous_snapshot());
        Verdict::Drop(diagnostic)
    }
}
