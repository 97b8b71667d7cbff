use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{AcceptedReading, CandidateReading, MeterSeed};
use crate::pipeline::processing::outcome::ReadingSnapshot;

/// The reading subsequent candidates are compared against
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Anchor {
    pub value: f64,
    pub start: Option<DateTime<Utc>>,
    pub end: DateTime<Utc>,
}

impl Anchor {
    /// Interval length in seconds, when the start is known
    pub fn duration_seconds(&self) -> Option<f64> {
        self.start
            .map(|start| (self.end - start).num_milliseconds() as f64 / 1000.0)
    }

    pub fn snapshot(&self) -> ReadingSnapshot {
        ReadingSnapshot {
            value: self.value,
            start: self.start,
            end: self.end,
        }
    }
}

/// Mutable state of one batch run. Owned by the run and threaded through
/// every stage by reference.
#[derive(Debug, Clone, Default)]
pub struct PipelineState {
    anchor: Option<Anchor>,
    last_raw_cumulative: Option<f64>,
}

impl PipelineState {
    /// State for a meter's first batch
    pub fn fresh() -> Self {
        Self::default()
    }

    /// State continuing from a persisted checkpoint, if any. The seeded
    /// anchor is a zero-valued reading carrying the stored times.
    pub fn seeded(seed: Option<&MeterSeed>) -> Self {
        match seed {
            Some(seed) => Self {
                anchor: Some(Anchor {
                    value: 0.0,
                    start: seed.last_start,
                    end: seed.last_end,
                }),
                last_raw_cumulative: seed.last_raw_cumulative,
            },
            None => Self::fresh(),
        }
    }

    pub fn anchor(&self) -> Option<&Anchor> {
        self.anchor.as_ref()
    }

    pub fn anchor_end(&self) -> Option<DateTime<Utc>> {
        self.anchor.as_ref().map(|anchor| anchor.end)
    }

    pub fn previous_snapshot(&self) -> Option<ReadingSnapshot> {
        self.anchor.as_ref().map(Anchor::snapshot)
    }

    pub fn last_raw_cumulative(&self) -> Option<f64> {
        self.last_raw_cumulative
    }

    /// Seed the run from a first reading that is dropped because it has no
    /// usable predecessor
    pub fn prime(&mut self, candidate: &CandidateReading, cumulative: bool) {
        self.anchor = Some(Anchor {
            value: candidate.value,
            start: candidate.start,
            end: candidate.end,
        });
        if cumulative {
            self.last_raw_cumulative = Some(candidate.value);
        }
    }

    /// Move the anchor to a fully accepted reading. `raw_cumulative` is the
    /// counter value that produced it, when the meter is cumulative.
    pub fn advance(&mut self, reading: &AcceptedReading, raw_cumulative: Option<f64>) {
        self.anchor = Some(Anchor {
            value: reading.value,
            start: Some(reading.start),
            end: reading.end,
        });
        if raw_cumulative.is_some() {
            self.last_raw_cumulative = raw_cumulative;
        }
    }

    /// Checkpoint to persist after the run
    pub fn checkpoint(&self) -> Option<MeterSeed> {
        self.anchor.as_ref().map(|anchor| MeterSeed {
            last_start: anchor.start,
            last_end: anchor.end,
            last_raw_cumulative: self.last_raw_cumulative,
        })
    }
}
