//! DST boundary handling: splits readings across spring-forward transitions
//! and resolves readings that touch the hour repeated at fall-back.

pub mod transition;

use chrono::NaiveDateTime;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::CandidateReading;
use crate::pipeline::pipeline_config::PipelineConfig;
use crate::pipeline::processing::continuity::Interval;
use crate::pipeline::processing::outcome::{ConfigSnapshot, Diagnostic, ReadingSnapshot, Verdict};
use crate::pipeline::state::PipelineState;

use transition::{find_transition, repeated_window, resolve_wall_clock, wall_clock_of, WallClock};

/// Part of a reading after DST handling
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReadingPiece {
    pub interval: Interval,
    pub value: f64,
}

impl ReadingPiece {
    fn describe(&self) -> String {
        format!(
            "{} to {} with value {}",
            self.interval.start.to_rfc3339(),
            self.interval.end.to_rfc3339(),
            self.value
        )
    }
}

pub struct DstSplitter {
    /// Meter zone; `None` disables the stage
    timezone: Option<Tz>,
    config: ConfigSnapshot,
}

impl DstSplitter {
    /// `timezone` is the resolved meter zone, given only when DST is honored
    pub fn new(config: &PipelineConfig, timezone: Option<Tz>) -> Self {
        Self {
            timezone: if config.honor_dst { timezone } else { None },
            config: ConfigSnapshot::from(config),
        }
    }

    /// Turn one validated interval into the readings to store. The last piece
    /// is the new anchor.
    pub fn split(
        &self,
        candidate: &CandidateReading,
        interval: Interval,
        value: f64,
        state: &PipelineState,
    ) -> Verdict<Vec<ReadingPiece>> {
        let whole = ReadingPiece { interval, value };
        let Some(tz) = &self.timezone else {
            return Verdict::accept(vec![whole]);
        };

        let wall_start = candidate
            .start_local
            .unwrap_or_else(|| wall_clock_of(tz, interval.start));
        let wall_end = candidate
            .end_local
            .unwrap_or_else(|| wall_clock_of(tz, interval.end));

        if let Some(start_local) = wall_clock_start(candidate, tz, interval) {
            if let WallClock::Repeated { earliest, latest } = resolve_wall_clock(tz, start_local) {
                if let Some(window) = repeated_window(tz, earliest, latest) {
                    return self.resolve_repeated_start(
                        candidate, whole, start_local, wall_end, window, state,
                    );
                }
            }
        }

        let nominal = seconds(wall_end - wall_start);
        let real = interval.duration_seconds();
        if nominal > real {
            self.split_spring_forward(candidate, whole, tz, state)
        } else if nominal < real {
            let warning = self.warning(
                candidate,
                whole,
                state,
                format!(
                    "reading spans a DST fall-back transition; its real length of {} seconds \
                     is longer than its wall-clock length of {} seconds and it was kept whole",
                    real, nominal
                ),
            );
            Verdict::accept_with(vec![whole], Some(warning))
        } else {
            Verdict::accept(vec![whole])
        }
    }

    fn split_spring_forward(
        &self,
        candidate: &CandidateReading,
        whole: ReadingPiece,
        tz: &Tz,
        state: &PipelineState,
    ) -> Verdict<Vec<ReadingPiece>> {
        let interval = whole.interval;
        let pieces = match find_transition(tz, interval.start, interval.end) {
            Some(at) => {
                let total = interval.duration_seconds();
                [
                    Interval {
                        start: interval.start,
                        end: at,
                    },
                    Interval {
                        start: at,
                        end: interval.end,
                    },
                ]
                .into_iter()
                .filter(|piece| piece.end > piece.start)
                .map(|piece| ReadingPiece {
                    value: whole.value * piece.duration_seconds() / total,
                    interval: piece,
                })
                .collect::<Vec<_>>()
            }
            None => vec![whole],
        };
        debug!(
            reading = candidate.index,
            pieces = pieces.len(),
            "reading crosses spring-forward transition"
        );

        let described: Vec<String> = pieces.iter().map(ReadingPiece::describe).collect();
        let warning = self.warning(
            candidate,
            whole,
            state,
            format!(
                "reading crosses a DST spring-forward transition; {} was stored as {} reading(s): {}",
                whole.describe(),
                pieces.len(),
                described.join(", ")
            ),
        );
        Verdict::accept_with(pieces, Some(warning))
    }

    fn resolve_repeated_start(
        &self,
        candidate: &CandidateReading,
        whole: ReadingPiece,
        start_local: NaiveDateTime,
        wall_end: NaiveDateTime,
        window: transition::RepeatedWindow,
        state: &PipelineState,
    ) -> Verdict<Vec<ReadingPiece>> {
        if wall_end <= window.wall_end {
            let diagnostic = Diagnostic::error(
                candidate.index,
                format!(
                    "reading is entirely within DST shift, reading lost: wall-clock {} to {} lies inside \
                     the repeated hour {} to {}",
                    start_local, wall_end, window.wall_start, window.wall_end
                ),
                &self.config,
            )
            .with_current(snapshot(whole))
            .with_previous(state.previous_snapshot());
            return Verdict::Drop(diagnostic);
        }

        let nominal = seconds(wall_end - start_local);
        let kept = seconds(wall_end - window.wall_end);
        let ratio = if nominal > 0.0 { kept / nominal } else { 1.0 };
        let piece = ReadingPiece {
            interval: Interval {
                start: window.reopens_at,
                end: whole.interval.end,
            },
            value: whole.value * ratio,
        };
        if piece.interval.end <= piece.interval.start {
            let diagnostic = Diagnostic::error(
                candidate.index,
                "reading is entirely within DST shift, reading lost: nothing remains after the repeated hour",
                &self.config,
            )
            .with_current(snapshot(whole))
            .with_previous(state.previous_snapshot());
            return Verdict::Drop(diagnostic);
        }

        let warning = self.warning(
            candidate,
            whole,
            state,
            format!(
                "reading starts inside the hour repeated by a DST fall-back ({} to {}); \
                 the part inside it was removed and the value prorated by {}: stored as {}",
                window.wall_start,
                window.wall_end,
                ratio,
                piece.describe()
            ),
        );
        Verdict::accept_with(vec![piece], Some(warning))
    }

    fn warning(
        &self,
        candidate: &CandidateReading,
        whole: ReadingPiece,
        state: &PipelineState,
        message: String,
    ) -> Diagnostic {
        Diagnostic::warning(candidate.index, message, &self.config)
            .with_current(snapshot(whole))
            .with_previous(state.previous_snapshot())
    }
}

/// Wall-clock start of a reading given in wall-clock time. End-only readings
/// borrow the anchor's end, which was resolved to its earliest instant.
fn wall_clock_start(candidate: &CandidateReading, tz: &Tz, interval: Interval) -> Option<NaiveDateTime> {
    match (candidate.start_local, candidate.start, candidate.end_local) {
        (Some(start_local), _, _) => Some(start_local),
        (None, None, Some(_)) => Some(wall_clock_of(tz, interval.start)),
        _ => None,
    }
}

fn snapshot(piece: ReadingPiece) -> ReadingSnapshot {
    ReadingSnapshot {
        value: piece.value,
        start: Some(piece.interval.start),
        end: piece.interval.end,
    }
}

fn seconds(delta: chrono::Duration) -> f64 {
    delta.num_milliseconds() as f64 / 1000.0
}
