//! Batch runner: folds every candidate of a batch through the stages in
//! order, threading one `PipelineState` and one `BatchOutcome`.

use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{debug, info, warn};

use crate::domain::{AcceptedReading, CandidateReading, MeterId, MeterSeed, RawRow};
use crate::error::Result;
use crate::pipeline::pipeline_config::PipelineConfig;
use crate::pipeline::processing::bounds::BoundsCheck;
use crate::pipeline::processing::continuity::{ContinuityValidator, MISSING_START_MESSAGE};
use crate::pipeline::processing::cumulative::{CumulativeEngine, FIRST_READING_MESSAGE};
use crate::pipeline::processing::dst::DstSplitter;
use crate::pipeline::processing::normalize::{InputNormalizer, LogicalRow};
use crate::pipeline::processing::outcome::{
    BatchOutcome, BatchResult, ConfigSnapshot, Diagnostic, ReadingSnapshot, Verdict,
};
use crate::pipeline::state::PipelineState;

/// The full ingest pipeline for one meter
pub struct Pipeline {
    meter_id: MeterId,
    config: ConfigSnapshot,
    normalizer: InputNormalizer,
    cumulative: CumulativeEngine,
    continuity: ContinuityValidator,
    bounds: BoundsCheck,
    dst: DstSplitter,
}

impl Pipeline {
    /// Validate `config` and build the stages for `meter_id`
    pub fn new(meter_id: MeterId, config: &PipelineConfig) -> Result<Self> {
        let timezone = config.validate()?;
        Ok(Self {
            meter_id,
            config: ConfigSnapshot::from(config),
            normalizer: InputNormalizer::new(config, timezone),
            cumulative: CumulativeEngine::new(config, timezone),
            continuity: ContinuityValidator::new(config),
            bounds: BoundsCheck::new(config),
            dst: DstSplitter::new(config, timezone),
        })
    }

    /// Run one batch, continuing from `seed` when the meter has history
    pub fn run(&self, rows: Vec<RawRow>, seed: Option<&MeterSeed>) -> BatchResult {
        let never = AtomicBool::new(false);
        self.run_interruptible(rows, seed, &never)
    }

    /// Run one batch, checking `interrupt` before each candidate. An
    /// interrupted batch is rejected as a whole.
    pub fn run_interruptible(
        &self,
        rows: Vec<RawRow>,
        seed: Option<&MeterSeed>,
        interrupt: &AtomicBool,
    ) -> BatchResult {
        let row_count = rows.len();
        let mut state = PipelineState::seeded(seed);
        let mut outcome = BatchOutcome::new(self.meter_id);

        for logical in self.normalizer.order(rows) {
            if interrupt.load(Ordering::Relaxed) {
                warn!(meter_id = self.meter_id, reading = logical.index, "batch interrupted");
                outcome.record(Diagnostic::fatal(
                    logical.index,
                    "batch was interrupted before every reading was processed",
                    &self.config,
                ));
                break;
            }
            outcome.candidate_seen();

            let Some(candidate) = settle(self.candidate(&logical), &mut outcome) else {
                if outcome.is_fatal() {
                    break;
                }
                continue;
            };

            if let Some(diagnostic) = self.prime(&candidate, &mut state) {
                outcome.record(diagnostic);
                continue;
            }

            self.process(&candidate, &mut state, &mut outcome);
        }

        let result = outcome.finish(state.checkpoint());
        info!(
            meter_id = self.meter_id,
            rows = row_count,
            candidates = result.stats.candidates,
            accepted = result.stats.accepted_readings,
            dropped = result.stats.dropped,
            warnings = result.stats.warnings,
            status = ?result.status(),
            "batch processed"
        );
        result
    }

    /// Parse a logical row; a row that cannot be read voids the batch
    fn candidate(&self, logical: &LogicalRow) -> Verdict<CandidateReading> {
        match self.normalizer.parse(logical) {
            Ok(candidate) => Verdict::accept(candidate),
            Err(failure) => Verdict::Abort(
                Diagnostic::fatal(
                    failure.index,
                    format!("input row {} could not be read: {}", failure.source_row, failure.reason),
                    &self.config,
                )
                .with_raw(failure.row),
            ),
        }
    }

    /// Drop a first reading that has nothing to be compared against, keeping
    /// it as the anchor for the next one
    fn prime(&self, candidate: &CandidateReading, state: &mut PipelineState) -> Option<Diagnostic> {
        let mut reasons = Vec::new();
        if self.cumulative.needs_priming(state) {
            reasons.push(FIRST_READING_MESSAGE);
        }
        if self.continuity.needs_priming(state) {
            reasons.push(MISSING_START_MESSAGE);
        }
        if reasons.is_empty() {
            return None;
        }

        debug!(reading = candidate.index, "priming anchor from first reading");
        let diagnostic = Diagnostic::error(candidate.index, reasons.join("; "), &self.config)
            .with_current(ReadingSnapshot::of_candidate(candidate))
            .with_previous(state.previous_snapshot());
        state.prime(candidate, self.cumulative.is_enabled());
        Some(diagnostic)
    }

    fn process(&self, candidate: &CandidateReading, state: &mut PipelineState, outcome: &mut BatchOutcome) {
        let Some(converted) = settle(self.cumulative.apply(candidate, state), outcome) else {
            return;
        };
        let Some(interval) = settle(self.continuity.check(candidate, state), outcome) else {
            return;
        };
        let Some(()) = settle(
            self.bounds.check(candidate, interval, converted.value, state),
            outcome,
        ) else {
            return;
        };
        let Some(pieces) = settle(
            self.dst.split(candidate, interval, converted.value, state),
            outcome,
        ) else {
            return;
        };

        let readings: Vec<AcceptedReading> = pieces
            .into_iter()
            .map(|piece| AcceptedReading {
                meter_id: self.meter_id,
                value: piece.value,
                start: piece.interval.start,
                end: piece.interval.end,
            })
            .collect();
        if let Some(last) = readings.last() {
            state.advance(last, converted.raw);
        }
        if converted.reset {
            outcome.counter_reset();
        }
        outcome.accept(readings);
    }
}

/// Record whatever a stage reported and pass the accepted value on
fn settle<T>(verdict: Verdict<T>, outcome: &mut BatchOutcome) -> Option<T> {
    match verdict {
        Verdict::Accept { value, warning } => {
            outcome.record_warning(warning);
            Some(value)
        }
        Verdict::Drop(diagnostic) | Verdict::Abort(diagnostic) => {
            outcome.record(diagnostic);
            None
        }
    }
}
