//! Input normalization: puts rows in chronological order, collapses
//! repeated rows and parses the survivors into candidate readings.

pub mod duplication;
pub mod timestamp;

use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::domain::{CandidateReading, RawRow};
use crate::pipeline::pipeline_config::{PipelineConfig, TimeSort};

use duplication::{strategy_for, DuplicationStrategy};
use timestamp::{parse_timestamp, resolve};

/// One logical interval: a run of `duplications` raw rows
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogicalRow {
    /// 1-based position after ordering and collapsing
    pub index: usize,
    /// 1-based position of the run's first row in the feed
    pub source_row: usize,
    pub rows: Vec<RawRow>,
    /// 1-based feed position of each row in `rows`
    pub sources: Vec<usize>,
}

impl LogicalRow {
    /// Feed position of the row at `offset` within the run
    pub fn source_of(&self, offset: usize) -> usize {
        self.sources
            .get(offset)
            .copied()
            .unwrap_or(self.source_row + offset)
    }

    /// Row whose timestamps represent the run
    pub fn representative(&self) -> Option<&RawRow> {
        self.rows.first()
    }
}

/// Why a logical row could not become a candidate. Always fatal to the batch.
#[derive(Debug, Clone, PartialEq)]
pub struct ParseFailure {
    pub index: usize,
    /// 1-based feed position of the offending row
    pub source_row: usize,
    pub row: RawRow,
    pub reason: String,
}

/// Orders, deduplicates and parses raw rows
pub struct InputNormalizer {
    time_sort: TimeSort,
    duplications: usize,
    only_end_time: bool,
    timezone: Option<Tz>,
    strategy: Box<dyn DuplicationStrategy>,
}

impl InputNormalizer {
    /// `timezone` is the resolved meter zone, given only when DST is honored
    pub fn new(config: &PipelineConfig, timezone: Option<Tz>) -> Self {
        Self::with_strategy(config, timezone, strategy_for(config.duplication_strategy))
    }

    pub fn with_strategy(
        config: &PipelineConfig,
        timezone: Option<Tz>,
        strategy: Box<dyn DuplicationStrategy>,
    ) -> Self {
        Self {
            time_sort: config.time_sort,
            duplications: config.duplications.max(1) as usize,
            only_end_time: config.only_end_time,
            timezone,
            strategy,
        }
    }

    /// Put rows in chronological order, then group them into runs of
    /// `duplications`. A short run can only be the chronologically last one.
    pub fn order(&self, rows: Vec<RawRow>) -> Vec<LogicalRow> {
        let total = rows.len();
        if total % self.duplications != 0 {
            warn!(
                rows = total,
                duplications = self.duplications,
                "row count is not a multiple of duplications, last run is short"
            );
        }

        let mut positioned: Vec<(usize, RawRow)> =
            rows.into_iter().enumerate().map(|(at, row)| (at + 1, row)).collect();
        if self.time_sort == TimeSort::Decreasing {
            positioned.reverse();
        }

        let mut runs = Vec::with_capacity(total / self.duplications + 1);
        let mut iter = positioned.into_iter().peekable();
        while iter.peek().is_some() {
            let (sources, run): (Vec<usize>, Vec<RawRow>) =
                iter.by_ref().take(self.duplications).unzip();
            runs.push(LogicalRow {
                index: 0,
                source_row: sources[0],
                rows: run,
                sources,
            });
        }
        debug!(
            rows = total,
            logical = runs.len(),
            strategy = self.strategy.name(),
            "rows ordered"
        );
        for (position, run) in runs.iter_mut().enumerate() {
            run.index = position + 1;
        }
        runs
    }

    /// Parse a logical row into a candidate reading
    pub fn parse(&self, logical: &LogicalRow) -> Result<CandidateReading, ParseFailure> {
        let Some(first) = logical.representative() else {
            return Err(ParseFailure {
                index: logical.index,
                source_row: logical.source_row,
                row: RawRow::end_only("", ""),
                reason: "empty row group".to_string(),
            });
        };
        let failure = |offset: usize, row: &RawRow, reason: String| ParseFailure {
            index: logical.index,
            source_row: logical.source_of(offset),
            row: row.clone(),
            reason,
        };

        let consulted = self.strategy.rows_consulted(logical.rows.len());
        let mut values = Vec::with_capacity(consulted);
        for (offset, row) in logical.rows.iter().take(consulted).enumerate() {
            let value = parse_value(&row.value)
                .ok_or_else(|| failure(offset, row, format!("value '{}' is not a number", row.value)))?;
            values.push(value);
        }
        let value = self.strategy.combine(&values);

        let (end, end_local) = parse_instant(&first.end, self.timezone.as_ref())
            .ok_or_else(|| failure(0, first, format!("end timestamp '{}' is not a valid date/time", first.end)))?;

        let (start, start_local) = if self.only_end_time {
            (None, None)
        } else {
            let text = first.start.as_deref().ok_or_else(|| {
                failure(0, first, "start timestamp is missing".to_string())
            })?;
            let (start, local) = parse_instant(text, self.timezone.as_ref()).ok_or_else(|| {
                failure(0, first, format!("start timestamp '{}' is not a valid date/time", text))
            })?;
            (Some(start), local)
        };

        Ok(CandidateReading {
            index: logical.index,
            value,
            start,
            end,
            start_local,
            end_local,
        })
    }
}

fn parse_value(text: &str) -> Option<f64> {
    text.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

fn parse_instant(
    text: &str,
    timezone: Option<&Tz>,
) -> Option<(chrono::DateTime<chrono::Utc>, Option<chrono::NaiveDateTime>)> {
    parse_timestamp(text).map(|parsed| resolve(parsed, timezone))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::pipeline_config::DuplicationMode;
    use chrono::{TimeZone, Utc};

    fn row(value: &str, day: u32) -> RawRow {
        RawRow::new(
            value,
            format!("2021-06-{:02} 00:00:00", day),
            format!("2021-06-{:02} 00:00:00", day + 1),
        )
    }

    #[test]
    fn test_decreasing_feed_is_reversed() {
        let config = PipelineConfig {
            time_sort: TimeSort::Decreasing,
            ..Default::default()
        };
        let normalizer = InputNormalizer::new(&config, None);
        let ordered = normalizer.order(vec![row("3", 3), row("2", 2), row("1", 1)]);

        let values: Vec<_> = ordered.iter().map(|r| r.rows[0].value.as_str()).collect();
        assert_eq!(values, vec!["1", "2", "3"]);
        assert_eq!(ordered[0].index, 1);
        assert_eq!(ordered[0].source_row, 3);
    }

    #[test]
    fn test_decreasing_short_feed_groups_after_reversal() {
        let config = PipelineConfig {
            time_sort: TimeSort::Decreasing,
            duplications: 2,
            duplication_strategy: DuplicationMode::Average,
            ..Default::default()
        };
        let normalizer = InputNormalizer::new(&config, None);
        let ordered = normalizer.order(vec![
            row("3", 3),
            row("2", 2),
            row("2", 2),
            row("1", 1),
            row("1", 1),
        ]);
        assert_eq!(ordered.len(), 3);
        let values: Vec<f64> = ordered
            .iter()
            .map(|run| normalizer.parse(run).unwrap().value)
            .collect();
        assert_eq!(values, vec![1.0, 2.0, 3.0]);
        assert_eq!(ordered[0].sources, vec![5, 4]);
        assert_eq!(ordered[2].rows.len(), 1);
        assert_eq!(ordered[2].source_row, 1);
    }

    #[test]
    fn test_runs_collapse_to_first_row() {
        let config = PipelineConfig {
            duplications: 2,
            ..Default::default()
        };
        let normalizer = InputNormalizer::new(&config, None);
        let ordered = normalizer.order(vec![
            row("1", 1),
            row("not-read", 1),
            row("2", 2),
            row("2", 2),
            row("3", 3),
        ]);
        assert_eq!(ordered.len(), 3);
        assert_eq!(ordered[1].source_row, 3);
        assert_eq!(ordered[2].rows.len(), 1);

        let first = normalizer.parse(&ordered[0]).unwrap();
        assert_eq!(first.value, 1.0);
        assert_eq!(first.index, 1);
    }

    #[test]
    fn test_average_strategy_reads_every_row() {
        let config = PipelineConfig {
            duplications: 2,
            duplication_strategy: DuplicationMode::Average,
            ..Default::default()
        };
        let normalizer = InputNormalizer::new(&config, None);
        let ordered = normalizer.order(vec![row("1", 1), row("3", 1), row("2", 2), row("x", 2)]);
        assert_eq!(normalizer.parse(&ordered[0]).unwrap().value, 2.0);

        let failure = normalizer.parse(&ordered[1]).unwrap_err();
        assert_eq!(failure.source_row, 4);
        assert_eq!(failure.index, 2);
        assert!(failure.reason.contains("'x'"));
    }

    #[test]
    fn test_parse_resolves_utc_instants() {
        let normalizer = InputNormalizer::new(&PipelineConfig::default(), None);
        let ordered = normalizer.order(vec![row(" 12.5 ", 1)]);
        let candidate = normalizer.parse(&ordered[0]).unwrap();
        assert_eq!(candidate.value, 12.5);
        assert_eq!(candidate.start, Some(Utc.with_ymd_and_hms(2021, 6, 1, 0, 0, 0).unwrap()));
        assert_eq!(candidate.end, Utc.with_ymd_and_hms(2021, 6, 2, 0, 0, 0).unwrap());
        assert!(candidate.start_local.is_none());
    }

    #[test]
    fn test_bad_timestamp_and_value_are_failures() {
        let normalizer = InputNormalizer::new(&PipelineConfig::default(), None);
        let bad_end = LogicalRow {
            index: 1,
            source_row: 1,
            rows: vec![RawRow::new("1", "2021-06-01 00:00:00", "soon")],
            sources: vec![1],
        };
        assert!(normalizer.parse(&bad_end).unwrap_err().reason.contains("end timestamp"));

        let bad_value = LogicalRow {
            index: 1,
            source_row: 1,
            rows: vec![row("NaN", 1)],
            sources: vec![1],
        };
        assert!(normalizer.parse(&bad_value).is_err());

        let missing_start = LogicalRow {
            index: 1,
            source_row: 1,
            rows: vec![RawRow::end_only("1", "2021-06-01 00:00:00")],
            sources: vec![1],
        };
        assert!(normalizer
            .parse(&missing_start)
            .unwrap_err()
            .reason
            .contains("missing"));
    }

    #[test]
    fn test_end_only_rows_have_no_start() {
        let config = PipelineConfig {
            only_end_time: true,
            ..Default::default()
        };
        let normalizer = InputNormalizer::new(&config, None);
        let ordered = normalizer.order(vec![RawRow::end_only("5", "2021-06-02 00:00:00")]);
        let candidate = normalizer.parse(&ordered[0]).unwrap();
        assert!(candidate.start.is_none());
    }
}
