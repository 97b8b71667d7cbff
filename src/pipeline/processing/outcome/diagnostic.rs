use std::fmt;

use chrono::{DateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{CandidateReading, RawRow};
use crate::pipeline::pipeline_config::PipelineConfig;

/// Severity of a diagnostic
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Severity {
    /// Reading kept, anomaly recorded
    Warning,
    /// Reading dropped, batch continues
    Error,
    /// Batch voided, nothing is stored
    Fatal,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Severity::Warning => "Warning",
            Severity::Error => "Error",
            Severity::Fatal => "Fatal",
        };
        f.write_str(label)
    }
}

/// Value and interval of a reading at the time a diagnostic was raised
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadingSnapshot {
    pub value: f64,
    pub start: Option<DateTime<Utc>>,
    pub end: DateTime<Utc>,
}

impl ReadingSnapshot {
    pub fn of_candidate(candidate: &CandidateReading) -> Self {
        Self {
            value: candidate.value,
            start: candidate.start,
            end: candidate.end,
        }
    }
}

impl fmt::Display for ReadingSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.start {
            Some(start) => write!(
                f,
                "value {} from {} to {}",
                self.value,
                start.to_rfc3339(),
                self.end.to_rfc3339()
            ),
            None => write!(
                f,
                "value {} from (unknown) to {}",
                self.value,
                self.end.to_rfc3339()
            ),
        }
    }
}

/// The config values an operator needs to audit a decision
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigSnapshot {
    pub cumulative: bool,
    pub cumulative_reset: bool,
    pub cumulative_reset_start: NaiveTime,
    pub cumulative_reset_end: NaiveTime,
    pub length_gap_seconds: f64,
    pub length_variation_seconds: f64,
    pub only_end_time: bool,
    pub honor_dst: bool,
}

impl From<&PipelineConfig> for ConfigSnapshot {
    fn from(config: &PipelineConfig) -> Self {
        Self {
            cumulative: config.cumulative,
            cumulative_reset: config.cumulative_reset,
            cumulative_reset_start: config.cumulative_reset_start,
            cumulative_reset_end: config.cumulative_reset_end,
            length_gap_seconds: config.length_gap_seconds,
            length_variation_seconds: config.length_variation_seconds,
            only_end_time: config.only_end_time,
            honor_dst: config.honor_dst,
        }
    }
}

impl fmt::Display for ConfigSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "cumulative={}, cumulativeReset={}, cumulativeResetStart={}, cumulativeResetEnd={}, \
             lengthGap={}, lengthVariation={}, onlyEndTime={}, honorDst={}",
            self.cumulative,
            self.cumulative_reset,
            self.cumulative_reset_start,
            self.cumulative_reset_end,
            self.length_gap_seconds,
            self.length_variation_seconds,
            self.only_end_time,
            self.honor_dst
        )
    }
}

/// A problem found while processing one candidate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    /// 1-based logical position of the candidate
    pub reading_index: usize,
    pub severity: Severity,
    pub message: String,
    pub current: Option<ReadingSnapshot>,
    pub previous: Option<ReadingSnapshot>,
    /// Offending input row, set for parse failures
    pub raw: Option<RawRow>,
    pub config: ConfigSnapshot,
}

impl Diagnostic {
    pub fn new(
        severity: Severity,
        reading_index: usize,
        message: impl Into<String>,
        config: &ConfigSnapshot,
    ) -> Self {
        Self {
            reading_index,
            severity,
            message: message.into(),
            current: None,
            previous: None,
            raw: None,
            config: config.clone(),
        }
    }

    pub fn warning(reading_index: usize, message: impl Into<String>, config: &ConfigSnapshot) -> Self {
        Self::new(Severity::Warning, reading_index, message, config)
    }

    pub fn error(reading_index: usize, message: impl Into<String>, config: &ConfigSnapshot) -> Self {
        Self::new(Severity::Error, reading_index, message, config)
    }

    pub fn fatal(reading_index: usize, message: impl Into<String>, config: &ConfigSnapshot) -> Self {
        Self::new(Severity::Fatal, reading_index, message, config)
    }

    pub fn with_current(mut self, snapshot: ReadingSnapshot) -> Self {
        self.current = Some(snapshot);
        self
    }

    pub fn with_previous(mut self, snapshot: Option<ReadingSnapshot>) -> Self {
        self.previous = snapshot;
        self
    }

    pub fn with_raw(mut self, raw: RawRow) -> Self {
        self.raw = Some(raw);
        self
    }

    pub fn is_error(&self) -> bool {
        self.severity >= Severity::Error
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{} for reading #{}: {}",
            self.severity, self.reading_index, self.message
        )?;
        if let Some(raw) = &self.raw {
            writeln!(
                f,
                "  raw row: value '{}', start '{}', end '{}'",
                raw.value,
                raw.start.as_deref().unwrap_or(""),
                raw.end
            )?;
        }
        if let Some(current) = &self.current {
            writeln!(f, "  this reading: {}", current)?;
        }
        match &self.previous {
            Some(previous) => writeln!(f, "  previous reading: {}", previous)?,
            None => writeln!(f, "  previous reading: none")?,
        }
        write!(f, "  config: {}", self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_render_includes_readings_and_config() {
        let config = ConfigSnapshot::from(&PipelineConfig {
            length_gap_seconds: 60.0,
            ..Default::default()
        });
        let start = Utc.with_ymd_and_hms(2021, 6, 1, 0, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2021, 6, 2, 0, 0, 0).unwrap();
        let diagnostic = Diagnostic::warning(2, "gap too large", &config)
            .with_current(ReadingSnapshot {
                value: 4.5,
                start: Some(start),
                end,
            })
            .with_previous(Some(ReadingSnapshot {
                value: 3.0,
                start: None,
                end: start,
            }));

        let rendered = diagnostic.to_string();
        assert!(rendered.starts_with("Warning for reading #2: gap too large"));
        assert!(rendered.contains("value 4.5 from 2021-06-01T00:00:00+00:00"));
        assert!(rendered.contains("value 3 from (unknown)"));
        assert!(rendered.contains("lengthGap=60"));
        assert!(rendered.contains("cumulativeResetEnd=23:59:59.999999"));
    }

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Fatal > Severity::Error);
        assert!(Severity::Error > Severity::Warning);
        let config = ConfigSnapshot::from(&PipelineConfig::default());
        assert!(!Diagnostic::warning(1, "w", &config).is_error());
        assert!(Diagnostic::fatal(1, "f", &config).is_error());
    }
}
