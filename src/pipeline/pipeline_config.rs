use chrono::{DateTime, NaiveTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::error::{IngestError, Result};

/// Order in which the feed delivers its rows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeSort {
    #[default]
    Increasing,
    Decreasing,
}

/// How a run of repeated rows collapses into one logical reading
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicationMode {
    /// Keep the first row of each run and skip the others
    #[default]
    KeepFirst,
    /// Mean of the values in the run
    Average,
    /// Values are fractions of the interval and are added up
    Sum,
}

/// Optional value and date limits; a reading outside them is dropped
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReadingBounds {
    pub min_value: Option<f64>,
    pub max_value: Option<f64>,
    pub min_date: Option<DateTime<Utc>>,
    pub max_date: Option<DateTime<Utc>>,
}

/// Per-batch pipeline configuration, resolved by the meter layer and
/// consumed read-only by every stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub time_sort: TimeSort,
    /// Values are an ever-increasing counter rather than interval usage
    pub cumulative: bool,
    /// A counter drop inside the reset window is a physical reset
    pub cumulative_reset: bool,
    pub cumulative_reset_start: NaiveTime,
    pub cumulative_reset_end: NaiveTime,
    /// Largest tolerated idle time between consecutive readings
    pub length_gap_seconds: f64,
    /// Largest tolerated change in interval length between consecutive readings
    pub length_variation_seconds: f64,
    /// Number of consecutive raw rows that describe one interval
    pub duplications: u32,
    pub duplication_strategy: DuplicationMode,
    /// Rows carry only an end timestamp
    pub only_end_time: bool,
    /// Resolve wall-clock times in `timezone` and split across DST changes
    pub honor_dst: bool,
    /// IANA zone name of the meter
    pub timezone: Option<String>,
    pub bounds: Option<ReadingBounds>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            time_sort: TimeSort::Increasing,
            cumulative: false,
            cumulative_reset: false,
            cumulative_reset_start: NaiveTime::MIN,
            cumulative_reset_end: end_of_day(),
            length_gap_seconds: 0.0,
            length_variation_seconds: 0.0,
            duplications: 1,
            duplication_strategy: DuplicationMode::KeepFirst,
            only_end_time: false,
            honor_dst: false,
            timezone: None,
            bounds: None,
        }
    }
}

fn end_of_day() -> NaiveTime {
    NaiveTime::from_hms_micro_opt(23, 59, 59, 999_999).unwrap_or(NaiveTime::MIN)
}

impl PipelineConfig {
    /// Check the configuration and resolve the meter timezone.
    ///
    /// Returns the timezone to use for wall-clock resolution, which is only
    /// `Some` when `honor_dst` is set.
    pub fn validate(&self) -> Result<Option<Tz>> {
        if self.duplications == 0 {
            return Err(IngestError::Config(
                "duplications must be at least 1".to_string(),
            ));
        }
        check_tolerance("length_gap_seconds", self.length_gap_seconds)?;
        check_tolerance("length_variation_seconds", self.length_variation_seconds)?;

        if let Some(bounds) = &self.bounds {
            if let (Some(min), Some(max)) = (bounds.min_value, bounds.max_value) {
                if min > max {
                    return Err(IngestError::Config(format!(
                        "bounds.min_value {} is greater than bounds.max_value {}",
                        min, max
                    )));
                }
            }
            if let (Some(min), Some(max)) = (bounds.min_date, bounds.max_date) {
                if min > max {
                    return Err(IngestError::Config(format!(
                        "bounds.min_date {} is after bounds.max_date {}",
                        min, max
                    )));
                }
            }
        }

        if !self.honor_dst {
            return Ok(None);
        }
        let name = self.timezone.as_deref().ok_or_else(|| {
            IngestError::Config("honor_dst requires a meter timezone".to_string())
        })?;
        let tz = name.parse::<Tz>().map_err(|e| IngestError::InvalidTimezone {
            name: name.to_string(),
            reason: e.to_string(),
        })?;
        Ok(Some(tz))
    }
}

fn check_tolerance(name: &str, value: f64) -> Result<()> {
    if !value.is_finite() || value < 0.0 {
        return Err(IngestError::Config(format!(
            "{} must be a finite number >= 0, got {}",
            name, value
        )));
    }
    Ok(())
}
