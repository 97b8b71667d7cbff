use std::fs;
use std::path::Path;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::Result;

/// Identifier of the meter a batch belongs to
pub type MeterId = i64;

/// One decoded input record as delivered by the upstream decoder
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawRow {
    /// Reading value, still as text. Row files may also give a JSON number.
    #[serde(deserialize_with = "value_text")]
    pub value: String,
    /// Start timestamp; absent for end-only feeds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<String>,
    /// End timestamp
    pub end: String,
}

impl RawRow {
    pub fn new(value: impl Into<String>, start: impl Into<String>, end: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            start: Some(start.into()),
            end: end.into(),
        }
    }

    /// Row for feeds that only report the end of each interval
    pub fn end_only(value: impl Into<String>, end: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            start: None,
            end: end.into(),
        }
    }
}

fn value_text<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Value {
        Text(String),
        Number(f64),
    }

    Ok(match Value::deserialize(deserializer)? {
        Value::Text(text) => text,
        Value::Number(number) => number.to_string(),
    })
}

/// A parsed reading that has not yet passed validation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateReading {
    /// 1-based position in the deduplicated, chronologically ordered sequence
    pub index: usize,
    /// Raw numeric value (a counter value when the meter is cumulative)
    pub value: f64,
    /// Start instant; `None` until derived for end-only feeds
    pub start: Option<DateTime<Utc>>,
    pub end: DateTime<Utc>,
    /// Wall-clock start as written in the feed, kept only when it was
    /// resolved through the meter timezone
    pub start_local: Option<NaiveDateTime>,
    /// Wall-clock end, same rule as `start_local`
    pub end_local: Option<NaiveDateTime>,
}

/// A validated reading ready to be stored. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AcceptedReading {
    pub meter_id: MeterId,
    pub value: f64,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// Persisted per-meter state that lets a batch continue where the previous
/// one stopped
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeterSeed {
    /// Start of the last reading; unknown when the anchor came from an
    /// end-only first row
    #[serde(default)]
    pub last_start: Option<DateTime<Utc>>,
    pub last_end: DateTime<Utc>,
    /// Last raw counter value seen for a cumulative meter
    #[serde(default)]
    pub last_raw_cumulative: Option<f64>,
}

/// Read a JSON array of rows, as written by the upstream decoder
pub fn read_rows(path: impl AsRef<Path>) -> Result<Vec<RawRow>> {
    read_json(path.as_ref())
}

impl MeterSeed {
    /// Read a checkpoint saved as JSON
    pub fn read(path: impl AsRef<Path>) -> Result<Self> {
        read_json(path.as_ref())
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}
