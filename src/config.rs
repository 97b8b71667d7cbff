use serde::Deserialize;
use std::fs;
use std::path::Path;

use crate::domain::MeterId;
use crate::error::{IngestError, Result};
use crate::pipeline::pipeline_config::PipelineConfig;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub meter: MeterConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// One meter and the pipeline settings its readings are processed with
#[derive(Debug, Clone, Deserialize)]
pub struct MeterConfig {
    pub id: MeterId,
    #[serde(flatten)]
    pub pipeline: PipelineConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub directory: String,
    pub file_name: String,
    /// Filter used when RUST_LOG is unset
    pub default_filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            directory: "logs".to_string(),
            file_name: "meter_ingest.log".to_string(),
            default_filter: "meter_ingest=info".to_string(),
        }
    }
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            IngestError::Config(format!("Failed to read config file '{}': {}", path.display(), e))
        })?;
        Self::from_toml(&content)
    }

    /// Parse and validate a TOML document
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        config.meter.pipeline.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::pipeline_config::{DuplicationMode, TimeSort};
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_load_full_config() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[meter]
id = 42
time_sort = "decreasing"
cumulative = true
cumulative_reset = true
cumulative_reset_start = "23:00:00"
cumulative_reset_end = "01:00:00"
length_gap_seconds = 60
length_variation_seconds = 30.5
duplications = 2
duplication_strategy = "average"
honor_dst = true
timezone = "America/Chicago"

[logging]
directory = "/tmp/meter-logs"
"#
        )
        .unwrap();

        let config = Config::load(file.path()).unwrap();
        let pipeline = &config.meter.pipeline;
        assert_eq!(config.meter.id, 42);
        assert_eq!(pipeline.time_sort, TimeSort::Decreasing);
        assert_eq!(pipeline.duplication_strategy, DuplicationMode::Average);
        assert_eq!(pipeline.duplications, 2);
        assert_eq!(pipeline.length_gap_seconds, 60.0);
        assert_eq!(pipeline.timezone.as_deref(), Some("America/Chicago"));
        assert_eq!(config.logging.directory, "/tmp/meter-logs");
        assert_eq!(config.logging.file_name, "meter_ingest.log");
    }

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = Config::from_toml("[meter]\nid = 1\n").unwrap();
        assert!(!config.meter.pipeline.cumulative);
        assert_eq!(config.meter.pipeline.duplications, 1);
        assert_eq!(config.logging.default_filter, "meter_ingest=info");
    }

    #[test]
    fn test_invalid_timezone_is_rejected() {
        let err = Config::from_toml("[meter]\nid = 1\nhonor_dst = true\ntimezone = \"Mars/Olympus\"\n")
            .unwrap_err();
        assert!(matches!(err, IngestError::InvalidTimezone { .. }));
    }

    #[test]
    fn test_missing_file_is_config_error() {
        let err = Config::load("/nonexistent/meter.toml").unwrap_err();
        assert!(matches!(err, IngestError::Config(_)));
    }
}
