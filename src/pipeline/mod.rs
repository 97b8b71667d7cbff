// Meter-reading pipeline: configuration, per-run state, stages and storage

pub mod pipeline_config;
pub mod processing;
pub mod runner;
pub mod state;
pub mod storage;

// Re-export key types
pub use pipeline_config::PipelineConfig;
pub use processing::outcome::{BatchResult, BatchStatus, Diagnostic, Severity};
pub use runner::Pipeline;
