pub mod app;
pub mod config;
pub mod domain;
pub mod error;
pub mod observability;
pub mod pipeline;

pub use domain::{AcceptedReading, MeterId, MeterSeed, RawRow};
pub use error::{IngestError, Result};
pub use pipeline::{BatchResult, BatchStatus, Pipeline, PipelineConfig};
