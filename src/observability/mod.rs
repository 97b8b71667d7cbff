// Observability: structured logging and batch metrics

pub mod logging;
pub mod metrics;

// Re-export main functions for ease of use
pub use self::logging::init_logging;
pub use self::metrics::{init, render};
