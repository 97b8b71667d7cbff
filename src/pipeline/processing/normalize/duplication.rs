use crate::pipeline::pipeline_config::DuplicationMode;

/// Strategy for collapsing a run of repeated rows into one logical value
pub trait DuplicationStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// How many leading rows of a run have their value parsed and combined.
    /// Rows past this count are skipped without being read.
    fn rows_consulted(&self, run_len: usize) -> usize;

    /// Combine the parsed values of the consulted rows
    fn combine(&self, values: &[f64]) -> f64;
}

/// Keeps the first row of each run
pub struct KeepFirst;

impl DuplicationStrategy for KeepFirst {
    fn name(&self) -> &'static str {
        "keep_first"
    }

    fn rows_consulted(&self, run_len: usize) -> usize {
        run_len.min(1)
    }

    fn combine(&self, values: &[f64]) -> f64 {
        values.first().copied().unwrap_or(0.0)
    }
}

/// Mean of every row in the run
pub struct Average;

impl DuplicationStrategy for Average {
    fn name(&self) -> &'static str {
        "average"
    }

    fn rows_consulted(&self, run_len: usize) -> usize {
        run_len
    }

    fn combine(&self, values: &[f64]) -> f64 {
        if values.is_empty() {
            return 0.0;
        }
        values.iter().sum::<f64>() / values.len() as f64
    }
}

/// Total of every row in the run, for feeds that divide an interval's usage
/// across its repeats
pub struct Sum;

impl DuplicationStrategy for Sum {
    fn name(&self) -> &'static str {
        "sum"
    }

    fn rows_consulted(&self, run_len: usize) -> usize {
        run_len
    }

    fn combine(&self, values: &[f64]) -> f64 {
        values.iter().sum()
    }
}

/// Strategy configured by `mode`
pub fn strategy_for(mode: DuplicationMode) -> Box<dyn DuplicationStrategy> {
    match mode {
        DuplicationMode::KeepFirst => Box::new(KeepFirst),
        DuplicationMode::Average => Box::new(Average),
        DuplicationMode::Sum => Box::new(Sum),
    }
}
