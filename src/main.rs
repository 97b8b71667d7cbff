use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::{info, warn};

use meter_ingest::app::IngestUseCase;
use meter_ingest::config::Config;
use meter_ingest::domain::{self, MeterSeed, RawRow};
use meter_ingest::observability;
use meter_ingest::pipeline::storage::InMemoryReadingStore;
use meter_ingest::pipeline::{BatchResult, Pipeline};

#[derive(Parser)]
#[command(name = "meter_ingest")]
#[command(about = "Validate and ingest batches of meter readings")]
#[command(version = "0.1.0")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one batch through the pipeline and print the report
    Validate {
        /// Meter configuration (TOML)
        #[arg(long)]
        config: PathBuf,
        /// Row file: JSON array of {"value", "start", "end"} objects
        #[arg(long)]
        input: PathBuf,
        /// Checkpoint left by a previous batch (JSON)
        #[arg(long)]
        seed: Option<PathBuf>,
        /// Print the full batch result as JSON instead of the report
        #[arg(long)]
        json: bool,
    },
    /// Ingest batches in order into an in-memory store
    Ingest {
        /// Meter configuration (TOML)
        #[arg(long)]
        config: PathBuf,
        /// Row files, processed in the order given
        #[arg(long, required = true)]
        input: Vec<PathBuf>,
        /// Checkpoint to continue from before the first batch (JSON)
        #[arg(long)]
        seed: Option<PathBuf>,
        /// Print Prometheus metrics after the last batch
        #[arg(long)]
        print_metrics: bool,
    },
}

fn read_rows(path: &Path) -> Result<Vec<RawRow>> {
    domain::read_rows(path)
        .with_context(|| format!("Failed to load rows from '{}'", path.display()))
}

fn read_seed(path: &Path) -> Result<MeterSeed> {
    MeterSeed::read(path).with_context(|| format!("Failed to load seed from '{}'", path.display()))
}

fn print_result(result: &BatchResult, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(result)?);
    } else {
        print!("{}", result.render_report());
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    match cli.command {
        Commands::Validate {
            config,
            input,
            seed,
            json,
        } => {
            let config = Config::load(&config)?;
            let _guard = observability::init_logging(&config.logging);

            let pipeline = Pipeline::new(config.meter.id, &config.meter.pipeline)?;
            let seed = seed.as_deref().map(read_seed).transpose()?;
            let rows = read_rows(&input)?;
            info!(meter_id = config.meter.id, rows = rows.len(), "validating batch");

            let result = pipeline.run(rows, seed.as_ref());
            print_result(&result, json)?;
            if !result.status().is_success() {
                std::process::exit(1);
            }
        }
        Commands::Ingest {
            config,
            input,
            seed,
            print_metrics,
        } => {
            let config = Config::load(&config)?;
            let _guard = observability::init_logging(&config.logging);
            observability::init()?;

            let store = InMemoryReadingStore::new();
            if let Some(path) = seed.as_deref() {
                store.put_seed(config.meter.id, read_seed(path)?)?;
            }
            let use_case = IngestUseCase::new(Arc::new(store.clone()));

            let interrupt = use_case.interrupt_handle();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("interrupt received, aborting current batch");
                    interrupt.store(true, Ordering::Relaxed);
                }
            });

            for path in &input {
                let rows = read_rows(path)?;
                println!("== {}", path.display());
                let result = use_case
                    .ingest_batch(config.meter.id, &config.meter.pipeline, rows)
                    .await?;
                print_result(&result, false)?;
            }

            let stored = store.readings(config.meter.id)?;
            println!("Stored {} reading(s) for meter {}", stored.len(), config.meter.id);

            if print_metrics {
                if let Some(text) = observability::render() {
                    println!("{}", text);
                }
            }
        }
    }

    Ok(())
}
