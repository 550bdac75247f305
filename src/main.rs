//! Railbird - Handicapping Probability Calibration
//!
//! Operator CLI for the calibration pipeline: dataset inspection,
//! calibration status, fitting, and cross-validation.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use commands::{CalibrateCommand, DatasetCommand, IngestCommand, StatusCommand};
use railbird_calibration::{CalibrationManager, ManagerConfig};
use railbird_core::{CalibrationStore, RaceStore};
use railbird_persistence::{CalibrationRepository, Database, RaceRepository};
use std::sync::Arc;
use tracing::Level;

mod commands;
mod logging;

const DEFAULT_DB_PATH: &str = "data/railbird.db";

#[derive(Debug, Parser)]
#[command(name = "railbird", version, about = "Handicapping probability calibration")]
struct Cli {
    /// Path to the SQLite database file
    #[arg(long, global = true, default_value = DEFAULT_DB_PATH)]
    db_path: String,

    /// Log output format
    #[arg(long, global = true, default_value = "compact")]
    log_format: logging::LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Show calibration status and the active parameters
    Status(StatusCommand),
    /// Inspect the historical dataset
    Dataset(DatasetCommand),
    /// Fit, cross-validate, or reset the calibration transform
    Calibrate(CalibrateCommand),
    /// Feed parsed cards, scored cards, or official results into the dataset
    Ingest(IngestCommand),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init_logging(cli.log_format, Level::INFO);

    let db = Database::new(&cli.db_path)
        .await
        .with_context(|| format!("Failed to open database at {}", cli.db_path))?;

    let races: Arc<dyn RaceStore> = Arc::new(RaceRepository::new(db.pool().clone()));
    let calibration: Arc<dyn CalibrationStore> =
        Arc::new(CalibrationRepository::new(db.pool().clone()));
    let manager = Arc::new(CalibrationManager::new(
        races.clone(),
        calibration,
        ManagerConfig::default(),
    ));

    match cli.command {
        Command::Status(cmd) => cmd.run(&manager).await?,
        Command::Dataset(cmd) => cmd.run(&manager).await?,
        Command::Calibrate(cmd) => cmd.run(&manager).await?,
        Command::Ingest(cmd) => cmd.run(races, manager).await?,
    }

    db.close().await;
    Ok(())
}
