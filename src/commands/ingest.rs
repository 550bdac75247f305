//! Ingest CLI command: feed parsed cards, scored cards, and official
//! results through the auto-logging pipeline

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use clap::{Args, Subcommand};
use comfy_table::{presets::UTF8_FULL, Attribute, Cell, Color, ContentArrangement, Table};
use railbird_calibration::CalibrationManager;
use railbird_core::{math, ParsedRaceCard, RaceResult, RaceStore, ScoredRaceCard};
use railbird_pipeline::{AutoLogReport, AutoLogger, ExtractorConfig};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Debug, Args)]
pub struct IngestCommand {
    #[command(subcommand)]
    action: IngestAction,
}

#[derive(Debug, Subcommand)]
enum IngestAction {
    /// Harvest historical races from a parsed card (JSON file)
    Card {
        /// Path to a parsed race card JSON file
        file: PathBuf,
    },
    /// Log model predictions from a scored card (JSON file)
    Scored {
        /// Path to a scored race card JSON file
        file: PathBuf,
    },
    /// Record official results for a pending race (JSON array file)
    Results {
        /// Path to a JSON array of per-horse results
        file: PathBuf,

        /// Race identifier, e.g. SA-2025-06-01-R4
        #[arg(long, conflicts_with_all = ["track", "date", "race"])]
        race_id: Option<String>,

        /// Track code, used with --date and --race when --race-id is absent
        #[arg(long, requires_all = ["date", "race"])]
        track: Option<String>,

        /// Race date (YYYY-MM-DD)
        #[arg(long)]
        date: Option<NaiveDate>,

        /// Race number on the card
        #[arg(long)]
        race: Option<u32>,
    },
}

impl IngestCommand {
    pub async fn run(
        &self,
        races: Arc<dyn RaceStore>,
        manager: Arc<CalibrationManager>,
    ) -> Result<()> {
        let logger = AutoLogger::new(races, manager, ExtractorConfig::default());

        let report = match &self.action {
            IngestAction::Card { file } => {
                let card: ParsedRaceCard = read_json(file).await?;
                logger.on_card_parsed(&card).await
            }
            IngestAction::Scored { file } => {
                let card: ScoredRaceCard = read_json(file).await?;
                logger.on_card_scored(&card).await
            }
            IngestAction::Results {
                file,
                race_id,
                track,
                date,
                race,
            } => {
                let id = resolve_race_id(race_id.as_deref(), track.as_deref(), *date, *race)?;
                let results: Vec<RaceResult> = read_json(file).await?;
                logger.on_results(&id, &results).await
            }
        };

        print_report(&report);
        Ok(())
    }
}

async fn read_json<T: serde::de::DeserializeOwned>(path: &PathBuf) -> Result<T> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("Failed to parse {}", path.display()))
}

fn resolve_race_id(
    race_id: Option<&str>,
    track: Option<&str>,
    date: Option<NaiveDate>,
    race: Option<u32>,
) -> Result<String> {
    if let Some(id) = race_id {
        return Ok(id.to_string());
    }
    match (track, date, race) {
        (Some(track), Some(date), Some(race)) => Ok(math::race_id(track, date, race)),
        _ => bail!("Provide either --race-id or all of --track, --date, and --race"),
    }
}

fn print_report(report: &AutoLogReport) {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table.add_row(vec![
        Cell::new("Races extracted").add_attribute(Attribute::Bold),
        Cell::new(report.races_extracted),
    ]);
    table.add_row(vec![
        Cell::new("Races saved").add_attribute(Attribute::Bold),
        Cell::new(report.races_saved),
    ]);
    table.add_row(vec![
        Cell::new("Predictions logged").add_attribute(Attribute::Bold),
        Cell::new(if report.predictions_logged { "yes" } else { "no" }),
    ]);
    table.add_row(vec![
        Cell::new("Results recorded").add_attribute(Attribute::Bold),
        Cell::new(if report.results_recorded { "yes" } else { "no" }),
    ]);
    let ready_cell = if report.calibration_ready {
        Cell::new("Ready").fg(Color::Green)
    } else {
        Cell::new("Not ready").fg(Color::Yellow)
    };
    table.add_row(vec![
        Cell::new("Calibration").add_attribute(Attribute::Bold),
        ready_cell,
    ]);
    println!("{table}");

    for note in &report.notes {
        println!("note: {note}");
    }
}
