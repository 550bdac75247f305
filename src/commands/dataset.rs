//! Dataset CLI command: summary, integrity, and bucket views

use anyhow::Result;
use clap::{Args, Subcommand, ValueEnum};
use comfy_table::{presets::UTF8_FULL, Attribute, Cell, Color, ContentArrangement, Table};
use railbird_calibration::CalibrationManager;
use rust_decimal::Decimal;

#[derive(Debug, Args)]
pub struct DatasetCommand {
    #[command(subcommand)]
    pub command: DatasetSubcommand,
}

#[derive(Debug, Subcommand)]
pub enum DatasetSubcommand {
    /// Dataset totals, date range, and breakdowns
    Summary,
    /// Check the dataset for structural problems
    Integrity,
    /// Win rates grouped by probability, score, or tier
    Buckets(BucketsArgs),
}

#[derive(Debug, Args)]
pub struct BucketsArgs {
    /// Grouping dimension
    #[arg(long, short, default_value = "probability")]
    pub by: Grouping,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum Grouping {
    Probability,
    Score,
    Tier,
}

impl DatasetCommand {
    pub async fn run(&self, manager: &CalibrationManager) -> Result<()> {
        let dataset = manager.dataset();
        match &self.command {
            DatasetSubcommand::Summary => run_summary(&dataset).await,
            DatasetSubcommand::Integrity => run_integrity(&dataset).await,
            DatasetSubcommand::Buckets(args) => run_buckets(&dataset, args.by).await,
        }
        Ok(())
    }
}

async fn run_summary(dataset: &railbird_calibration::DatasetManager) {
    let summary = dataset.summary().await;

    println!();
    println!("Historical Dataset");
    println!();

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table.add_row(vec![
        Cell::new("Total races").add_attribute(Attribute::Bold),
        Cell::new(summary.total_races),
    ]);
    table.add_row(vec![
        Cell::new("Completed").add_attribute(Attribute::Bold),
        Cell::new(summary.completed_races),
    ]);
    table.add_row(vec![
        Cell::new("Pending results").add_attribute(Attribute::Bold),
        Cell::new(summary.pending_races),
    ]);
    table.add_row(vec![
        Cell::new("Entries").add_attribute(Attribute::Bold),
        Cell::new(summary.total_entries),
    ]);
    let range = match (summary.earliest_date, summary.latest_date) {
        (Some(from), Some(to)) => format!("{from} to {to}"),
        _ => "-".to_string(),
    };
    table.add_row(vec![
        Cell::new("Date range").add_attribute(Attribute::Bold),
        Cell::new(range),
    ]);
    table.add_row(vec![
        Cell::new("Tracks").add_attribute(Attribute::Bold),
        Cell::new(summary.tracks.join(", ")),
    ]);
    for (source, count) in &summary.by_source {
        table.add_row(vec![
            Cell::new(format!("Source: {source}")),
            Cell::new(*count),
        ]);
    }
    for (surface, count) in &summary.by_surface {
        table.add_row(vec![
            Cell::new(format!("Surface: {surface}")),
            Cell::new(*count),
        ]);
    }
    println!("{table}");
}

async fn run_integrity(dataset: &railbird_calibration::DatasetManager) {
    let report = dataset.integrity_report().await;

    println!();
    println!("Integrity check: {} races examined", report.races_checked);
    println!();

    if report.is_clean() {
        println!("No problems found.");
        return;
    }

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("Severity").add_attribute(Attribute::Bold),
            Cell::new("Race").add_attribute(Attribute::Bold),
            Cell::new("Problem").add_attribute(Attribute::Bold),
        ]);
    for issue in &report.issues {
        table.add_row(vec![
            Cell::new("issue").fg(Color::Red),
            Cell::new(&issue.race_id),
            Cell::new(&issue.detail),
        ]);
    }
    for warning in &report.warnings {
        table.add_row(vec![
            Cell::new("warning").fg(Color::Yellow),
            Cell::new(&warning.race_id),
            Cell::new(&warning.detail),
        ]);
    }
    println!("{table}");
}

async fn run_buckets(dataset: &railbird_calibration::DatasetManager, by: Grouping) {
    println!();
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);

    match by {
        Grouping::Probability => {
            println!("Win rate by predicted probability");
            println!();
            table.set_header(vec![
                Cell::new("Bucket").add_attribute(Attribute::Bold),
                Cell::new("Count").add_attribute(Attribute::Bold),
                Cell::new("Winners").add_attribute(Attribute::Bold),
                Cell::new("Win rate").add_attribute(Attribute::Bold),
                Cell::new("Avg predicted").add_attribute(Attribute::Bold),
            ]);
            for bucket in dataset.probability_buckets().await {
                table.add_row(vec![
                    Cell::new(&bucket.label),
                    Cell::new(bucket.count),
                    Cell::new(bucket.winners),
                    Cell::new(format!("{:.3}", bucket.win_rate)),
                    Cell::new(format!("{:.3}", bucket.avg_predicted)),
                ]);
            }
        }
        Grouping::Score => {
            println!("Win rate by raw score");
            println!();
            table.set_header(vec![
                Cell::new("Bucket").add_attribute(Attribute::Bold),
                Cell::new("Count").add_attribute(Attribute::Bold),
                Cell::new("Winners").add_attribute(Attribute::Bold),
                Cell::new("Win rate").add_attribute(Attribute::Bold),
            ]);
            for bucket in dataset.score_buckets().await {
                table.add_row(vec![
                    Cell::new(&bucket.label),
                    Cell::new(bucket.count),
                    Cell::new(bucket.winners),
                    Cell::new(format!("{:.3}", bucket.win_rate)),
                ]);
            }
        }
        Grouping::Tier => {
            println!("Flat-stake ROI by tier");
            println!();
            table.set_header(vec![
                Cell::new("Tier").add_attribute(Attribute::Bold),
                Cell::new("Bets").add_attribute(Attribute::Bold),
                Cell::new("Winners").add_attribute(Attribute::Bold),
                Cell::new("Win rate").add_attribute(Attribute::Bold),
                Cell::new("Staked").add_attribute(Attribute::Bold),
                Cell::new("Returned").add_attribute(Attribute::Bold),
                Cell::new("ROI").add_attribute(Attribute::Bold),
            ]);
            for tier in dataset.roi_by_tier().await {
                let roi_color = if tier.roi >= Decimal::ZERO {
                    Color::Green
                } else {
                    Color::Red
                };
                table.add_row(vec![
                    Cell::new(tier.tier),
                    Cell::new(tier.count),
                    Cell::new(tier.winners),
                    Cell::new(format!("{:.3}", tier.win_rate)),
                    Cell::new(tier.total_staked.to_string()),
                    Cell::new(tier.total_returned.round_dp(2).to_string()),
                    Cell::new(format!("{}", tier.roi.round_dp(3))).fg(roi_color),
                ]);
            }
        }
    }
    println!("{table}");
}
