//! Status CLI command: calibration readiness and the active transform

use anyhow::Result;
use clap::{Args, ValueEnum};
use comfy_table::{presets::UTF8_FULL, Attribute, Cell, Color, ContentArrangement, Table};
use railbird_calibration::CalibrationManager;

#[derive(Debug, Args)]
pub struct StatusCommand {
    /// Output format
    #[arg(long, short, default_value = "table")]
    pub format: OutputFormat,

    /// Include the reliability diagram for the current transform
    #[arg(long)]
    pub reliability: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    Table,
    Json,
}

impl StatusCommand {
    pub async fn run(&self, manager: &CalibrationManager) -> Result<()> {
        let status = manager.status().await;

        match self.format {
            OutputFormat::Json => {
                println!("{}", serde_json::to_string_pretty(&status)?);
                return Ok(());
            }
            OutputFormat::Table => {}
        }

        println!();
        println!("Calibration Status");
        println!();

        let mut table = Table::new();
        table
            .load_preset(UTF8_FULL)
            .set_content_arrangement(ContentArrangement::Dynamic);

        let ready_cell = if status.is_ready {
            Cell::new("Ready").fg(Color::Green)
        } else {
            Cell::new("Not ready").fg(Color::Yellow)
        };
        table.add_row(vec![Cell::new("State").add_attribute(Attribute::Bold), ready_cell]);
        table.add_row(vec![
            Cell::new("Completed races").add_attribute(Attribute::Bold),
            Cell::new(status.total_races),
        ]);
        table.add_row(vec![
            Cell::new("Races needed").add_attribute(Attribute::Bold),
            Cell::new(status.races_needed),
        ]);
        table.add_row(vec![
            Cell::new("Progress").add_attribute(Attribute::Bold),
            Cell::new(format!("{}%", status.progress_percent)),
        ]);
        table.add_row(vec![
            Cell::new("Recalibration due").add_attribute(Attribute::Bold),
            Cell::new(if status.needs_recalibration { "yes" } else { "no" }),
        ]);
        table.add_row(vec![
            Cell::new("Last fitted").add_attribute(Attribute::Bold),
            Cell::new(
                status
                    .last_fitted_at
                    .map(|t| t.to_rfc3339())
                    .unwrap_or_else(|| "-".to_string()),
            ),
        ]);
        table.add_row(vec![
            Cell::new("Brier score").add_attribute(Attribute::Bold),
            Cell::new(
                status
                    .brier_score
                    .map(|b| format!("{b:.4}"))
                    .unwrap_or_else(|| "-".to_string()),
            ),
        ]);
        table.add_row(vec![
            Cell::new("Log loss").add_attribute(Attribute::Bold),
            Cell::new(
                status
                    .log_loss
                    .map(|l| format!("{l:.4}"))
                    .unwrap_or_else(|| "-".to_string()),
            ),
        ]);
        if let Some(params) = manager.get_parameters().await {
            table.add_row(vec![
                Cell::new("Transform").add_attribute(Attribute::Bold),
                Cell::new(format!("a = {:.4}, b = {:.4}", params.a, params.b)),
            ]);
        }
        println!("{table}");

        if self.reliability {
            print_reliability(manager).await;
        }
        Ok(())
    }
}

async fn print_reliability(manager: &CalibrationManager) {
    let Some(metrics) = manager.comprehensive_metrics().await else {
        println!();
        println!("No completed predictions to evaluate yet.");
        return;
    };

    println!();
    println!(
        "Reliability ({} predictions, ECE {:.4}, MCE {:.4})",
        metrics.sample_count, metrics.expected_calibration_error, metrics.max_calibration_error
    );
    println!();

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("Bucket").add_attribute(Attribute::Bold),
            Cell::new("Predicted").add_attribute(Attribute::Bold),
            Cell::new("Actual").add_attribute(Attribute::Bold),
            Cell::new("Count").add_attribute(Attribute::Bold),
            Cell::new("Std Err").add_attribute(Attribute::Bold),
        ]);

    for bin in &metrics.reliability {
        let gap = (bin.mean_predicted - bin.actual_rate).abs();
        let actual_color = if gap > 0.1 { Color::Red } else { Color::Reset };
        table.add_row(vec![
            Cell::new(&bin.label),
            Cell::new(format!("{:.3}", bin.mean_predicted)),
            Cell::new(format!("{:.3}", bin.actual_rate)).fg(actual_color),
            Cell::new(bin.count),
            Cell::new(format!("{:.3}", bin.std_error)),
        ]);
    }
    println!("{table}");
}
