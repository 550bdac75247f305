//! Calibrate CLI command: fit, cross-validate, history, reset

use anyhow::Result;
use clap::{Args, Subcommand};
use comfy_table::{presets::UTF8_FULL, Attribute, Cell, ContentArrangement, Table};
use railbird_calibration::CalibrationManager;

#[derive(Debug, Args)]
pub struct CalibrateCommand {
    #[command(subcommand)]
    pub command: CalibrateSubcommand,
}

#[derive(Debug, Subcommand)]
pub enum CalibrateSubcommand {
    /// Force a fit on the current dataset
    Fit,
    /// k-fold cross-validation of the fit's stability
    Cv(CvArgs),
    /// Show the retained fit history
    History,
    /// Clear fitted parameters and fit history
    Reset(ResetArgs),
}

#[derive(Debug, Args)]
pub struct CvArgs {
    /// Number of folds
    #[arg(long, short, default_value_t = 5)]
    pub folds: usize,
}

#[derive(Debug, Args)]
pub struct ResetArgs {
    /// Skip the confirmation prompt
    #[arg(long)]
    pub yes: bool,
}

impl CalibrateCommand {
    pub async fn run(&self, manager: &CalibrationManager) -> Result<()> {
        match &self.command {
            CalibrateSubcommand::Fit => run_fit(manager).await,
            CalibrateSubcommand::Cv(args) => run_cv(manager, args.folds).await,
            CalibrateSubcommand::History => run_history(manager).await,
            CalibrateSubcommand::Reset(args) => run_reset(manager, args.yes).await,
        }
        Ok(())
    }
}

async fn run_fit(manager: &CalibrationManager) {
    if !manager.recalibrate().await {
        let status = manager.status().await;
        println!(
            "Fit failed: {} completed races with valid predictions is not enough.",
            status.total_races
        );
        return;
    }

    let Some(params) = manager.get_parameters().await else {
        println!("Fit did not produce parameters.");
        return;
    };
    println!(
        "Fitted: a = {:.4}, b = {:.4} on {} races (Brier {:.4}, log loss {:.4})",
        params.a, params.b, params.race_count, params.brier_score, params.log_loss
    );
}

async fn run_cv(manager: &CalibrationManager, folds: usize) {
    let Some(cv) = manager.run_cross_validation(folds).await else {
        println!("Not enough completed predictions for {folds}-fold cross-validation.");
        return;
    };

    println!();
    println!("{folds}-fold cross-validation");
    println!();

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("Fold").add_attribute(Attribute::Bold),
            Cell::new("Train").add_attribute(Attribute::Bold),
            Cell::new("Test").add_attribute(Attribute::Bold),
            Cell::new("Brier").add_attribute(Attribute::Bold),
            Cell::new("Log loss").add_attribute(Attribute::Bold),
        ]);
    for fold in &cv.folds {
        table.add_row(vec![
            Cell::new(fold.fold + 1),
            Cell::new(fold.train_size),
            Cell::new(fold.test_size),
            Cell::new(format!("{:.4}", fold.brier_score)),
            Cell::new(format!("{:.4}", fold.log_loss)),
        ]);
    }
    println!("{table}");
    println!(
        "Brier {:.4} +/- {:.4}   Log loss {:.4} +/- {:.4}",
        cv.mean_brier, cv.std_brier, cv.mean_log_loss, cv.std_log_loss
    );
}

async fn run_history(manager: &CalibrationManager) {
    let history = manager.fit_history().await;
    if history.is_empty() {
        println!("No fits recorded yet.");
        return;
    }

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("Fitted at").add_attribute(Attribute::Bold),
            Cell::new("a").add_attribute(Attribute::Bold),
            Cell::new("b").add_attribute(Attribute::Bold),
            Cell::new("Races").add_attribute(Attribute::Bold),
            Cell::new("Brier").add_attribute(Attribute::Bold),
            Cell::new("Log loss").add_attribute(Attribute::Bold),
        ]);
    for params in &history {
        table.add_row(vec![
            Cell::new(params.fitted_at.to_rfc3339()),
            Cell::new(format!("{:.4}", params.a)),
            Cell::new(format!("{:.4}", params.b)),
            Cell::new(params.race_count),
            Cell::new(format!("{:.4}", params.brier_score)),
            Cell::new(format!("{:.4}", params.log_loss)),
        ]);
    }
    println!("{table}");
}

async fn run_reset(manager: &CalibrationManager, yes: bool) {
    if !yes {
        println!("This clears the fitted transform and its history. Re-run with --yes to confirm.");
        return;
    }
    manager.reset().await;
    println!("Calibration reset. Predictions pass through uncalibrated until the next fit.");
}
