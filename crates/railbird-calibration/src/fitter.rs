//! Platt parameter fitting
//!
//! Batch gradient descent on log loss in logit space, with an exhaustive
//! grid-search fallback and k-fold cross-validation for judging estimate
//! stability. Cross-validation never selects the final model; that is
//! always fit once on the full dataset.

use crate::metrics;
use chrono::Utc;
use railbird_core::math::{logit, stable_sigmoid};
use railbird_core::PlattParameters;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Parameters are clamped to this magnitude after every descent step.
const PARAMETER_BOUND: f64 = 10.0;

/// One training sample: a raw prediction and its observed outcome
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FitSample {
    pub predicted: f64,
    pub won: bool,
}

/// Gradient descent configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FitConfig {
    #[serde(default = "default_learning_rate")]
    pub learning_rate: f64,

    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,

    /// Convergence threshold on the gradient norm
    #[serde(default = "default_convergence_tolerance")]
    pub convergence_tolerance: f64,

    /// L2 regularization coefficient; keeps parameters from drifting to
    /// extreme values on sparse data
    #[serde(default = "default_l2_lambda")]
    pub l2_lambda: f64,

    /// Minimum valid (finite, strictly interior) samples required
    #[serde(default = "default_min_samples")]
    pub min_samples: usize,
}

fn default_learning_rate() -> f64 {
    0.01
}

fn default_max_iterations() -> usize {
    1000
}

fn default_convergence_tolerance() -> f64 {
    1e-6
}

fn default_l2_lambda() -> f64 {
    0.001
}

fn default_min_samples() -> usize {
    10
}

impl Default for FitConfig {
    fn default() -> Self {
        Self {
            learning_rate: default_learning_rate(),
            max_iterations: default_max_iterations(),
            convergence_tolerance: default_convergence_tolerance(),
            l2_lambda: default_l2_lambda(),
            min_samples: default_min_samples(),
        }
    }
}

/// Grid search configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GridSearchConfig {
    pub a_min: f64,
    pub a_max: f64,
    pub b_min: f64,
    pub b_max: f64,
    pub step: f64,
}

impl Default for GridSearchConfig {
    fn default() -> Self {
        Self {
            a_min: 0.1,
            a_max: 3.0,
            b_min: -2.0,
            b_max: 2.0,
            step: 0.1,
        }
    }
}

/// Outcome of a fit
#[derive(Debug, Clone)]
pub struct FitResult {
    pub parameters: PlattParameters,
    pub converged: bool,
    pub iterations: usize,
    /// Log loss after each iteration
    pub loss_history: Vec<f64>,
    /// Valid samples actually used
    pub sample_count: usize,
}

/// One held-out fold's evaluation
#[derive(Debug, Clone)]
pub struct FoldResult {
    pub fold: usize,
    pub train_size: usize,
    pub test_size: usize,
    pub brier_score: f64,
    pub log_loss: f64,
}

/// Cross-validation summary
#[derive(Debug, Clone)]
pub struct CrossValidationResult {
    pub folds: Vec<FoldResult>,
    pub mean_brier: f64,
    pub std_brier: f64,
    pub mean_log_loss: f64,
    pub std_log_loss: f64,
}

/// Keep only finite, strictly-interior predictions.
fn valid_samples(samples: &[FitSample]) -> Vec<FitSample> {
    samples
        .iter()
        .copied()
        .filter(|s| s.predicted.is_finite() && s.predicted > 0.0 && s.predicted < 1.0)
        .collect()
}

/// Fit Platt parameters by batch gradient descent on log loss.
///
/// Returns `None` when fewer than `config.min_samples` valid predictions
/// remain after filtering; insufficient data is not an error.
pub fn fit(samples: &[FitSample], config: &FitConfig) -> Option<FitResult> {
    let samples = valid_samples(samples);
    if samples.len() < config.min_samples {
        debug!(
            valid = samples.len(),
            required = config.min_samples,
            "Not enough valid samples to fit"
        );
        return None;
    }

    let n = samples.len() as f64;
    let logits: Vec<f64> = samples.iter().map(|s| logit(s.predicted)).collect();
    let targets: Vec<f64> = samples
        .iter()
        .map(|s| if s.won { 1.0 } else { 0.0 })
        .collect();

    let mut a = 1.0_f64;
    let mut b = 0.0_f64;
    let mut loss_history = Vec::new();
    let mut converged = false;
    let mut iterations = 0;

    for iter in 0..config.max_iterations {
        iterations = iter + 1;

        let mut grad_a = 0.0;
        let mut grad_b = 0.0;
        let mut loss = 0.0;

        for (&x, &y) in logits.iter().zip(&targets) {
            let p = stable_sigmoid(a * x + b);
            let p_safe = p.clamp(1e-15, 1.0 - 1e-15);
            loss -= y * p_safe.ln() + (1.0 - y) * (1.0 - p_safe).ln();

            let error = p - y;
            grad_a += error * x;
            grad_b += error;
        }

        grad_a = grad_a / n + config.l2_lambda * a;
        grad_b = grad_b / n + config.l2_lambda * b;
        loss_history.push(loss / n);

        a = (a - config.learning_rate * grad_a).clamp(-PARAMETER_BOUND, PARAMETER_BOUND);
        b = (b - config.learning_rate * grad_b).clamp(-PARAMETER_BOUND, PARAMETER_BOUND);

        let gradient_norm = (grad_a * grad_a + grad_b * grad_b).sqrt();
        if gradient_norm < config.convergence_tolerance {
            converged = true;
            break;
        }
    }

    let fitted = PlattParameters {
        a,
        b,
        fitted_at: Utc::now(),
        race_count: 0,
        brier_score: 0.0,
        log_loss: 0.0,
    };
    let result = evaluate(fitted, &samples);

    debug!(
        a = result.a,
        b = result.b,
        iterations,
        converged,
        samples = samples.len(),
        "Platt fit finished"
    );

    Some(FitResult {
        parameters: result,
        converged,
        iterations,
        loss_history,
        sample_count: samples.len(),
    })
}

/// Exhaustive log-loss scan over an (a, b) grid; the best cell wins.
///
/// Fallback for when gradient descent's convergence is suspect.
pub fn grid_search(samples: &[FitSample], grid: &GridSearchConfig) -> Option<FitResult> {
    let samples = valid_samples(samples);
    if samples.is_empty() || grid.step <= 0.0 {
        return None;
    }

    let predictions: Vec<f64> = samples.iter().map(|s| s.predicted).collect();
    let outcomes: Vec<bool> = samples.iter().map(|s| s.won).collect();

    let mut best: Option<(f64, f64, f64)> = None;
    let mut cells = 0;

    let mut a = grid.a_min;
    while a <= grid.a_max + 1e-12 {
        let mut b = grid.b_min;
        while b <= grid.b_max + 1e-12 {
            cells += 1;
            let candidate = PlattParameters {
                a,
                b,
                ..PlattParameters::identity()
            };
            let calibrated: Vec<f64> = predictions
                .iter()
                .map(|&p| crate::platt::calibrate_probability(p, &candidate))
                .collect();
            if let Some(loss) = metrics::log_loss(&calibrated, &outcomes) {
                if best.map_or(true, |(_, _, best_loss)| loss < best_loss) {
                    best = Some((a, b, loss));
                }
            }
            b += grid.step;
        }
        a += grid.step;
    }

    let (a, b, loss) = best?;
    let fitted = evaluate(
        PlattParameters {
            a,
            b,
            fitted_at: Utc::now(),
            race_count: 0,
            brier_score: 0.0,
            log_loss: 0.0,
        },
        &samples,
    );

    debug!(a, b, cells, "Grid search finished");

    Some(FitResult {
        parameters: fitted,
        converged: true,
        iterations: cells,
        loss_history: vec![loss],
        sample_count: samples.len(),
    })
}

/// k-fold cross-validation: Fisher-Yates shuffle, contiguous split, fit on
/// each training fold and score on its held-out fold.
pub fn cross_validate(
    samples: &[FitSample],
    k: usize,
    config: &FitConfig,
) -> Option<CrossValidationResult> {
    let mut samples = valid_samples(samples);
    if k < 2 || samples.len() < k * config.min_samples {
        return None;
    }

    samples.shuffle(&mut rand::thread_rng());

    let fold_size = samples.len() / k;
    let mut folds = Vec::with_capacity(k);

    for fold in 0..k {
        let test_start = fold * fold_size;
        let test_end = if fold == k - 1 {
            samples.len()
        } else {
            test_start + fold_size
        };

        let test: Vec<FitSample> = samples[test_start..test_end].to_vec();
        let train: Vec<FitSample> = samples[..test_start]
            .iter()
            .chain(&samples[test_end..])
            .copied()
            .collect();

        let fitted = fit(&train, config)?;

        let calibrated: Vec<f64> = test
            .iter()
            .map(|s| crate::platt::calibrate_probability(s.predicted, &fitted.parameters))
            .collect();
        let outcomes: Vec<bool> = test.iter().map(|s| s.won).collect();

        folds.push(FoldResult {
            fold,
            train_size: train.len(),
            test_size: test.len(),
            brier_score: metrics::brier_score(&calibrated, &outcomes)?,
            log_loss: metrics::log_loss(&calibrated, &outcomes)?,
        });
    }

    let briers: Vec<f64> = folds.iter().map(|f| f.brier_score).collect();
    let losses: Vec<f64> = folds.iter().map(|f| f.log_loss).collect();
    let (mean_brier, std_brier) = mean_std(&briers);
    let (mean_log_loss, std_log_loss) = mean_std(&losses);

    Some(CrossValidationResult {
        folds,
        mean_brier,
        std_brier,
        mean_log_loss,
        std_log_loss,
    })
}

/// Fill in achieved Brier score and log loss on the fitting data.
fn evaluate(mut params: PlattParameters, samples: &[FitSample]) -> PlattParameters {
    let calibrated: Vec<f64> = samples
        .iter()
        .map(|s| crate::platt::calibrate_probability(s.predicted, &params))
        .collect();
    let outcomes: Vec<bool> = samples.iter().map(|s| s.won).collect();

    params.brier_score = metrics::brier_score(&calibrated, &outcomes).unwrap_or(0.0);
    params.log_loss = metrics::log_loss(&calibrated, &outcomes).unwrap_or(0.0);
    params
}

fn mean_std(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (0.0, 0.0);
    }
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    let variance =
        values.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / values.len() as f64;
    (mean, variance.sqrt())
}
