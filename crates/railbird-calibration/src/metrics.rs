//! Calibration quality metrics
//!
//! Proper scoring rules and bucketed calibration diagnostics over parallel
//! prediction/outcome slices. Mismatched or empty input returns `None`
//! rather than a misleading score.

use serde::{Deserialize, Serialize};

/// Clamp applied to predictions inside the log loss to avoid infinite loss.
const LOG_LOSS_EPSILON: f64 = 1e-15;

/// Default bucket count for calibration-error metrics.
pub const DEFAULT_BUCKETS: usize = 10;

/// One row of a reliability diagram
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReliabilityBin {
    /// Bucket range label, e.g. `0.2-0.3`
    pub label: String,
    pub lower: f64,
    pub upper: f64,
    /// Mean predicted probability inside the bucket
    pub mean_predicted: f64,
    /// Observed win rate inside the bucket
    pub actual_rate: f64,
    pub count: usize,
    /// Standard error of the win-rate estimate: `sqrt(p(1-p)/n)`
    pub std_error: f64,
}

/// Mean squared error between predictions and binary outcomes.
///
/// 0 is perfect, 1 maximally wrong; a constant 0.5 predictor scores 0.25
/// against balanced outcomes.
pub fn brier_score(predictions: &[f64], outcomes: &[bool]) -> Option<f64> {
    if predictions.is_empty() || predictions.len() != outcomes.len() {
        return None;
    }
    let sum: f64 = predictions
        .iter()
        .zip(outcomes)
        .map(|(&p, &won)| {
            let y = if won { 1.0 } else { 0.0 };
            (p - y) * (p - y)
        })
        .sum();
    Some(sum / predictions.len() as f64)
}

/// Mean negative log-likelihood, predictions clamped away from 0 and 1.
pub fn log_loss(predictions: &[f64], outcomes: &[bool]) -> Option<f64> {
    if predictions.is_empty() || predictions.len() != outcomes.len() {
        return None;
    }
    let sum: f64 = predictions
        .iter()
        .zip(outcomes)
        .map(|(&p, &won)| {
            let p = p.clamp(LOG_LOSS_EPSILON, 1.0 - LOG_LOSS_EPSILON);
            if won {
                -p.ln()
            } else {
                -(1.0 - p).ln()
            }
        })
        .sum();
    Some(sum / predictions.len() as f64)
}

/// Expected Calibration Error: population-weighted mean gap between a
/// bucket's average predicted probability and its observed win rate.
pub fn expected_calibration_error(
    predictions: &[f64],
    outcomes: &[bool],
    buckets: usize,
) -> Option<f64> {
    let bins = bucketize(predictions, outcomes, buckets)?;
    let total = predictions.len() as f64;
    let ece = bins
        .iter()
        .map(|b| (b.count as f64 / total) * (b.mean_predicted - b.actual_rate).abs())
        .sum();
    Some(ece)
}

/// Worst single bucket's calibration gap.
pub fn max_calibration_error(
    predictions: &[f64],
    outcomes: &[bool],
    buckets: usize,
) -> Option<f64> {
    let bins = bucketize(predictions, outcomes, buckets)?;
    bins.iter()
        .map(|b| (b.mean_predicted - b.actual_rate).abs())
        .fold(None, |acc, v| Some(acc.map_or(v, |a: f64| a.max(v))))
}

/// Reliability diagram: one row per non-empty bucket.
pub fn reliability_diagram(
    predictions: &[f64],
    outcomes: &[bool],
    buckets: usize,
) -> Option<Vec<ReliabilityBin>> {
    bucketize(predictions, outcomes, buckets)
}

/// Brier Skill Score: `1 - brier / brier_baseline`, where the baseline
/// predicts the overall observed win rate for every sample. Positive means
/// the model beats naively predicting the base rate.
pub fn brier_skill_score(predictions: &[f64], outcomes: &[bool]) -> Option<f64> {
    let brier = brier_score(predictions, outcomes)?;
    let base_rate = outcomes.iter().filter(|&&w| w).count() as f64 / outcomes.len() as f64;
    let baseline: Vec<f64> = vec![base_rate; outcomes.len()];
    let brier_baseline = brier_score(&baseline, outcomes)?;
    if brier_baseline <= 0.0 {
        return None;
    }
    Some(1.0 - brier / brier_baseline)
}

fn bucketize(
    predictions: &[f64],
    outcomes: &[bool],
    buckets: usize,
) -> Option<Vec<ReliabilityBin>> {
    if predictions.is_empty() || predictions.len() != outcomes.len() || buckets == 0 {
        return None;
    }

    let width = 1.0 / buckets as f64;
    let mut sums = vec![0.0_f64; buckets];
    let mut wins = vec![0usize; buckets];
    let mut counts = vec![0usize; buckets];

    for (&p, &won) in predictions.iter().zip(outcomes) {
        let p = p.clamp(0.0, 1.0);
        let idx = ((p / width) as usize).min(buckets - 1);
        sums[idx] += p;
        counts[idx] += 1;
        if won {
            wins[idx] += 1;
        }
    }

    let bins = (0..buckets)
        .filter(|&i| counts[i] > 0)
        .map(|i| {
            let n = counts[i] as f64;
            let rate = wins[i] as f64 / n;
            let lower = i as f64 * width;
            let upper = lower + width;
            ReliabilityBin {
                label: format!("{:.1}-{:.1}", lower, upper),
                lower,
                upper,
                mean_predicted: sums[i] / n,
                actual_rate: rate,
                count: counts[i],
                std_error: (rate * (1.0 - rate) / n).sqrt(),
            }
        })
        .collect();

    Some(bins)
}
