//! Platt Scaling Core
//!
//! Pure probability transform: `calibrated = sigmoid(a * logit(raw) + b)`.
//! Field calibration renormalizes a whole race so the calibrated
//! probabilities sum to 1, with bound clamping and proportional
//! redistribution of the clamped surplus.

use railbird_core::math::{logit, stable_sigmoid};
use railbird_core::PlattParameters;

/// Lower bound on any calibrated probability.
pub const MIN_CALIBRATED: f64 = 0.005;
/// Upper bound on any calibrated probability.
pub const MAX_CALIBRATED: f64 = 0.995;

/// Redistribution passes attempted before falling back to a flat
/// renormalization.
const MAX_REDISTRIBUTION_PASSES: usize = 10;

/// Calibrate a single raw probability.
///
/// Output is clamped to `[0.005, 0.995]`. Non-finite input returns the
/// nearest clamp bound instead of propagating NaN.
pub fn calibrate_probability(raw: f64, params: &PlattParameters) -> f64 {
    if raw.is_nan() {
        return MIN_CALIBRATED;
    }
    if raw.is_infinite() {
        return if raw > 0.0 { MAX_CALIBRATED } else { MIN_CALIBRATED };
    }
    let calibrated = stable_sigmoid(params.a * logit(raw) + params.b);
    calibrated.clamp(MIN_CALIBRATED, MAX_CALIBRATED)
}

/// Calibrate every raw probability in a race and renormalize to sum 1.
///
/// After renormalization any value pushed outside `[0.005, 0.995]` is
/// clamped and its surplus or deficit redistributed proportionally among
/// the unclamped values. The fixed-point loop is capped at 10 passes; if
/// every value ends up pinned at a bound the field is flat-renormalized
/// instead.
pub fn calibrate_field(raw: &[f64], params: &PlattParameters) -> Vec<f64> {
    match raw.len() {
        0 => return Vec::new(),
        1 => return vec![1.0],
        _ => {}
    }

    let mut values: Vec<f64> = raw
        .iter()
        .map(|&p| calibrate_probability(p, params))
        .collect();

    renormalize(&mut values);

    for _ in 0..MAX_REDISTRIBUTION_PASSES {
        let mut surplus = 0.0;
        let mut unclamped = Vec::new();

        for (i, v) in values.iter_mut().enumerate() {
            if *v < MIN_CALIBRATED {
                surplus += *v - MIN_CALIBRATED;
                *v = MIN_CALIBRATED;
            } else if *v > MAX_CALIBRATED {
                surplus += *v - MAX_CALIBRATED;
                *v = MAX_CALIBRATED;
            } else {
                unclamped.push(i);
            }
        }

        if surplus.abs() < 1e-12 {
            break;
        }

        if unclamped.is_empty() {
            // Every value pinned at a bound; give up on bounded
            // redistribution and flatten
            renormalize(&mut values);
            break;
        }

        let unclamped_sum: f64 = unclamped.iter().map(|&i| values[i]).sum();
        if unclamped_sum <= 0.0 {
            renormalize(&mut values);
            break;
        }

        for &i in &unclamped {
            values[i] += surplus * (values[i] / unclamped_sum);
        }
    }

    values
}

fn renormalize(values: &mut [f64]) {
    let sum: f64 = values.iter().sum();
    if sum > 0.0 && sum.is_finite() {
        for v in values.iter_mut() {
            *v /= sum;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity() -> PlattParameters {
        PlattParameters::identity()
    }

    fn params(a: f64, b: f64) -> PlattParameters {
        let mut p = PlattParameters::identity();
        p.a = a;
        p.b = b;
        p
    }

    #[test]
    fn test_identity_is_near_passthrough() {
        for &p in &[0.05, 0.1, 0.25, 0.5, 0.75, 0.9] {
            let c = calibrate_probability(p, &identity());
            assert!(
                (c - p).abs() < 0.1,
                "identity calibration moved {p} to {c}"
            );
        }
    }

    #[test]
    fn test_output_clamped() {
        assert!(calibrate_probability(0.9999, &params(5.0, 3.0)) <= MAX_CALIBRATED);
        assert!(calibrate_probability(0.0001, &params(5.0, -3.0)) >= MIN_CALIBRATED);
    }

    #[test]
    fn test_non_finite_input_returns_bound() {
        assert_eq!(calibrate_probability(f64::NAN, &identity()), MIN_CALIBRATED);
        assert_eq!(
            calibrate_probability(f64::INFINITY, &identity()),
            MAX_CALIBRATED
        );
        assert_eq!(
            calibrate_probability(f64::NEG_INFINITY, &identity()),
            MIN_CALIBRATED
        );
    }

    #[test]
    fn test_field_trivial_cases() {
        assert!(calibrate_field(&[], &identity()).is_empty());
        assert_eq!(calibrate_field(&[0.37], &identity()), vec![1.0]);
    }

    #[test]
    fn test_field_sums_to_one() {
        let fields: [&[f64]; 4] = [
            &[0.4, 0.3, 0.2, 0.1],
            &[0.9, 0.9, 0.9],
            &[0.01, 0.01, 0.01, 0.01, 0.96],
            &[0.125, 0.125, 0.125, 0.125, 0.125, 0.125, 0.125, 0.125],
        ];
        for raw in fields {
            for p in [identity(), params(1.4, -0.2), params(0.6, 0.5)] {
                let out = calibrate_field(raw, &p);
                let sum: f64 = out.iter().sum();
                assert!(
                    (sum - 1.0).abs() < 0.01,
                    "field {raw:?} with ({}, {}) summed to {sum}",
                    p.a,
                    p.b
                );
            }
        }
    }

    #[test]
    fn test_field_preserves_order_under_identity() {
        let raw = [0.45, 0.25, 0.15, 0.10, 0.05];
        let out = calibrate_field(&raw, &identity());
        for w in out.windows(2) {
            assert!(w[0] >= w[1], "order broken: {out:?}");
        }
    }

    #[test]
    fn test_field_respects_bounds_after_redistribution() {
        // Steep parameters push a dominant favorite far above the ceiling
        let raw = [0.97, 0.01, 0.01, 0.01];
        let out = calibrate_field(&raw, &params(3.0, 2.0));
        for &v in &out {
            assert!(
                (MIN_CALIBRATED - 1e-9..=MAX_CALIBRATED + 1e-9).contains(&v),
                "value {v} escaped bounds in {out:?}"
            );
        }
        let sum: f64 = out.iter().sum();
        assert!((sum - 1.0).abs() < 0.01);
    }

    #[test]
    fn test_two_horse_field_all_pinned_falls_back_flat() {
        // With two entries both bounds cannot hold a sum of 1 without the
        // fallback flat renormalization
        let out = calibrate_field(&[0.999, 0.001], &params(8.0, 0.0));
        let sum: f64 = out.iter().sum();
        assert!((sum - 1.0).abs() < 0.02, "sum was {sum}");
        assert!(out[0] > out[1]);
    }
}
