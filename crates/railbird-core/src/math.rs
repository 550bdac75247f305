//! Pure math and normalization helpers
//!
//! Shared by the schema, the extractor, and the Platt scaling core. All
//! functions are numerically safe on garbage input: they clamp or return
//! defaults rather than propagating NaN.

use chrono::NaiveDate;

/// Lower clamp applied before the logit transform.
pub const LOGIT_FLOOR: f64 = 0.001;
/// Upper clamp applied before the logit transform.
pub const LOGIT_CEIL: f64 = 0.999;

/// Numerically stable logistic function.
///
/// Branches on the sign of `x` so neither branch ever exponentiates a large
/// positive value.
pub fn stable_sigmoid(x: f64) -> f64 {
    if x.is_nan() {
        return 0.5;
    }
    if x >= 0.0 {
        1.0 / (1.0 + (-x).exp())
    } else {
        let e = x.exp();
        e / (1.0 + e)
    }
}

/// Log-odds transform with input clamped to `[0.001, 0.999]`.
pub fn logit(p: f64) -> f64 {
    let p = if p.is_finite() {
        p.clamp(LOGIT_FLOOR, LOGIT_CEIL)
    } else {
        LOGIT_FLOOR
    };
    (p / (1.0 - p)).ln()
}

/// Probability implied by decimal odds: `1 / (odds + 1)`.
///
/// Returns 0.0 for unknown (non-positive or non-finite) odds.
pub fn implied_probability(decimal_odds: f64) -> f64 {
    if !decimal_odds.is_finite() || decimal_odds <= 0.0 {
        return 0.0;
    }
    1.0 / (decimal_odds + 1.0)
}

/// Build the stable race identifier: `{TRACK}-{YYYY-MM-DD}-R{number}`.
pub fn race_id(track: &str, date: NaiveDate, race_number: u32) -> String {
    format!(
        "{}-{}-R{}",
        track.trim().to_uppercase(),
        date.format("%Y-%m-%d"),
        race_number
    )
}

/// Normalize a racing-form date string to a `NaiveDate`.
///
/// Accepts `YYYY-MM-DD`, `MM/DD/YYYY`, `MM/DD/YY`, and the condensed form
/// style `DDMonYY` / `DDMonYYYY` (e.g. `12May23`). Two-digit years pivot at
/// 70: 70-99 are 19xx, 00-69 are 20xx.
pub fn normalize_date(raw: &str) -> Option<NaiveDate> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }

    if let Ok(d) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Some(d);
    }

    if s.contains('/') {
        let parts: Vec<&str> = s.split('/').collect();
        if parts.len() == 3 {
            let month: u32 = parts[0].parse().ok()?;
            let day: u32 = parts[1].parse().ok()?;
            let year: i32 = parts[2].parse().ok()?;
            let year = if parts[2].len() <= 2 { pivot_year(year) } else { year };
            return NaiveDate::from_ymd_opt(year, month, day);
        }
        return None;
    }

    parse_condensed(s)
}

/// Two-digit year pivot: 70-99 map to 1970-1999, 00-69 to 2000-2069.
fn pivot_year(yy: i32) -> i32 {
    if yy >= 70 {
        1900 + yy
    } else {
        2000 + yy
    }
}

/// Parse `DDMonYY` / `DDMonYYYY`, e.g. `12May23` or `3Nov2024`.
fn parse_condensed(s: &str) -> Option<NaiveDate> {
    let day_len = s.chars().take_while(|c| c.is_ascii_digit()).count();
    if !(1..=2).contains(&day_len) {
        return None;
    }
    let day: u32 = s[..day_len].parse().ok()?;

    let rest = &s[day_len..];
    if rest.len() < 5 {
        return None;
    }
    // Slicing panics when byte 3 falls inside a multi-byte character, so
    // split with get() and treat a bad boundary as unparseable.
    let month = match rest.get(..3)?.to_lowercase().as_str() {
        "jan" => 1,
        "feb" => 2,
        "mar" => 3,
        "apr" => 4,
        "may" => 5,
        "jun" => 6,
        "jul" => 7,
        "aug" => 8,
        "sep" => 9,
        "oct" => 10,
        "nov" => 11,
        "dec" => 12,
        _ => return None,
    };

    let year_part = rest.get(3..)?;
    let year: i32 = year_part.parse().ok()?;
    let year = if year_part.len() <= 2 { pivot_year(year) } else { year };

    NaiveDate::from_ymd_opt(year, month, day)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sigmoid_logit_round_trip() {
        let mut p = 0.002;
        while p < 0.999 {
            let back = stable_sigmoid(logit(p));
            assert!((back - p).abs() < 1e-3, "round trip failed at p={p}: {back}");
            p += 0.007;
        }
    }

    #[test]
    fn test_sigmoid_extremes() {
        assert_eq!(stable_sigmoid(f64::INFINITY), 1.0);
        assert_eq!(stable_sigmoid(f64::NEG_INFINITY), 0.0);
        assert!((stable_sigmoid(1000.0) - 1.0).abs() < 1e-12);
        assert!(stable_sigmoid(-1000.0).abs() < 1e-12);
        assert_eq!(stable_sigmoid(f64::NAN), 0.5);
        assert!((stable_sigmoid(0.0) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_logit_clamps_garbage() {
        assert!(logit(0.0).is_finite());
        assert!(logit(1.0).is_finite());
        assert!(logit(-5.0).is_finite());
        assert!(logit(f64::NAN).is_finite());
        assert!((logit(0.5)).abs() < 1e-12);
    }

    #[test]
    fn test_implied_probability() {
        assert!((implied_probability(1.0) - 0.5).abs() < 1e-12);
        assert!((implied_probability(3.0) - 0.25).abs() < 1e-12);
        assert_eq!(implied_probability(0.0), 0.0);
        assert_eq!(implied_probability(-2.0), 0.0);
        assert_eq!(implied_probability(f64::NAN), 0.0);
    }

    #[test]
    fn test_race_id_format() {
        let date = NaiveDate::from_ymd_opt(2025, 3, 9).unwrap();
        assert_eq!(race_id(" sa ", date, 7), "SA-2025-03-09-R7");
    }

    #[test]
    fn test_normalize_date_formats() {
        let expected = NaiveDate::from_ymd_opt(2023, 5, 12).unwrap();
        assert_eq!(normalize_date("2023-05-12"), Some(expected));
        assert_eq!(normalize_date("05/12/2023"), Some(expected));
        assert_eq!(normalize_date("05/12/23"), Some(expected));
        assert_eq!(normalize_date("12May23"), Some(expected));
        assert_eq!(normalize_date("12MAY2023"), Some(expected));
    }

    #[test]
    fn test_normalize_date_pivot() {
        assert_eq!(
            normalize_date("01/15/70"),
            NaiveDate::from_ymd_opt(1970, 1, 15)
        );
        assert_eq!(
            normalize_date("01/15/69"),
            NaiveDate::from_ymd_opt(2069, 1, 15)
        );
        assert_eq!(
            normalize_date("3Nov99"),
            NaiveDate::from_ymd_opt(1999, 11, 3)
        );
    }

    #[test]
    fn test_normalize_date_rejects_garbage() {
        assert_eq!(normalize_date(""), None);
        assert_eq!(normalize_date("not a date"), None);
        assert_eq!(normalize_date("13/45/2023"), None);
        assert_eq!(normalize_date("12Xyz23"), None);
        // Multi-byte characters in the month slot must not panic the slicer.
        assert_eq!(normalize_date("1aaä23"), None);
        assert_eq!(normalize_date("12Mäy23"), None);
        assert_eq!(normalize_date("12Maÿ23"), None);
    }
}
