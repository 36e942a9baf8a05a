//! Numeric helpers shared by the scoring engines.
//!
//! Every helper is total: missing or non-finite inputs fall back to a
//! default instead of propagating NaN into scores.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

/// Coerce an optional value to a finite float.
pub fn safe_float(value: Option<f64>, default: f64) -> f64 {
    match value {
        Some(v) if v.is_finite() => v,
        _ => default,
    }
}

/// `ln(1 + max(value, 0))`, used to compress dollar amounts.
pub fn log_norm(value: f64) -> f64 {
    safe_float(Some(value), 0.0).max(0.0).ln_1p()
}

/// Herfindahl-Hirschman index over positive exposures; 0.0 when none.
pub fn hhi_concentration<I>(exposures: I) -> f64
where
    I: IntoIterator<Item = f64>,
{
    let cleaned: Vec<f64> = exposures.into_iter().filter(|v| *v > 0.0).collect();
    let total: f64 = cleaned.iter().sum();
    hhi(cleaned, total).unwrap_or(0.0)
}

/// Sum of squared shares of `total` over values > 0; absent when `total <= 0`.
pub fn hhi<I>(values: I, total: f64) -> Option<f64>
where
    I: IntoIterator<Item = f64>,
{
    if total <= 0.0 || !total.is_finite() {
        return None;
    }
    Some(
        values
            .into_iter()
            .filter(|v| *v > 0.0)
            .map(|v| (v / total).powi(2))
            .sum(),
    )
}

/// Largest value as a share of `total`; absent when `total <= 0`.
pub fn share_of_max<I>(values: I, total: f64) -> Option<f64>
where
    I: IntoIterator<Item = f64>,
{
    if total <= 0.0 || !total.is_finite() {
        return None;
    }
    let max = values.into_iter().fold(0.0_f64, f64::max);
    Some(max / total)
}

/// `numerator / denominator`; absent when `denominator <= 0`.
pub fn ratio(numerator: f64, denominator: f64) -> Option<f64> {
    if denominator <= 0.0 || !denominator.is_finite() {
        return None;
    }
    Some(numerator / denominator)
}

/// Parse an upstream timestamp.
///
/// Accepts RFC 3339, naive ISO date-times (taken as UTC), plain
/// `YYYY-MM-DD` dates and numeric epoch seconds.
pub fn parse_datetime(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(naive.and_utc());
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return date.and_hms_opt(0, 0, 0).map(|naive| naive.and_utc());
    }
    raw.parse::<f64>()
        .ok()
        .filter(|secs| secs.is_finite())
        .and_then(|secs| DateTime::from_timestamp(secs as i64, 0))
}

/// Whole days from `run_date` until a market closes, floored at zero.
pub fn days_until_close(close_time: Option<&str>, run_date: NaiveDate) -> Option<i64> {
    let close = parse_datetime(close_time?)?;
    Some((close.date_naive() - run_date).num_days().max(0))
}

/// Dot product of named features and weights; missing features count as zero.
pub fn weighted_sum(features: &[(&str, f64)], weights: &[(&str, f64)]) -> f64 {
    weights
        .iter()
        .map(|(name, weight)| {
            let value = features
                .iter()
                .find(|(feature, _)| feature == name)
                .map(|(_, v)| *v)
                .unwrap_or(0.0);
            value * weight
        })
        .sum()
}
