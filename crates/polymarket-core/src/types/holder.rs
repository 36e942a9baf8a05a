//! Holder snapshot rows.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Normalized outcome label of a holder position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Outcome {
    Yes,
    No,
    Unknown,
}

impl Outcome {
    /// Normalize a raw outcome label (case-insensitive, trimmed).
    pub fn normalize(raw: &str) -> Self {
        let text = raw.trim();
        if text.eq_ignore_ascii_case("yes") {
            Outcome::Yes
        } else if text.eq_ignore_ascii_case("no") {
            Outcome::No
        } else {
            Outcome::Unknown
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Yes => "Yes",
            Outcome::No => "No",
            Outcome::Unknown => "Unknown",
        }
    }
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One wallet's exposure to one market outcome on one run date.
///
/// Rows are superseded by the next run's row with the same
/// `(market_id, address, outcome)` key, never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HolderRecord {
    pub run_date: NaiveDate,
    pub market_id: String,
    pub address: String,
    /// Raw outcome label as reported upstream.
    pub outcome: String,
    /// Dollar value of the position; `None` when no price was available.
    pub value_usd: Option<f64>,
    /// Share count as reported upstream, if any.
    #[serde(default)]
    pub shares: Option<f64>,
    /// Wallet first seen within `thresholds.new_wallet_days` of the run.
    #[serde(default)]
    pub is_new_wallet: bool,
}

impl HolderRecord {
    pub fn new(
        run_date: NaiveDate,
        market_id: impl Into<String>,
        address: impl Into<String>,
        outcome: impl Into<String>,
        value_usd: f64,
    ) -> Self {
        Self {
            run_date,
            market_id: market_id.into(),
            address: address.into(),
            outcome: outcome.into(),
            value_usd: Some(value_usd),
            shares: None,
            is_new_wallet: false,
        }
    }

    pub fn with_shares(mut self, shares: f64) -> Self {
        self.shares = Some(shares);
        self
    }

    pub fn new_wallet(mut self) -> Self {
        self.is_new_wallet = true;
        self
    }

    /// Scoring exposure: the dollar value when known, else the share count.
    pub fn exposure(&self) -> f64 {
        match (self.value_usd, self.shares) {
            (Some(v), _) if v.is_finite() => v,
            (None, Some(s)) if s.is_finite() => s,
            _ => 0.0,
        }
    }

    /// Position value with absent or non-finite values coerced to zero.
    pub fn value(&self) -> f64 {
        match self.value_usd {
            Some(v) if v.is_finite() => v,
            _ => 0.0,
        }
    }

    pub fn normalized_outcome(&self) -> Outcome {
        Outcome::normalize(&self.outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_normalization() {
        assert_eq!(Outcome::normalize(" YES "), Outcome::Yes);
        assert_eq!(Outcome::normalize("no"), Outcome::No);
        assert_eq!(Outcome::normalize("Trump"), Outcome::Unknown);
        assert_eq!(Outcome::normalize(""), Outcome::Unknown);
    }

    #[test]
    fn test_value_coercion() {
        let date = NaiveDate::from_ymd_opt(2026, 1, 7).unwrap();
        let mut row = HolderRecord::new(date, "m1", "0xabc", "Yes", 12.5);
        assert_eq!(row.value(), 12.5);

        row.value_usd = None;
        assert_eq!(row.value(), 0.0);

        row.value_usd = Some(f64::NAN);
        assert_eq!(row.value(), 0.0);
    }

    #[test]
    fn test_exposure_falls_back_to_shares() {
        let date = NaiveDate::from_ymd_opt(2026, 1, 7).unwrap();
        let priced = HolderRecord::new(date, "m1", "0xabc", "Yes", 40.0).with_shares(100.0);
        assert_eq!(priced.exposure(), 40.0);

        let mut unpriced = priced.clone();
        unpriced.value_usd = None;
        assert_eq!(unpriced.exposure(), 100.0);

        unpriced.shares = None;
        assert_eq!(unpriced.exposure(), 0.0);
    }
}
