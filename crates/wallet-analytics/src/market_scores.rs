//! Snapshot scoring of markets and their holders.
//!
//! A market scores on its own features (volume, liquidity, holder count,
//! closeness to resolution, holder dispersion) plus the mean score of its
//! holders. Each holder is flagged as a conviction or whale position by USD
//! value, or by share count when no price was available.

use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::NaiveDate;
use polymarket_core::config::{AppConfig, MarketFilters, ScoreWeights, Thresholds};
use polymarket_core::types::{
    ExposureBasis, HolderRecord, MarketInfo, MarketScore, MarketSignals, WalletScore,
    WalletSignals,
};
use serde::Serialize;
use tracing::debug;

use crate::features::{days_until_close, hhi_concentration, log_norm, weighted_sum};
use crate::ranking::stable_sorted;

/// Scores of one run, each list ranked by score desc then id.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ScoreOutcome {
    pub markets: Vec<MarketScore>,
    pub wallets: Vec<WalletScore>,
}

#[derive(Debug, Default)]
struct WalletTotals<'a> {
    value_usd: f64,
    shares: f64,
    markets: HashSet<&'a str>,
    new_wallet: bool,
}

fn flag(hit: bool) -> f64 {
    if hit {
        1.0
    } else {
        0.0
    }
}

fn named(weights: &BTreeMap<String, f64>) -> Vec<(&str, f64)> {
    weights.iter().map(|(name, w)| (name.as_str(), *w)).collect()
}

#[derive(Debug, Clone)]
pub struct MarketScorer {
    filters: MarketFilters,
    thresholds: Thresholds,
    weights: ScoreWeights,
}

impl MarketScorer {
    pub fn new(filters: MarketFilters, thresholds: Thresholds, weights: ScoreWeights) -> Self {
        Self {
            filters,
            thresholds,
            weights,
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(
            config.market_filters.clone(),
            config.thresholds.clone(),
            config.weights.clone(),
        )
    }

    /// 1.0 at close, falling linearly to 0.0 at `days_to_close` days out.
    pub fn closing_soon(&self, days_to_close: Option<i64>) -> f64 {
        let horizon = self.filters.days_to_close;
        match days_to_close {
            Some(days) if horizon > 0 => 1.0 - (days as f64 / horizon as f64).min(1.0),
            _ => 0.0,
        }
    }

    /// (conviction, whale) flags of one holder row.
    fn holder_flags(&self, row: &HolderRecord) -> (bool, bool) {
        let t = &self.thresholds;
        match (row.value_usd, row.shares) {
            (Some(usd), _) => (usd >= t.conviction_exposure_usd, usd >= t.whale_exposure_usd),
            (None, Some(shares)) => (
                shares >= t.conviction_exposure_shares,
                shares >= t.whale_exposure_shares,
            ),
            (None, None) => (false, false),
        }
    }

    pub fn compute(
        &self,
        run_date: NaiveDate,
        markets: &[MarketInfo],
        holders: &[HolderRecord],
    ) -> ScoreOutcome {
        let mut by_market: HashMap<&str, Vec<&HolderRecord>> = HashMap::new();
        for row in holders {
            by_market.entry(row.market_id.as_str()).or_default().push(row);
        }
        // Fixed row order keeps float sums independent of input order.
        for rows in by_market.values_mut() {
            rows.sort_by(|a, b| (&a.address, &a.outcome).cmp(&(&b.address, &b.outcome)));
        }

        let market_weights = named(&self.weights.market);
        let wallet_weights = named(&self.weights.wallet);
        let mut totals: BTreeMap<&str, WalletTotals<'_>> = BTreeMap::new();
        let mut market_scores = Vec::with_capacity(markets.len());

        let mut ordered: Vec<&MarketInfo> = markets.iter().collect();
        ordered.sort_by(|a, b| a.market_id.cmp(&b.market_id));

        for market in ordered {
            let rows = by_market
                .get(market.market_id.as_str())
                .map(Vec::as_slice)
                .unwrap_or(&[]);

            let hhi = hhi_concentration(rows.iter().map(|r| r.exposure()));
            let days = days_until_close(market.close_time.as_deref(), run_date);
            let mut signals = MarketSignals {
                volume: log_norm(market.volume_usd),
                liquidity: log_norm(market.liquidity_usd),
                holders: log_norm(rows.len() as f64),
                closing_soon: self.closing_soon(days),
                concentration: 1.0 - hhi,
                ..MarketSignals::default()
            };
            let market_score = weighted_sum(
                &[
                    ("volume", signals.volume),
                    ("liquidity", signals.liquidity),
                    ("holders", signals.holders),
                    ("closing_soon", signals.closing_soon),
                    ("concentration", signals.concentration),
                ],
                &market_weights,
            );

            let mut holder_score_sum = 0.0;
            for row in rows {
                let (conviction, whale) = self.holder_flags(row);
                let usd_basis = row.value_usd.is_some();
                match (conviction, usd_basis) {
                    (true, true) => signals.conviction_wallets_usd += 1,
                    (true, false) => signals.conviction_wallets_shares += 1,
                    _ => {}
                }
                match (whale, usd_basis) {
                    (true, true) => signals.whale_wallets_usd += 1,
                    (true, false) => signals.whale_wallets_shares += 1,
                    _ => {}
                }
                if row.is_new_wallet {
                    signals.new_wallets += 1;
                }

                holder_score_sum += weighted_sum(
                    &[
                        ("exposure", log_norm(row.exposure())),
                        ("conviction", flag(conviction)),
                        ("whale", flag(whale)),
                        ("new_wallet", flag(row.is_new_wallet)),
                    ],
                    &wallet_weights,
                );

                if row.address.is_empty() {
                    continue;
                }
                let wallet = totals.entry(row.address.as_str()).or_default();
                match (row.value_usd, row.shares) {
                    (Some(usd), _) => wallet.value_usd += usd,
                    (None, Some(shares)) => wallet.shares += shares,
                    (None, None) => {}
                }
                wallet.markets.insert(market.market_id.as_str());
                wallet.new_wallet |= row.is_new_wallet;
            }

            signals.wallet_signal = if rows.is_empty() {
                0.0
            } else {
                holder_score_sum / rows.len() as f64
            };
            signals.conviction_wallets =
                signals.conviction_wallets_usd + signals.conviction_wallets_shares;
            signals.whale_wallets = signals.whale_wallets_usd + signals.whale_wallets_shares;
            signals.convergence =
                signals.conviction_wallets >= self.thresholds.convergence_min_wallets;

            market_scores.push(MarketScore {
                run_date,
                market_id: market.market_id.clone(),
                question: market.question.clone(),
                cluster_key: market.cluster_key.clone(),
                score: market_score + signals.wallet_signal,
                signals,
            });
        }

        let wallet_scores: Vec<WalletScore> = totals
            .into_iter()
            .map(|(address, wallet)| self.score_wallet(run_date, address, &wallet, &wallet_weights))
            .collect();

        let markets = stable_sorted(market_scores, |m| m.score, true, |m| m.market_id.clone());
        let wallets = stable_sorted(wallet_scores, |w| w.score, true, |w| w.address.clone());
        debug!(
            run_date = %run_date,
            markets = markets.len(),
            wallets = wallets.len(),
            "Scored snapshot"
        );
        ScoreOutcome { markets, wallets }
    }

    fn score_wallet(
        &self,
        run_date: NaiveDate,
        address: &str,
        wallet: &WalletTotals<'_>,
        weights: &[(&str, f64)],
    ) -> WalletScore {
        let t = &self.thresholds;
        let (basis, exposure, conviction_at, whale_at) = if wallet.value_usd > 0.0 {
            (
                ExposureBasis::Usd,
                wallet.value_usd,
                t.conviction_exposure_usd,
                t.whale_exposure_usd,
            )
        } else {
            (
                ExposureBasis::Shares,
                wallet.shares,
                t.conviction_exposure_shares,
                t.whale_exposure_shares,
            )
        };

        let signals = WalletSignals {
            exposure: log_norm(exposure),
            conviction: flag(exposure >= conviction_at),
            whale: flag(exposure >= whale_at),
            new_wallet: flag(wallet.new_wallet),
            markets: wallet.markets.len() as u32,
            basis,
        };
        let score = weighted_sum(
            &[
                ("exposure", signals.exposure),
                ("conviction", signals.conviction),
                ("whale", signals.whale),
                ("new_wallet", signals.new_wallet),
            ],
            weights,
        );

        WalletScore {
            run_date,
            address: address.to_string(),
            score,
            signals,
        }
    }
}
