//! Single-day wallet filtering and scoring.

use std::collections::{BTreeMap, HashSet};

use polymarket_core::config::{WalletFilters, WalletRanking};
use polymarket_core::types::{
    ExcludedWallet, ExclusionReason, HolderRecord, MarketContext, RankedWallet, WalletMetric,
    WalletPosition,
};

use crate::features::{log_norm, safe_float, weighted_sum};
use crate::ranking::stable_sorted;

/// Ranked and excluded wallets for one run.
#[derive(Debug, Clone, Default)]
pub struct RankingOutcome {
    /// Sorted by score desc, then address.
    pub ranked: Vec<RankedWallet>,
    /// Sorted by total_usd desc, then address.
    pub excluded: Vec<ExcludedWallet>,
}

/// Split metrics into ranked and excluded wallets.
pub fn score_wallets(
    metrics: &[WalletMetric],
    filters: &WalletFilters,
    weights: &WalletRanking,
) -> RankingOutcome {
    let mut ranked = Vec::new();
    let mut excluded = Vec::new();

    for metric in metrics {
        let reasons = filter_reasons(metric, filters);
        if reasons.is_empty() {
            ranked.push(RankedWallet {
                score_wallet: wallet_score(metric, weights),
                metric: metric.clone(),
            });
        } else {
            excluded.push(ExcludedWallet {
                metric: metric.clone(),
                reasons,
            });
        }
    }

    RankingOutcome {
        ranked: stable_sorted(ranked, |w| w.score_wallet, true, |w| {
            w.metric.address.clone()
        }),
        excluded: stable_sorted(excluded, |w| w.metric.total_usd, true, |w| {
            w.metric.address.clone()
        }),
    }
}

/// Every filter the metric fails. Absent shares fail their cap; absent
/// sidedness passes.
pub fn filter_reasons(metric: &WalletMetric, filters: &WalletFilters) -> Vec<ExclusionReason> {
    let exceeds = |value: Option<f64>, cap: f64| value.map_or(true, |v| v > cap);
    let mut reasons = Vec::new();

    if metric.total_usd < filters.min_total_usd || metric.total_usd.is_nan() {
        reasons.push(ExclusionReason::MinTotalUsd);
    }
    if metric.markets_count < filters.min_markets {
        reasons.push(ExclusionReason::MinMarkets);
    }
    if metric.clusters_count < filters.min_clusters {
        reasons.push(ExclusionReason::MinClusters);
    }
    if exceeds(metric.top_cluster_share, filters.max_top_cluster_share) {
        reasons.push(ExclusionReason::MaxTopClusterShare);
    }
    if exceeds(metric.top_market_share, filters.max_top_market_share) {
        reasons.push(ExclusionReason::MaxTopMarketShare);
    }
    if exceeds(metric.hhi_clusters, filters.max_hhi_clusters) {
        reasons.push(ExclusionReason::MaxHhiClusters);
    }
    if metric.sidedness.is_some_and(|s| s > filters.max_sidedness) {
        reasons.push(ExclusionReason::MaxSidedness);
    }
    reasons
}

/// Weighted wallet score. Absent shares count as fully concentrated (1.0),
/// absent sidedness as balanced (0.0).
pub fn wallet_score(metric: &WalletMetric, weights: &WalletRanking) -> f64 {
    let top_cluster_share = safe_float(metric.top_cluster_share, 1.0);
    let hhi_clusters = safe_float(metric.hhi_clusters, 1.0);
    let top_market_share = safe_float(metric.top_market_share, 1.0);
    let hhi_markets = safe_float(metric.hhi_markets, 1.0);
    let sidedness = safe_float(metric.sidedness, 0.0);

    let features = [
        ("total_usd_log", log_norm(metric.total_usd)),
        ("markets", metric.markets_count as f64),
        ("clusters", metric.clusters_count as f64),
        (
            "diversity_bonus",
            (1.0 - top_cluster_share) + (1.0 - hhi_clusters),
        ),
        ("concentration_penalty", hhi_markets + top_market_share),
        ("sidedness_penalty", sidedness),
    ];
    let coefficients = [
        ("total_usd_log", weights.w_total_usd_log),
        ("markets", weights.w_markets),
        ("clusters", weights.w_clusters),
        ("diversity_bonus", weights.w_diversity_bonus),
        ("concentration_penalty", weights.w_concentration_penalty),
        ("sidedness_penalty", weights.w_sidedness_penalty),
    ];
    weighted_sum(&features, &coefficients)
}

/// Largest positions of the given wallets, `top_n` per wallet.
///
/// Wallets are emitted in address order; positions by value desc, then market.
pub fn wallet_positions(
    holders: &[HolderRecord],
    context: &MarketContext,
    addresses: &[&str],
    top_n: usize,
) -> Vec<WalletPosition> {
    let wanted: HashSet<&str> = addresses.iter().copied().filter(|a| !a.is_empty()).collect();
    let mut per_wallet: BTreeMap<&str, Vec<WalletPosition>> = BTreeMap::new();

    for row in holders {
        if !wanted.contains(row.address.as_str()) {
            continue;
        }
        per_wallet
            .entry(&row.address)
            .or_default()
            .push(WalletPosition {
                address: row.address.clone(),
                market_id: row.market_id.clone(),
                question: context.question(&row.market_id).map(str::to_string),
                cluster_key: context.cluster_key(&row.market_id).to_string(),
                outcome: row.outcome.clone(),
                value_usd: row.value(),
            });
    }

    per_wallet
        .into_values()
        .flat_map(|positions| {
            stable_sorted(positions, |p| p.value_usd, true, |p| {
                (p.market_id.clone(), p.outcome.clone())
            })
            .into_iter()
            .take(top_n)
        })
        .collect()
}
