//! Per-wallet concentration metrics and ranking outputs.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Concentration, diversity and sidedness metrics for one wallet on one run.
///
/// Ratios with a non-positive denominator are `None`, never zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalletMetric {
    pub run_date: NaiveDate,
    pub address: String,
    pub total_usd: f64,
    pub markets_count: u32,
    pub clusters_count: u32,
    pub top_cluster_share: Option<f64>,
    pub top_market_share: Option<f64>,
    pub hhi_markets: Option<f64>,
    pub hhi_clusters: Option<f64>,
    pub yes_usd: f64,
    pub no_usd: f64,
    pub yes_share: Option<f64>,
    /// 0 = perfectly balanced yes/no, 1 = fully one-sided.
    pub sidedness: Option<f64>,
}

/// Why a wallet was excluded from the ranked list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExclusionReason {
    MinTotalUsd,
    MinMarkets,
    MinClusters,
    MaxTopClusterShare,
    MaxTopMarketShare,
    MaxHhiClusters,
    MaxSidedness,
}

impl ExclusionReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExclusionReason::MinTotalUsd => "min_total_usd",
            ExclusionReason::MinMarkets => "min_markets",
            ExclusionReason::MinClusters => "min_clusters",
            ExclusionReason::MaxTopClusterShare => "max_top_cluster_share",
            ExclusionReason::MaxTopMarketShare => "max_top_market_share",
            ExclusionReason::MaxHhiClusters => "max_hhi_clusters",
            ExclusionReason::MaxSidedness => "max_sidedness",
        }
    }
}

impl std::fmt::Display for ExclusionReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A wallet that passed every filter, with its score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedWallet {
    #[serde(flatten)]
    pub metric: WalletMetric,
    pub score_wallet: f64,
}

/// A wallet that failed one or more filters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExcludedWallet {
    #[serde(flatten)]
    pub metric: WalletMetric,
    pub reasons: Vec<ExclusionReason>,
}

/// One of a ranked wallet's largest positions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalletPosition {
    pub address: String,
    pub market_id: String,
    pub question: Option<String>,
    pub cluster_key: String,
    pub outcome: String,
    pub value_usd: f64,
}

/// Holder exposure aggregated per cluster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterSummary {
    pub cluster_key: String,
    pub markets_in_cluster: u32,
    pub total_holder_usd: f64,
    pub wallets: u32,
    pub top_wallet: Option<String>,
    pub top_wallet_usd: Option<f64>,
}
