//! Multi-day consensus outputs.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::{Outcome, PositionClass, Tier};

/// Independent accumulation of one market outcome by several wallets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsensusEntry {
    pub market_id: String,
    pub outcome: Outcome,
    pub question: Option<String>,
    pub cluster_key: String,
    pub wallets_supporting: u32,
    pub wallets_new: u32,
    pub wallets_increasing: u32,
    #[serde(rename = "tiers_A")]
    pub tiers_a: u32,
    #[serde(rename = "tiers_B")]
    pub tiers_b: u32,
    pub total_delta_usd: f64,
    pub total_new_usd: f64,
    pub total_increase_usd: f64,
    pub top_wallet: Option<String>,
    pub top_wallet_delta: f64,
    pub top_wallet_share: f64,
    pub score_consensus: f64,
    /// Qualified only under the relaxed fallback threshold.
    pub fallback: bool,
}

/// A wallet supporting a consensus entry, summed across the window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsensusWallet {
    pub market_id: String,
    pub outcome: Outcome,
    pub address: String,
    pub tier: Tier,
    pub delta_usd: f64,
    pub classification: PositionClass,
}

/// Counters describing how candidates fell through the consensus filters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsensusDiagnostics {
    pub candidate_rows: u32,
    pub candidate_flow_wallets_a_b: u32,
    pub unique_candidate_keys: u32,
    pub keys_meeting_min_wallets: u32,
    pub keys_meeting_min_total_delta: u32,
    pub qualified_keys: u32,
    pub fallback_used: bool,
}

/// Output of one consensus computation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConsensusResult {
    pub run_date: Option<NaiveDate>,
    /// Oldest prior run covered by the lookback window.
    pub prior_run_date: Option<NaiveDate>,
    pub lookback_days: u32,
    pub entries: Vec<ConsensusEntry>,
    pub wallets: Vec<ConsensusWallet>,
    pub diagnostics: ConsensusDiagnostics,
}
