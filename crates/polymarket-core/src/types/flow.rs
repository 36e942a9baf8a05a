//! Day-over-day flow types: position lifecycle, wallet tiers and flow rows.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::Outcome;

/// Lifecycle state of a position between two runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PositionClass {
    /// No exposure on the prior run, exposure today.
    NewPosition,
    /// Exposure grew.
    Increase,
    /// Exposure shrank but is still open.
    Decrease,
    /// Exposure on the prior run, none today.
    Closed,
    /// Anything else, including zero on both runs.
    Unchanged,
}

impl PositionClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            PositionClass::NewPosition => "NEW_POSITION",
            PositionClass::Increase => "INCREASE",
            PositionClass::Decrease => "DECREASE",
            PositionClass::Closed => "CLOSED",
            PositionClass::Unchanged => "UNCHANGED",
        }
    }

    /// Whether this state represents added exposure.
    pub fn is_accumulation(&self) -> bool {
        matches!(self, PositionClass::NewPosition | PositionClass::Increase)
    }
}

impl std::fmt::Display for PositionClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Coarse quality band assigned from the flow ranking (A > B > C).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Tier {
    #[serde(rename = "TIER_A")]
    A,
    #[serde(rename = "TIER_B")]
    B,
    #[serde(rename = "TIER_C")]
    C,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::A => "TIER_A",
            Tier::B => "TIER_B",
            Tier::C => "TIER_C",
        }
    }

    /// TIER_A or TIER_B.
    pub fn is_high_quality(&self) -> bool {
        matches!(self, Tier::A | Tier::B)
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Change in one wallet's exposure to one market outcome between two runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionDelta {
    pub run_date: NaiveDate,
    pub address: String,
    pub market_id: String,
    pub question: Option<String>,
    pub cluster_key: String,
    pub outcome: Outcome,
    pub usd_today: f64,
    pub usd_prev: f64,
    pub delta_usd: f64,
    pub classification: PositionClass,
}

/// Per-wallet flow between a run and its prior run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowRow {
    pub address: String,
    pub total_usd_today: f64,
    pub total_usd_prev: f64,
    pub total_usd_delta: f64,
    pub markets_today: u32,
    pub markets_prev: u32,
    pub markets_delta: i64,
    pub clusters_today: u32,
    pub clusters_prev: u32,
    pub clusters_delta: i64,
    pub top_cluster_today: Option<String>,
    pub top_cluster_share_today: Option<f64>,
    pub top_cluster_delta: Option<String>,
    pub top_cluster_delta_usd: f64,
    pub new_clusters_entered_count: u32,
    /// Runs within the history lookback in which the wallet appeared.
    pub runs_seen: u32,
    /// Admitted through the large-new-wallet override rather than history.
    pub new_wallet_override: bool,
    pub score_flow: f64,
    pub tier: Tier,
}

/// Position flow re-aggregated per market.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketFlowRow {
    pub market_id: String,
    pub question: Option<String>,
    pub cluster_key: String,
    pub wallets_increasing: u32,
    pub wallets_new: u32,
    pub total_delta_usd: f64,
    pub top_wallet: Option<String>,
    pub top_wallet_delta: Option<f64>,
}

/// Output of one flow computation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FlowResult {
    pub run_date: Option<NaiveDate>,
    pub prior_run_date: Option<NaiveDate>,
    pub wallets_flow: Vec<FlowRow>,
    pub positions_flow: Vec<PositionDelta>,
    pub markets_flow: Vec<MarketFlowRow>,
}

impl FlowResult {
    /// Empty result for a run with no prior run.
    pub fn without_prior(run_date: NaiveDate) -> Self {
        Self {
            run_date: Some(run_date),
            ..Default::default()
        }
    }
}
