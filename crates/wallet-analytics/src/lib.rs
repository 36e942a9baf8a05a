//! Wallet Analytics
//!
//! Concentration metrics, snapshot scores, day-over-day flow and multi-day
//! consensus over Polymarket holder snapshots.

pub mod classifier;
pub mod clusters;
pub mod consensus;
pub mod features;
pub mod flow;
pub mod market_scores;
pub mod pipeline;
pub mod ranking;
pub mod tiering;
pub mod wallet_metrics;
pub mod wallet_ranker;

pub use classifier::classify;
pub use clusters::{apply_cluster_cap, clusters_summary, wallet_top_clusters};
pub use consensus::{ConsensusEngine, PairFlow};
pub use flow::{all_position_deltas, FlowEngine, FlowInputs};
pub use market_scores::{MarketScorer, ScoreOutcome};
pub use pipeline::{
    consensus_report, flow_report, run_daily, score_report, wallet_report, DailyReport,
    WalletReport,
};
pub use ranking::stable_sorted;
pub use tiering::assign_tiers;
pub use wallet_ranker::{score_wallets, RankingOutcome};
