//! Per-market and per-wallet snapshot scores.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Feature values and holder counts behind a market score.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MarketSignals {
    pub volume: f64,
    pub liquidity: f64,
    pub holders: f64,
    pub closing_soon: f64,
    pub concentration: f64,
    /// Mean holder score.
    pub wallet_signal: f64,
    pub conviction_wallets: u32,
    pub whale_wallets: u32,
    pub conviction_wallets_usd: u32,
    pub conviction_wallets_shares: u32,
    pub whale_wallets_usd: u32,
    pub whale_wallets_shares: u32,
    pub new_wallets: u32,
    /// At least `thresholds.convergence_min_wallets` conviction holders.
    pub convergence: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketScore {
    pub run_date: NaiveDate,
    pub market_id: String,
    pub question: Option<String>,
    pub cluster_key: String,
    pub score: f64,
    pub signals: MarketSignals,
}

/// Unit a wallet's aggregate exposure was measured in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExposureBasis {
    Usd,
    Shares,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalletSignals {
    pub exposure: f64,
    pub conviction: f64,
    pub whale: f64,
    pub new_wallet: f64,
    pub markets: u32,
    pub basis: ExposureBasis,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalletScore {
    pub run_date: NaiveDate,
    pub address: String,
    pub score: f64,
    pub signals: WalletSignals,
}
