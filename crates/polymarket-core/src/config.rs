//! Configuration management for the insider analytics system.
//!
//! Values are layered: built-in defaults, then an optional TOML file, then
//! `INSIDER__SECTION__KEY` environment variables.

use crate::{Error, Result};
use chrono::{Local, NaiveDate};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

/// Default configuration file looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "insider.toml";

/// Application configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub run: RunConfig,
    pub database: DatabaseConfig,
    pub market_filters: MarketFilters,
    pub thresholds: Thresholds,
    pub weights: ScoreWeights,
    pub wallet_filters: WalletFilters,
    pub wallet_ranking: WalletRanking,
    pub diversity: DiversityConfig,
    pub report: ReportConfig,
    pub flow: FlowConfig,
    pub consensus: ConsensusConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Label stored with each run.
    pub timezone: String,
    /// Fixed run date (`YYYY-MM-DD`) instead of today.
    pub date_override: Option<String>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            timezone: "America/New_York".to_string(),
            date_override: None,
        }
    }
}

impl RunConfig {
    /// The run date: `cli_date`, then `date_override`, then today's local date.
    #[allow(clippy::result_large_err)]
    pub fn resolve_run_date(&self, cli_date: Option<&str>) -> Result<NaiveDate> {
        match cli_date.or(self.date_override.as_deref()) {
            Some(raw) => NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
                .map_err(|_| Error::InvalidRunDate(raw.to_string())),
            None => Ok(Local::now().date_naive()),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://data/polymarket_insider.sqlite".to_string(),
            max_connections: 5,
        }
    }
}

/// Markets kept at import time.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MarketFilters {
    /// Markets closing later than this are skipped; also the horizon of
    /// the `closing_soon` market feature.
    pub days_to_close: i64,
    pub min_volume: f64,
    pub min_liquidity: f64,
}

impl Default for MarketFilters {
    fn default() -> Self {
        Self {
            days_to_close: 60,
            min_volume: 0.0,
            min_liquidity: 0.0,
        }
    }
}

/// Holder flag thresholds used by market and wallet scoring.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    pub new_wallet_days: i64,
    pub conviction_exposure_usd: f64,
    pub whale_exposure_usd: f64,
    pub conviction_exposure_shares: f64,
    pub whale_exposure_shares: f64,
    pub convergence_min_wallets: u32,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            new_wallet_days: 14,
            conviction_exposure_usd: 2000.0,
            whale_exposure_usd: 20000.0,
            conviction_exposure_shares: 1000.0,
            whale_exposure_shares: 5000.0,
            convergence_min_wallets: 3,
        }
    }
}

/// Named feature weights for market and wallet scores.
///
/// Market features: `volume`, `liquidity`, `holders`, `closing_soon`,
/// `concentration`. Wallet features: `exposure`, `conviction`, `whale`,
/// `new_wallet`. Unknown names weigh a feature that is always zero.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScoreWeights {
    pub market: BTreeMap<String, f64>,
    pub wallet: BTreeMap<String, f64>,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        let named = |pairs: &[(&str, f64)]| {
            pairs
                .iter()
                .map(|(name, weight)| (name.to_string(), *weight))
                .collect()
        };
        Self {
            market: named(&[
                ("volume", 1.0),
                ("liquidity", 0.5),
                ("holders", 0.5),
                ("closing_soon", 1.0),
                ("concentration", 1.0),
            ]),
            wallet: named(&[
                ("exposure", 0.5),
                ("conviction", 1.0),
                ("whale", 1.5),
                ("new_wallet", 1.0),
            ]),
        }
    }
}

/// Thresholds a wallet must meet to be ranked.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WalletFilters {
    pub min_total_usd: f64,
    pub min_markets: u32,
    pub min_clusters: u32,
    pub max_top_cluster_share: f64,
    pub max_top_market_share: f64,
    pub max_hhi_clusters: f64,
    pub max_sidedness: f64,
}

impl Default for WalletFilters {
    fn default() -> Self {
        Self {
            min_total_usd: 5000.0,
            min_markets: 3,
            min_clusters: 2,
            max_top_cluster_share: 0.7,
            max_top_market_share: 0.5,
            max_hhi_clusters: 0.65,
            max_sidedness: 0.9,
        }
    }
}

/// Coefficients of the single-day wallet score. Penalties are negative.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WalletRanking {
    pub w_total_usd_log: f64,
    pub w_markets: f64,
    pub w_clusters: f64,
    pub w_diversity_bonus: f64,
    pub w_concentration_penalty: f64,
    pub w_sidedness_penalty: f64,
}

impl Default for WalletRanking {
    fn default() -> Self {
        Self {
            w_total_usd_log: 1.0,
            w_markets: 0.4,
            w_clusters: 0.8,
            w_diversity_bonus: 1.2,
            w_concentration_penalty: -1.0,
            w_sidedness_penalty: -0.4,
        }
    }
}

/// Per-cluster caps applied when selecting report lists.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DiversityConfig {
    pub enabled: bool,
    pub max_per_cluster_top50: usize,
    pub max_per_cluster_watchlist: usize,
}

impl Default for DiversityConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_per_cluster_top50: 10,
            max_per_cluster_watchlist: 8,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    pub top_wallets: usize,
    pub top_positions_per_wallet: usize,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            top_wallets: 15,
            top_positions_per_wallet: 5,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FlowWeights {
    pub w_flow_delta: f64,
    pub w_new_clusters: f64,
    pub w_cluster_delta: f64,
    pub w_concentration_penalty: f64,
}

impl Default for FlowWeights {
    fn default() -> Self {
        Self {
            w_flow_delta: 1.0,
            w_new_clusters: 0.8,
            w_cluster_delta: 0.3,
            w_concentration_penalty: 1.2,
        }
    }
}

/// Bands partitioning the ranked flow list into tiers.
///
/// Fractions are cumulative shares of the ranked list: with the defaults the
/// top 20% are TIER_A candidates and the top 50% are TIER_B candidates.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TierBands {
    pub tier_a_fraction: f64,
    pub tier_b_fraction: f64,
    pub tier_a_min_score: f64,
    pub tier_b_min_score: f64,
}

impl Default for TierBands {
    fn default() -> Self {
        Self {
            tier_a_fraction: 0.2,
            tier_b_fraction: 0.5,
            tier_a_min_score: 0.0,
            tier_b_min_score: 0.0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FlowConfig {
    /// Runs (within `lookback_runs`) a wallet must appear in to be ranked.
    pub min_runs_seen: u32,
    pub lookback_runs: u32,
    /// Wallets below `min_runs_seen` are still ranked at or above this total.
    pub override_total_usd_today_for_new_wallet: f64,
    pub min_total_usd_today: f64,
    pub min_total_delta_usd: f64,
    pub min_position_delta_usd: f64,
    pub min_new_position_usd: f64,
    pub max_top_cluster_share_today: f64,
    pub top_wallets: usize,
    pub top_positions_per_wallet: usize,
    pub weights: FlowWeights,
    pub tiers: TierBands,
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            min_runs_seen: 1,
            lookback_runs: 5,
            override_total_usd_today_for_new_wallet: 25000.0,
            min_total_usd_today: 5000.0,
            min_total_delta_usd: 2000.0,
            min_position_delta_usd: 1000.0,
            min_new_position_usd: 1500.0,
            max_top_cluster_share_today: 0.6,
            top_wallets: 25,
            top_positions_per_wallet: 10,
            weights: FlowWeights::default(),
            tiers: TierBands::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ConsensusWeights {
    pub w_total_delta: f64,
    pub w_wallets: f64,
    pub w_new: f64,
    #[serde(alias = "w_tierA")]
    pub w_tier_a: f64,
    pub w_concentration_penalty: f64,
}

impl Default for ConsensusWeights {
    fn default() -> Self {
        Self {
            w_total_delta: 1.0,
            w_wallets: 1.0,
            w_new: 0.5,
            w_tier_a: 0.5,
            w_concentration_penalty: 2.0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ConsensusConfig {
    /// Number of consecutive run pairs aggregated.
    pub lookback_days: u32,
    pub min_wallets: u32,
    #[serde(alias = "require_tierA_or_B")]
    pub require_tier_a_or_b: bool,
    pub min_position_delta_usd: f64,
    pub min_total_delta_usd: f64,
    pub max_top_wallet_share: f64,
    pub top_n: usize,
    /// Remove entries above `max_top_wallet_share` instead of only penalizing them.
    pub drop_over_concentrated: bool,
    /// When no bucket meets both `min_wallets` and `min_total_delta_usd`,
    /// return buckets meeting `min_wallets` and
    /// `fallback_min_total_delta_usd` instead, flagged `fallback`.
    /// Off by default so qualification stays strict.
    pub fallback_enabled: bool,
    pub fallback_min_total_delta_usd: f64,
    pub weights: ConsensusWeights,
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        Self {
            lookback_days: 3,
            min_wallets: 2,
            require_tier_a_or_b: true,
            min_position_delta_usd: 1000.0,
            min_total_delta_usd: 3000.0,
            max_top_wallet_share: 0.8,
            top_n: 20,
            drop_over_concentrated: false,
            fallback_enabled: false,
            fallback_min_total_delta_usd: 1000.0,
            weights: ConsensusWeights::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from defaults, an optional file and the environment.
    ///
    /// An explicitly given file must exist; the default `insider.toml` is optional.
    #[allow(clippy::result_large_err)]
    pub fn load(path: Option<&Path>) -> Result<Self> {
        dotenvy::dotenv().ok();

        let file = match path {
            Some(p) => config::File::from(p).required(true),
            None => config::File::with_name(DEFAULT_CONFIG_FILE).required(false),
        };

        let settings = config::Config::builder()
            .add_source(file)
            .add_source(
                config::Environment::with_prefix("INSIDER")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let cfg: AppConfig = settings.try_deserialize()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Reject values that would make the engines meaningless.
    #[allow(clippy::result_large_err)]
    pub fn validate(&self) -> Result<()> {
        let bands = &self.flow.tiers;
        if !(0.0..=1.0).contains(&bands.tier_a_fraction)
            || !(0.0..=1.0).contains(&bands.tier_b_fraction)
        {
            return Err(Error::Config {
                message: "flow.tiers fractions must be within [0, 1]".to_string(),
            });
        }
        if bands.tier_a_fraction > bands.tier_b_fraction {
            return Err(Error::Config {
                message: "flow.tiers.tier_a_fraction must not exceed tier_b_fraction".to_string(),
            });
        }
        if self.flow.lookback_runs == 0 {
            return Err(Error::Config {
                message: "flow.lookback_runs must be at least 1".to_string(),
            });
        }
        if self.market_filters.days_to_close < 0 {
            return Err(Error::Config {
                message: "market_filters.days_to_close must not be negative".to_string(),
            });
        }
        if self.consensus.lookback_days == 0 {
            return Err(Error::Config {
                message: "consensus.lookback_days must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}
