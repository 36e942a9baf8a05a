//! Snapshot storage: the run calendar, holder snapshots and market context.

pub mod memory;
pub mod sqlite;

pub use memory::MemorySnapshotStore;
pub use sqlite::SqliteSnapshotStore;

use crate::config::DatabaseConfig;
use crate::types::{HolderRecord, MarketContext, MarketInfo, MarketScore, WalletMetric, WalletScore};
use crate::Result;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;

/// Lifecycle status of a daily run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Success,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Running => "running",
            RunStatus::Success => "success",
            RunStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Storage backend for daily snapshots.
#[async_trait::async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Recorded run dates on or before `up_to`, newest first.
    async fn run_dates(&self, up_to: NaiveDate, limit: usize) -> Result<Vec<NaiveDate>>;

    /// The latest recorded run strictly before `run_date`.
    async fn prior_run_date(&self, run_date: NaiveDate) -> Result<Option<NaiveDate>>;

    /// All holder rows captured for a run.
    async fn holders(&self, run_date: NaiveDate) -> Result<Vec<HolderRecord>>;

    /// Market question/cluster lookup for a run.
    ///
    /// Starts from the latest market metadata; non-empty values captured in
    /// that run's snapshot take precedence.
    async fn market_context(&self, run_date: NaiveDate) -> Result<MarketContext>;

    /// Market metadata captured in a run's snapshot, ordered by market id.
    async fn market_snapshots(&self, run_date: NaiveDate) -> Result<Vec<MarketInfo>>;

    /// Create or update a run entry.
    async fn record_run(&self, run_date: NaiveDate, timezone: &str, status: RunStatus)
        -> Result<()>;

    /// Insert holder rows, replacing rows with the same key. Returns rows written.
    async fn insert_holders(&self, rows: &[HolderRecord]) -> Result<u64>;

    /// Update latest market metadata and capture it as the run's snapshot.
    async fn upsert_markets(&self, run_date: NaiveDate, markets: &[MarketInfo]) -> Result<()>;

    /// Replace the stored wallet metrics of a run.
    async fn save_wallet_metrics(&self, run_date: NaiveDate, metrics: &[WalletMetric])
        -> Result<()>;

    /// Stored wallet metrics of a run, ordered by address.
    async fn wallet_metrics(&self, run_date: NaiveDate) -> Result<Vec<WalletMetric>>;

    /// Replace the stored market and wallet scores of a run.
    async fn save_scores(
        &self,
        run_date: NaiveDate,
        markets: &[MarketScore],
        wallets: &[WalletScore],
    ) -> Result<()>;

    /// Stored market scores of a run, by score desc then market id.
    async fn market_scores(&self, run_date: NaiveDate) -> Result<Vec<MarketScore>>;

    /// Stored wallet scores of a run, by score desc then address.
    async fn wallet_scores(&self, run_date: NaiveDate) -> Result<Vec<WalletScore>>;
}

/// Create a SQLite connection pool, creating the database file if missing.
pub async fn create_pool(config: &DatabaseConfig) -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(&config.url)?.create_if_missing(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(config.max_connections)
        .connect_with(options)
        .await?;

    Ok(pool)
}

/// Apply the embedded migrations.
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}
