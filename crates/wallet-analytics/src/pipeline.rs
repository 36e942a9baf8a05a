//! Store-driven daily pipeline.
//!
//! Loads snapshots through a [`SnapshotStore`] and runs the engines over
//! them. The engines themselves stay synchronous; only loading is async.

use std::collections::{HashMap, HashSet};

use chrono::NaiveDate;
use polymarket_core::config::AppConfig;
use polymarket_core::db::{RunStatus, SnapshotStore};
use polymarket_core::types::{
    ClusterSummary, ConsensusResult, ExcludedWallet, FlowResult, HolderRecord, MarketContext,
    RankedWallet, WalletMetric, WalletPosition,
};
use polymarket_core::Result;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::clusters::{apply_cluster_cap, cluster_for, clusters_summary, wallet_top_clusters};
use crate::consensus::{ConsensusEngine, PairFlow};
use crate::flow::{all_position_deltas, FlowEngine, FlowInputs};
use crate::market_scores::{MarketScorer, ScoreOutcome};
use crate::wallet_metrics;
use crate::wallet_ranker::{score_wallets, wallet_positions};

/// Size of the diversified top list.
pub const TOP_LIST_SIZE: usize = 50;

/// Single-day wallet ranking for one run.
#[derive(Debug, Clone, Serialize)]
pub struct WalletReport {
    pub run_date: NaiveDate,
    pub metrics: Vec<WalletMetric>,
    pub ranked: Vec<RankedWallet>,
    pub excluded: Vec<ExcludedWallet>,
    /// Up to [`TOP_LIST_SIZE`] ranked wallets under the per-cluster cap.
    pub top50: Vec<RankedWallet>,
    /// Up to `report.top_wallets` ranked wallets under the watchlist cap.
    pub watchlist: Vec<RankedWallet>,
    /// Largest positions of the watchlist wallets.
    pub top_positions: Vec<WalletPosition>,
    pub clusters: Vec<ClusterSummary>,
}

/// Everything a daily run produces.
#[derive(Debug, Clone, Serialize)]
pub struct DailyReport {
    pub wallets: WalletReport,
    pub scores: ScoreOutcome,
    pub flow: FlowResult,
    pub consensus: ConsensusResult,
}

/// One run's holders, market context and derived metrics.
struct DaySnapshot {
    holders: Vec<HolderRecord>,
    context: MarketContext,
    metrics: Vec<WalletMetric>,
}

async fn load_day<S>(store: &S, run_date: NaiveDate) -> Result<DaySnapshot>
where
    S: SnapshotStore + ?Sized,
{
    let holders = store.holders(run_date).await?;
    let context = store.market_context(run_date).await?;
    let metrics = wallet_metrics::compute(run_date, &holders, &context);
    debug!(
        run_date = %run_date,
        holders = holders.len(),
        markets = context.len(),
        wallets = metrics.len(),
        "Loaded snapshot"
    );
    Ok(DaySnapshot {
        holders,
        context,
        metrics,
    })
}

/// Rank one run's wallets and build the diversified lists.
pub async fn wallet_report<S>(store: &S, run_date: NaiveDate, config: &AppConfig) -> Result<WalletReport>
where
    S: SnapshotStore + ?Sized,
{
    let day = load_day(store, run_date).await?;
    let outcome = score_wallets(&day.metrics, &config.wallet_filters, &config.wallet_ranking);
    let top_clusters = wallet_top_clusters(&day.holders, &day.context);
    let cluster_of = |w: &RankedWallet| cluster_for(&top_clusters, &w.metric.address).to_string();

    let diversity = &config.diversity;
    let top50 = apply_cluster_cap(
        outcome.ranked.clone(),
        cluster_of,
        TOP_LIST_SIZE,
        diversity.max_per_cluster_top50,
        diversity.enabled,
    );
    let watchlist = apply_cluster_cap(
        outcome.ranked.clone(),
        cluster_of,
        config.report.top_wallets,
        diversity.max_per_cluster_watchlist,
        diversity.enabled,
    );

    let addresses: Vec<&str> = watchlist.iter().map(|w| w.metric.address.as_str()).collect();
    let top_positions = wallet_positions(
        &day.holders,
        &day.context,
        &addresses,
        config.report.top_positions_per_wallet,
    );
    let clusters = clusters_summary(&day.holders, &day.context);

    info!(
        run_date = %run_date,
        wallets = day.metrics.len(),
        ranked = outcome.ranked.len(),
        excluded = outcome.excluded.len(),
        watchlist = watchlist.len(),
        "Wallet report ready"
    );

    Ok(WalletReport {
        run_date,
        metrics: day.metrics,
        ranked: outcome.ranked,
        excluded: outcome.excluded,
        top50,
        watchlist,
        top_positions,
        clusters,
    })
}

/// Address sets per run date, loaded at most once per report.
#[derive(Debug, Default)]
struct AddressHistory {
    by_date: HashMap<NaiveDate, HashSet<String>>,
}

impl AddressHistory {
    fn remember(&mut self, run_date: NaiveDate, holders: &[HolderRecord]) {
        self.by_date.entry(run_date).or_insert_with(|| {
            holders
                .iter()
                .filter(|row| !row.address.is_empty())
                .map(|row| row.address.clone())
                .collect()
        });
    }

    async fn runs_seen<S>(
        &mut self,
        store: &S,
        run_date: NaiveDate,
        lookback_runs: u32,
    ) -> Result<HashMap<String, u32>>
    where
        S: SnapshotStore + ?Sized,
    {
        let mut seen: HashMap<String, u32> = HashMap::new();
        for date in store.run_dates(run_date, lookback_runs as usize).await? {
            if !self.by_date.contains_key(&date) {
                let holders = store.holders(date).await?;
                self.remember(date, &holders);
            }
            for address in self.by_date.get(&date).into_iter().flatten() {
                *seen.entry(address.clone()).or_insert(0) += 1;
            }
        }
        Ok(seen)
    }
}

/// Count, per wallet, the runs among the last `lookback_runs` (up to and
/// including `run_date`) in which it held anything.
pub async fn runs_seen<S>(
    store: &S,
    run_date: NaiveDate,
    lookback_runs: u32,
) -> Result<HashMap<String, u32>>
where
    S: SnapshotStore + ?Sized,
{
    AddressHistory::default()
        .runs_seen(store, run_date, lookback_runs)
        .await
}

/// Flow between two runs plus the loaded snapshots it was computed from.
async fn flow_between<S>(
    store: &S,
    run_date: NaiveDate,
    prior_run_date: NaiveDate,
    engine: &FlowEngine,
    history: &mut AddressHistory,
) -> Result<(FlowResult, DaySnapshot, DaySnapshot)>
where
    S: SnapshotStore + ?Sized,
{
    let today = load_day(store, run_date).await?;
    let prev = load_day(store, prior_run_date).await?;
    history.remember(run_date, &today.holders);
    history.remember(prior_run_date, &prev.holders);
    let today_clusters = wallet_metrics::cluster_totals(&today.holders, &today.context);
    let prev_clusters = wallet_metrics::cluster_totals(&prev.holders, &prev.context);
    let seen = history
        .runs_seen(store, run_date, engine.config().lookback_runs)
        .await?;

    let flow = engine.compute(&FlowInputs {
        run_date,
        prior_run_date,
        today_metrics: &today.metrics,
        prev_metrics: &prev.metrics,
        today_cluster_totals: &today_clusters,
        prev_cluster_totals: &prev_clusters,
        today_holders: &today.holders,
        prev_holders: &prev.holders,
        market_context: &today.context,
        runs_seen: &seen,
    });
    Ok((flow, today, prev))
}

/// Flow between `run_date` and the run immediately before it.
pub async fn flow_report<S>(store: &S, run_date: NaiveDate, config: &AppConfig) -> Result<FlowResult>
where
    S: SnapshotStore + ?Sized,
{
    let Some(prior_run_date) = store.prior_run_date(run_date).await? else {
        warn!(run_date = %run_date, "No prior run, flow is empty");
        return Ok(FlowResult::without_prior(run_date));
    };

    let engine = FlowEngine::new(config.flow.clone());
    let mut history = AddressHistory::default();
    let (flow, _, _) =
        flow_between(store, run_date, prior_run_date, &engine, &mut history).await?;

    info!(
        run_date = %run_date,
        prior_run_date = %prior_run_date,
        wallets = flow.wallets_flow.len(),
        positions = flow.positions_flow.len(),
        markets = flow.markets_flow.len(),
        "Flow report ready"
    );
    Ok(flow)
}

/// Consecutive (run, prior run) pairs ending at `run_date`, oldest first.
pub async fn lookback_pairs<S>(
    store: &S,
    run_date: NaiveDate,
    lookback_days: u32,
) -> Result<Vec<(NaiveDate, NaiveDate)>>
where
    S: SnapshotStore + ?Sized,
{
    let limit = (lookback_days as usize + 1).max(2);
    let dates = store.run_dates(run_date, limit).await?;
    let mut pairs: Vec<(NaiveDate, NaiveDate)> = dates
        .windows(2)
        .take(lookback_days as usize)
        .map(|pair| (pair[0], pair[1]))
        .collect();
    pairs.reverse();
    Ok(pairs)
}

/// Consensus over the lookback window ending at `run_date`.
pub async fn consensus_report<S>(
    store: &S,
    run_date: NaiveDate,
    config: &AppConfig,
) -> Result<ConsensusResult>
where
    S: SnapshotStore + ?Sized,
{
    let flow_engine = FlowEngine::new(config.flow.clone());
    let consensus_engine = ConsensusEngine::new(config.consensus.clone());

    let mut history = AddressHistory::default();
    let mut pairs = Vec::new();
    for (current, prior) in lookback_pairs(store, run_date, config.consensus.lookback_days).await? {
        let (flow, today, prev) =
            flow_between(store, current, prior, &flow_engine, &mut history).await?;
        let tiers = flow
            .wallets_flow
            .iter()
            .map(|row| (row.address.clone(), row.tier))
            .collect();
        let deltas = all_position_deltas(current, &today.holders, &prev.holders, &today.context);
        pairs.push(PairFlow {
            run_date: current,
            prior_run_date: prior,
            tiers,
            deltas,
        });
    }

    let result = consensus_engine.compute(run_date, &pairs);
    info!(
        run_date = %run_date,
        pairs = pairs.len(),
        entries = result.entries.len(),
        candidate_rows = result.diagnostics.candidate_rows,
        fallback_used = result.diagnostics.fallback_used,
        "Consensus report ready"
    );
    Ok(result)
}

/// Market and wallet scores of one run's snapshot.
pub async fn score_report<S>(store: &S, run_date: NaiveDate, config: &AppConfig) -> Result<ScoreOutcome>
where
    S: SnapshotStore + ?Sized,
{
    let markets = store.market_snapshots(run_date).await?;
    let holders = store.holders(run_date).await?;
    let outcome = MarketScorer::from_config(config).compute(run_date, &markets, &holders);

    let converging = outcome
        .markets
        .iter()
        .filter(|m| m.signals.convergence)
        .count();
    info!(
        run_date = %run_date,
        markets = outcome.markets.len(),
        wallets = outcome.wallets.len(),
        converging,
        "Score report ready"
    );
    Ok(outcome)
}

/// Run every report for `run_date`, persisting wallet metrics, scores and
/// the run status.
pub async fn run_daily<S>(store: &S, run_date: NaiveDate, config: &AppConfig) -> Result<DailyReport>
where
    S: SnapshotStore + ?Sized,
{
    let timezone = config.run.timezone.as_str();
    store.record_run(run_date, timezone, RunStatus::Running).await?;

    match build_daily(store, run_date, config).await {
        Ok(report) => {
            store.record_run(run_date, timezone, RunStatus::Success).await?;
            info!(run_date = %run_date, "Daily run succeeded");
            Ok(report)
        }
        Err(e) => {
            warn!(run_date = %run_date, error = %e, "Daily run failed");
            store.record_run(run_date, timezone, RunStatus::Failed).await?;
            Err(e)
        }
    }
}

async fn build_daily<S>(store: &S, run_date: NaiveDate, config: &AppConfig) -> Result<DailyReport>
where
    S: SnapshotStore + ?Sized,
{
    let wallets = wallet_report(store, run_date, config).await?;
    store.save_wallet_metrics(run_date, &wallets.metrics).await?;

    let scores = score_report(store, run_date, config).await?;
    store
        .save_scores(run_date, &scores.markets, &scores.wallets)
        .await?;

    let flow = flow_report(store, run_date, config).await?;
    let consensus = consensus_report(store, run_date, config).await?;

    Ok(DailyReport {
        wallets,
        scores,
        flow,
        consensus,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use polymarket_core::db::MemorySnapshotStore;
    use polymarket_core::types::{MarketInfo, Tier};

    fn day(n: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 1, n).unwrap()
    }

    fn config() -> AppConfig {
        let mut config = AppConfig::default();
        config.flow.min_runs_seen = 1;
        config.flow.min_total_usd_today = 1000.0;
        config.flow.min_total_delta_usd = 500.0;
        config.flow.min_position_delta_usd = 500.0;
        config.flow.max_top_cluster_share_today = 1.0;
        config.flow.tiers.tier_a_fraction = 0.5;
        config.flow.tiers.tier_b_fraction = 1.0;
        config.consensus.lookback_days = 2;
        config.consensus.min_position_delta_usd = 500.0;
        config.consensus.min_total_delta_usd = 2000.0;
        config.consensus.fallback_enabled = false;
        config
    }

    async fn seeded_store() -> MemorySnapshotStore {
        let store = MemorySnapshotStore::new();
        let markets = vec![
            MarketInfo::new("m1", "event:1").with_question("Q1"),
            MarketInfo::new("m2", "event:2").with_question("Q2"),
        ];
        let days = [
            (day(1), [("W1", 1000.0), ("W2", 1000.0)]),
            (day(2), [("W1", 2000.0), ("W2", 1000.0)]),
            (day(3), [("W1", 2000.0), ("W2", 2500.0)]),
        ];
        for (date, positions) in days {
            store
                .record_run(date, "America/New_York", RunStatus::Success)
                .await
                .unwrap();
            store.upsert_markets(date, &markets).await.unwrap();
            let rows: Vec<HolderRecord> = positions
                .iter()
                .map(|(address, value)| HolderRecord::new(date, "m1", *address, "Yes", *value))
                .collect();
            store.insert_holders(&rows).await.unwrap();
        }
        store
    }

    #[tokio::test]
    async fn test_flow_report_without_prior_is_empty() {
        let store = seeded_store().await;
        let flow = flow_report(&store, day(1), &config()).await.unwrap();
        assert_eq!(flow.run_date, Some(day(1)));
        assert_eq!(flow.prior_run_date, None);
        assert!(flow.wallets_flow.is_empty());
    }

    #[tokio::test]
    async fn test_flow_report_uses_prior_run() {
        let store = seeded_store().await;
        let flow = flow_report(&store, day(2), &config()).await.unwrap();

        assert_eq!(flow.prior_run_date, Some(day(1)));
        let wallets: Vec<&str> = flow.wallets_flow.iter().map(|r| r.address.as_str()).collect();
        assert_eq!(wallets, vec!["W1"]);
        assert_eq!(flow.wallets_flow[0].runs_seen, 2);
        assert_eq!(flow.positions_flow.len(), 1);
        assert_eq!(flow.markets_flow[0].question.as_deref(), Some("Q1"));
    }

    #[tokio::test]
    async fn test_history_gate_reads_run_calendar() {
        let store = seeded_store().await;
        let mut cfg = config();
        cfg.flow.min_runs_seen = 3;

        let gated = flow_report(&store, day(2), &cfg).await.unwrap();
        assert!(gated.wallets_flow.is_empty());

        // Three runs seen by day 3
        let admitted = flow_report(&store, day(3), &cfg).await.unwrap();
        assert_eq!(admitted.wallets_flow.len(), 1);
        assert_eq!(admitted.wallets_flow[0].runs_seen, 3);
    }

    #[tokio::test]
    async fn test_lookback_pairs_oldest_first() {
        let store = seeded_store().await;
        let pairs = lookback_pairs(&store, day(3), 5).await.unwrap();
        assert_eq!(pairs, vec![(day(2), day(1)), (day(3), day(2))]);

        let single = lookback_pairs(&store, day(3), 1).await.unwrap();
        assert_eq!(single, vec![(day(3), day(2))]);
    }

    #[tokio::test]
    async fn test_consensus_report_spans_pairs() {
        let store = seeded_store().await;
        let result = consensus_report(&store, day(3), &config()).await.unwrap();

        assert_eq!(result.prior_run_date, Some(day(1)));
        assert_eq!(result.entries.len(), 1);
        let entry = &result.entries[0];
        assert_eq!(entry.market_id, "m1");
        assert_eq!(entry.wallets_supporting, 2);
        assert_eq!(entry.tiers_a, 2);
        assert_eq!(entry.total_delta_usd, 2500.0);
        assert_eq!(entry.top_wallet.as_deref(), Some("W2"));
        assert!(result.wallets.iter().all(|w| w.tier == Tier::A));
    }

    #[tokio::test]
    async fn test_run_daily_records_status_and_metrics() {
        let store = seeded_store().await;
        let report = run_daily(&store, day(3), &config()).await.unwrap();

        assert_eq!(store.run_status(day(3)).await, Some(RunStatus::Success));
        let saved = store.wallet_metrics(day(3)).await.unwrap();
        assert_eq!(saved.len(), 2);
        assert_eq!(report.wallets.metrics.len(), 2);
        assert_eq!(report.flow.prior_run_date, Some(day(2)));
        assert_eq!(report.consensus.entries.len(), 1);

        assert_eq!(report.scores.markets.len(), 2);
        let saved_markets = store.market_scores(day(3)).await.unwrap();
        assert_eq!(saved_markets, report.scores.markets);
        assert_eq!(store.wallet_scores(day(3)).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_score_report_reads_snapshot() {
        let store = seeded_store().await;
        let outcome = score_report(&store, day(3), &config()).await.unwrap();

        let markets: Vec<&str> = outcome.markets.iter().map(|m| m.market_id.as_str()).collect();
        assert_eq!(markets, vec!["m1", "m2"]);
        let m1 = &outcome.markets[0].signals;
        assert_eq!(m1.conviction_wallets_usd, 2);
        assert!(!m1.convergence);
        assert_eq!(outcome.markets[1].signals.concentration, 1.0);

        let wallets: Vec<&str> = outcome.wallets.iter().map(|w| w.address.as_str()).collect();
        assert_eq!(wallets, vec!["W2", "W1"]);
    }

    #[tokio::test]
    async fn test_cached_runs_seen_matches_store() {
        let store = seeded_store().await;
        let mut history = AddressHistory::default();
        for (date, lookback) in [(day(3), 5), (day(2), 5), (day(3), 2), (day(1), 1)] {
            let cached = history.runs_seen(&store, date, lookback).await.unwrap();
            assert_eq!(cached, runs_seen(&store, date, lookback).await.unwrap());
        }
        assert_eq!(history.by_date.len(), 3);

        let seen = runs_seen(&store, day(3), 5).await.unwrap();
        assert_eq!(seen["W1"], 3);
        assert_eq!(seen["W2"], 3);
    }

    #[tokio::test]
    async fn test_consensus_counts_tiered_wallets_past_top_wallets() {
        let store = MemorySnapshotStore::new();
        let markets = vec![MarketInfo::new("m1", "event:1").with_question("Q1")];
        let added = [("W1", 5000.0), ("W2", 6000.0), ("W3", 7000.0), ("W4", 8000.0)];
        for (date, extra) in [(day(10), 0.0), (day(11), 1.0)] {
            store.record_run(date, "UTC", RunStatus::Success).await.unwrap();
            store.upsert_markets(date, &markets).await.unwrap();
            let rows: Vec<HolderRecord> = added
                .iter()
                .map(|(address, usd)| {
                    HolderRecord::new(date, "m1", *address, "Yes", 1000.0 + extra * usd)
                })
                .collect();
            store.insert_holders(&rows).await.unwrap();
        }

        let mut cfg = AppConfig::default();
        cfg.flow.max_top_cluster_share_today = 1.0;
        cfg.flow.top_wallets = 1;
        cfg.consensus.lookback_days = 1;

        let flow = flow_report(&store, day(11), &cfg).await.unwrap();
        assert_eq!(flow.wallets_flow.len(), 4);
        assert!(flow.positions_flow.iter().all(|p| p.address == "W4"));

        let result = consensus_report(&store, day(11), &cfg).await.unwrap();
        assert_eq!(result.entries.len(), 1);
        let entry = &result.entries[0];
        assert_eq!(entry.wallets_supporting, 2);
        assert_eq!(entry.tiers_a, 1);
        assert_eq!(entry.tiers_b, 1);
        assert_eq!(entry.total_delta_usd, 15000.0);
        assert_eq!(entry.top_wallet.as_deref(), Some("W4"));
    }

    #[tokio::test]
    async fn test_shorter_lookback_never_exceeds_longer() {
        let store = seeded_store().await;
        let mut short = config();
        short.consensus.lookback_days = 1;
        short.consensus.min_wallets = 1;
        short.consensus.min_total_delta_usd = 1000.0;
        let mut long = short.clone();
        long.consensus.lookback_days = 2;

        let short_result = consensus_report(&store, day(3), &short).await.unwrap();
        let long_result = consensus_report(&store, day(3), &long).await.unwrap();
        assert_eq!(short_result.prior_run_date, Some(day(2)));
        assert_eq!(long_result.prior_run_date, Some(day(1)));
        assert!(!short_result.entries.is_empty());

        for entry in &short_result.entries {
            let wider = long_result
                .entries
                .iter()
                .find(|e| e.market_id == entry.market_id && e.outcome == entry.outcome)
                .unwrap();
            assert!(entry.total_delta_usd <= wider.total_delta_usd);
            assert!(entry.wallets_supporting <= wider.wallets_supporting);
        }
        assert_eq!(short_result.entries[0].total_delta_usd, 1500.0);
        assert_eq!(long_result.entries[0].total_delta_usd, 2500.0);
    }

    #[tokio::test]
    async fn test_wallet_report_caps_clusters() {
        let store = MemorySnapshotStore::new();
        let date = day(5);
        store.record_run(date, "UTC", RunStatus::Success).await.unwrap();
        let markets: Vec<MarketInfo> = (1..=4)
            .map(|i| MarketInfo::new(format!("m{}", i), format!("event:{}", i)))
            .collect();
        store.upsert_markets(date, &markets).await.unwrap();

        let mut rows = Vec::new();
        for (address, big) in [("A", "m1"), ("B", "m1"), ("C", "m3")] {
            rows.push(HolderRecord::new(date, big, address, "Yes", 4000.0));
            rows.push(HolderRecord::new(date, "m2", address, "No", 2000.0));
            rows.push(HolderRecord::new(date, "m4", address, "Yes", 1000.0));
        }
        store.insert_holders(&rows).await.unwrap();

        let mut cfg = AppConfig::default();
        cfg.wallet_filters.min_total_usd = 0.0;
        cfg.wallet_filters.min_markets = 1;
        cfg.wallet_filters.min_clusters = 1;
        cfg.wallet_filters.max_top_cluster_share = 1.0;
        cfg.wallet_filters.max_top_market_share = 1.0;
        cfg.wallet_filters.max_hhi_clusters = 1.0;
        cfg.wallet_filters.max_sidedness = 1.0;
        cfg.diversity.max_per_cluster_watchlist = 1;
        cfg.report.top_positions_per_wallet = 2;

        let report = wallet_report(&store, date, &cfg).await.unwrap();
        assert_eq!(report.ranked.len(), 3);
        // A and B share their top cluster; only the first in rank order stays
        let watchlist: Vec<&str> = report
            .watchlist
            .iter()
            .map(|w| w.metric.address.as_str())
            .collect();
        assert_eq!(watchlist, vec!["A", "C"]);
        assert_eq!(report.top_positions.len(), 4);
        assert_eq!(report.clusters.len(), 4);
    }
}
