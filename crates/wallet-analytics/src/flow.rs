//! Day-over-day wallet flow.
//!
//! Compares a run with its prior run to find wallets adding exposure,
//! the positions they added, and the markets receiving that flow.

use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::NaiveDate;
use polymarket_core::config::FlowConfig;
use polymarket_core::types::{
    FlowResult, FlowRow, HolderRecord, MarketContext, MarketFlowRow, Outcome, PositionClass,
    PositionDelta, Tier, WalletMetric,
};
use tracing::debug;

use crate::classifier::classify;
use crate::features::log_norm;
use crate::ranking::stable_sorted;
use crate::tiering::assign_tiers;

/// Per-wallet USD by cluster: address -> cluster_key -> usd.
pub type ClusterTotals = HashMap<String, HashMap<String, f64>>;

/// Position key: (address, market_id, outcome).
type PositionKey = (String, String, Outcome);

/// Everything the flow computation reads for one (run, prior run) pair.
#[derive(Debug, Clone, Copy)]
pub struct FlowInputs<'a> {
    pub run_date: NaiveDate,
    pub prior_run_date: NaiveDate,
    pub today_metrics: &'a [WalletMetric],
    pub prev_metrics: &'a [WalletMetric],
    pub today_cluster_totals: &'a ClusterTotals,
    pub prev_cluster_totals: &'a ClusterTotals,
    pub today_holders: &'a [HolderRecord],
    pub prev_holders: &'a [HolderRecord],
    /// Question/cluster lookup of the current run.
    pub market_context: &'a MarketContext,
    /// Runs within the history lookback in which each wallet appeared.
    pub runs_seen: &'a HashMap<String, u32>,
}

/// Computes wallet, position and market flow for a pair of runs.
#[derive(Debug, Clone)]
pub struct FlowEngine {
    config: FlowConfig,
}

impl FlowEngine {
    pub fn new(config: FlowConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &FlowConfig {
        &self.config
    }

    pub fn compute(&self, inputs: &FlowInputs<'_>) -> FlowResult {
        let prev_by_address: HashMap<&str, &WalletMetric> = inputs
            .prev_metrics
            .iter()
            .map(|m| (m.address.as_str(), m))
            .collect();
        let empty = HashMap::new();

        let mut candidates = Vec::new();
        let mut gated = 0usize;
        for today in inputs.today_metrics {
            let prev = prev_by_address.get(today.address.as_str()).copied();
            let clusters_today = inputs
                .today_cluster_totals
                .get(&today.address)
                .unwrap_or(&empty);
            let clusters_prev = inputs
                .prev_cluster_totals
                .get(&today.address)
                .unwrap_or(&empty);

            let mut row = build_flow_row(today, prev, clusters_today, clusters_prev);

            row.runs_seen = inputs.runs_seen.get(&today.address).copied().unwrap_or(1);
            if row.runs_seen < self.config.min_runs_seen {
                if row.total_usd_today < self.config.override_total_usd_today_for_new_wallet {
                    gated += 1;
                    continue;
                }
                row.new_wallet_override = true;
            }

            if !self.passes(&row) {
                continue;
            }
            row.score_flow = self.score(&row);
            candidates.push(row);
        }

        let mut ranked = stable_sorted(candidates, |r| r.score_flow, true, |r| r.address.clone());
        assign_tiers(&mut ranked, &self.config.tiers);

        // Every tiered wallet stays in `wallets_flow` for consensus; only the
        // position drill-down is limited to the leaders.
        let top_addresses: HashSet<&str> = ranked
            .iter()
            .take(self.config.top_wallets)
            .map(|r| r.address.as_str())
            .collect();
        let positions_flow = self.positions_flow(inputs, &top_addresses);
        let markets_flow = markets_flow(&positions_flow);

        debug!(
            run_date = %inputs.run_date,
            prior_run_date = %inputs.prior_run_date,
            wallets = ranked.len(),
            drilled = top_addresses.len(),
            gated,
            positions = positions_flow.len(),
            markets = markets_flow.len(),
            "Computed flow"
        );

        FlowResult {
            run_date: Some(inputs.run_date),
            prior_run_date: Some(inputs.prior_run_date),
            wallets_flow: ranked,
            positions_flow,
            markets_flow,
        }
    }

    /// Inclusion filter; an absent top-cluster share fails.
    pub fn passes(&self, row: &FlowRow) -> bool {
        row.total_usd_today >= self.config.min_total_usd_today
            && row.total_usd_delta >= self.config.min_total_delta_usd
            && row
                .top_cluster_share_today
                .is_some_and(|share| share <= self.config.max_top_cluster_share_today)
    }

    pub fn score(&self, row: &FlowRow) -> f64 {
        let weights = &self.config.weights;
        let share = row.top_cluster_share_today.unwrap_or(0.0);
        let concentration = (share - self.config.max_top_cluster_share_today).max(0.0);
        let cluster_bonus = if row.clusters_delta > 0 { 1.0 } else { 0.0 };

        weights.w_flow_delta * log_norm(row.total_usd_delta)
            + weights.w_new_clusters * row.new_clusters_entered_count as f64
            + weights.w_cluster_delta * log_norm(row.top_cluster_delta_usd)
            + cluster_bonus
            - weights.w_concentration_penalty * concentration
    }

    fn positions_flow(
        &self,
        inputs: &FlowInputs<'_>,
        addresses: &HashSet<&str>,
    ) -> Vec<PositionDelta> {
        if addresses.is_empty() {
            return Vec::new();
        }
        let keep = |row: &&HolderRecord| addresses.contains(row.address.as_str());
        let today = position_values(inputs.today_holders.iter().filter(keep));
        let prev = position_values(inputs.prev_holders.iter().filter(keep));

        let retained: Vec<PositionDelta> =
            build_deltas(inputs.run_date, &today, &prev, inputs.market_context)
                .into_iter()
                .filter(|p| match p.classification {
                    PositionClass::NewPosition => p.usd_today >= self.config.min_new_position_usd,
                    PositionClass::Increase => p.delta_usd >= self.config.min_position_delta_usd,
                    _ => false,
                })
                .collect();

        let sorted = stable_sorted(retained, |p| p.delta_usd, true, position_tie_break);

        let mut per_wallet: BTreeMap<String, Vec<PositionDelta>> = BTreeMap::new();
        for row in sorted {
            per_wallet.entry(row.address.clone()).or_default().push(row);
        }
        per_wallet
            .into_values()
            .flat_map(|rows| rows.into_iter().take(self.config.top_positions_per_wallet))
            .collect()
    }
}

/// Unfiltered position deltas for every key held on either run, sorted by
/// (address, market_id, outcome).
pub fn all_position_deltas(
    run_date: NaiveDate,
    today_holders: &[HolderRecord],
    prev_holders: &[HolderRecord],
    context: &MarketContext,
) -> Vec<PositionDelta> {
    let today = position_values(today_holders.iter());
    let prev = position_values(prev_holders.iter());
    let deltas = build_deltas(run_date, &today, &prev, context);
    stable_sorted(deltas, |_| 0u32, false, position_tie_break)
}

fn position_tie_break(p: &PositionDelta) -> (String, String, &'static str) {
    (p.address.clone(), p.market_id.clone(), p.outcome.as_str())
}

/// Sum priced holder values per (address, market, normalized outcome).
fn position_values<'a>(rows: impl Iterator<Item = &'a HolderRecord>) -> HashMap<PositionKey, f64> {
    let mut values = HashMap::new();
    for row in rows {
        if row.address.is_empty() || row.value_usd.is_none() {
            continue;
        }
        let key = (
            row.address.clone(),
            row.market_id.clone(),
            row.normalized_outcome(),
        );
        *values.entry(key).or_insert(0.0) += row.value();
    }
    values
}

fn build_deltas(
    run_date: NaiveDate,
    today: &HashMap<PositionKey, f64>,
    prev: &HashMap<PositionKey, f64>,
    context: &MarketContext,
) -> Vec<PositionDelta> {
    let keys: HashSet<&PositionKey> = today.keys().chain(prev.keys()).collect();
    keys.into_iter()
        .map(|key| {
            let (address, market_id, outcome) = key;
            let usd_today = today.get(key).copied().unwrap_or(0.0);
            let usd_prev = prev.get(key).copied().unwrap_or(0.0);
            PositionDelta {
                run_date,
                address: address.clone(),
                market_id: market_id.clone(),
                question: context.question(market_id).map(str::to_string),
                cluster_key: context.cluster_key(market_id).to_string(),
                outcome: *outcome,
                usd_today,
                usd_prev,
                delta_usd: usd_today - usd_prev,
                classification: classify(usd_prev, usd_today),
            }
        })
        .collect()
}

fn build_flow_row(
    today: &WalletMetric,
    prev: Option<&WalletMetric>,
    clusters_today: &HashMap<String, f64>,
    clusters_prev: &HashMap<String, f64>,
) -> FlowRow {
    let total_today = today.total_usd;
    let total_prev = prev.map_or(0.0, |p| p.total_usd);
    let markets_prev = prev.map_or(0, |p| p.markets_count);
    let clusters_prev_count = prev.map_or(0, |p| p.clusters_count);

    let (top_cluster_today, top_cluster_share_today) = top_cluster(clusters_today, total_today);
    let (top_cluster_delta, top_cluster_delta_usd) = top_cluster_delta(clusters_today, clusters_prev);

    FlowRow {
        address: today.address.clone(),
        total_usd_today: total_today,
        total_usd_prev: total_prev,
        total_usd_delta: total_today - total_prev,
        markets_today: today.markets_count,
        markets_prev,
        markets_delta: today.markets_count as i64 - markets_prev as i64,
        clusters_today: today.clusters_count,
        clusters_prev: clusters_prev_count,
        clusters_delta: today.clusters_count as i64 - clusters_prev_count as i64,
        top_cluster_today,
        top_cluster_share_today,
        top_cluster_delta,
        top_cluster_delta_usd,
        new_clusters_entered_count: new_clusters_entered(clusters_today, clusters_prev),
        runs_seen: 0,
        new_wallet_override: false,
        score_flow: 0.0,
        tier: Tier::C,
    }
}

/// Pick the entry with the largest value; equal values go to the smaller key.
fn max_by_value<'a>(entries: impl Iterator<Item = (&'a str, f64)>) -> Option<(&'a str, f64)> {
    entries.fold(None, |best, (key, value)| match best {
        Some((best_key, best_value))
            if value < best_value || (value == best_value && key >= best_key) =>
        {
            Some((best_key, best_value))
        }
        _ => Some((key, value)),
    })
}

fn top_cluster(clusters: &HashMap<String, f64>, total: f64) -> (Option<String>, Option<f64>) {
    if total <= 0.0 {
        return (None, None);
    }
    match max_by_value(clusters.iter().map(|(k, v)| (k.as_str(), *v))) {
        Some((key, value)) => (Some(key.to_string()), Some(value / total)),
        None => (None, None),
    }
}

fn top_cluster_delta(
    today: &HashMap<String, f64>,
    prev: &HashMap<String, f64>,
) -> (Option<String>, f64) {
    let keys: HashSet<&str> = today.keys().chain(prev.keys()).map(String::as_str).collect();
    let deltas = keys.into_iter().map(|key| {
        let delta = today.get(key).copied().unwrap_or(0.0) - prev.get(key).copied().unwrap_or(0.0);
        (key, delta)
    });
    match max_by_value(deltas) {
        Some((key, delta)) => (Some(key.to_string()), delta),
        None => (None, 0.0),
    }
}

fn new_clusters_entered(today: &HashMap<String, f64>, prev: &HashMap<String, f64>) -> u32 {
    today
        .iter()
        .filter(|(key, value)| **value > 0.0 && prev.get(*key).copied().unwrap_or(0.0) <= 0.0)
        .count() as u32
}

#[derive(Debug)]
struct MarketAccumulator {
    question: Option<String>,
    cluster_key: String,
    wallets_increasing: HashSet<String>,
    wallets_new: HashSet<String>,
    total_delta_usd: f64,
    top_wallet: Option<String>,
    top_wallet_delta: Option<f64>,
}

/// Re-aggregate retained position rows per market.
///
/// The first row reaching the running maximum keeps top_wallet, so the
/// result depends on `positions` being in deterministic order.
pub fn markets_flow(positions: &[PositionDelta]) -> Vec<MarketFlowRow> {
    let mut markets: HashMap<&str, MarketAccumulator> = HashMap::new();

    for row in positions {
        let market = markets
            .entry(row.market_id.as_str())
            .or_insert_with(|| MarketAccumulator {
                question: row.question.clone(),
                cluster_key: row.cluster_key.clone(),
                wallets_increasing: HashSet::new(),
                wallets_new: HashSet::new(),
                total_delta_usd: 0.0,
                top_wallet: None,
                top_wallet_delta: None,
            });

        market.total_delta_usd += row.delta_usd;
        market.wallets_increasing.insert(row.address.clone());
        if row.classification == PositionClass::NewPosition {
            market.wallets_new.insert(row.address.clone());
        }
        if row.delta_usd > market.top_wallet_delta.unwrap_or(-1.0) {
            market.top_wallet = Some(row.address.clone());
            market.top_wallet_delta = Some(row.delta_usd);
        }
    }

    let rows: Vec<MarketFlowRow> = markets
        .into_iter()
        .map(|(market_id, acc)| MarketFlowRow {
            market_id: market_id.to_string(),
            question: acc.question,
            cluster_key: acc.cluster_key,
            wallets_increasing: acc.wallets_increasing.len() as u32,
            wallets_new: acc.wallets_new.len() as u32,
            total_delta_usd: acc.total_delta_usd,
            top_wallet: acc.top_wallet,
            top_wallet_delta: acc.top_wallet_delta,
        })
        .collect();

    stable_sorted(rows, |m| m.total_delta_usd, true, |m| m.market_id.clone())
}
