//! Multi-day consensus aggregation.
//!
//! Position deltas from several consecutive run pairs are bucketed per
//! (market, outcome). A bucket becomes a consensus entry when enough
//! high-quality wallets added enough exposure to it.

use std::collections::{HashMap, HashSet};

use chrono::NaiveDate;
use polymarket_core::config::ConsensusConfig;
use polymarket_core::types::{
    ConsensusDiagnostics, ConsensusEntry, ConsensusResult, ConsensusWallet, Outcome,
    PositionClass, PositionDelta, Tier,
};
use tracing::debug;

use crate::features::log_norm;
use crate::ranking::stable_sorted;

/// Flow output of one (run, prior run) pair in the lookback window.
#[derive(Debug, Clone)]
pub struct PairFlow {
    pub run_date: NaiveDate,
    pub prior_run_date: NaiveDate,
    /// Tier per wallet from that pair's flow ranking.
    pub tiers: HashMap<String, Tier>,
    /// Unfiltered position deltas between the two runs.
    pub deltas: Vec<PositionDelta>,
}

#[derive(Debug)]
struct Bucket {
    market_id: String,
    outcome: Outcome,
    question: Option<String>,
    cluster_key: String,
    supporting: HashSet<String>,
    new: HashSet<String>,
    increasing: HashSet<String>,
    tiers_a: u32,
    tiers_b: u32,
    total_delta_usd: f64,
    total_new_usd: f64,
    total_increase_usd: f64,
    wallets: HashMap<String, ConsensusWallet>,
}

impl Bucket {
    fn new(row: &PositionDelta) -> Self {
        Self {
            market_id: row.market_id.clone(),
            outcome: row.outcome,
            question: row.question.clone(),
            cluster_key: row.cluster_key.clone(),
            supporting: HashSet::new(),
            new: HashSet::new(),
            increasing: HashSet::new(),
            tiers_a: 0,
            tiers_b: 0,
            total_delta_usd: 0.0,
            total_new_usd: 0.0,
            total_increase_usd: 0.0,
            wallets: HashMap::new(),
        }
    }

    fn add(&mut self, row: &PositionDelta, tier: Option<Tier>) {
        let delta = row.delta_usd;
        self.supporting.insert(row.address.clone());
        if row.classification == PositionClass::NewPosition {
            self.new.insert(row.address.clone());
            self.total_new_usd += delta;
        } else {
            self.increasing.insert(row.address.clone());
            self.total_increase_usd += delta;
        }
        self.total_delta_usd += delta;
        match tier {
            Some(Tier::A) => self.tiers_a += 1,
            Some(Tier::B) => self.tiers_b += 1,
            _ => {}
        }

        let wallet = self
            .wallets
            .entry(row.address.clone())
            .or_insert_with(|| ConsensusWallet {
                market_id: row.market_id.clone(),
                outcome: row.outcome,
                address: row.address.clone(),
                tier: tier.unwrap_or(Tier::C),
                delta_usd: 0.0,
                classification: row.classification,
            });
        wallet.delta_usd += delta;
        if row.classification == PositionClass::NewPosition {
            wallet.classification = PositionClass::NewPosition;
        }
    }

    fn wallet_count(&self) -> u32 {
        self.supporting.len() as u32
    }

    /// Wallet with the largest summed delta; equal deltas go to the smaller
    /// address. Starts from zero, so non-positive deltas never win.
    fn top_wallet(&self) -> (Option<&str>, f64) {
        let mut top: Option<&str> = None;
        let mut top_delta = 0.0;
        for (address, wallet) in &self.wallets {
            let address = address.as_str();
            let delta = wallet.delta_usd;
            if delta > top_delta || (delta == top_delta && address < top.unwrap_or(address)) {
                top = Some(address);
                top_delta = delta;
            }
        }
        (top, top_delta)
    }
}

/// Aggregates position deltas across a lookback window into consensus
/// entries.
#[derive(Debug, Clone)]
pub struct ConsensusEngine {
    config: ConsensusConfig,
}

impl ConsensusEngine {
    pub fn new(config: ConsensusConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ConsensusConfig {
        &self.config
    }

    /// Consensus over `pairs`, ordered oldest pair first.
    pub fn compute(&self, run_date: NaiveDate, pairs: &[PairFlow]) -> ConsensusResult {
        let Some(oldest) = pairs.first() else {
            return ConsensusResult {
                run_date: Some(run_date),
                lookback_days: self.config.lookback_days,
                ..Default::default()
            };
        };

        // Later pairs override earlier tiers
        let mut tiers: HashMap<String, Tier> = HashMap::new();
        for pair in pairs {
            tiers.extend(
                pair.tiers
                    .iter()
                    .filter(|(_, tier)| tier.is_high_quality())
                    .map(|(address, tier)| (address.clone(), *tier)),
            );
        }

        let rows = pairs.iter().flat_map(|pair| pair.deltas.iter());
        let mut result = self.aggregate(rows, &tiers);
        result.run_date = Some(run_date);
        result.prior_run_date = Some(oldest.prior_run_date);

        debug!(
            run_date = %run_date,
            pairs = pairs.len(),
            entries = result.entries.len(),
            fallback_used = result.diagnostics.fallback_used,
            "Computed consensus"
        );
        result
    }

    /// Bucket already-collected rows using a merged wallet tier map.
    pub fn aggregate<'a>(
        &self,
        rows: impl IntoIterator<Item = &'a PositionDelta>,
        tiers: &HashMap<String, Tier>,
    ) -> ConsensusResult {
        let cfg = &self.config;
        let mut diagnostics = ConsensusDiagnostics {
            candidate_flow_wallets_a_b: tiers.values().filter(|t| t.is_high_quality()).count()
                as u32,
            ..Default::default()
        };

        let mut buckets: HashMap<(String, Outcome), Bucket> = HashMap::new();
        for row in rows {
            if !row.classification.is_accumulation()
                || row.delta_usd.is_nan()
                || row.delta_usd < cfg.min_position_delta_usd
                || row.address.is_empty()
            {
                continue;
            }
            let tier = tiers.get(&row.address).copied();
            if cfg.require_tier_a_or_b && !tier.is_some_and(|t| t.is_high_quality()) {
                continue;
            }

            diagnostics.candidate_rows += 1;
            buckets
                .entry((row.market_id.clone(), row.outcome))
                .or_insert_with(|| Bucket::new(row))
                .add(row, tier);
        }

        diagnostics.unique_candidate_keys = buckets.len() as u32;
        diagnostics.keys_meeting_min_wallets = buckets
            .values()
            .filter(|b| b.wallet_count() >= cfg.min_wallets)
            .count() as u32;
        diagnostics.keys_meeting_min_total_delta = buckets
            .values()
            .filter(|b| b.total_delta_usd >= cfg.min_total_delta_usd)
            .count() as u32;

        let mut entries = self.select(&buckets, cfg.min_total_delta_usd, false);
        if entries.is_empty() && cfg.fallback_enabled {
            entries = self.select(&buckets, cfg.fallback_min_total_delta_usd, true);
            diagnostics.fallback_used = !entries.is_empty();
        }

        let mut entries = stable_sorted(
            entries,
            |e| (e.score_consensus, e.total_delta_usd, e.wallets_supporting),
            true,
            |e| (e.market_id.clone(), e.outcome.as_str()),
        );
        diagnostics.qualified_keys = entries.len() as u32;
        entries.truncate(cfg.top_n);

        let wallets = entries
            .iter()
            .flat_map(|entry| {
                let bucket = &buckets[&(entry.market_id.clone(), entry.outcome)];
                stable_sorted(
                    bucket.wallets.values().cloned(),
                    |w| w.delta_usd,
                    true,
                    |w| w.address.clone(),
                )
            })
            .collect();

        ConsensusResult {
            run_date: None,
            prior_run_date: None,
            lookback_days: cfg.lookback_days,
            entries,
            wallets,
            diagnostics,
        }
    }

    /// Buckets meeting `min_wallets` and `min_total`, finalized into entries.
    fn select(
        &self,
        buckets: &HashMap<(String, Outcome), Bucket>,
        min_total: f64,
        fallback: bool,
    ) -> Vec<ConsensusEntry> {
        let cfg = &self.config;
        buckets
            .values()
            .filter(|b| b.wallet_count() >= cfg.min_wallets && b.total_delta_usd >= min_total)
            .map(|b| self.finalize(b, fallback))
            .filter(|e| !(cfg.drop_over_concentrated && e.top_wallet_share > cfg.max_top_wallet_share))
            .collect()
    }

    fn finalize(&self, bucket: &Bucket, fallback: bool) -> ConsensusEntry {
        let (top_wallet, top_wallet_delta) = bucket.top_wallet();
        let total = bucket.total_delta_usd;
        let top_wallet_share = if total > 0.0 {
            top_wallet_delta / total
        } else {
            0.0
        };

        let mut entry = ConsensusEntry {
            market_id: bucket.market_id.clone(),
            outcome: bucket.outcome,
            question: bucket.question.clone(),
            cluster_key: bucket.cluster_key.clone(),
            wallets_supporting: bucket.wallet_count(),
            wallets_new: bucket.new.len() as u32,
            wallets_increasing: bucket.increasing.len() as u32,
            tiers_a: bucket.tiers_a,
            tiers_b: bucket.tiers_b,
            total_delta_usd: total,
            total_new_usd: bucket.total_new_usd,
            total_increase_usd: bucket.total_increase_usd,
            top_wallet: top_wallet.map(str::to_string),
            top_wallet_delta,
            top_wallet_share,
            score_consensus: 0.0,
            fallback,
        };
        entry.score_consensus = self.score(&entry);
        entry
    }

    pub fn score(&self, entry: &ConsensusEntry) -> f64 {
        let weights = &self.config.weights;
        let concentration = (entry.top_wallet_share - self.config.max_top_wallet_share).max(0.0);

        weights.w_total_delta * log_norm(entry.total_delta_usd)
            + weights.w_wallets * entry.wallets_supporting as f64
            + weights.w_new * entry.wallets_new as f64
            + weights.w_tier_a * entry.tiers_a as f64
            - weights.w_concentration_penalty * concentration
    }
}
