//! Per-wallet concentration, diversity and sidedness metrics for one run.

use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::NaiveDate;
use polymarket_core::types::{HolderRecord, MarketContext, WalletMetric};

use crate::features::{hhi, ratio, share_of_max};

#[derive(Debug, Default)]
struct WalletAccumulator<'a> {
    total_usd: f64,
    markets: HashSet<&'a str>,
    clusters: HashSet<&'a str>,
    market_usd: HashMap<&'a str, f64>,
    cluster_usd: HashMap<&'a str, f64>,
    yes_usd: f64,
    no_usd: f64,
}

impl<'a> WalletAccumulator<'a> {
    fn add(&mut self, market_id: &'a str, cluster_key: &'a str, outcome: &str, value: f64) {
        self.total_usd += value;
        self.markets.insert(market_id);
        self.clusters.insert(cluster_key);

        if value != 0.0 {
            *self.market_usd.entry(market_id).or_insert(0.0) += value;
            *self.cluster_usd.entry(cluster_key).or_insert(0.0) += value;
        }

        match outcome.trim().to_lowercase().as_str() {
            "yes" => self.yes_usd += value,
            "no" => self.no_usd += value,
            _ => {}
        }
    }

    fn finish(self, run_date: NaiveDate, address: &str) -> WalletMetric {
        let total = self.total_usd;
        let yes_share = ratio(self.yes_usd, self.yes_usd + self.no_usd);

        WalletMetric {
            run_date,
            address: address.to_string(),
            total_usd: total,
            markets_count: self.markets.len() as u32,
            clusters_count: self.clusters.len() as u32,
            top_cluster_share: share_of_max(self.cluster_usd.values().copied(), total),
            top_market_share: share_of_max(self.market_usd.values().copied(), total),
            hhi_markets: hhi(self.market_usd.values().copied(), total),
            hhi_clusters: hhi(self.cluster_usd.values().copied(), total),
            yes_usd: self.yes_usd,
            no_usd: self.no_usd,
            yes_share,
            sidedness: yes_share.map(|share| (share - 0.5).abs() * 2.0),
        }
    }
}

/// Compute wallet metrics from one run's holder rows.
///
/// Rows without an address are skipped. Output is ordered by address.
pub fn compute(
    run_date: NaiveDate,
    holders: &[HolderRecord],
    context: &MarketContext,
) -> Vec<WalletMetric> {
    let mut wallets: BTreeMap<&str, WalletAccumulator<'_>> = BTreeMap::new();

    for row in holders {
        if row.address.is_empty() {
            continue;
        }
        let cluster_key = context.cluster_key(&row.market_id);
        wallets.entry(&row.address).or_default().add(
            &row.market_id,
            cluster_key,
            &row.outcome,
            row.value(),
        );
    }

    wallets
        .into_iter()
        .map(|(address, acc)| acc.finish(run_date, address))
        .collect()
}

/// Per-wallet USD by cluster, summed over one run's priced holder rows.
pub fn cluster_totals(
    holders: &[HolderRecord],
    context: &MarketContext,
) -> HashMap<String, HashMap<String, f64>> {
    let mut totals: HashMap<String, HashMap<String, f64>> = HashMap::new();
    for row in holders {
        if row.address.is_empty() || row.value_usd.is_none() {
            continue;
        }
        let cluster_key = context.cluster_key(&row.market_id);
        *totals
            .entry(row.address.clone())
            .or_default()
            .entry(cluster_key.to_string())
            .or_insert(0.0) += row.value();
    }
    totals
}
