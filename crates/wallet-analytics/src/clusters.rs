//! Cluster-level summaries and per-cluster diversification caps.

use std::collections::{HashMap, HashSet};

use polymarket_core::types::{ClusterSummary, HolderRecord, MarketContext, UNKNOWN_CLUSTER};

use crate::ranking::stable_sorted;

#[derive(Debug, Default)]
struct ClusterAccumulator<'a> {
    total_usd: f64,
    markets: HashSet<&'a str>,
    wallet_usd: HashMap<&'a str, f64>,
}

/// Holder exposure per cluster for one run, sorted by total desc then key.
pub fn clusters_summary(holders: &[HolderRecord], context: &MarketContext) -> Vec<ClusterSummary> {
    let mut clusters: HashMap<&str, ClusterAccumulator<'_>> = HashMap::new();

    for row in holders {
        if row.address.is_empty() {
            continue;
        }
        let value = row.value();
        let acc = clusters
            .entry(context.cluster_key(&row.market_id))
            .or_default();
        acc.total_usd += value;
        acc.markets.insert(&row.market_id);
        *acc.wallet_usd.entry(&row.address).or_insert(0.0) += value;
    }

    let summary: Vec<ClusterSummary> = clusters
        .into_iter()
        .map(|(cluster_key, acc)| {
            let top = top_by_value(&acc.wallet_usd);
            ClusterSummary {
                cluster_key: cluster_key.to_string(),
                markets_in_cluster: acc.markets.len() as u32,
                total_holder_usd: acc.total_usd,
                wallets: acc.wallet_usd.len() as u32,
                top_wallet: top.map(|(address, _)| address.to_string()),
                top_wallet_usd: top.map(|(_, usd)| usd),
            }
        })
        .collect();

    stable_sorted(summary, |c| c.total_holder_usd, true, |c| {
        c.cluster_key.clone()
    })
}

/// Each wallet's largest cluster by USD for one run.
pub fn wallet_top_clusters(
    holders: &[HolderRecord],
    context: &MarketContext,
) -> HashMap<String, String> {
    let mut per_wallet: HashMap<&str, HashMap<&str, f64>> = HashMap::new();
    for row in holders {
        if row.address.is_empty() {
            continue;
        }
        *per_wallet
            .entry(&row.address)
            .or_default()
            .entry(context.cluster_key(&row.market_id))
            .or_insert(0.0) += row.value();
    }

    per_wallet
        .into_iter()
        .filter_map(|(address, clusters)| {
            top_by_value(&clusters).map(|(cluster, _)| (address.to_string(), cluster.to_string()))
        })
        .collect()
}

/// Greedy selection in rank order: at most `limit` items and at most
/// `max_per_cluster` per cluster. Disabled caps reduce to truncation.
pub fn apply_cluster_cap<T, F>(
    ranked: Vec<T>,
    cluster_of: F,
    limit: usize,
    max_per_cluster: usize,
    enabled: bool,
) -> Vec<T>
where
    F: Fn(&T) -> String,
{
    if !enabled {
        return ranked.into_iter().take(limit).collect();
    }

    let mut per_cluster: HashMap<String, usize> = HashMap::new();
    let mut selected = Vec::with_capacity(limit.min(ranked.len()));
    for item in ranked {
        if selected.len() >= limit {
            break;
        }
        let count = per_cluster.entry(cluster_of(&item)).or_insert(0);
        if *count >= max_per_cluster {
            continue;
        }
        *count += 1;
        selected.push(item);
    }
    selected
}

/// Largest entry by value; equal values go to the larger key.
fn top_by_value<'a>(values: &HashMap<&'a str, f64>) -> Option<(&'a str, f64)> {
    values
        .iter()
        .map(|(key, value)| (*key, *value))
        .max_by(|a, b| a.1.total_cmp(&b.1).then_with(|| a.0.cmp(b.0)))
}

/// Cluster lookup for a wallet, `"unknown"` when it has no holdings.
pub fn cluster_for<'a>(top_clusters: &'a HashMap<String, String>, address: &str) -> &'a str {
    top_clusters
        .get(address)
        .map(String::as_str)
        .unwrap_or(UNKNOWN_CLUSTER)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn holder(market: &str, address: &str, value: f64) -> HolderRecord {
        let date = NaiveDate::from_ymd_opt(2026, 1, 7).unwrap();
        HolderRecord::new(date, market, address, "Yes", value)
    }

    fn context() -> MarketContext {
        let mut context = MarketContext::new();
        context.insert("m1", None, Some("cluster:a".into()));
        context.insert("m2", None, Some("cluster:a".into()));
        context.insert("m3", None, Some("cluster:b".into()));
        context
    }

    #[test]
    fn test_clusters_summary() {
        let holders = vec![
            holder("m1", "w1", 100.0),
            holder("m2", "w2", 300.0),
            holder("m2", "w1", 200.0),
            holder("m3", "w3", 50.0),
            holder("m9", "w3", 50.0),
        ];
        let summary = clusters_summary(&holders, &context());
        let keys: Vec<&str> = summary.iter().map(|c| c.cluster_key.as_str()).collect();
        assert_eq!(keys, vec!["cluster:a", "cluster:b", "unknown"]);

        let a = &summary[0];
        assert_eq!(a.markets_in_cluster, 2);
        assert_eq!(a.total_holder_usd, 600.0);
        assert_eq!(a.wallets, 2);
        // w1 and w2 both hold 300; the larger address wins
        assert_eq!(a.top_wallet.as_deref(), Some("w2"));
        assert_eq!(a.top_wallet_usd, Some(300.0));
    }

    #[test]
    fn test_wallet_top_clusters() {
        let holders = vec![
            holder("m1", "w1", 100.0),
            holder("m3", "w1", 400.0),
            holder("m2", "w2", 10.0),
        ];
        let tops = wallet_top_clusters(&holders, &context());
        assert_eq!(cluster_for(&tops, "w1"), "cluster:b");
        assert_eq!(cluster_for(&tops, "w2"), "cluster:a");
        assert_eq!(cluster_for(&tops, "nobody"), UNKNOWN_CLUSTER);
    }

    #[test]
    fn test_cluster_cap() {
        let ranked = vec![("w1", "a"), ("w2", "a"), ("w3", "a"), ("w4", "b"), ("w5", "c")];

        let capped = apply_cluster_cap(ranked.clone(), |r| r.1.to_string(), 4, 2, true);
        let names: Vec<&str> = capped.iter().map(|r| r.0).collect();
        assert_eq!(names, vec!["w1", "w2", "w4", "w5"]);

        let truncated = apply_cluster_cap(ranked, |r| r.1.to_string(), 3, 1, false);
        let names: Vec<&str> = truncated.iter().map(|r| r.0).collect();
        assert_eq!(names, vec!["w1", "w2", "w3"]);
    }
}
