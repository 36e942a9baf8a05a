//! In-memory snapshot store for tests and benchmarks.

use super::{RunStatus, SnapshotStore};
use crate::types::{HolderRecord, MarketContext, MarketInfo, MarketScore, WalletMetric, WalletScore};
use crate::Result;
use chrono::NaiveDate;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Debug, Default)]
struct State {
    runs: BTreeMap<NaiveDate, (String, RunStatus)>,
    markets: HashMap<String, MarketInfo>,
    snapshots: HashMap<NaiveDate, HashMap<String, MarketInfo>>,
    /// Keyed by (market_id, address, outcome) so re-inserts replace.
    holders: HashMap<NaiveDate, BTreeMap<(String, String, String), HolderRecord>>,
    metrics: HashMap<NaiveDate, Vec<WalletMetric>>,
    market_scores: HashMap<NaiveDate, Vec<MarketScore>>,
    wallet_scores: HashMap<NaiveDate, Vec<WalletScore>>,
}

/// Snapshot store backed by process memory.
#[derive(Debug, Clone, Default)]
pub struct MemorySnapshotStore {
    state: Arc<RwLock<State>>,
}

impl MemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Status recorded for a run, if any.
    pub async fn run_status(&self, run_date: NaiveDate) -> Option<RunStatus> {
        let state = self.state.read().await;
        state.runs.get(&run_date).map(|(_, status)| *status)
    }
}

#[async_trait::async_trait]
impl SnapshotStore for MemorySnapshotStore {
    async fn run_dates(&self, up_to: NaiveDate, limit: usize) -> Result<Vec<NaiveDate>> {
        let state = self.state.read().await;
        Ok(state
            .runs
            .range(..=up_to)
            .rev()
            .take(limit)
            .map(|(date, _)| *date)
            .collect())
    }

    async fn prior_run_date(&self, run_date: NaiveDate) -> Result<Option<NaiveDate>> {
        let state = self.state.read().await;
        Ok(state.runs.range(..run_date).next_back().map(|(date, _)| *date))
    }

    async fn holders(&self, run_date: NaiveDate) -> Result<Vec<HolderRecord>> {
        let state = self.state.read().await;
        Ok(state
            .holders
            .get(&run_date)
            .map(|rows| rows.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn market_context(&self, run_date: NaiveDate) -> Result<MarketContext> {
        let state = self.state.read().await;
        let mut merged: HashMap<&str, (Option<String>, Option<String>)> = HashMap::new();

        for market in state.markets.values() {
            merged.insert(
                &market.market_id,
                (market.question.clone(), Some(market.cluster_key.clone())),
            );
        }
        if let Some(snapshot) = state.snapshots.get(&run_date) {
            for market in snapshot.values() {
                let entry = merged.entry(&market.market_id).or_default();
                if let Some(question) = market.question.as_ref().filter(|q| !q.is_empty()) {
                    entry.0 = Some(question.clone());
                }
                if !market.cluster_key.is_empty() {
                    entry.1 = Some(market.cluster_key.clone());
                }
            }
        }

        let mut context = MarketContext::new();
        for (market_id, (question, cluster_key)) in merged {
            context.insert(market_id, question, cluster_key);
        }
        Ok(context)
    }

    async fn market_snapshots(&self, run_date: NaiveDate) -> Result<Vec<MarketInfo>> {
        let state = self.state.read().await;
        let mut markets: Vec<MarketInfo> = state
            .snapshots
            .get(&run_date)
            .map(|snapshot| snapshot.values().cloned().collect())
            .unwrap_or_default();
        markets.sort_by(|a, b| a.market_id.cmp(&b.market_id));
        Ok(markets)
    }

    async fn record_run(
        &self,
        run_date: NaiveDate,
        timezone: &str,
        status: RunStatus,
    ) -> Result<()> {
        let mut state = self.state.write().await;
        state.runs.insert(run_date, (timezone.to_string(), status));
        Ok(())
    }

    async fn insert_holders(&self, rows: &[HolderRecord]) -> Result<u64> {
        let mut state = self.state.write().await;
        for row in rows {
            state.holders.entry(row.run_date).or_default().insert(
                (row.market_id.clone(), row.address.clone(), row.outcome.clone()),
                row.clone(),
            );
        }
        Ok(rows.len() as u64)
    }

    async fn upsert_markets(&self, run_date: NaiveDate, markets: &[MarketInfo]) -> Result<()> {
        let mut state = self.state.write().await;
        for market in markets {
            state
                .markets
                .insert(market.market_id.clone(), market.clone());
            state
                .snapshots
                .entry(run_date)
                .or_default()
                .insert(market.market_id.clone(), market.clone());
        }
        Ok(())
    }

    async fn save_wallet_metrics(
        &self,
        run_date: NaiveDate,
        metrics: &[WalletMetric],
    ) -> Result<()> {
        let mut state = self.state.write().await;
        let mut rows = metrics.to_vec();
        rows.sort_by(|a, b| a.address.cmp(&b.address));
        state.metrics.insert(run_date, rows);
        Ok(())
    }

    async fn wallet_metrics(&self, run_date: NaiveDate) -> Result<Vec<WalletMetric>> {
        let state = self.state.read().await;
        Ok(state.metrics.get(&run_date).cloned().unwrap_or_default())
    }

    async fn save_scores(
        &self,
        run_date: NaiveDate,
        markets: &[MarketScore],
        wallets: &[WalletScore],
    ) -> Result<()> {
        let mut state = self.state.write().await;
        let mut market_rows = markets.to_vec();
        market_rows.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| a.market_id.cmp(&b.market_id))
        });
        let mut wallet_rows = wallets.to_vec();
        wallet_rows.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| a.address.cmp(&b.address))
        });
        state.market_scores.insert(run_date, market_rows);
        state.wallet_scores.insert(run_date, wallet_rows);
        Ok(())
    }

    async fn market_scores(&self, run_date: NaiveDate) -> Result<Vec<MarketScore>> {
        let state = self.state.read().await;
        Ok(state.market_scores.get(&run_date).cloned().unwrap_or_default())
    }

    async fn wallet_scores(&self, run_date: NaiveDate) -> Result<Vec<WalletScore>> {
        let state = self.state.read().await;
        Ok(state.wallet_scores.get(&run_date).cloned().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 1, day).unwrap()
    }

    #[tokio::test]
    async fn test_run_calendar() {
        let store = MemorySnapshotStore::new();
        for day in [5, 6, 7, 9] {
            store
                .record_run(date(day), "UTC", RunStatus::Success)
                .await
                .unwrap();
        }

        let dates = store.run_dates(date(8), 10).await.unwrap();
        assert_eq!(dates, vec![date(7), date(6), date(5)]);

        let limited = store.run_dates(date(9), 2).await.unwrap();
        assert_eq!(limited, vec![date(9), date(7)]);

        assert_eq!(store.prior_run_date(date(9)).await.unwrap(), Some(date(7)));
        assert_eq!(store.prior_run_date(date(5)).await.unwrap(), None);
        assert_eq!(store.run_status(date(6)).await, Some(RunStatus::Success));
    }

    #[tokio::test]
    async fn test_holders_replace_same_key() {
        let store = MemorySnapshotStore::new();
        let rows = vec![
            HolderRecord::new(date(7), "m1", "0xa", "Yes", 100.0),
            HolderRecord::new(date(7), "m1", "0xa", "Yes", 250.0),
            HolderRecord::new(date(7), "m1", "0xa", "No", 50.0),
        ];
        store.insert_holders(&rows).await.unwrap();

        let stored = store.holders(date(7)).await.unwrap();
        assert_eq!(stored.len(), 2);
        let yes = stored.iter().find(|r| r.outcome == "Yes").unwrap();
        assert_eq!(yes.value(), 250.0);
        assert!(store.holders(date(6)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_market_context_prefers_snapshot() {
        let store = MemorySnapshotStore::new();
        store
            .upsert_markets(
                date(6),
                &[MarketInfo::new("m1", "event:old").with_question("Old?")],
            )
            .await
            .unwrap();
        store
            .upsert_markets(date(7), &[MarketInfo::new("m2", "event:b")])
            .await
            .unwrap();

        let context = store.market_context(date(6)).await.unwrap();
        assert_eq!(context.cluster_key("m1"), "event:old");
        assert_eq!(context.question("m1"), Some("Old?"));
        // m2 is known from the latest metadata even though it was not in this run
        assert_eq!(context.cluster_key("m2"), "event:b");

        let captured = store.market_snapshots(date(6)).await.unwrap();
        assert_eq!(captured.len(), 1);
        assert_eq!(captured[0].market_id, "m1");
        assert!(store.market_snapshots(date(5)).await.unwrap().is_empty());
    }
}
