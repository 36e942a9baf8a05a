//! SQLite-backed snapshot store.

use super::{RunStatus, SnapshotStore};
use crate::types::{
    HolderRecord, MarketContext, MarketInfo, MarketScore, MarketSignals, WalletMetric, WalletScore,
    WalletSignals,
};
use crate::Result;
use chrono::{NaiveDate, Utc};
use sqlx::{Row, SqlitePool};
use tracing::debug;

/// Repository over the snapshot tables.
#[derive(Debug, Clone)]
pub struct SqliteSnapshotStore {
    pool: SqlitePool,
}

impl SqliteSnapshotStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait::async_trait]
impl SnapshotStore for SqliteSnapshotStore {
    async fn run_dates(&self, up_to: NaiveDate, limit: usize) -> Result<Vec<NaiveDate>> {
        let rows = sqlx::query(
            r#"
            SELECT run_date FROM runs
            WHERE run_date <= $1
            ORDER BY run_date DESC
            LIMIT $2
            "#,
        )
        .bind(up_to)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| row.try_get::<NaiveDate, _>("run_date").map_err(Into::into))
            .collect()
    }

    async fn prior_run_date(&self, run_date: NaiveDate) -> Result<Option<NaiveDate>> {
        let row = sqlx::query(
            r#"
            SELECT run_date FROM runs
            WHERE run_date < $1
            ORDER BY run_date DESC
            LIMIT 1
            "#,
        )
        .bind(run_date)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(Some(row.try_get("run_date")?)),
            None => Ok(None),
        }
    }

    async fn holders(&self, run_date: NaiveDate) -> Result<Vec<HolderRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT run_date, market_id, address, outcome, value_usd, shares, is_new_wallet
            FROM holders
            WHERE run_date = $1
            ORDER BY market_id, address, outcome
            "#,
        )
        .bind(run_date)
        .fetch_all(&self.pool)
        .await?;

        let mut holders = Vec::with_capacity(rows.len());
        for row in rows {
            holders.push(HolderRecord {
                run_date: row.try_get("run_date")?,
                market_id: row.try_get("market_id")?,
                address: row.try_get("address")?,
                outcome: row.try_get("outcome")?,
                value_usd: row.try_get("value_usd")?,
                shares: row.try_get("shares")?,
                is_new_wallet: row.try_get("is_new_wallet")?,
            });
        }
        Ok(holders)
    }

    async fn market_context(&self, run_date: NaiveDate) -> Result<MarketContext> {
        let rows = sqlx::query(
            r#"
            SELECT m.market_id AS market_id,
                   COALESCE(NULLIF(ms.question, ''), m.question) AS question,
                   COALESCE(NULLIF(ms.cluster_key, ''), m.cluster_key) AS cluster_key
            FROM markets m
            LEFT JOIN market_snapshots ms
              ON ms.run_date = $1 AND ms.market_id = m.market_id
            UNION ALL
            SELECT ms.market_id, ms.question, ms.cluster_key
            FROM market_snapshots ms
            WHERE ms.run_date = $1
              AND ms.market_id NOT IN (SELECT market_id FROM markets)
            "#,
        )
        .bind(run_date)
        .fetch_all(&self.pool)
        .await?;

        let mut context = MarketContext::new();
        for row in rows {
            let market_id: String = row.try_get("market_id")?;
            let question: Option<String> = row.try_get("question")?;
            let cluster_key: Option<String> = row.try_get("cluster_key")?;
            context.insert(market_id, question, cluster_key);
        }
        Ok(context)
    }

    async fn market_snapshots(&self, run_date: NaiveDate) -> Result<Vec<MarketInfo>> {
        let rows = sqlx::query(
            r#"
            SELECT market_id, question, slug, cluster_key, close_time, volume_usd, liquidity_usd
            FROM market_snapshots
            WHERE run_date = $1
            ORDER BY market_id
            "#,
        )
        .bind(run_date)
        .fetch_all(&self.pool)
        .await?;

        let mut markets = Vec::with_capacity(rows.len());
        for row in rows {
            let cluster_key: Option<String> = row.try_get("cluster_key")?;
            let volume_usd: Option<f64> = row.try_get("volume_usd")?;
            let liquidity_usd: Option<f64> = row.try_get("liquidity_usd")?;
            markets.push(MarketInfo {
                market_id: row.try_get("market_id")?,
                question: row.try_get("question")?,
                slug: row.try_get("slug")?,
                cluster_key: cluster_key.unwrap_or_default(),
                close_time: row.try_get("close_time")?,
                volume_usd: volume_usd.unwrap_or(0.0),
                liquidity_usd: liquidity_usd.unwrap_or(0.0),
            });
        }
        Ok(markets)
    }

    async fn record_run(
        &self,
        run_date: NaiveDate,
        timezone: &str,
        status: RunStatus,
    ) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        sqlx::query(
            r#"
            INSERT INTO runs (run_date, timezone, status, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $4)
            ON CONFLICT (run_date) DO UPDATE SET
                timezone = EXCLUDED.timezone,
                status = EXCLUDED.status,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(run_date)
        .bind(timezone)
        .bind(status.as_str())
        .bind(&now)
        .execute(&self.pool)
        .await?;

        debug!(%run_date, %status, "Recorded run");
        Ok(())
    }

    async fn insert_holders(&self, rows: &[HolderRecord]) -> Result<u64> {
        let mut tx = self.pool.begin().await?;
        let mut written = 0u64;
        for row in rows {
            let result = sqlx::query(
                r#"
                INSERT INTO holders (
                    run_date, market_id, address, outcome, value_usd, shares, is_new_wallet
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                ON CONFLICT (run_date, market_id, address, outcome) DO UPDATE SET
                    value_usd = EXCLUDED.value_usd,
                    shares = EXCLUDED.shares,
                    is_new_wallet = EXCLUDED.is_new_wallet
                "#,
            )
            .bind(row.run_date)
            .bind(&row.market_id)
            .bind(&row.address)
            .bind(&row.outcome)
            .bind(row.value_usd)
            .bind(row.shares)
            .bind(row.is_new_wallet)
            .execute(&mut *tx)
            .await?;
            written += result.rows_affected();
        }
        tx.commit().await?;

        debug!(rows = written, "Inserted holders");
        Ok(written)
    }

    async fn upsert_markets(&self, run_date: NaiveDate, markets: &[MarketInfo]) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        let mut tx = self.pool.begin().await?;
        for market in markets {
            sqlx::query(
                r#"
                INSERT INTO markets (
                    market_id, question, slug, cluster_key, close_time,
                    volume_usd, liquidity_usd, updated_at
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                ON CONFLICT (market_id) DO UPDATE SET
                    question = EXCLUDED.question,
                    slug = EXCLUDED.slug,
                    cluster_key = EXCLUDED.cluster_key,
                    close_time = EXCLUDED.close_time,
                    volume_usd = EXCLUDED.volume_usd,
                    liquidity_usd = EXCLUDED.liquidity_usd,
                    updated_at = EXCLUDED.updated_at
                "#,
            )
            .bind(&market.market_id)
            .bind(&market.question)
            .bind(&market.slug)
            .bind(&market.cluster_key)
            .bind(&market.close_time)
            .bind(market.volume_usd)
            .bind(market.liquidity_usd)
            .bind(&now)
            .execute(&mut *tx)
            .await?;

            sqlx::query(
                r#"
                INSERT OR REPLACE INTO market_snapshots (
                    run_date, market_id, question, slug, cluster_key, close_time,
                    volume_usd, liquidity_usd
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                "#,
            )
            .bind(run_date)
            .bind(&market.market_id)
            .bind(&market.question)
            .bind(&market.slug)
            .bind(&market.cluster_key)
            .bind(&market.close_time)
            .bind(market.volume_usd)
            .bind(market.liquidity_usd)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;

        debug!(%run_date, markets = markets.len(), "Upserted markets");
        Ok(())
    }

    async fn save_wallet_metrics(
        &self,
        run_date: NaiveDate,
        metrics: &[WalletMetric],
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM wallet_metrics WHERE run_date = $1")
            .bind(run_date)
            .execute(&mut *tx)
            .await?;

        for metric in metrics {
            sqlx::query(
                r#"
                INSERT INTO wallet_metrics (
                    run_date, address, total_usd, markets_count, clusters_count,
                    top_cluster_share, top_market_share, hhi_markets, hhi_clusters,
                    yes_usd, no_usd, yes_share, sidedness
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
                "#,
            )
            .bind(run_date)
            .bind(&metric.address)
            .bind(metric.total_usd)
            .bind(metric.markets_count as i64)
            .bind(metric.clusters_count as i64)
            .bind(metric.top_cluster_share)
            .bind(metric.top_market_share)
            .bind(metric.hhi_markets)
            .bind(metric.hhi_clusters)
            .bind(metric.yes_usd)
            .bind(metric.no_usd)
            .bind(metric.yes_share)
            .bind(metric.sidedness)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;

        debug!(%run_date, wallets = metrics.len(), "Saved wallet metrics");
        Ok(())
    }

    async fn wallet_metrics(&self, run_date: NaiveDate) -> Result<Vec<WalletMetric>> {
        let rows = sqlx::query(
            r#"
            SELECT run_date, address, total_usd, markets_count, clusters_count,
                   top_cluster_share, top_market_share, hhi_markets, hhi_clusters,
                   yes_usd, no_usd, yes_share, sidedness
            FROM wallet_metrics
            WHERE run_date = $1
            ORDER BY address
            "#,
        )
        .bind(run_date)
        .fetch_all(&self.pool)
        .await?;

        let mut metrics = Vec::with_capacity(rows.len());
        for row in rows {
            metrics.push(WalletMetric {
                run_date: row.try_get("run_date")?,
                address: row.try_get("address")?,
                total_usd: row.try_get("total_usd")?,
                markets_count: row.try_get::<i64, _>("markets_count")? as u32,
                clusters_count: row.try_get::<i64, _>("clusters_count")? as u32,
                top_cluster_share: row.try_get("top_cluster_share")?,
                top_market_share: row.try_get("top_market_share")?,
                hhi_markets: row.try_get("hhi_markets")?,
                hhi_clusters: row.try_get("hhi_clusters")?,
                yes_usd: row.try_get("yes_usd")?,
                no_usd: row.try_get("no_usd")?,
                yes_share: row.try_get("yes_share")?,
                sidedness: row.try_get("sidedness")?,
            });
        }
        Ok(metrics)
    }

    async fn save_scores(
        &self,
        run_date: NaiveDate,
        markets: &[MarketScore],
        wallets: &[WalletScore],
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM market_scores WHERE run_date = $1")
            .bind(run_date)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM wallet_scores WHERE run_date = $1")
            .bind(run_date)
            .execute(&mut *tx)
            .await?;

        for market in markets {
            sqlx::query(
                r#"
                INSERT INTO market_scores (
                    run_date, market_id, question, cluster_key, score, signals_json
                )
                VALUES ($1, $2, $3, $4, $5, $6)
                "#,
            )
            .bind(run_date)
            .bind(&market.market_id)
            .bind(&market.question)
            .bind(&market.cluster_key)
            .bind(market.score)
            .bind(serde_json::to_string(&market.signals)?)
            .execute(&mut *tx)
            .await?;
        }

        for wallet in wallets {
            sqlx::query(
                r#"
                INSERT INTO wallet_scores (run_date, address, score, signals_json)
                VALUES ($1, $2, $3, $4)
                "#,
            )
            .bind(run_date)
            .bind(&wallet.address)
            .bind(wallet.score)
            .bind(serde_json::to_string(&wallet.signals)?)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;

        debug!(%run_date, markets = markets.len(), wallets = wallets.len(), "Saved scores");
        Ok(())
    }

    async fn market_scores(&self, run_date: NaiveDate) -> Result<Vec<MarketScore>> {
        let rows = sqlx::query(
            r#"
            SELECT run_date, market_id, question, cluster_key, score, signals_json
            FROM market_scores
            WHERE run_date = $1
            ORDER BY score DESC, market_id
            "#,
        )
        .bind(run_date)
        .fetch_all(&self.pool)
        .await?;

        let mut scores = Vec::with_capacity(rows.len());
        for row in rows {
            let signals: String = row.try_get("signals_json")?;
            scores.push(MarketScore {
                run_date: row.try_get("run_date")?,
                market_id: row.try_get("market_id")?,
                question: row.try_get("question")?,
                cluster_key: row.try_get("cluster_key")?,
                score: row.try_get("score")?,
                signals: serde_json::from_str::<MarketSignals>(&signals)?,
            });
        }
        Ok(scores)
    }

    async fn wallet_scores(&self, run_date: NaiveDate) -> Result<Vec<WalletScore>> {
        let rows = sqlx::query(
            r#"
            SELECT run_date, address, score, signals_json
            FROM wallet_scores
            WHERE run_date = $1
            ORDER BY score DESC, address
            "#,
        )
        .bind(run_date)
        .fetch_all(&self.pool)
        .await?;

        let mut scores = Vec::with_capacity(rows.len());
        for row in rows {
            let signals: String = row.try_get("signals_json")?;
            scores.push(WalletScore {
                run_date: row.try_get("run_date")?,
                address: row.try_get("address")?,
                score: row.try_get("score")?,
                signals: serde_json::from_str::<WalletSignals>(&signals)?,
            });
        }
        Ok(scores)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::run_migrations;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn setup() -> SqliteSnapshotStore {
        // A single connection keeps every query on the same in-memory database.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        run_migrations(&pool).await.unwrap();
        SqliteSnapshotStore::new(pool)
    }

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 1, day).unwrap()
    }

    #[tokio::test]
    async fn test_run_calendar_ordering() {
        let store = setup().await;
        for day in [6, 7, 5] {
            store
                .record_run(date(day), "UTC", RunStatus::Running)
                .await
                .unwrap();
        }
        store
            .record_run(date(7), "UTC", RunStatus::Success)
            .await
            .unwrap();

        let dates = store.run_dates(date(7), 10).await.unwrap();
        assert_eq!(dates, vec![date(7), date(6), date(5)]);
        assert_eq!(store.prior_run_date(date(7)).await.unwrap(), Some(date(6)));
        assert_eq!(store.prior_run_date(date(5)).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_snapshot_round_trip() {
        let store = setup().await;
        let day = date(7);

        store
            .upsert_markets(
                day,
                &[
                    MarketInfo::new("m1", "event:a").with_question("Q1"),
                    MarketInfo::new("m2", ""),
                ],
            )
            .await
            .unwrap();

        let mut unpriced = HolderRecord::new(day, "m2", "0xb", "No", 0.0)
            .with_shares(300.0)
            .new_wallet();
        unpriced.value_usd = None;
        let written = store
            .insert_holders(&[
                HolderRecord::new(day, "m1", "0xa", "Yes", 1200.0),
                unpriced,
            ])
            .await
            .unwrap();
        assert_eq!(written, 2);

        let holders = store.holders(day).await.unwrap();
        assert_eq!(holders.len(), 2);
        assert_eq!(holders[0].address, "0xa");
        assert_eq!(holders[0].value_usd, Some(1200.0));
        assert_eq!(holders[1].value_usd, None);
        assert_eq!(holders[1].shares, Some(300.0));
        assert!(holders[1].is_new_wallet);
        assert!(!holders[0].is_new_wallet);

        let context = store.market_context(day).await.unwrap();
        assert_eq!(context.cluster_key("m1"), "event:a");
        assert_eq!(context.question("m1"), Some("Q1"));
        assert_eq!(context.cluster_key("m2"), "unknown");

        let captured = store.market_snapshots(day).await.unwrap();
        let ids: Vec<&str> = captured.iter().map(|m| m.market_id.as_str()).collect();
        assert_eq!(ids, vec!["m1", "m2"]);
        assert_eq!(captured[0].question.as_deref(), Some("Q1"));
        assert!(store.market_snapshots(date(8)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_scores_replace_and_order() {
        let store = setup().await;
        let day = date(7);
        let market = |id: &str, score: f64| MarketScore {
            run_date: day,
            market_id: id.to_string(),
            question: None,
            cluster_key: "event:a".to_string(),
            score,
            signals: MarketSignals {
                conviction_wallets: 3,
                convergence: true,
                ..MarketSignals::default()
            },
        };
        let wallet = WalletScore {
            run_date: day,
            address: "0xa".to_string(),
            score: 2.5,
            signals: WalletSignals {
                exposure: 7.5,
                conviction: 1.0,
                whale: 0.0,
                new_wallet: 0.0,
                markets: 2,
                basis: crate::types::ExposureBasis::Shares,
            },
        };

        store
            .save_scores(day, &[market("m1", 1.0)], &[])
            .await
            .unwrap();
        store
            .save_scores(day, &[market("m2", 1.0), market("m1", 3.0)], &[wallet.clone()])
            .await
            .unwrap();

        let markets = store.market_scores(day).await.unwrap();
        assert_eq!(markets, vec![market("m1", 3.0), market("m2", 1.0)]);
        assert_eq!(store.wallet_scores(day).await.unwrap(), vec![wallet]);
        assert!(store.market_scores(date(8)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_wallet_metrics_replace() {
        let store = setup().await;
        let day = date(7);
        let metric = WalletMetric {
            run_date: day,
            address: "0xa".to_string(),
            total_usd: 100.0,
            markets_count: 2,
            clusters_count: 1,
            top_cluster_share: Some(1.0),
            top_market_share: Some(0.5),
            hhi_markets: Some(0.5),
            hhi_clusters: Some(1.0),
            yes_usd: 100.0,
            no_usd: 0.0,
            yes_share: Some(1.0),
            sidedness: None,
        };

        store
            .save_wallet_metrics(day, &[metric.clone()])
            .await
            .unwrap();
        store
            .save_wallet_metrics(day, &[metric.clone()])
            .await
            .unwrap();

        let stored = store.wallet_metrics(day).await.unwrap();
        assert_eq!(stored, vec![metric]);
    }
}
