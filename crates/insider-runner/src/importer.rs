//! Snapshot importer.
//!
//! Turns raw market and holder payloads, as saved from the Polymarket
//! APIs, into [`MarketInfo`] and [`HolderRecord`] rows and writes them to a
//! [`SnapshotStore`].

use std::collections::{HashMap, HashSet};
use std::path::Path;

use chrono::{DateTime, NaiveDate, Utc};
use polymarket_core::config::{AppConfig, MarketFilters};
use polymarket_core::db::{RunStatus, SnapshotStore};
use polymarket_core::types::{build_cluster_key, ClusterSource, HolderRecord, MarketInfo};
use polymarket_core::{Error, Result};
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};
use wallet_analytics::features::{days_until_close, parse_datetime};

const MARKET_ID_KEYS: &[&str] = &["id", "marketId", "market_id", "conditionId", "condition_id"];
const HOLDER_MARKET_KEYS: &[&str] = &["market_id", "marketId", "market", "conditionId", "condition_id"];
const CLOSE_TIME_KEYS: &[&str] = &[
    "closeTime",
    "closesAt",
    "close_time",
    "endDate",
    "endDateIso",
    "endDateTime",
    "end_time",
];
const VOLUME_KEYS: &[&str] = &["volume", "volumeUSD", "volume_usd", "volumeNum", "volumeUsd"];
const LIQUIDITY_KEYS: &[&str] = &[
    "liquidity",
    "liquidityUSD",
    "liquidity_usd",
    "liquidityNum",
    "liquidityUsd",
];
const ADDRESS_KEYS: &[&str] = &["address", "wallet", "user", "account", "proxyWallet"];
const OUTCOME_KEYS: &[&str] = &["outcome", "position", "side", "outcomeLabel", "outcome_label"];
const VALUE_KEYS: &[&str] = &[
    "valueUsd",
    "valueUSD",
    "value_usd",
    "usdValue",
    "usd_value",
    "notionalValue",
    "notional_value",
];
const SHARES_KEYS: &[&str] = &[
    "shares", "share", "size", "amount", "balance", "position", "quantity",
];
const LIST_KEYS: &[&str] = &["holders", "data", "results"];
const CLOSED_KEYS: &[&str] = &[
    "closed",
    "isClosed",
    "resolved",
    "isResolved",
    "archived",
    "isArchived",
];
const CREATED_KEYS: &[&str] = &["firstSeen", "createdAt", "created_at", "first_seen"];

/// Outcome label used when a holder row carries none.
pub const UNKNOWN_OUTCOME: &str = "unknown";

/// A parsed market plus the pricing fields holder valuation needs.
#[derive(Debug, Clone)]
pub struct MarketRecord {
    pub info: MarketInfo,
    outcomes: Vec<String>,
    outcome_prices: Vec<f64>,
    last_price: Option<f64>,
    /// Closed, resolved or archived upstream.
    closed: bool,
}

/// Why a market is left out of a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Exclusion {
    ClosedOrResolved,
    BelowMinVolume,
    BelowMinLiquidity,
    OutsideDaysToClose,
}

impl MarketRecord {
    /// Filters this market fails. A market without a parseable close time
    /// passes the close-time filter.
    pub fn exclusions(&self, run_date: NaiveDate, filters: &MarketFilters) -> Vec<Exclusion> {
        let mut reasons = Vec::new();
        if self.closed {
            reasons.push(Exclusion::ClosedOrResolved);
        }
        if self.info.volume_usd < filters.min_volume {
            reasons.push(Exclusion::BelowMinVolume);
        }
        if self.info.liquidity_usd < filters.min_liquidity {
            reasons.push(Exclusion::BelowMinLiquidity);
        }
        if days_until_close(self.info.close_time.as_deref(), run_date)
            .is_some_and(|days| days > filters.days_to_close)
        {
            reasons.push(Exclusion::OutsideDaysToClose);
        }
        reasons
    }
}

/// Counters reported after an import.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImportSummary {
    pub run_date: NaiveDate,
    pub markets: usize,
    pub excluded_markets: usize,
    pub missing_close_time: usize,
    pub holder_rows: u64,
    pub skipped_holders: usize,
    /// Rows belonging to excluded markets.
    pub dropped_holders: usize,
    pub unknown_outcomes: usize,
    pub unpriced_holders: usize,
    pub new_wallet_rows: usize,
}

fn text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// JSON truthiness for upstream status flags.
fn truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|v| v != 0.0),
        Value::String(s) => s.trim().eq_ignore_ascii_case("true") || s.trim() == "1",
        _ => false,
    }
}

fn first_text(obj: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| obj.get(*key).and_then(text))
}

/// Numeric value of a JSON number or numeric string.
fn number(value: &Value) -> Option<f64> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed.filter(|v| v.is_finite())
}

/// First non-zero number among `keys`.
fn first_nonzero(obj: &Map<String, Value>, keys: &[&str]) -> Option<f64> {
    keys.iter()
        .find_map(|key| obj.get(*key).and_then(number).filter(|v| *v != 0.0))
}

/// Number under the first present key, coerced to 0.0 when unparseable.
fn first_present(obj: &Map<String, Value>, keys: &[&str]) -> Option<f64> {
    keys.iter()
        .find_map(|key| obj.get(*key))
        .map(|value| number(value).unwrap_or(0.0))
}

/// A JSON array, or a string holding an encoded JSON array.
fn coerce_list(value: Option<&Value>) -> Vec<Value> {
    match value {
        Some(Value::Array(items)) => items.clone(),
        Some(Value::String(s)) => serde_json::from_str::<Vec<Value>>(s).unwrap_or_default(),
        _ => Vec::new(),
    }
}

fn event_ids(raw: &Map<String, Value>) -> Vec<String> {
    let Some(Value::Array(events)) = raw.get("events") else {
        return Vec::new();
    };
    events
        .iter()
        .filter_map(|event| match event {
            Value::Object(obj) => first_text(obj, &["id", "eventId", "event_id"]),
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            _ => None,
        })
        .collect()
}

/// Parse one market object. Returns `None` when it has no usable id.
pub fn parse_market(raw: &Value) -> Option<MarketRecord> {
    let obj = raw.as_object()?;
    let market_id = first_text(obj, MARKET_ID_KEYS)?;
    let question = first_text(obj, &["question", "title"]);
    let slug = first_text(obj, &["slug"]);
    let group_title = first_text(obj, &["groupItemTitle", "group_item_title"]);

    let cluster_key = build_cluster_key(&ClusterSource {
        event_ids: event_ids(obj),
        group_title: group_title.as_deref(),
        slug: slug.as_deref(),
        question: question.as_deref(),
    });

    let outcomes = coerce_list(obj.get("outcomes"))
        .iter()
        .map(|v| text(v).unwrap_or_default())
        .collect();
    let prices_raw = obj.get("outcomePrices").or_else(|| obj.get("outcome_prices"));
    let outcome_prices = coerce_list(prices_raw)
        .iter()
        .map(|v| number(v).unwrap_or(0.0))
        .collect();

    Some(MarketRecord {
        info: MarketInfo {
            market_id,
            question,
            slug,
            cluster_key,
            close_time: first_text(obj, CLOSE_TIME_KEYS),
            volume_usd: first_nonzero(obj, VOLUME_KEYS).unwrap_or(0.0),
            liquidity_usd: first_nonzero(obj, LIQUIDITY_KEYS).unwrap_or(0.0),
        },
        outcomes,
        outcome_prices,
        last_price: first_nonzero(obj, &["lastTradePrice", "last_price", "lastPrice"]),
        closed: CLOSED_KEYS
            .iter()
            .any(|key| obj.get(*key).is_some_and(truthy)),
    })
}

/// Parse a markets payload: an array, or an object wrapping one under
/// `markets`, `data` or `results`.
pub fn parse_markets(payload: &Value) -> Vec<MarketRecord> {
    let items: &[Value] = match payload {
        Value::Array(items) => items,
        Value::Object(obj) => ["markets", "data", "results"]
            .iter()
            .find_map(|key| obj.get(*key).and_then(Value::as_array))
            .map(Vec::as_slice)
            .unwrap_or(&[]),
        _ => &[],
    };
    items.iter().filter_map(parse_market).collect()
}

/// Holder objects in one API payload.
///
/// Accepts a flat array, token groups (`[{token, holders: [...]}]`) or an
/// object wrapping the list under `holders`, `data` or `results`.
pub fn extract_holder_list(payload: &Value) -> Vec<&Map<String, Value>> {
    match payload {
        Value::Array(items) => {
            let grouped = !items.is_empty()
                && items
                    .iter()
                    .all(|item| item.as_object().is_some_and(|o| o.contains_key("holders")));
            if grouped {
                items
                    .iter()
                    .filter_map(|group| group.get("holders").and_then(Value::as_array))
                    .flatten()
                    .filter_map(Value::as_object)
                    .collect()
            } else {
                items.iter().filter_map(Value::as_object).collect()
            }
        }
        Value::Object(obj) => LIST_KEYS
            .iter()
            .find_map(|key| obj.get(*key).and_then(Value::as_array))
            .map(|items| items.iter().filter_map(Value::as_object).collect())
            .unwrap_or_default(),
        _ => Vec::new(),
    }
}

fn outcome_index(holder: &Map<String, Value>) -> Option<usize> {
    holder
        .get("outcomeIndex")
        .and_then(Value::as_u64)
        .map(|i| i as usize)
}

/// Outcome label from the holder, then from the market's outcome list.
pub fn holder_outcome(holder: &Map<String, Value>, market: Option<&MarketRecord>) -> String {
    if let Some(outcome) = first_text(holder, OUTCOME_KEYS) {
        return outcome;
    }
    outcome_index(holder)
        .and_then(|i| market.and_then(|m| m.outcomes.get(i)))
        .filter(|label| !label.is_empty())
        .cloned()
        .unwrap_or_else(|| UNKNOWN_OUTCOME.to_string())
}

/// USD value from an explicit value field, else shares times price.
pub fn holder_value_usd(holder: &Map<String, Value>, market: Option<&MarketRecord>) -> Option<f64> {
    if let Some(value) = first_present(holder, VALUE_KEYS) {
        return Some(value);
    }
    let shares = first_present(holder, SHARES_KEYS)?;

    let from_outcome = || {
        let i = outcome_index(holder)?;
        market?.outcome_prices.get(i).copied()
    };
    let price = holder
        .get("price")
        .and_then(number)
        .filter(|p| *p != 0.0)
        .or_else(|| from_outcome().filter(|p| *p != 0.0))
        .or_else(|| market.and_then(|m| m.last_price));

    price.map(|p| shares * p)
}

/// When the wallet was first seen, if the holder row says.
pub fn wallet_created(holder: &Map<String, Value>) -> Option<DateTime<Utc>> {
    CREATED_KEYS
        .iter()
        .find_map(|key| holder.get(*key).and_then(text).and_then(|raw| parse_datetime(&raw)))
}

#[derive(Debug, Default)]
struct ParsedHolders {
    rows: Vec<HolderRecord>,
    skipped: usize,
    dropped: usize,
    unknown_outcomes: usize,
    unpriced: usize,
    new_wallets: usize,
}

/// Holder payload parsing for one run.
struct HolderParser<'a> {
    run_date: NaiveDate,
    markets: &'a HashMap<String, MarketRecord>,
    excluded: &'a HashSet<String>,
    new_wallet_days: i64,
}

impl HolderParser<'_> {
    fn push(
        &self,
        parsed: &mut ParsedHolders,
        market_id: Option<String>,
        holder: &Map<String, Value>,
    ) {
        let (Some(market_id), Some(address)) = (market_id, first_text(holder, ADDRESS_KEYS)) else {
            parsed.skipped += 1;
            return;
        };
        if self.excluded.contains(&market_id) {
            parsed.dropped += 1;
            return;
        }
        let market = self.markets.get(&market_id);
        let outcome = holder_outcome(holder, market);
        if outcome == UNKNOWN_OUTCOME {
            parsed.unknown_outcomes += 1;
        }
        let value_usd = holder_value_usd(holder, market);
        if value_usd.is_none() {
            parsed.unpriced += 1;
        }
        // A creation date after the run still counts as new.
        let is_new_wallet = wallet_created(holder).is_some_and(|created| {
            (self.run_date - created.date_naive()).num_days() <= self.new_wallet_days
        });
        if is_new_wallet {
            parsed.new_wallets += 1;
        }
        parsed.rows.push(HolderRecord {
            run_date: self.run_date,
            market_id,
            address,
            outcome,
            value_usd,
            shares: first_present(holder, SHARES_KEYS),
            is_new_wallet,
        });
    }

    /// Parse a holders payload.
    ///
    /// An object without `holders`/`data`/`results` keys maps market ids to
    /// per-market payloads. Any other shape is one flat payload whose rows
    /// name their market themselves.
    fn parse(&self, payload: &Value) -> ParsedHolders {
        let mut parsed = ParsedHolders::default();
        match payload {
            Value::Object(obj) if !LIST_KEYS.iter().any(|key| obj.contains_key(*key)) => {
                for (market_id, market_payload) in obj {
                    for holder in extract_holder_list(market_payload) {
                        self.push(&mut parsed, Some(market_id.clone()), holder);
                    }
                }
            }
            _ => {
                for holder in extract_holder_list(payload) {
                    let market_id = first_text(holder, HOLDER_MARKET_KEYS);
                    self.push(&mut parsed, market_id, holder);
                }
            }
        }
        parsed
    }
}

fn read_json(path: &Path) -> Result<Value> {
    let raw = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&raw)?)
}

/// Import one run's markets and holders from JSON files.
///
/// Markets failing `market_filters` are left out together with their
/// holder rows.
pub async fn import_snapshot<S>(
    store: &S,
    run_date: NaiveDate,
    config: &AppConfig,
    markets_path: &Path,
    holders_path: &Path,
) -> Result<ImportSummary>
where
    S: SnapshotStore + ?Sized,
{
    let timezone = config.run.timezone.as_str();
    let markets = parse_markets(&read_json(markets_path)?);
    if markets.is_empty() {
        return Err(Error::InvalidSnapshot(format!(
            "no markets found in {}",
            markets_path.display()
        )));
    }

    let mut by_id: HashMap<String, MarketRecord> = HashMap::new();
    let mut excluded: HashSet<String> = HashSet::new();
    let mut missing_close_time = 0;
    for market in markets {
        if days_until_close(market.info.close_time.as_deref(), run_date).is_none() {
            missing_close_time += 1;
        }
        let reasons = market.exclusions(run_date, &config.market_filters);
        if reasons.is_empty() {
            by_id.insert(market.info.market_id.clone(), market);
        } else {
            debug!(market_id = %market.info.market_id, ?reasons, "Excluded market");
            excluded.insert(market.info.market_id);
        }
    }
    if by_id.is_empty() {
        warn!(run_date = %run_date, excluded = excluded.len(), "Every market was excluded");
    }

    let parser = HolderParser {
        run_date,
        markets: &by_id,
        excluded: &excluded,
        new_wallet_days: config.thresholds.new_wallet_days,
    };
    let holders = parser.parse(&read_json(holders_path)?);
    if holders.skipped > 0 {
        warn!(
            run_date = %run_date,
            skipped = holders.skipped,
            "Skipped holder rows without market or address"
        );
    }

    store.record_run(run_date, timezone, RunStatus::Running).await?;
    let infos: Vec<MarketInfo> = by_id.into_values().map(|m| m.info).collect();
    let written = async {
        store.upsert_markets(run_date, &infos).await?;
        store.insert_holders(&holders.rows).await
    }
    .await;

    let holder_rows = match written {
        Ok(count) => count,
        Err(e) => {
            store.record_run(run_date, timezone, RunStatus::Failed).await?;
            return Err(e);
        }
    };
    store.record_run(run_date, timezone, RunStatus::Success).await?;

    let summary = ImportSummary {
        run_date,
        markets: infos.len(),
        excluded_markets: excluded.len(),
        missing_close_time,
        holder_rows,
        skipped_holders: holders.skipped,
        dropped_holders: holders.dropped,
        unknown_outcomes: holders.unknown_outcomes,
        unpriced_holders: holders.unpriced,
        new_wallet_rows: holders.new_wallets,
    };
    info!(
        run_date = %run_date,
        markets = summary.markets,
        excluded_markets = summary.excluded_markets,
        holders = summary.holder_rows,
        unknown_outcomes = summary.unknown_outcomes,
        "Imported snapshot"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use polymarket_core::db::MemorySnapshotStore;
    use serde_json::json;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 1, 7).unwrap()
    }

    fn market() -> MarketRecord {
        parse_market(&json!({
            "conditionId": "0xabc",
            "question": "Will BTC close above 100k?",
            "slug": "btc-above-100k-2026-01-31",
            "outcomes": "[\"Yes\", \"No\"]",
            "outcomePrices": "[\"0.62\", \"0.38\"]",
            "volumeNum": "125000.5",
            "lastTradePrice": 0.6
        }))
        .unwrap()
    }

    #[test]
    fn test_market_fields_and_cluster() {
        let m = market();
        assert_eq!(m.info.market_id, "0xabc");
        assert_eq!(m.info.cluster_key, "slug:btc above 100k");
        assert_eq!(m.info.volume_usd, 125000.5);
        assert_eq!(m.outcomes, vec!["Yes", "No"]);
        assert_eq!(m.outcome_prices, vec![0.62, 0.38]);

        let evented = parse_market(&json!({
            "id": 42,
            "title": "Fed decision",
            "events": [{"eventId": "evt-9"}]
        }))
        .unwrap();
        assert_eq!(evented.info.market_id, "42");
        assert_eq!(evented.info.question.as_deref(), Some("Fed decision"));
        assert_eq!(evented.info.cluster_key, "event:evt-9");

        assert!(parse_market(&json!({"question": "no id"})).is_none());
    }

    #[test]
    fn test_holder_key_fallbacks() {
        let m = market();
        let holder = json!({"proxyWallet": "0x1", "outcomeIndex": 1, "shares": 100});
        let holder = holder.as_object().unwrap();

        assert_eq!(first_text(holder, ADDRESS_KEYS).as_deref(), Some("0x1"));
        assert_eq!(holder_outcome(holder, Some(&m)), "No");
        assert!((holder_value_usd(holder, Some(&m)).unwrap() - 38.0).abs() < 1e-9);

        let explicit = json!({"wallet": "0x2", "side": "YES", "usdValue": "250.5", "size": 9});
        let explicit = explicit.as_object().unwrap();
        assert_eq!(holder_outcome(explicit, Some(&m)), "YES");
        assert_eq!(holder_value_usd(explicit, Some(&m)), Some(250.5));
    }

    #[test]
    fn test_holder_valuation_fallbacks() {
        let m = market();
        // No outcome index: last trade price
        let shares_only = json!({"user": "0x3", "amount": 10});
        let value = holder_value_usd(shares_only.as_object().unwrap(), Some(&m)).unwrap();
        assert!((value - 6.0).abs() < 1e-9);

        // Explicit price wins over market prices
        let priced = json!({"user": "0x3", "amount": 10, "price": 0.5, "outcomeIndex": 0});
        assert_eq!(holder_value_usd(priced.as_object().unwrap(), Some(&m)), Some(5.0));

        // Nothing to price with
        let unpriced = json!({"user": "0x4", "amount": 10});
        assert_eq!(holder_value_usd(unpriced.as_object().unwrap(), None), None);
        let no_shares = json!({"user": "0x4"});
        assert_eq!(holder_value_usd(no_shares.as_object().unwrap(), Some(&m)), None);

        let unlabeled = json!({"user": "0x5"});
        assert_eq!(holder_outcome(unlabeled.as_object().unwrap(), None), UNKNOWN_OUTCOME);
    }

    #[test]
    fn test_payload_shapes() {
        let flat = json!([{"address": "a"}, {"address": "b"}, 7]);
        assert_eq!(extract_holder_list(&flat).len(), 2);

        let wrapped = json!({"data": [{"address": "a"}]});
        assert_eq!(extract_holder_list(&wrapped).len(), 1);

        let grouped = json!([
            {"token": "yes", "holders": [{"address": "a"}, {"address": "b"}]},
            {"token": "no", "holders": [{"address": "c"}]}
        ]);
        assert_eq!(extract_holder_list(&grouped).len(), 3);

        assert!(extract_holder_list(&json!("nope")).is_empty());
    }

    fn parser<'a>(
        markets: &'a HashMap<String, MarketRecord>,
        excluded: &'a HashSet<String>,
    ) -> HolderParser<'a> {
        HolderParser {
            run_date: date(),
            markets,
            excluded,
            new_wallet_days: 14,
        }
    }

    #[test]
    fn test_market_exclusions() {
        let filters = MarketFilters {
            days_to_close: 30,
            min_volume: 1000.0,
            min_liquidity: 0.0,
        };
        assert!(market().exclusions(date(), &filters).is_empty());

        let closing_late = parse_market(&json!({
            "id": "late",
            "volume": 5000,
            "endDate": "2026-03-01T00:00:00Z"
        }))
        .unwrap();
        assert_eq!(
            closing_late.exclusions(date(), &filters),
            vec![Exclusion::OutsideDaysToClose]
        );

        let resolved = parse_market(&json!({
            "id": "done",
            "resolved": "true",
            "closed": false,
            "volume": 10,
            "endDate": "2026-01-10"
        }))
        .unwrap();
        assert_eq!(
            resolved.exclusions(date(), &filters),
            vec![Exclusion::ClosedOrResolved, Exclusion::BelowMinVolume]
        );

        let open = parse_market(&json!({"id": "open", "closed": 0, "archived": "false"})).unwrap();
        assert_eq!(
            open.exclusions(date(), &MarketFilters::default()),
            Vec::<Exclusion>::new()
        );
    }

    #[test]
    fn test_new_wallet_flag_and_shares() {
        let markets: HashMap<String, MarketRecord> =
            [("0xabc".to_string(), market())].into_iter().collect();
        let excluded = HashSet::new();
        let payload = json!({"0xabc": [
            {"address": "fresh", "outcomeIndex": 0, "shares": 50, "firstSeen": "2025-12-30T10:00:00Z"},
            {"address": "old", "outcome": "No", "valueUsd": 10, "createdAt": "2025-11-01"},
            {"address": "epoch", "outcome": "No", "valueUsd": 10, "created_at": 1767744000},
            {"address": "blank", "outcome": "No", "valueUsd": 10, "firstSeen": "later"}
        ]});
        let parsed = parser(&markets, &excluded).parse(&payload);

        let flags: Vec<(&str, bool)> = parsed
            .rows
            .iter()
            .map(|r| (r.address.as_str(), r.is_new_wallet))
            .collect();
        assert_eq!(
            flags,
            vec![("fresh", true), ("old", false), ("epoch", true), ("blank", false)]
        );
        assert_eq!(parsed.new_wallets, 2);
        assert_eq!(parsed.rows[0].shares, Some(50.0));
        assert!((parsed.rows[0].value() - 31.0).abs() < 1e-9);
        assert_eq!(parsed.rows[1].shares, None);
    }

    #[test]
    fn test_parse_holders_by_market_map_and_flat() {
        let markets: HashMap<String, MarketRecord> =
            [("0xabc".to_string(), market())].into_iter().collect();
        let excluded: HashSet<String> = ["0xdead".to_string()].into_iter().collect();
        let parser = parser(&markets, &excluded);

        let by_market = json!({
            "0xabc": [
                {"address": "0x1", "outcome": "Yes", "valueUsd": 100},
                {"outcome": "No", "valueUsd": 5}
            ]
        });
        let parsed = parser.parse(&by_market);
        assert_eq!(parsed.rows.len(), 1);
        assert_eq!(parsed.skipped, 1);
        assert_eq!(parsed.rows[0].market_id, "0xabc");
        assert_eq!(parsed.rows[0].value_usd, Some(100.0));

        let flat = json!({"holders": [
            {"address": "0x1", "conditionId": "0xabc", "outcomeIndex": 0, "shares": 10},
            {"address": "0x2", "valueUsd": 5},
            {"address": "0x3", "marketId": "0xdead", "valueUsd": 500}
        ]});
        let parsed = parser.parse(&flat);
        assert_eq!(parsed.rows.len(), 1);
        assert_eq!(parsed.rows[0].outcome, "Yes");
        assert!((parsed.rows[0].value() - 6.2).abs() < 1e-9);
        assert_eq!(parsed.skipped, 1);
        assert_eq!(parsed.dropped, 1);
    }

    #[tokio::test]
    async fn test_import_snapshot_into_store() {
        let dir = std::env::temp_dir().join(format!("insider-import-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let markets_path = dir.join("markets.json");
        let holders_path = dir.join("holders.json");
        std::fs::write(
            &markets_path,
            json!({"data": [
                {"id": "m1", "question": "Q1", "events": ["e1"]},
                {"id": "m2", "question": "Q2", "groupItemTitle": "Rates", "endDate": "2026-02-01"},
                {"id": "m3", "question": "Q3", "closed": true}
            ]})
            .to_string(),
        )
        .unwrap();
        std::fs::write(
            &holders_path,
            json!({
                "m1": [{"address": "w1", "outcome": "Yes", "valueUsd": 10}],
                "m2": {"holders": [{"address": "w1", "outcome": "No", "valueUsd": 20}]},
                "m3": [{"address": "w2", "outcome": "Yes", "valueUsd": 30}]
            })
            .to_string(),
        )
        .unwrap();

        let store = MemorySnapshotStore::new();
        let config = AppConfig::default();
        let summary = import_snapshot(&store, date(), &config, &markets_path, &holders_path)
            .await
            .unwrap();
        std::fs::remove_dir_all(&dir).ok();

        assert_eq!(summary.markets, 2);
        assert_eq!(summary.excluded_markets, 1);
        assert_eq!(summary.missing_close_time, 2);
        assert_eq!(summary.holder_rows, 2);
        assert_eq!(summary.dropped_holders, 1);
        assert_eq!(store.run_status(date()).await, Some(RunStatus::Success));

        let context = store.market_context(date()).await.unwrap();
        assert_eq!(context.cluster_key("m1"), "event:e1");
        assert_eq!(context.cluster_key("m2"), "group:rates");
        assert_eq!(store.holders(date()).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_import_rejects_empty_markets() {
        let dir = std::env::temp_dir().join(format!("insider-empty-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let markets_path = dir.join("markets.json");
        std::fs::write(&markets_path, "[]").unwrap();

        let store = MemorySnapshotStore::new();
        let config = AppConfig::default();
        let result =
            import_snapshot(&store, date(), &config, &markets_path, &dir.join("holders.json")).await;
        std::fs::remove_dir_all(&dir).ok();

        assert!(matches!(result, Err(Error::InvalidSnapshot(_))));
        assert_eq!(store.run_status(date()).await, None);
    }
}
