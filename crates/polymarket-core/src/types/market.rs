//! Market metadata and cluster grouping.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Cluster key used when a market has no known grouping.
pub const UNKNOWN_CLUSTER: &str = "unknown";

/// Market metadata captured for a run date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketInfo {
    pub market_id: String,
    pub question: Option<String>,
    pub slug: Option<String>,
    /// Groups related markets (e.g. the same event) for diversification analysis.
    pub cluster_key: String,
    pub close_time: Option<String>,
    pub volume_usd: f64,
    pub liquidity_usd: f64,
}

impl MarketInfo {
    pub fn new(market_id: impl Into<String>, cluster_key: impl Into<String>) -> Self {
        Self {
            market_id: market_id.into(),
            question: None,
            slug: None,
            cluster_key: cluster_key.into(),
            close_time: None,
            volume_usd: 0.0,
            liquidity_usd: 0.0,
        }
    }

    pub fn with_question(mut self, question: impl Into<String>) -> Self {
        self.question = Some(question.into());
        self
    }
}

/// Question and cluster for a single market.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketContextEntry {
    pub question: Option<String>,
    pub cluster_key: String,
}

/// Lookup of market_id to question/cluster for one run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MarketContext {
    entries: HashMap<String, MarketContextEntry>,
}

impl MarketContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(
        &mut self,
        market_id: impl Into<String>,
        question: Option<String>,
        cluster_key: Option<String>,
    ) {
        let cluster_key = cluster_key
            .filter(|key| !key.is_empty())
            .unwrap_or_else(|| UNKNOWN_CLUSTER.to_string());
        self.entries.insert(
            market_id.into(),
            MarketContextEntry {
                question,
                cluster_key,
            },
        );
    }

    /// Cluster for a market, `"unknown"` when the market is not in context.
    pub fn cluster_key(&self, market_id: &str) -> &str {
        self.entries
            .get(market_id)
            .map(|e| e.cluster_key.as_str())
            .unwrap_or(UNKNOWN_CLUSTER)
    }

    pub fn question(&self, market_id: &str) -> Option<&str> {
        self.entries
            .get(market_id)
            .and_then(|e| e.question.as_deref())
    }

    pub fn get(&self, market_id: &str) -> Option<&MarketContextEntry> {
        self.entries.get(market_id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<'a> FromIterator<&'a MarketInfo> for MarketContext {
    fn from_iter<I: IntoIterator<Item = &'a MarketInfo>>(iter: I) -> Self {
        let mut context = MarketContext::new();
        for market in iter {
            context.insert(
                market.market_id.clone(),
                market.question.clone(),
                Some(market.cluster_key.clone()),
            );
        }
        context
    }
}

/// Fields of an upstream market payload used to derive its cluster key.
#[derive(Debug, Clone, Default)]
pub struct ClusterSource<'a> {
    pub event_ids: Vec<String>,
    pub group_title: Option<&'a str>,
    pub slug: Option<&'a str>,
    pub question: Option<&'a str>,
}

/// Derive a deterministic cluster key.
///
/// Precedence: first event id, then group title, then slug prefix (date
/// suffix or `--` variant stripped), then a normalized question.
pub fn build_cluster_key(source: &ClusterSource<'_>) -> String {
    if let Some(event_id) = source.event_ids.iter().find(|id| !id.is_empty()) {
        return format!("event:{}", event_id);
    }

    if let Some(title) = source.group_title.filter(|t| !t.is_empty()) {
        return format!("group:{}", normalize_cluster_text(title));
    }

    if let Some(slug) = source.slug.filter(|s| !s.is_empty()) {
        let prefix = match find_date_suffix(slug) {
            Some(idx) => &slug[..idx],
            None => slug.split("--").next().unwrap_or(slug),
        };
        return format!("slug:{}", normalize_cluster_text(prefix));
    }

    format!("q:{}", question_cluster_key(source.question.unwrap_or("")))
}

/// Lowercase, replace non-alphanumeric runs with a single space, trim.
pub fn normalize_cluster_text(text: &str) -> String {
    let lowered = text.to_lowercase();
    lowered
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

fn question_cluster_key(question: &str) -> String {
    let q = question.trim().to_lowercase();
    if q.starts_with("will ") && q.contains(" win super bowl 2026") {
        return "super_bowl_2026_winner".to_string();
    }
    if q.contains("nfc championship") {
        return "nfc_championship".to_string();
    }
    if q.contains("afc championship") {
        return "afc_championship".to_string();
    }
    if q.contains("gta vi") || q.contains("gta 6") {
        return "gta_6".to_string();
    }
    let normalized: String = normalize_cluster_text(&q).chars().take(60).collect();
    if normalized.is_empty() {
        UNKNOWN_CLUSTER.to_string()
    } else {
        normalized
    }
}

/// Byte index of the first `-YYYY-MM-DD` segment in a slug.
fn find_date_suffix(slug: &str) -> Option<usize> {
    let bytes = slug.as_bytes();
    const PATTERN_LEN: usize = 11;
    if bytes.len() < PATTERN_LEN {
        return None;
    }
    (0..=bytes.len() - PATTERN_LEN).find(|&i| {
        let w = &bytes[i..i + PATTERN_LEN];
        w[0] == b'-'
            && w[1..5].iter().all(u8::is_ascii_digit)
            && w[5] == b'-'
            && w[6..8].iter().all(u8::is_ascii_digit)
            && w[8] == b'-'
            && w[9..11].iter().all(u8::is_ascii_digit)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cluster_key_prefers_event() {
        let source = ClusterSource {
            event_ids: vec!["evt_123".to_string()],
            slug: Some("nfl-super-bowl-2026"),
            question: Some("Will the Tigers win Super Bowl 2026?"),
            ..Default::default()
        };
        assert_eq!(build_cluster_key(&source), "event:evt_123");
    }

    #[test]
    fn test_cluster_key_group_and_slug() {
        let group = ClusterSource {
            group_title: Some("Fed Rate: March!"),
            ..Default::default()
        };
        assert_eq!(build_cluster_key(&group), "group:fed rate march");

        let dated = ClusterSource {
            slug: Some("btc-above-100k-2026-03-01"),
            ..Default::default()
        };
        assert_eq!(build_cluster_key(&dated), "slug:btc above 100k");

        let variant = ClusterSource {
            slug: Some("world-cup-winner--brazil"),
            ..Default::default()
        };
        assert_eq!(build_cluster_key(&variant), "slug:world cup winner");
    }

    #[test]
    fn test_cluster_key_question_fallback() {
        let sb = ClusterSource {
            question: Some("Will the Lions win Super Bowl 2026?"),
            ..Default::default()
        };
        assert_eq!(build_cluster_key(&sb), "q:super_bowl_2026_winner");

        let empty = ClusterSource::default();
        assert_eq!(build_cluster_key(&empty), "q:unknown");
    }

    #[test]
    fn test_context_defaults_to_unknown_cluster() {
        let mut context = MarketContext::new();
        context.insert("m1", Some("Q1".to_string()), None);
        context.insert("m2", None, Some("event:a".to_string()));

        assert_eq!(context.cluster_key("m1"), UNKNOWN_CLUSTER);
        assert_eq!(context.cluster_key("m2"), "event:a");
        assert_eq!(context.cluster_key("missing"), UNKNOWN_CLUSTER);
        assert_eq!(context.question("m1"), Some("Q1"));
    }
}
