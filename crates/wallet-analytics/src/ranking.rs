//! Deterministic ranking with explicit tie-breaks.
//!
//! Upstream aggregation uses hash maps, so input order is arbitrary. Every
//! ranking in the workspace goes through [`stable_sorted`] with a tie-break
//! key, which makes the output independent of input order.

use std::cmp::Ordering;

/// A primary sort key. Floats compare with `f64::total_cmp`.
pub trait RankKey {
    fn rank_cmp(&self, other: &Self) -> Ordering;
}

impl RankKey for f64 {
    fn rank_cmp(&self, other: &Self) -> Ordering {
        self.total_cmp(other)
    }
}

macro_rules! ord_rank_key {
    ($($t:ty),*) => {
        $(
            impl RankKey for $t {
                fn rank_cmp(&self, other: &Self) -> Ordering {
                    self.cmp(other)
                }
            }
        )*
    };
}

ord_rank_key!(u32, u64, i64, usize, String, &str);

impl<A: RankKey, B: RankKey> RankKey for (A, B) {
    fn rank_cmp(&self, other: &Self) -> Ordering {
        self.0
            .rank_cmp(&other.0)
            .then_with(|| self.1.rank_cmp(&other.1))
    }
}

impl<A: RankKey, B: RankKey, C: RankKey> RankKey for (A, B, C) {
    fn rank_cmp(&self, other: &Self) -> Ordering {
        self.0
            .rank_cmp(&other.0)
            .then_with(|| self.1.rank_cmp(&other.1))
            .then_with(|| self.2.rank_cmp(&other.2))
    }
}

/// Sort by `primary` (descending when `reverse`), breaking ties ascending by
/// `tie` regardless of `reverse`.
pub fn stable_sorted<T, K, P, B, Tk>(
    items: impl IntoIterator<Item = T>,
    primary: P,
    reverse: bool,
    tie: B,
) -> Vec<T>
where
    K: RankKey,
    P: Fn(&T) -> K,
    B: Fn(&T) -> Tk,
    Tk: Ord,
{
    let mut keyed: Vec<(K, Tk, T)> = items
        .into_iter()
        .map(|item| (primary(&item), tie(&item), item))
        .collect();

    keyed.sort_by(|a, b| {
        let by_primary = if reverse {
            b.0.rank_cmp(&a.0)
        } else {
            a.0.rank_cmp(&b.0)
        };
        by_primary.then_with(|| a.1.cmp(&b.1))
    });

    keyed.into_iter().map(|(_, _, item)| item).collect()
}
