//! Tier banding over the ranked flow list.

use polymarket_core::config::TierBands;
use polymarket_core::types::{FlowRow, Tier};

/// Number of leading ranks covered by a cumulative `fraction` of `n` rows.
fn band_cutoff(n: usize, fraction: f64) -> usize {
    if n == 0 || fraction <= 0.0 {
        return 0;
    }
    let raw = (n as f64 * fraction - 1e-9).ceil();
    (raw.max(0.0) as usize).min(n)
}

/// Tier for the row at `rank` (0-based) of `n` ranked rows.
pub fn tier_for_rank(rank: usize, n: usize, score: f64, bands: &TierBands) -> Tier {
    if rank < band_cutoff(n, bands.tier_a_fraction) && score >= bands.tier_a_min_score {
        Tier::A
    } else if rank < band_cutoff(n, bands.tier_b_fraction) && score >= bands.tier_b_min_score {
        Tier::B
    } else {
        Tier::C
    }
}

/// Assign tiers in place over rows already sorted by score.
///
/// Wallets admitted through the new-wallet override never rank above TIER_B.
pub fn assign_tiers(ranked: &mut [FlowRow], bands: &TierBands) {
    let n = ranked.len();
    for (rank, row) in ranked.iter_mut().enumerate() {
        let tier = tier_for_rank(rank, n, row.score_flow, bands);
        row.tier = if row.new_wallet_override && tier == Tier::A {
            Tier::B
        } else {
            tier
        };
    }
}
