//! Position lifecycle classification.

use polymarket_core::types::PositionClass;

/// Classify the change from `prev` to `today` exposure.
///
/// Total over all inputs: NaN is treated as zero exposure.
pub fn classify(prev: f64, today: f64) -> PositionClass {
    let prev = if prev.is_nan() { 0.0 } else { prev };
    let today = if today.is_nan() { 0.0 } else { today };
    let delta = today - prev;

    if prev <= 0.0 && today > 0.0 {
        PositionClass::NewPosition
    } else if prev > 0.0 && today <= 0.0 {
        PositionClass::Closed
    } else if prev > 0.0 && delta > 0.0 {
        PositionClass::Increase
    } else if prev > 0.0 && delta < 0.0 && today > 0.0 {
        PositionClass::Decrease
    } else {
        PositionClass::Unchanged
    }
}
