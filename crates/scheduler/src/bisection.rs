//! Monotone-predicate integer bisection search.
//!
//! Contract:
//! - callers pass predicates whose truth set is a prefix (for
//!   [`find_max_legal_value`]) or suffix (for [`find_min_legal_value`]) of
//!   the search interval;
//! - the solver returns the boundary value, or `None` when even the
//!   anchoring endpoint fails the predicate.

/// Largest `value` in `[low, high]` satisfying `legal`.
///
/// Returns `None` when `low` itself is not legal. The predicate's truth set
/// must be a prefix of the interval.
pub fn find_max_legal_value(
    mut legal: impl FnMut(u64) -> bool,
    mut low: u64,
    mut high: u64,
) -> Option<u64> {
    if !legal(low) {
        return None;
    }
    while low < high {
        let mid = low + (high - low + 1) / 2;
        if legal(mid) {
            low = mid;
        } else {
            high = mid - 1;
        }
    }
    Some(low)
}

/// Smallest `value` in `[low, high]` satisfying `legal`.
///
/// Returns `None` when `high` itself is not legal. The predicate's truth set
/// must be a suffix of the interval.
pub fn find_min_legal_value(
    mut legal: impl FnMut(u64) -> bool,
    mut low: u64,
    mut high: u64,
) -> Option<u64> {
    if !legal(high) {
        return None;
    }
    while low < high {
        let mid = low + (high - low) / 2;
        if legal(mid) {
            high = mid;
        } else {
            low = mid + 1;
        }
    }
    Some(high)
}
