//! Utilization from a pair of counter snapshots.

use crate::stat::CpuSnapshot;

/// Percentage of elapsed ticks spent active between two captures.
///
/// Returns `0.0` when no time elapsed or the counters went backwards — a
/// reset source carries no usable information for the interval, so it is
/// treated as "no data" rather than an error.
pub fn utilization(prev: &CpuSnapshot, curr: &CpuSnapshot) -> f64 {
    let total_delta = match curr.total_ticks().checked_sub(prev.total_ticks()) {
        Some(delta) if delta > 0 => delta,
        _ => return 0.0,
    };
    let idle_delta = curr
        .idle_ticks()
        .saturating_sub(prev.idle_ticks())
        .min(total_delta);

    (total_delta - idle_delta) as f64 / total_delta as f64 * 100.0
}
