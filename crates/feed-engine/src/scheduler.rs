// Preload window planner. Pure decision functions over the manager's view
// of the feed; the scheduler holds no state of its own.

use std::ops::RangeInclusive;

/// Plan produced for one `preload_around_index` pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowPlan {
    /// Current position, clamped to feed bounds.
    pub current_index: usize,
    /// Indices to load, nearest to `current_index` first. Ties at equal
    /// distance break toward the forward (scroll) direction.
    pub load_order: Vec<usize>,
    /// Entries outside this range are eviction candidates. Wider than the
    /// load window so scrolling back one step does not reload.
    pub keep_alive: RangeInclusive<usize>,
}

impl WindowPlan {
    #[inline]
    pub fn keeps(&self, index: usize) -> bool {
        self.keep_alive.contains(&index)
    }
}

/// Compute the target load set and keep-alive window for a feed of `len`
/// entries. The keep-alive radius is `max(preload_range, retention_margin)`
/// so it can never be narrower than the load window.
///
/// Returns `None` for an empty feed.
pub fn plan_window(
    current_index: usize,
    preload_range: usize,
    retention_margin: usize,
    len: usize,
) -> Option<WindowPlan> {
    if len == 0 {
        return None;
    }

    let current = current_index.min(len - 1);
    let target_lo = current.saturating_sub(preload_range);
    let target_hi = (current + preload_range).min(len - 1);

    let margin = retention_margin.max(preload_range);
    let keep_lo = current.saturating_sub(margin);
    let keep_hi = (current + margin).min(len - 1);

    // Nearest-first, forward before backward at equal distance: the user is
    // statistically more likely to keep scrolling forward.
    let mut load_order = Vec::with_capacity(target_hi - target_lo + 1);
    load_order.push(current);
    for d in 1..=preload_range {
        let fwd = current + d;
        if fwd <= target_hi {
            load_order.push(fwd);
        }
        if d <= current && current - d >= target_lo {
            load_order.push(current - d);
        }
    }

    Some(WindowPlan {
        current_index: current,
        load_order,
        keep_alive: keep_lo..=keep_hi,
    })
}

/// Distance-based eviction rank: farther from `current_index` evicts first;
/// at equal distance the backward (already-seen) side evicts before the
/// forward side. Lower rank evicts later.
#[inline]
pub fn eviction_rank(current_index: usize, index: usize) -> (usize, bool) {
    let distance = current_index.abs_diff(index);
    // `true` sorts after `false`, so forward indices survive ties.
    (distance, index > current_index)
}

/// Sort eviction candidates into the order they should be evicted:
/// farthest-from-current first, backward side first on ties.
pub fn order_for_eviction(current_index: usize, candidates: &mut [usize]) {
    candidates.sort_by_key(|&idx| {
        let (distance, is_forward) = eviction_rank(current_index, idx);
        (std::cmp::Reverse(distance), is_forward)
    });
}
