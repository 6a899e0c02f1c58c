// Memory governor: plans evictions so the sum of ready resource costs never
// exceeds the configured ceiling. Pure planner; the manager applies the
// returned evictions under its state lock, which makes check-then-evict
// atomic with respect to concurrent admissions.

use crate::scheduler::eviction_rank;
use feed_types::VideoId;
use std::cmp::Reverse;

/// One `Ready` video the governor may evict.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvictionCandidate {
    pub id: VideoId,
    /// Position in the feed, used for distance-based ordering.
    pub index: usize,
    pub cost_bytes: u64,
}

/// Outcome of an admission check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdmissionPlan {
    /// Admit after evicting the listed videos (possibly none).
    Admit { evict: Vec<VideoId> },
    /// The incoming cost exceeds the ceiling outright and can never fit.
    Reject,
}

#[derive(Debug, Clone)]
pub struct MemoryGovernor {
    ceiling_bytes: u64,
    pressure_ceiling_bytes: u64,
}

impl MemoryGovernor {
    pub fn new(ceiling_bytes: u64, pressure_ceiling_bytes: u64) -> Self {
        Self {
            ceiling_bytes,
            pressure_ceiling_bytes,
        }
    }

    #[inline]
    pub fn ceiling_bytes(&self) -> u64 {
        self.ceiling_bytes
    }

    /// Plan the evictions required before `incoming_cost` may be admitted.
    ///
    /// Candidates evict farthest-from-current first; the video at
    /// `current_index` is spared while any alternative remains. Distance
    /// from the viewport predicts next access better than recency in a
    /// mostly-forward feed.
    pub fn plan_admission(
        &self,
        ready: &[EvictionCandidate],
        ready_bytes: u64,
        incoming_cost: u64,
        current_index: usize,
    ) -> AdmissionPlan {
        if incoming_cost > self.ceiling_bytes {
            return AdmissionPlan::Reject;
        }

        let needed = (ready_bytes + incoming_cost).saturating_sub(self.ceiling_bytes);
        let evict = plan_to_free(ready, needed, current_index);
        AdmissionPlan::Admit { evict }
    }

    /// Plan evictions down to the degraded-mode pressure ceiling.
    pub fn plan_pressure(
        &self,
        ready: &[EvictionCandidate],
        ready_bytes: u64,
        current_index: usize,
    ) -> Vec<VideoId> {
        let needed = ready_bytes.saturating_sub(self.pressure_ceiling_bytes);
        plan_to_free(ready, needed, current_index)
    }
}

/// Pick candidates until at least `needed` bytes are freed. The entry at
/// `current_index` is considered only after every alternative.
fn plan_to_free(ready: &[EvictionCandidate], needed: u64, current_index: usize) -> Vec<VideoId> {
    if needed == 0 {
        return Vec::new();
    }

    let mut ordered: Vec<&EvictionCandidate> = ready.iter().collect();
    ordered.sort_by_key(|c| {
        let (distance, is_forward) = eviction_rank(current_index, c.index);
        // Current video last, then farthest first, backward side first.
        (c.index == current_index, Reverse(distance), is_forward)
    });

    let mut evict = Vec::new();
    let mut freed = 0u64;
    for candidate in ordered {
        if freed >= needed {
            break;
        }
        freed += candidate.cost_bytes;
        evict.push(candidate.id.clone());
    }
    evict
}
