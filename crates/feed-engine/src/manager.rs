// Video lifecycle and preload manager: the single source of truth for every
// video visible to the feed. Owns the ordered record+state collection and
// coordinates the scheduler, retry policy, and memory governor, all of
// which are stateless decision functions over state passed in.
//
// Concurrency model: every state transition is applied under one mutex
// (single-writer discipline). The lock is never held across an await; load
// tasks suspend at the engine boundary and re-acquire the lock to apply
// their completion. Loads carry a generation number, and a completion whose
// generation is stale is discarded after releasing its own handle, which is
// how loads are logically cancelled when a video leaves the window.
// Separately from the desired generation, each entry tracks the generation
// holding the engine claim; cancellation never clears it, so at most one
// engine load exists per id even across cancel-and-re-enter sequences.

use crate::config::FeedManagerConfig;
use crate::error::{FeedError, LoadError};
use crate::events::FeedEvent;
use crate::governor::{AdmissionPlan, EvictionCandidate, MemoryGovernor};
use crate::metrics::{FeedMetrics, MetricsSnapshot};
use crate::playback::{ControllerHandle, LoadedMedia, PlaybackEngine};
use crate::retry::{FailureDecision, RetryPolicy};
use crate::scheduler;
use crate::state::{VideoEntry, VideoPhase, VideoState};
use feed_types::{VideoId, VideoRecord};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

/// Aggregate counts for diagnostics and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FeedStats {
    pub total: usize,
    pub not_loaded: usize,
    pub loading: usize,
    pub ready: usize,
    pub failed_retriable: usize,
    pub failed_permanent: usize,
    pub disposed: usize,
    pub ready_bytes: u64,
    pub active_controllers: usize,
}

#[derive(Debug, Default)]
struct FeedState {
    /// Video ids ordered newest-first (descending sequence key, ascending
    /// id on ties). Positions shift only through insertion and removal.
    order: Vec<VideoId>,
    entries: HashMap<VideoId, VideoEntry>,
    /// Running sum of resource costs over `Ready` entries.
    ready_bytes: u64,
    /// Last position reported by the UI; completions and evictions measure
    /// distance from here.
    current_index: usize,
    /// Bumped on every window pass. Loads issued on behalf of a window
    /// carry its generation and are dropped at begin time when a newer
    /// window pass has superseded them.
    window_generation: u64,
    shut_down: bool,
}

impl FeedState {
    fn index_of(&self, id: &VideoId) -> Option<usize> {
        self.order.iter().position(|oid| oid == id)
    }

    fn ready_candidates(&self) -> Vec<EvictionCandidate> {
        self.order
            .iter()
            .enumerate()
            .filter_map(|(index, id)| {
                let entry = self.entries.get(id)?;
                (entry.phase == VideoPhase::Ready).then(|| EvictionCandidate {
                    id: id.clone(),
                    index,
                    cost_bytes: entry.cost_bytes,
                })
            })
            .collect()
    }
}

struct ManagerInner {
    config: FeedManagerConfig,
    retry_policy: RetryPolicy,
    governor: MemoryGovernor,
    engine: Arc<dyn PlaybackEngine>,
    state: Mutex<FeedState>,
    events: broadcast::Sender<FeedEvent>,
    token: CancellationToken,
    metrics: Arc<FeedMetrics>,
    load_generation: AtomicU64,
}

/// The feed's video lifecycle orchestrator. Cheap to clone; all clones
/// share one collection.
#[derive(Clone)]
pub struct VideoManager {
    inner: Arc<ManagerInner>,
}

impl VideoManager {
    pub fn new(
        config: FeedManagerConfig,
        engine: Arc<dyn PlaybackEngine>,
    ) -> Result<Self, FeedError> {
        config.validate()?;
        let (events, _) = broadcast::channel(config.event_channel_capacity);
        let retry_policy = RetryPolicy::new(config.max_retries, &config.retry);
        let governor = MemoryGovernor::new(
            config.memory_ceiling_bytes,
            config.memory_pressure_ceiling_bytes,
        );
        Ok(Self {
            inner: Arc::new(ManagerInner {
                config,
                retry_policy,
                governor,
                engine,
                state: Mutex::new(FeedState::default()),
                events,
                token: CancellationToken::new(),
                metrics: Arc::new(FeedMetrics::new()),
                load_generation: AtomicU64::new(0),
            }),
        })
    }

    /// Subscribe to insertion, phase-change, and removal notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<FeedEvent> {
        self.inner.events.subscribe()
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.inner.metrics.snapshot()
    }

    /// Insert a new record in sequence order. Idempotent per id: the feed
    /// source may resend, and the first-seen record wins. Never blocks.
    pub fn add_video_event(&self, record: VideoRecord) {
        let inner = &self.inner;
        let mut state = inner.state.lock();
        if state.shut_down {
            warn!(id = %record.id, "record ignored, manager is shut down");
            return;
        }
        if state.entries.contains_key(&record.id) {
            trace!(id = %record.id, "duplicate record ignored");
            return;
        }

        let position = state.order.partition_point(|oid| {
            let existing = &state.entries[oid].record;
            existing.sequence_key > record.sequence_key
                || (existing.sequence_key == record.sequence_key && existing.id < record.id)
        });

        let id = record.id.clone();
        let had_entries = !state.order.is_empty();
        state.order.insert(position, id.clone());
        state.entries.insert(id.clone(), VideoEntry::new(record));
        if had_entries && position <= state.current_index {
            state.current_index += 1;
        }
        debug!(id = %id, position, total = state.order.len(), "record added");
        inner.emit(FeedEvent::Added { id });

        self.enforce_retention_cap(&mut state);
    }

    /// Pure read of one video's lifecycle state.
    pub fn video_state(&self, id: &VideoId) -> Option<VideoState> {
        let state = self.inner.state.lock();
        state.entries.get(id).map(VideoEntry::snapshot)
    }

    pub fn len(&self) -> usize {
        self.inner.state.lock().order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Ids in feed order, newest first.
    pub fn video_ids(&self) -> Vec<VideoId> {
        self.inner.state.lock().order.clone()
    }

    pub fn stats(&self) -> FeedStats {
        let state = self.inner.state.lock();
        let mut stats = FeedStats {
            total: state.order.len(),
            ready_bytes: state.ready_bytes,
            ..Default::default()
        };
        for entry in state.entries.values() {
            match entry.phase {
                VideoPhase::NotLoaded => stats.not_loaded += 1,
                VideoPhase::Loading => stats.loading += 1,
                VideoPhase::Ready => stats.ready += 1,
                VideoPhase::Failed { permanent: false } => stats.failed_retriable += 1,
                VideoPhase::Failed { permanent: true } => stats.failed_permanent += 1,
                VideoPhase::Disposed => stats.disposed += 1,
            }
            if entry.handle.is_some() {
                stats.active_controllers += 1;
            }
        }
        stats
    }

    /// Load one video through the playback engine.
    ///
    /// At most one load is in flight per id; duplicate calls while a load
    /// is pending are no-ops, as are calls for videos already ready or
    /// permanently failed. Load failures never surface as `Err` — they are
    /// recorded on the video's state so sibling preloads are unaffected.
    /// `Err` means contract misuse only (unknown id, manager shut down).
    pub async fn preload_video(&self, id: &VideoId) -> Result<(), FeedError> {
        self.load_video(id, None).await
    }

    /// Shared load path for direct preloads and window-issued ones. A
    /// `window` generation pins the load to one window pass.
    async fn load_video(&self, id: &VideoId, window: Option<u64>) -> Result<(), FeedError> {
        let Some(issued) = self.begin_load(id, window)? else {
            return Ok(());
        };
        let (generation, attempt, source) = issued;

        // Backoff before re-attempts; first attempts go straight through.
        if attempt > 0 {
            let delay = self.inner.retry_policy.delay_for_attempt(attempt - 1);
            trace!(id = %id, attempt, delay_ms = delay.as_millis() as u64, "retry backoff");
            tokio::select! {
                _ = self.inner.token.cancelled() => {
                    self.rollback_cancelled_load(id, generation);
                    return Ok(());
                }
                _ = tokio::time::sleep(delay) => {}
            }
            // The window may have moved on while we slept. The engine was
            // never called, so the claim is handed back here.
            if !self.load_still_current(id, generation) {
                self.release_engine_claim(id, generation);
                return Ok(());
            }
        }

        let timeout = self.inner.config.preload_timeout;
        let result = match tokio::time::timeout(timeout, self.inner.engine.load(&source)).await {
            Ok(engine_result) => engine_result,
            Err(_) => Err(LoadError::Timeout { after: timeout }),
        };

        self.complete_load(id, generation, result);
        Ok(())
    }

    /// Plan and issue preloads around the reported scroll position.
    ///
    /// Computes the target window `[i-R, i+R]`, issues loads nearest-first
    /// (forward ties first) for every eligible entry, logically cancels
    /// in-flight loads that left the keep-alive window, and disposes ready
    /// entries outside it. Safe to call on every scroll frame: entries
    /// already loading or ready are left alone.
    pub fn preload_around_index(&self, current_index: usize, preload_range: usize) {
        let inner = &self.inner;
        let (window, to_load): (u64, Vec<VideoId>) = {
            let mut state = inner.state.lock();
            if state.shut_down || state.order.is_empty() {
                return;
            }

            let Some(plan) = scheduler::plan_window(
                current_index,
                preload_range,
                inner.config.retention_margin,
                state.order.len(),
            ) else {
                return;
            };
            state.current_index = plan.current_index;
            state.window_generation += 1;

            // Cancel and dispose everything that left the keep-alive window.
            let mut evicted = 0u64;
            for index in 0..state.order.len() {
                if plan.keeps(index) {
                    continue;
                }
                let id = state.order[index].clone();
                let entry = state.entries.get_mut(&id).expect("entry for ordered id");
                if entry.loading_gen.take().is_some() {
                    inner.metrics.record_load_cancelled();
                    if entry.phase == VideoPhase::Loading {
                        inner.set_phase(entry, VideoPhase::NotLoaded);
                    }
                }
                if entry.phase == VideoPhase::Ready {
                    inner.dispose_entry(&mut state, &id);
                    evicted += 1;
                }
            }
            if evicted > 0 {
                inner.metrics.record_evictions(evicted);
            }

            let to_load = plan
                .load_order
                .iter()
                .filter_map(|&index| {
                    let id = &state.order[index];
                    state.entries[id].eligible_for_auto_load().then(|| id.clone())
                })
                .collect();
            (state.window_generation, to_load)
        };

        // Spawn in priority order; loads run concurrently but are issued
        // nearest-first. Each carries the window generation so that a task
        // outrun by a newer window pass drops out instead of loading.
        for id in to_load {
            let manager = self.clone();
            tokio::spawn(async move {
                if let Err(e) = manager.load_video(&id, Some(window)).await {
                    trace!(id = %id, error = %e, "window preload dropped");
                }
            });
        }
    }

    /// Evict down to the degraded-mode pressure ceiling, farthest from the
    /// current position first, sparing the current video while any
    /// alternative exists. Awaits the releases.
    pub async fn handle_memory_pressure(&self) {
        let inner = &self.inner;
        let handles: Vec<ControllerHandle> = {
            let mut state = inner.state.lock();
            if state.shut_down {
                return;
            }
            let candidates = state.ready_candidates();
            let evict =
                inner
                    .governor
                    .plan_pressure(&candidates, state.ready_bytes, state.current_index);
            if evict.is_empty() {
                return;
            }
            debug!(count = evict.len(), "memory pressure eviction");
            inner.metrics.record_evictions(evict.len() as u64);
            evict
                .iter()
                .filter_map(|id| inner.dispose_entry_keep_handle(&mut state, id))
                .collect()
        };

        for handle in handles {
            if let Err(e) = inner.engine.release(handle).await {
                warn!(handle = handle.0, error = %e, "release failed during memory pressure");
            }
        }
    }

    /// Release the controller and mark the video disposed. Idempotent; the
    /// state transition is synchronous, the engine-side release is
    /// fire-and-forget.
    pub fn dispose_video(&self, id: &VideoId) {
        let inner = &self.inner;
        let mut state = inner.state.lock();
        let Some(entry) = state.entries.get_mut(id) else {
            return;
        };
        if entry.loading_gen.take().is_some() {
            inner.metrics.record_load_cancelled();
        }
        if entry.phase == VideoPhase::Disposed {
            return;
        }
        inner.dispose_entry(&mut state, id);
    }

    /// Explicit user retry: resets the attempt count (even from a permanent
    /// failure) and re-enters loading.
    pub async fn retry_video(&self, id: &VideoId) -> Result<(), FeedError> {
        {
            let mut state = self.inner.state.lock();
            if state.shut_down {
                return Err(FeedError::ShutDown);
            }
            let Some(entry) = state.entries.get_mut(id) else {
                return Err(FeedError::UnknownVideo { id: id.clone() });
            };
            entry.retry_count = 0;
            entry.last_error = None;
            if entry.phase.is_failed() {
                self.inner.set_phase(entry, VideoPhase::NotLoaded);
            }
        }
        self.preload_video(id).await
    }

    /// Scoped teardown: cancels in-flight loads, disposes every entry, and
    /// releases every controller best-effort. Release failures are logged,
    /// never propagated.
    pub async fn shutdown(&self) {
        let inner = &self.inner;
        inner.token.cancel();

        let handles: Vec<(VideoId, ControllerHandle)> = {
            let mut state = inner.state.lock();
            if state.shut_down {
                return;
            }
            state.shut_down = true;
            let ids = state.order.clone();
            let mut handles = Vec::new();
            for id in ids {
                let entry = state.entries.get_mut(&id).expect("entry for ordered id");
                if entry.loading_gen.take().is_some() {
                    inner.metrics.record_load_cancelled();
                }
                if let Some(handle) = inner.dispose_entry_keep_handle(&mut state, &id) {
                    handles.push((id, handle));
                }
            }
            handles
        };

        for (id, handle) in handles {
            if let Err(e) = inner.engine.release(handle).await {
                warn!(id = %id, handle = handle.0, error = %e, "release failed during shutdown");
            }
        }
        inner.metrics.log_summary();
    }

    // --- Load lifecycle internals ---

    /// Claim the load slot for `id`. Returns `None` when no load should be
    /// issued (already in flight, ready, permanently failed, or the issuing
    /// window pass has been superseded).
    fn begin_load(
        &self,
        id: &VideoId,
        window: Option<u64>,
    ) -> Result<Option<(u64, u32, feed_types::SourceDescriptor)>, FeedError> {
        let inner = &self.inner;
        let mut state = inner.state.lock();
        if state.shut_down {
            return Err(FeedError::ShutDown);
        }
        if let Some(window) = window
            && window != state.window_generation
        {
            trace!(id = %id, "window pass superseded before load start");
            return Ok(None);
        }
        let Some(entry) = state.entries.get_mut(id) else {
            return Err(FeedError::UnknownVideo { id: id.clone() });
        };

        if entry.loading_gen.is_some() {
            trace!(id = %id, "load already in flight");
            return Ok(None);
        }
        match entry.phase {
            VideoPhase::Ready => return Ok(None),
            VideoPhase::Failed { permanent: true } => {
                trace!(id = %id, "permanently failed, waiting for explicit retry");
                return Ok(None);
            }
            _ => {}
        }

        // A logically cancelled load for this id may still hold the engine
        // claim. Re-adopt it: its completion becomes current again, and no
        // second concurrent engine load is issued.
        if let Some(active) = entry.in_flight_gen {
            trace!(id = %id, generation = active, "re-adopting in-flight load");
            entry.loading_gen = Some(active);
            inner.set_phase(entry, VideoPhase::Loading);
            return Ok(None);
        }

        let generation = inner.load_generation.fetch_add(1, Ordering::Relaxed) + 1;
        entry.loading_gen = Some(generation);
        entry.in_flight_gen = Some(generation);
        let attempt = entry.retry_count;
        inner.set_phase(entry, VideoPhase::Loading);
        inner.metrics.record_load_started(attempt > 0);
        Ok(Some((generation, attempt, entry.record.source.clone())))
    }

    fn load_still_current(&self, id: &VideoId, generation: u64) -> bool {
        let state = self.inner.state.lock();
        state
            .entries
            .get(id)
            .is_some_and(|entry| entry.loading_gen == Some(generation))
    }

    fn rollback_cancelled_load(&self, id: &VideoId, generation: u64) {
        let inner = &self.inner;
        let mut state = inner.state.lock();
        if let Some(entry) = state.entries.get_mut(id) {
            if entry.in_flight_gen == Some(generation) {
                entry.in_flight_gen = None;
            }
            if entry.loading_gen == Some(generation) {
                entry.loading_gen = None;
                if entry.phase == VideoPhase::Loading {
                    inner.set_phase(entry, VideoPhase::NotLoaded);
                }
            }
        }
        inner.metrics.record_load_cancelled();
    }

    /// Hand back the engine claim for a load that stopped before calling
    /// the engine.
    fn release_engine_claim(&self, id: &VideoId, generation: u64) {
        let mut state = self.inner.state.lock();
        if let Some(entry) = state.entries.get_mut(id)
            && entry.in_flight_gen == Some(generation)
        {
            entry.in_flight_gen = None;
        }
    }

    /// Apply a load completion. Stale completions (generation mismatch, or
    /// the record was removed meanwhile) release their handle and are
    /// otherwise discarded, so a video the user scrolled far past is never
    /// resurrected into `Ready`.
    fn complete_load(&self, id: &VideoId, generation: u64, result: Result<LoadedMedia, LoadError>) {
        let inner = &self.inner;
        let mut state = inner.state.lock();

        // The engine call is over either way; drop the claim so a later
        // load for this id may be issued.
        if let Some(entry) = state.entries.get_mut(id)
            && entry.in_flight_gen == Some(generation)
        {
            entry.in_flight_gen = None;
        }

        let current = state
            .entries
            .get(id)
            .is_some_and(|entry| entry.loading_gen == Some(generation));
        if !current {
            if let Ok(loaded) = result {
                trace!(id = %id, "stale load completion, releasing handle");
                inner.spawn_release(loaded.handle);
            }
            inner.metrics.record_load_cancelled();
            return;
        }
        state
            .entries
            .get_mut(id)
            .expect("entry checked above")
            .loading_gen = None;

        match result {
            Ok(loaded) => self.admit_ready(&mut state, id, loaded),
            Err(LoadError::Cancelled) => {
                let entry = state.entries.get_mut(id).expect("entry checked above");
                entry.last_error = None;
                inner.set_phase(entry, VideoPhase::NotLoaded);
                inner.metrics.record_load_cancelled();
            }
            Err(error) => {
                let entry = state.entries.get_mut(id).expect("entry checked above");
                let decision = inner
                    .retry_policy
                    .on_failure(error.is_retryable(), entry.retry_count);
                warn!(id = %id, error = %error, ?decision, "load failed");
                match decision {
                    FailureDecision::Retriable { retry_count } => {
                        entry.retry_count = retry_count;
                        entry.last_error = Some(error);
                        inner.set_phase(entry, VideoPhase::Failed { permanent: false });
                    }
                    FailureDecision::Permanent => {
                        entry.last_error = Some(error);
                        inner.set_phase(entry, VideoPhase::Failed { permanent: true });
                    }
                }
                inner.metrics.record_load_failed();
            }
        }
    }

    /// Governor admission: evict until there is headroom, then mark ready.
    /// Runs entirely under the state lock so concurrent admissions cannot
    /// transiently overshoot the ceiling.
    fn admit_ready(&self, state: &mut FeedState, id: &VideoId, loaded: LoadedMedia) {
        let inner = &self.inner;
        let candidates = state.ready_candidates();
        let plan = inner.governor.plan_admission(
            &candidates,
            state.ready_bytes,
            loaded.cost_bytes,
            state.current_index,
        );

        match plan {
            AdmissionPlan::Reject => {
                warn!(
                    id = %id,
                    cost_bytes = loaded.cost_bytes,
                    ceiling = inner.governor.ceiling_bytes(),
                    "media larger than the memory ceiling, rejecting"
                );
                inner.spawn_release(loaded.handle);
                let entry = state.entries.get_mut(id).expect("admitting known entry");
                entry.last_error = Some(LoadError::resource_exhausted(
                    "media cost exceeds the memory ceiling",
                ));
                inner.set_phase(entry, VideoPhase::Failed { permanent: true });
                inner.metrics.record_load_failed();
            }
            AdmissionPlan::Admit { evict } => {
                if !evict.is_empty() {
                    debug!(id = %id, count = evict.len(), "evicting for admission");
                    inner.metrics.record_evictions(evict.len() as u64);
                    for evict_id in &evict {
                        inner.dispose_entry(state, evict_id);
                    }
                }
                let ready_bytes = state.ready_bytes + loaded.cost_bytes;
                state.ready_bytes = ready_bytes;
                let entry = state.entries.get_mut(id).expect("admitting known entry");
                entry.handle = Some(loaded.handle);
                entry.cost_bytes = loaded.cost_bytes;
                entry.last_error = None;
                inner.set_phase(entry, VideoPhase::Ready);
                inner
                    .metrics
                    .record_load_succeeded(loaded.cost_bytes, ready_bytes);
            }
        }
    }

    /// Remove the oldest non-current records beyond the retention cap.
    fn enforce_retention_cap(&self, state: &mut FeedState) {
        let inner = &self.inner;
        while state.order.len() > inner.config.max_retained_videos {
            // Oldest last; skip the video the user is looking at.
            let Some(index) = (0..state.order.len())
                .rev()
                .find(|&index| index != state.current_index)
            else {
                break;
            };
            let id = state.order.remove(index);
            let entry = state.entries.remove(&id).expect("entry for ordered id");
            if entry.phase == VideoPhase::Ready {
                state.ready_bytes -= entry.cost_bytes;
            }
            if let Some(handle) = entry.handle {
                inner.spawn_release(handle);
            }
            if index < state.current_index {
                state.current_index -= 1;
            }
            debug!(id = %id, "record dropped by retention cap");
            inner.metrics.record_record_removed();
            inner.emit(FeedEvent::Removed { id });
        }
    }
}

impl ManagerInner {
    fn emit(&self, event: FeedEvent) {
        // Nobody listening is fine.
        let _ = self.events.send(event);
    }

    fn set_phase(&self, entry: &mut VideoEntry, to: VideoPhase) {
        if entry.phase == to {
            return;
        }
        let from = entry.phase;
        entry.phase = to;
        trace!(id = %entry.record.id, ?from, ?to, "phase change");
        self.emit(FeedEvent::PhaseChanged {
            id: entry.record.id.clone(),
            from,
            to,
        });
    }

    /// Dispose an entry, releasing the handle fire-and-forget.
    fn dispose_entry(&self, state: &mut FeedState, id: &VideoId) {
        if let Some(handle) = self.dispose_entry_keep_handle(state, id) {
            self.spawn_release(handle);
        }
    }

    /// Dispose an entry and hand the controller back to the caller, for
    /// paths that await the release themselves. The state transition is
    /// complete before this returns; the handle only needs freeing.
    fn dispose_entry_keep_handle(
        &self,
        state: &mut FeedState,
        id: &VideoId,
    ) -> Option<ControllerHandle> {
        let entry = state.entries.get_mut(id)?;
        if entry.phase == VideoPhase::Ready {
            state.ready_bytes -= entry.cost_bytes;
        }
        entry.cost_bytes = 0;
        let handle = entry.handle.take();
        self.set_phase(entry, VideoPhase::Disposed);
        handle
    }

    fn spawn_release(&self, handle: ControllerHandle) {
        let engine = Arc::clone(&self.engine);
        tokio::spawn(async move {
            if let Err(e) = engine.release(handle).await {
                warn!(handle = handle.0, error = %e, "controller release failed");
            }
        });
    }
}
