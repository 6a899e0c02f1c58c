// End-to-end tests for the video manager against an instrumented fake
// playback engine. The fake engine counts outstanding load/release pairs
// and records any re-entrant per-id load, so the tests can verify the
// at-most-one-in-flight and no-leaked-controller invariants directly.

use async_trait::async_trait;
use feed_engine::{
    ControllerHandle, FeedManagerConfig, LoadError, LoadedMedia, MediaKind, PlaybackEngine,
    RetryBackoffConfig, SourceDescriptor, VideoId, VideoManager, VideoPhase, VideoRecord,
};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use url::Url;

const DEFAULT_COST: u64 = 10;

#[derive(Debug, Clone)]
enum Behavior {
    Succeed { cost_bytes: u64 },
    FailAlways { error: LoadError },
    FailTimes { remaining: u32, error: LoadError, cost_bytes: u64 },
}

/// Programmable fake playback engine.
#[derive(Default)]
struct FakeEngine {
    next_handle: AtomicU64,
    latency: Duration,
    behaviors: Mutex<HashMap<String, Behavior>>,
    outstanding: Mutex<HashMap<ControllerHandle, String>>,
    in_flight: Arc<Mutex<HashSet<String>>>,
    overlap_violations: AtomicU64,
    loads_per_key: Mutex<HashMap<String, u64>>,
}

/// Removes the per-id in-flight marker even when the load future is
/// dropped mid-way (e.g. by the manager's preload timeout).
struct InFlightGuard {
    key: String,
    set: Arc<Mutex<HashSet<String>>>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.set.lock().remove(&self.key);
    }
}

impl FakeEngine {
    fn new() -> Self {
        Self::default()
    }

    fn with_latency(latency: Duration) -> Self {
        Self {
            latency,
            ..Self::default()
        }
    }

    fn set_cost(&self, id: &str, cost_bytes: u64) {
        self.behaviors
            .lock()
            .insert(id.to_string(), Behavior::Succeed { cost_bytes });
    }

    fn fail_always(&self, id: &str, error: LoadError) {
        self.behaviors
            .lock()
            .insert(id.to_string(), Behavior::FailAlways { error });
    }

    fn fail_times(&self, id: &str, times: u32, error: LoadError) {
        self.behaviors.lock().insert(
            id.to_string(),
            Behavior::FailTimes {
                remaining: times,
                error,
                cost_bytes: DEFAULT_COST,
            },
        );
    }

    fn outstanding_count(&self) -> usize {
        self.outstanding.lock().len()
    }

    fn overlap_violations(&self) -> u64 {
        self.overlap_violations.load(Ordering::Relaxed)
    }

    fn loads_for(&self, id: &str) -> u64 {
        self.loads_per_key.lock().get(id).copied().unwrap_or(0)
    }

    fn outcome_for(&self, key: &str) -> Result<u64, LoadError> {
        let mut behaviors = self.behaviors.lock();
        match behaviors.get_mut(key) {
            None => Ok(DEFAULT_COST),
            Some(Behavior::Succeed { cost_bytes }) => Ok(*cost_bytes),
            Some(Behavior::FailAlways { error }) => Err(error.clone()),
            Some(Behavior::FailTimes {
                remaining,
                error,
                cost_bytes,
            }) => {
                if *remaining > 0 {
                    *remaining -= 1;
                    Err(error.clone())
                } else {
                    Ok(*cost_bytes)
                }
            }
        }
    }
}

fn key_of(source: &SourceDescriptor) -> String {
    source
        .primary
        .path_segments()
        .and_then(|mut segments| segments.next_back())
        .unwrap_or("")
        .trim_end_matches(".mp4")
        .to_string()
}

#[async_trait]
impl PlaybackEngine for FakeEngine {
    async fn load(&self, source: &SourceDescriptor) -> Result<LoadedMedia, LoadError> {
        let key = key_of(source);

        if !self.in_flight.lock().insert(key.clone()) {
            self.overlap_violations.fetch_add(1, Ordering::Relaxed);
        }
        let _guard = InFlightGuard {
            key: key.clone(),
            set: Arc::clone(&self.in_flight),
        };
        *self.loads_per_key.lock().entry(key.clone()).or_insert(0) += 1;

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        let cost_bytes = self.outcome_for(&key)?;
        let handle = ControllerHandle(self.next_handle.fetch_add(1, Ordering::Relaxed) + 1);
        self.outstanding.lock().insert(handle, key);
        Ok(LoadedMedia { handle, cost_bytes })
    }

    async fn release(&self, handle: ControllerHandle) -> Result<(), LoadError> {
        self.outstanding.lock().remove(&handle);
        Ok(())
    }
}

// --- Helpers ---

fn record(id: &str, key: i64) -> VideoRecord {
    VideoRecord::new(
        id,
        key,
        SourceDescriptor::new(
            Url::parse(&format!("https://cdn.example.com/v/{id}.mp4")).unwrap(),
            MediaKind::Video,
        ),
    )
}

fn test_config() -> FeedManagerConfig {
    FeedManagerConfig {
        retry: RetryBackoffConfig {
            base_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(100),
            jitter: false,
        },
        ..Default::default()
    }
}

fn build(config: FeedManagerConfig, engine: Arc<FakeEngine>) -> VideoManager {
    VideoManager::new(config, engine).unwrap()
}

/// Insert `count` videos `v0..v{count-1}` with `v0` the newest, so index
/// `i` in feed order is `v{i}`.
fn fill_feed(manager: &VideoManager, count: usize) {
    for i in 0..count {
        manager.add_video_event(record(&format!("v{i}"), ((count - i) as i64) * 1000));
    }
}

fn id(s: &str) -> VideoId {
    VideoId::from(s)
}

fn phase_of(manager: &VideoManager, name: &str) -> VideoPhase {
    manager.video_state(&id(name)).expect("known video").phase
}

async fn wait_until(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(60), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

async fn wait_for_phase(manager: &VideoManager, name: &str, phase: VideoPhase) {
    let manager = manager.clone();
    let name = name.to_string();
    wait_until(move || phase_of(&manager, &name) == phase).await;
}

// --- Window preloading ---

#[tokio::test(start_paused = true)]
async fn window_preloads_only_target_range() {
    let engine = Arc::new(FakeEngine::new());
    let manager = build(test_config(), Arc::clone(&engine));
    fill_feed(&manager, 20);

    manager.preload_around_index(0, 2);
    wait_for_phase(&manager, "v0", VideoPhase::Ready).await;
    wait_for_phase(&manager, "v1", VideoPhase::Ready).await;
    wait_for_phase(&manager, "v2", VideoPhase::Ready).await;

    for i in 3..20 {
        assert_eq!(
            phase_of(&manager, &format!("v{i}")),
            VideoPhase::NotLoaded,
            "v{i} should stay untouched"
        );
    }
    assert_eq!(engine.outstanding_count(), 3);
    assert_eq!(engine.overlap_violations(), 0);
}

#[tokio::test(start_paused = true)]
async fn repeated_window_calls_do_not_duplicate_loads() {
    let engine = Arc::new(FakeEngine::with_latency(Duration::from_millis(50)));
    let manager = build(test_config(), Arc::clone(&engine));
    fill_feed(&manager, 10);

    for _ in 0..20 {
        manager.preload_around_index(0, 2);
    }
    wait_for_phase(&manager, "v2", VideoPhase::Ready).await;

    assert_eq!(engine.overlap_violations(), 0);
    assert_eq!(engine.loads_for("v0"), 1);
    assert_eq!(engine.loads_for("v1"), 1);
    assert_eq!(engine.loads_for("v2"), 1);
}

#[tokio::test(start_paused = true)]
async fn scrolling_disposes_outside_keep_alive() {
    let engine = Arc::new(FakeEngine::new());
    let config = FeedManagerConfig {
        preload_range: 1,
        retention_margin: 2,
        ..test_config()
    };
    let manager = build(config, Arc::clone(&engine));
    fill_feed(&manager, 12);

    manager.preload_around_index(0, 1);
    wait_for_phase(&manager, "v1", VideoPhase::Ready).await;

    // Scroll far forward; v0/v1 leave the keep-alive window [6, 10].
    manager.preload_around_index(8, 1);
    wait_for_phase(&manager, "v8", VideoPhase::Ready).await;
    wait_until(|| phase_of(&manager, "v0") == VideoPhase::Disposed).await;
    wait_until(|| phase_of(&manager, "v1") == VideoPhase::Disposed).await;

    wait_until(|| engine.outstanding_count() == manager.stats().ready).await;
}

#[tokio::test(start_paused = true)]
async fn rapid_window_switch_never_resurrects_left_videos() {
    let engine = Arc::new(FakeEngine::with_latency(Duration::from_millis(50)));
    let config = FeedManagerConfig {
        preload_range: 1,
        retention_margin: 1,
        ..test_config()
    };
    let manager = build(config, Arc::clone(&engine));
    fill_feed(&manager, 12);

    manager.preload_around_index(5, 1);
    // Loads for v4..v6 are still in flight when the window jumps away.
    manager.preload_around_index(0, 1);

    wait_for_phase(&manager, "v0", VideoPhase::Ready).await;
    wait_for_phase(&manager, "v1", VideoPhase::Ready).await;
    wait_until(|| engine.outstanding_count() == manager.stats().ready).await;

    for name in ["v4", "v5", "v6"] {
        let phase = phase_of(&manager, name);
        assert!(
            matches!(phase, VideoPhase::NotLoaded | VideoPhase::Disposed),
            "{name} must not be ready after leaving the window, got {phase:?}"
        );
    }
    assert_eq!(engine.outstanding_count(), 2);
    assert_eq!(engine.overlap_violations(), 0);
}

#[tokio::test(start_paused = true)]
async fn scroll_away_and_back_does_not_double_load() {
    let engine = Arc::new(FakeEngine::with_latency(Duration::from_millis(50)));
    let config = FeedManagerConfig {
        preload_range: 1,
        retention_margin: 1,
        ..test_config()
    };
    let manager = build(config, Arc::clone(&engine));
    fill_feed(&manager, 12);

    manager.preload_around_index(5, 1);
    wait_until(|| manager.stats().loading == 3).await;

    // Scroll away (cancelling v4..v6) and right back while their engine
    // loads are still running; the return must re-adopt those loads, not
    // issue a second concurrent one per id.
    manager.preload_around_index(0, 1);
    manager.preload_around_index(5, 1);

    wait_for_phase(&manager, "v4", VideoPhase::Ready).await;
    wait_for_phase(&manager, "v5", VideoPhase::Ready).await;
    wait_for_phase(&manager, "v6", VideoPhase::Ready).await;

    assert_eq!(engine.overlap_violations(), 0);
    assert_eq!(engine.loads_for("v4"), 1);
    assert_eq!(engine.loads_for("v5"), 1);
    assert_eq!(engine.loads_for("v6"), 1);
    for name in ["v0", "v1"] {
        assert_eq!(phase_of(&manager, name), VideoPhase::NotLoaded);
    }
    wait_until(|| engine.outstanding_count() == manager.stats().ready).await;
}

#[tokio::test(start_paused = true)]
async fn dispose_then_preload_reuses_in_flight_load() {
    let engine = Arc::new(FakeEngine::with_latency(Duration::from_millis(50)));
    let manager = build(test_config(), Arc::clone(&engine));
    fill_feed(&manager, 2);

    let v0 = id("v0");
    let background = {
        let manager = manager.clone();
        let v0 = v0.clone();
        tokio::spawn(async move { manager.preload_video(&v0).await })
    };
    wait_until(|| manager.stats().loading == 1).await;

    // Dispose while the engine load is in flight, then ask for it again.
    manager.dispose_video(&v0);
    manager.preload_video(&v0).await.unwrap();

    wait_for_phase(&manager, "v0", VideoPhase::Ready).await;
    background.await.unwrap().unwrap();

    assert_eq!(engine.loads_for("v0"), 1);
    assert_eq!(engine.overlap_violations(), 0);
    assert_eq!(engine.outstanding_count(), 1);
}

// --- Direct preloads and the in-flight invariant ---

#[tokio::test(start_paused = true)]
async fn concurrent_preloads_reach_engine_once() {
    let engine = Arc::new(FakeEngine::with_latency(Duration::from_millis(20)));
    let manager = build(test_config(), Arc::clone(&engine));
    fill_feed(&manager, 3);

    let v0 = id("v0");
    let calls = (0..8).map(|_| {
        let manager = manager.clone();
        let v0 = v0.clone();
        async move { manager.preload_video(&v0).await }
    });
    for result in futures::future::join_all(calls).await {
        result.unwrap();
    }
    wait_for_phase(&manager, "v0", VideoPhase::Ready).await;

    assert_eq!(engine.loads_for("v0"), 1);
    assert_eq!(engine.overlap_violations(), 0);
}

#[tokio::test(start_paused = true)]
async fn preload_unknown_id_is_contract_error() {
    let engine = Arc::new(FakeEngine::new());
    let manager = build(test_config(), engine);
    assert!(manager.preload_video(&id("missing")).await.is_err());
}

#[tokio::test(start_paused = true)]
async fn sibling_failure_does_not_affect_other_loads() {
    let engine = Arc::new(FakeEngine::new());
    engine.fail_always("v1", LoadError::format("bad codec"));
    let manager = build(test_config(), Arc::clone(&engine));
    fill_feed(&manager, 4);

    manager.preload_around_index(0, 2);
    wait_for_phase(&manager, "v0", VideoPhase::Ready).await;
    wait_for_phase(&manager, "v2", VideoPhase::Ready).await;
    wait_for_phase(&manager, "v1", VideoPhase::Failed { permanent: true }).await;

    let state = manager.video_state(&id("v1")).unwrap();
    assert_eq!(state.last_error, Some(LoadError::format("bad codec")));
}

// --- Retry and circuit breaker ---

#[tokio::test(start_paused = true)]
async fn bounded_retries_then_permanent_failure() {
    let engine = Arc::new(FakeEngine::new());
    engine.fail_always("v0", LoadError::network("connection reset"));
    let config = FeedManagerConfig {
        max_retries: 3,
        ..test_config()
    };
    let manager = build(config, Arc::clone(&engine));
    fill_feed(&manager, 1);

    let v0 = id("v0");
    // First max_retries failures stay retriable with a growing count.
    for expected_count in 1..=3u32 {
        manager.preload_video(&v0).await.unwrap();
        let state = manager.video_state(&v0).unwrap();
        assert_eq!(state.phase, VideoPhase::Failed { permanent: false });
        assert_eq!(state.retry_count, expected_count);
    }

    // The attempt that finds the count at the cap opens the circuit.
    manager.preload_video(&v0).await.unwrap();
    let state = manager.video_state(&v0).unwrap();
    assert_eq!(state.phase, VideoPhase::Failed { permanent: true });
    assert_eq!(state.retry_count, 3);

    // No further automatic attempts.
    manager.preload_video(&v0).await.unwrap();
    manager.preload_around_index(0, 2);
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(engine.loads_for("v0"), 4);
    assert_eq!(
        manager.video_state(&v0).unwrap().retry_count,
        3,
        "retry count must not move after the permanent transition"
    );
}

#[tokio::test(start_paused = true)]
async fn non_retryable_error_goes_permanent_immediately() {
    let engine = Arc::new(FakeEngine::new());
    engine.fail_always("v0", LoadError::corrupt("truncated"));
    let manager = build(test_config(), Arc::clone(&engine));
    fill_feed(&manager, 1);

    manager.preload_video(&id("v0")).await.unwrap();
    let state = manager.video_state(&id("v0")).unwrap();
    assert_eq!(state.phase, VideoPhase::Failed { permanent: true });
    assert_eq!(state.retry_count, 0);
}

#[tokio::test(start_paused = true)]
async fn transient_failure_recovers_on_retry() {
    let engine = Arc::new(FakeEngine::new());
    engine.fail_times("v0", 2, LoadError::network("flaky"));
    let manager = build(test_config(), Arc::clone(&engine));
    fill_feed(&manager, 1);

    let v0 = id("v0");
    manager.preload_video(&v0).await.unwrap();
    manager.preload_video(&v0).await.unwrap();
    assert_eq!(phase_of(&manager, "v0"), VideoPhase::Failed { permanent: false });

    manager.preload_video(&v0).await.unwrap();
    assert_eq!(phase_of(&manager, "v0"), VideoPhase::Ready);
    // Success clears the error but not the historical count.
    let state = manager.video_state(&v0).unwrap();
    assert!(state.last_error.is_none());
}

#[tokio::test(start_paused = true)]
async fn explicit_retry_resets_count_and_reloads() {
    let engine = Arc::new(FakeEngine::new());
    engine.fail_always("v0", LoadError::corrupt("bad bytes"));
    let manager = build(test_config(), Arc::clone(&engine));
    fill_feed(&manager, 1);

    let v0 = id("v0");
    manager.preload_video(&v0).await.unwrap();
    assert_eq!(phase_of(&manager, "v0"), VideoPhase::Failed { permanent: true });

    // The source recovers; only an explicit retry may re-enter loading.
    engine.set_cost("v0", DEFAULT_COST);
    manager.retry_video(&v0).await.unwrap();
    let state = manager.video_state(&v0).unwrap();
    assert_eq!(state.phase, VideoPhase::Ready);
    assert_eq!(state.retry_count, 0);
}

#[tokio::test(start_paused = true)]
async fn timed_out_load_is_a_retriable_failure() {
    let engine = Arc::new(FakeEngine::with_latency(Duration::from_secs(120)));
    let config = FeedManagerConfig {
        preload_timeout: Duration::from_secs(1),
        ..test_config()
    };
    let manager = build(config, Arc::clone(&engine));
    fill_feed(&manager, 1);

    manager.preload_video(&id("v0")).await.unwrap();
    let state = manager.video_state(&id("v0")).unwrap();
    assert_eq!(state.phase, VideoPhase::Failed { permanent: false });
    assert_eq!(
        state.last_error,
        Some(LoadError::Timeout {
            after: Duration::from_secs(1)
        })
    );
    assert_eq!(engine.outstanding_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn engine_cancellation_returns_to_not_loaded() {
    let engine = Arc::new(FakeEngine::new());
    engine.fail_always("v0", LoadError::Cancelled);
    let manager = build(test_config(), Arc::clone(&engine));
    fill_feed(&manager, 1);

    manager.preload_video(&id("v0")).await.unwrap();
    let state = manager.video_state(&id("v0")).unwrap();
    assert_eq!(state.phase, VideoPhase::NotLoaded);
    assert_eq!(state.retry_count, 0);
    assert!(state.last_error.is_none());
}

// --- Memory ceiling ---

#[tokio::test(start_paused = true)]
async fn admission_evicts_farthest_before_exceeding_ceiling() {
    let engine = Arc::new(FakeEngine::new());
    let config = FeedManagerConfig {
        memory_ceiling_bytes: 100,
        memory_pressure_ceiling_bytes: 50,
        preload_range: 4,
        retention_margin: 8,
        ..test_config()
    };
    let manager = build(config, Arc::clone(&engine));
    for i in 0..6 {
        engine.set_cost(&format!("v{i}"), 19);
    }
    engine.set_cost("v5", 10);
    fill_feed(&manager, 6);

    manager.preload_around_index(0, 4);
    wait_until(|| manager.stats().ready == 5).await;
    assert_eq!(manager.stats().ready_bytes, 95);

    // Admitting v5 (cost 10) would hit 105; the farthest ready video from
    // the current position must go first.
    manager.preload_video(&id("v5")).await.unwrap();
    assert_eq!(phase_of(&manager, "v5"), VideoPhase::Ready);
    assert_eq!(phase_of(&manager, "v4"), VideoPhase::Disposed);
    let stats = manager.stats();
    assert!(stats.ready_bytes <= 100, "ceiling exceeded: {stats:?}");
    wait_until(|| engine.outstanding_count() == manager.stats().ready).await;
}

#[tokio::test(start_paused = true)]
async fn oversized_media_is_rejected_not_admitted() {
    let engine = Arc::new(FakeEngine::new());
    let config = FeedManagerConfig {
        memory_ceiling_bytes: 100,
        memory_pressure_ceiling_bytes: 50,
        ..test_config()
    };
    let manager = build(config, Arc::clone(&engine));
    engine.set_cost("v0", 500);
    fill_feed(&manager, 1);

    manager.preload_video(&id("v0")).await.unwrap();
    let state = manager.video_state(&id("v0")).unwrap();
    assert_eq!(state.phase, VideoPhase::Failed { permanent: true });
    assert_eq!(manager.stats().ready_bytes, 0);
    wait_until(|| engine.outstanding_count() == 0).await;
}

#[tokio::test(start_paused = true)]
async fn memory_pressure_evicts_to_degraded_ceiling_sparing_current() {
    let engine = Arc::new(FakeEngine::new());
    let config = FeedManagerConfig {
        memory_ceiling_bytes: 100,
        memory_pressure_ceiling_bytes: 40,
        preload_range: 2,
        retention_margin: 4,
        ..test_config()
    };
    let manager = build(config, Arc::clone(&engine));
    for i in 0..3 {
        engine.set_cost(&format!("v{i}"), 30);
    }
    fill_feed(&manager, 3);

    manager.preload_around_index(0, 2);
    wait_until(|| manager.stats().ready == 3).await;
    assert_eq!(manager.stats().ready_bytes, 90);

    manager.handle_memory_pressure().await;
    let stats = manager.stats();
    assert!(stats.ready_bytes <= 40);
    assert_eq!(
        phase_of(&manager, "v0"),
        VideoPhase::Ready,
        "the current video must survive while alternatives exist"
    );
    assert_eq!(phase_of(&manager, "v1"), VideoPhase::Disposed);
    assert_eq!(phase_of(&manager, "v2"), VideoPhase::Disposed);
    wait_until(|| engine.outstanding_count() == 1).await;
}

// --- Disposal and teardown ---

#[tokio::test(start_paused = true)]
async fn dispose_is_idempotent_and_clears_cost() {
    let engine = Arc::new(FakeEngine::new());
    let manager = build(test_config(), Arc::clone(&engine));
    fill_feed(&manager, 2);

    let v0 = id("v0");
    manager.preload_video(&v0).await.unwrap();
    assert_eq!(manager.stats().ready_bytes, DEFAULT_COST);

    manager.dispose_video(&v0);
    manager.dispose_video(&v0);
    let state = manager.video_state(&v0).unwrap();
    assert_eq!(state.phase, VideoPhase::Disposed);
    assert_eq!(state.resource_cost_bytes, 0);
    assert_eq!(manager.stats().ready_bytes, 0);
    wait_until(|| engine.outstanding_count() == 0).await;
}

#[tokio::test(start_paused = true)]
async fn shutdown_releases_every_controller() {
    let engine = Arc::new(FakeEngine::with_latency(Duration::from_millis(30)));
    let manager = build(test_config(), Arc::clone(&engine));
    fill_feed(&manager, 10);

    manager.preload_around_index(0, 2);
    wait_until(|| manager.stats().ready == 3).await;

    manager.shutdown().await;
    let stats = manager.stats();
    assert_eq!(stats.ready, 0);
    assert_eq!(stats.active_controllers, 0);
    assert_eq!(stats.ready_bytes, 0);
    wait_until(|| engine.outstanding_count() == 0).await;

    // Post-shutdown calls are contract errors or no-ops.
    assert!(manager.preload_video(&id("v0")).await.is_err());
    manager.add_video_event(record("v_late", 1));
    assert_eq!(manager.len(), 10);
}

#[tokio::test(start_paused = true)]
async fn shutdown_with_loads_in_flight_leaks_nothing() {
    let engine = Arc::new(FakeEngine::with_latency(Duration::from_millis(50)));
    let manager = build(test_config(), Arc::clone(&engine));
    fill_feed(&manager, 6);

    manager.preload_around_index(0, 2);
    wait_until(|| manager.stats().loading == 3).await;
    // Loads are now genuinely in flight with the engine; their completions
    // arrive after teardown and must release their own handles.
    manager.shutdown().await;

    wait_until(|| engine.outstanding_count() == 0).await;
    assert_eq!(manager.stats().active_controllers, 0);
}

// --- Events ---

#[tokio::test(start_paused = true)]
async fn phase_transitions_are_pushed_to_subscribers() {
    let engine = Arc::new(FakeEngine::new());
    let manager = build(test_config(), Arc::clone(&engine));
    let mut rx = manager.subscribe();

    manager.add_video_event(record("v0", 1000));
    manager.preload_video(&id("v0")).await.unwrap();

    use feed_engine::FeedEvent;
    assert_eq!(rx.recv().await.unwrap(), FeedEvent::Added { id: id("v0") });
    assert_eq!(
        rx.recv().await.unwrap(),
        FeedEvent::PhaseChanged {
            id: id("v0"),
            from: VideoPhase::NotLoaded,
            to: VideoPhase::Loading,
        }
    );
    assert_eq!(
        rx.recv().await.unwrap(),
        FeedEvent::PhaseChanged {
            id: id("v0"),
            from: VideoPhase::Loading,
            to: VideoPhase::Ready,
        }
    );
}

// --- Metrics ---

#[tokio::test(start_paused = true)]
async fn metrics_track_loads_and_failures() {
    let engine = Arc::new(FakeEngine::new());
    engine.fail_times("v1", 1, LoadError::network("flaky"));
    let manager = build(test_config(), Arc::clone(&engine));
    fill_feed(&manager, 2);

    manager.preload_video(&id("v0")).await.unwrap();
    manager.preload_video(&id("v1")).await.unwrap();
    manager.preload_video(&id("v1")).await.unwrap();

    let metrics = manager.metrics();
    assert_eq!(metrics.loads_started, 3);
    assert_eq!(metrics.loads_succeeded, 2);
    assert_eq!(metrics.loads_failed, 1);
    assert_eq!(metrics.retries, 1);
    assert_eq!(metrics.bytes_loaded_total, 2 * DEFAULT_COST);
}
