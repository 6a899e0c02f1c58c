// Simulated playback engine for offline runs: no network, configurable
// latency and failure rate, randomized media cost.

use async_trait::async_trait;
use feed_engine::{ControllerHandle, LoadError, LoadedMedia, PlaybackEngine};
use feed_types::SourceDescriptor;
use parking_lot::Mutex;
use rand::RngExt;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::debug;

const MIN_COST_BYTES: u64 = 512 * 1024;
const MAX_COST_BYTES: u64 = 8 * 1024 * 1024;

pub struct SimulatedEngine {
    latency: Duration,
    /// Probability in [0, 1] that a load fails with a transient error.
    failure_rate: f64,
    next_handle: AtomicU64,
    live: Mutex<HashSet<u64>>,
}

impl SimulatedEngine {
    pub fn new(latency: Duration, failure_rate: f64) -> Self {
        Self {
            latency,
            failure_rate: failure_rate.clamp(0.0, 1.0),
            next_handle: AtomicU64::new(1),
            live: Mutex::new(HashSet::new()),
        }
    }

    pub fn live_controllers(&self) -> usize {
        self.live.lock().len()
    }
}

#[async_trait]
impl PlaybackEngine for SimulatedEngine {
    async fn load(&self, source: &SourceDescriptor) -> Result<LoadedMedia, LoadError> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        let (failed, cost_bytes) = {
            let mut rng = rand::rng();
            (
                self.failure_rate > 0.0 && rng.random_bool(self.failure_rate),
                rng.random_range(MIN_COST_BYTES..=MAX_COST_BYTES),
            )
        };
        if failed {
            return Err(LoadError::network(format!(
                "simulated failure for {}",
                source.primary
            )));
        }

        let raw = self.next_handle.fetch_add(1, Ordering::Relaxed);
        self.live.lock().insert(raw);
        debug!(handle = raw, cost_bytes, url = %source.primary, "simulated load");
        Ok(LoadedMedia {
            handle: ControllerHandle(raw),
            cost_bytes,
        })
    }

    async fn release(&self, handle: ControllerHandle) -> Result<(), LoadError> {
        self.live.lock().remove(&handle.0);
        Ok(())
    }
}
