// Per-video lifecycle state. Owned exclusively by the manager; the UI and
// the playback engine never mutate it directly.

use crate::error::LoadError;
use crate::playback::ControllerHandle;
use feed_types::VideoRecord;

/// Discrete lifecycle phase of one video.
///
/// A closed enum instead of independent `is_loading`/`is_ready` flags:
/// illegal combinations are unrepresentable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoPhase {
    /// No load has been issued, or a cancelled load was rolled back.
    NotLoaded,
    /// A load is in flight with the playback engine.
    Loading,
    /// Loaded and playable; counts against the memory ceiling.
    Ready,
    /// The last attempt failed. Retriable failures may be retried
    /// automatically while in the target window; permanent ones only by an
    /// explicit user retry.
    Failed { permanent: bool },
    /// Controller released and resource cost cleared.
    Disposed,
}

impl VideoPhase {
    #[inline]
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }

    /// Phases during which a controller handle exists.
    #[inline]
    pub fn holds_controller(&self) -> bool {
        matches!(self, Self::Loading | Self::Ready)
    }
}

/// Public read-only snapshot of one video's lifecycle state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoState {
    pub phase: VideoPhase,
    /// Failed attempts so far; reset only by an explicit user retry.
    pub retry_count: u32,
    /// Classification of the last failure; cleared on success.
    pub last_error: Option<LoadError>,
    /// Estimated memory cost while `Ready`, zero otherwise.
    pub resource_cost_bytes: u64,
}

/// Internal record+state pair, one per video id.
#[derive(Debug)]
pub(crate) struct VideoEntry {
    pub record: VideoRecord,
    pub phase: VideoPhase,
    pub retry_count: u32,
    pub last_error: Option<LoadError>,
    pub cost_bytes: u64,
    /// Ownership token for the engine-side resource. Present iff
    /// `phase.holds_controller()` once a load has been admitted.
    pub handle: Option<ControllerHandle>,
    /// Generation of the load this entry currently wants; `None` when no
    /// load is desired. Completions carrying a stale generation are
    /// discarded, which is how loads are logically cancelled on window
    /// exit.
    pub loading_gen: Option<u64>,
    /// Generation of the load task that holds the engine claim for this
    /// id. Set when a task claims the engine call and cleared only by that
    /// task; survives logical cancellation, so a video re-entering the
    /// window re-adopts the running load instead of issuing a second
    /// concurrent one.
    pub in_flight_gen: Option<u64>,
}

impl VideoEntry {
    pub fn new(record: VideoRecord) -> Self {
        Self {
            record,
            phase: VideoPhase::NotLoaded,
            retry_count: 0,
            last_error: None,
            cost_bytes: 0,
            handle: None,
            loading_gen: None,
            in_flight_gen: None,
        }
    }

    pub fn snapshot(&self) -> VideoState {
        VideoState {
            phase: self.phase,
            retry_count: self.retry_count,
            last_error: self.last_error.clone(),
            resource_cost_bytes: self.cost_bytes,
        }
    }

    /// Eligible for a load issued by a window pass: never loaded, disposed,
    /// or failed retriably. Permanent failures and in-flight loads are not.
    pub fn eligible_for_auto_load(&self) -> bool {
        if self.loading_gen.is_some() {
            return false;
        }
        matches!(
            self.phase,
            VideoPhase::NotLoaded | VideoPhase::Disposed | VideoPhase::Failed { permanent: false }
        )
    }
}
