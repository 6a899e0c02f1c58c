// Video lifecycle and preload manager for a continuous-scroll feed.
//
// The manager is the single source of truth for what is loaded: it owns the
// ordered record+state collection, decides which videos to preload around
// the current scroll position, enforces a hard memory ceiling, and recovers
// from per-video failures without letting them affect siblings.

pub mod config;
pub mod error;
pub mod events;
pub mod governor;
pub mod manager;
pub mod metrics;
pub mod playback;
pub mod retry;
pub mod scheduler;
pub mod state;

// Re-exports for easier access
pub use config::{FeedManagerConfig, HttpEngineConfig, RetryBackoffConfig};
pub use error::{FeedError, LoadError};
pub use events::FeedEvent;
pub use governor::{AdmissionPlan, EvictionCandidate, MemoryGovernor};
pub use manager::{FeedStats, VideoManager};
pub use metrics::{FeedMetrics, MetricsSnapshot};
pub use playback::{ControllerHandle, HttpPlaybackEngine, LoadedMedia, PlaybackEngine};
pub use retry::{FailureDecision, RetryPolicy};
pub use scheduler::{WindowPlan, plan_window};
pub use state::{VideoPhase, VideoState};

pub use feed_types::{MediaKind, SequenceKey, SourceDescriptor, VideoId, VideoRecord};
