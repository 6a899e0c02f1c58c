use crate::state::VideoPhase;
use feed_types::VideoId;

/// Push notifications emitted by the manager so observers never poll.
///
/// Every record insertion, phase transition, and removal is observable.
/// Delivered over a `tokio::sync::broadcast` channel; a lagging subscriber
/// loses the oldest events, never the manager's own consistency.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedEvent {
    /// A new record entered the feed.
    Added { id: VideoId },
    /// A video's lifecycle phase changed.
    PhaseChanged {
        id: VideoId,
        from: VideoPhase,
        to: VideoPhase,
    },
    /// The record fell outside the retained window and was removed entirely.
    Removed { id: VideoId },
}

impl FeedEvent {
    pub fn id(&self) -> &VideoId {
        match self {
            Self::Added { id } | Self::PhaseChanged { id, .. } | Self::Removed { id } => id,
        }
    }
}
