use feed_types::VideoId;
use std::time::Duration;

/// Classified outcome of a failed load attempt.
///
/// Load failures never cross the manager's public boundary as `Err`; they
/// are recorded on the video's state and pushed on the event stream, so one
/// video's failure cannot abort a batch of sibling preloads.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LoadError {
    #[error("network error: {reason}")]
    Network { reason: String },

    #[error("load timed out after {after:?}")]
    Timeout { after: Duration },

    #[error("unsupported media format: {reason}")]
    Format { reason: String },

    #[error("source returned corrupt media: {reason}")]
    Corrupt { reason: String },

    #[error("decoder resources exhausted: {reason}")]
    ResourceExhausted { reason: String },

    #[error("load cancelled")]
    Cancelled,
}

impl LoadError {
    pub fn network(reason: impl Into<String>) -> Self {
        Self::Network {
            reason: reason.into(),
        }
    }

    pub fn format(reason: impl Into<String>) -> Self {
        Self::Format {
            reason: reason.into(),
        }
    }

    pub fn corrupt(reason: impl Into<String>) -> Self {
        Self::Corrupt {
            reason: reason.into(),
        }
    }

    pub fn resource_exhausted(reason: impl Into<String>) -> Self {
        Self::ResourceExhausted {
            reason: reason.into(),
        }
    }

    /// Whether a fresh attempt could plausibly succeed.
    ///
    /// Format and corruption errors fail identically on identical input;
    /// network, timeout, and resource exhaustion are transient. `Cancelled`
    /// is not a failure at all and never reaches the retry policy.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network { .. } | Self::Timeout { .. } | Self::ResourceExhausted { .. } => true,
            Self::Format { .. } | Self::Corrupt { .. } | Self::Cancelled => false,
        }
    }
}

/// Contract-misuse errors on the manager's public API.
///
/// These are the only errors the manager returns to callers; everything
/// that can go wrong with an individual video is state, not an error.
#[derive(Debug, thiserror::Error)]
pub enum FeedError {
    #[error("unknown video id `{id}`")]
    UnknownVideo { id: VideoId },

    #[error("feed manager is shut down")]
    ShutDown,

    #[error("invalid configuration: {reason}")]
    InvalidConfig { reason: String },
}

impl FeedError {
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }
}
