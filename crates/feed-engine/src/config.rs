use crate::error::FeedError;
use reqwest::header::{HeaderMap, HeaderValue};
use std::time::Duration;

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/142.0.0.0 Safari/537.36";

/// Backoff applied between load attempts for the same video.
#[derive(Debug, Clone)]
pub struct RetryBackoffConfig {
    /// Base delay; attempt `n` waits `base * 2^n` (capped).
    pub base_delay: Duration,
    /// Hard cap on the computed delay.
    pub max_delay: Duration,
    /// Add random jitter of [0, base/2) to each delay.
    pub jitter: bool,
}

impl Default for RetryBackoffConfig {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(5),
            jitter: true,
        }
    }
}

/// Configurable options for the feed manager.
#[derive(Debug, Clone)]
pub struct FeedManagerConfig {
    /// Cap on total retained record+state count. Oldest non-visible records
    /// beyond the cap are removed entirely, not merely disposed.
    pub max_retained_videos: usize,

    /// Forward/back window radius actively kept ready around the current
    /// position.
    pub preload_range: usize,

    /// Wider radius before eviction is considered, preventing reload thrash
    /// when the user scrolls back a step. Effective margin is
    /// `max(retention_margin, preload_range)`.
    pub retention_margin: usize,

    /// Failed attempts before a video becomes permanently failed.
    pub max_retries: u32,

    /// An in-flight load slower than this is treated as failed.
    pub preload_timeout: Duration,

    /// Normal memory ceiling for the sum of ready resource costs.
    pub memory_ceiling_bytes: u64,

    /// Degraded-mode ceiling used by `handle_memory_pressure`.
    pub memory_pressure_ceiling_bytes: u64,

    /// Backoff between retries of the same video.
    pub retry: RetryBackoffConfig,

    /// Capacity of the phase-change broadcast channel. Slow subscribers that
    /// fall further behind than this lose the oldest events.
    pub event_channel_capacity: usize,
}

impl Default for FeedManagerConfig {
    fn default() -> Self {
        Self {
            max_retained_videos: 100,
            preload_range: 2,
            retention_margin: 4,
            max_retries: 3,
            preload_timeout: Duration::from_secs(10),
            memory_ceiling_bytes: 256 * 1024 * 1024,
            memory_pressure_ceiling_bytes: 128 * 1024 * 1024,
            retry: RetryBackoffConfig::default(),
            event_channel_capacity: 256,
        }
    }
}

impl FeedManagerConfig {
    pub fn validate(&self) -> Result<(), FeedError> {
        if self.max_retained_videos == 0 {
            return Err(FeedError::invalid_config(
                "max_retained_videos must be at least 1",
            ));
        }
        if self.memory_ceiling_bytes == 0 {
            return Err(FeedError::invalid_config(
                "memory_ceiling_bytes must be non-zero",
            ));
        }
        if self.memory_pressure_ceiling_bytes > self.memory_ceiling_bytes {
            return Err(FeedError::invalid_config(
                "memory_pressure_ceiling_bytes must not exceed memory_ceiling_bytes",
            ));
        }
        if self.event_channel_capacity == 0 {
            return Err(FeedError::invalid_config(
                "event_channel_capacity must be at least 1",
            ));
        }
        Ok(())
    }
}

/// Options for the HTTP-backed playback engine.
#[derive(Debug, Clone)]
pub struct HttpEngineConfig {
    /// Connection timeout (time to establish the initial connection).
    pub connect_timeout: Duration,

    /// Read timeout (maximum time between received data chunks).
    pub read_timeout: Duration,

    /// User agent string.
    pub user_agent: String,

    /// Custom HTTP headers merged over the defaults.
    pub headers: HeaderMap,

    /// Refuse new loads once this many controllers are outstanding,
    /// reporting resource exhaustion (retriable after eviction).
    pub max_live_controllers: usize,
}

impl Default for HttpEngineConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(30),
            read_timeout: Duration::from_secs(30),
            user_agent: DEFAULT_USER_AGENT.to_owned(),
            headers: HttpEngineConfig::default_headers(),
            max_live_controllers: 16,
        }
    }
}

impl HttpEngineConfig {
    pub fn default_headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            reqwest::header::ACCEPT_ENCODING,
            HeaderValue::from_static("gzip, deflate"),
        );
        headers.insert(
            reqwest::header::CONNECTION,
            HeaderValue::from_static("keep-alive"),
        );
        headers.insert(reqwest::header::ACCEPT, HeaderValue::from_static("*/*"));
        headers
    }
}
