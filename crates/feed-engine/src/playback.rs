// Playback engine boundary. The manager treats the engine as an opaque,
// possibly-slow, possibly-failing capability: load a source into a playable
// controller, release the controller later.

use crate::config::HttpEngineConfig;
use crate::error::{FeedError, LoadError};
use async_trait::async_trait;
use bytes::Bytes;
use feed_types::SourceDescriptor;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, warn};

/// Ownership token for one engine-side decode/playback resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ControllerHandle(pub u64);

/// Result of a successful load.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadedMedia {
    pub handle: ControllerHandle,
    /// Estimated memory cost of the loaded media; charged against the
    /// manager's ceiling while the video is ready.
    pub cost_bytes: u64,
}

/// External decode/playback capability.
///
/// The manager does not retry or interpret engine-internal errors beyond
/// the [`LoadError`] classification.
#[async_trait]
pub trait PlaybackEngine: Send + Sync {
    async fn load(&self, source: &SourceDescriptor) -> Result<LoadedMedia, LoadError>;

    async fn release(&self, handle: ControllerHandle) -> Result<(), LoadError>;
}

/// Default engine wrapper: fetches media bytes over HTTP and holds them as
/// the controller resource, with the byte length as the cost estimate.
///
/// Tries the fallback URL when the primary fails with a retryable error.
pub struct HttpPlaybackEngine {
    client: reqwest::Client,
    config: HttpEngineConfig,
    next_handle: AtomicU64,
    live: Mutex<HashMap<ControllerHandle, Bytes>>,
}

impl HttpPlaybackEngine {
    pub fn new(config: HttpEngineConfig) -> Result<Self, FeedError> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .read_timeout(config.read_timeout)
            .user_agent(config.user_agent.clone())
            .default_headers(config.headers.clone())
            .build()
            .map_err(|e| FeedError::invalid_config(format!("http client: {e}")))?;

        Ok(Self {
            client,
            config,
            next_handle: AtomicU64::new(1),
            live: Mutex::new(HashMap::new()),
        })
    }

    /// Number of controllers currently outstanding.
    pub fn live_controllers(&self) -> usize {
        self.live.lock().len()
    }

    async fn fetch(&self, url: &url::Url) -> Result<Bytes, LoadError> {
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(classify_reqwest_error)?;

        let status = response.status();
        if !status.is_success() {
            if status.is_server_error() || status == reqwest::StatusCode::TOO_MANY_REQUESTS {
                return Err(LoadError::network(format!("HTTP {status} for {url}")));
            }
            // Client errors repeat identically on identical input.
            return Err(LoadError::format(format!("HTTP {status} for {url}")));
        }

        if let Some(content_type) = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            && !is_media_content_type(content_type)
        {
            return Err(LoadError::format(format!(
                "unexpected content type `{content_type}` for {url}"
            )));
        }

        let bytes = response.bytes().await.map_err(classify_reqwest_error)?;
        if bytes.is_empty() {
            return Err(LoadError::corrupt(format!("empty body for {url}")));
        }
        Ok(bytes)
    }
}

#[async_trait]
impl PlaybackEngine for HttpPlaybackEngine {
    async fn load(&self, source: &SourceDescriptor) -> Result<LoadedMedia, LoadError> {
        if self.live.lock().len() >= self.config.max_live_controllers {
            return Err(LoadError::resource_exhausted(format!(
                "{} controllers outstanding",
                self.config.max_live_controllers
            )));
        }

        let bytes = match self.fetch(&source.primary).await {
            Ok(bytes) => bytes,
            Err(primary_err) if primary_err.is_retryable() => match &source.fallback {
                Some(fallback) => {
                    debug!(error = %primary_err, fallback = %fallback, "primary source failed, trying fallback");
                    self.fetch(fallback).await?
                }
                None => return Err(primary_err),
            },
            Err(primary_err) => return Err(primary_err),
        };

        let cost_bytes = bytes.len() as u64;
        let handle = ControllerHandle(self.next_handle.fetch_add(1, Ordering::Relaxed));
        self.live.lock().insert(handle, bytes);
        debug!(handle = handle.0, cost_bytes, url = %source.primary, "media loaded");

        Ok(LoadedMedia { handle, cost_bytes })
    }

    async fn release(&self, handle: ControllerHandle) -> Result<(), LoadError> {
        if self.live.lock().remove(&handle).is_none() {
            // Releases are idempotent.
            warn!(handle = handle.0, "release of unknown controller handle");
        }
        Ok(())
    }
}

fn classify_reqwest_error(e: reqwest::Error) -> LoadError {
    if e.is_timeout() {
        LoadError::network(format!("timeout: {e}"))
    } else if e.is_connect() || e.is_request() || e.is_body() {
        LoadError::network(e.to_string())
    } else if e.is_decode() {
        LoadError::corrupt(e.to_string())
    } else {
        LoadError::network(e.to_string())
    }
}

fn is_media_content_type(content_type: &str) -> bool {
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or(content_type)
        .trim();
    essence.starts_with("video/")
        || essence.starts_with("image/")
        || essence.starts_with("audio/")
        || essence == "application/octet-stream"
        || essence == "application/mp4"
}
