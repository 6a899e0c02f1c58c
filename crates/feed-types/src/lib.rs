// Shared domain types for the feed client: video identity, ordering, and
// source descriptors. These are immutable once created; lifecycle state
// lives in `feed-engine`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use url::Url;

/// Globally unique video identifier.
///
/// Backed by `Arc<str>` so clones are cheap; ids are copied into events,
/// plans, and spawned tasks frequently.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VideoId(Arc<str>);

impl VideoId {
    pub fn new(id: impl Into<Arc<str>>) -> Self {
        Self(id.into())
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VideoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for VideoId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for VideoId {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

/// Monotonic ordering key for feed position (e.g. creation time in unix
/// millis). The feed is ordered newest-first, i.e. descending key.
pub type SequenceKey = i64;

/// Distinguishes timed video content from looping-image content.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    #[default]
    Video,
    LoopingImage,
}

/// Opaque source reference the playback engine uses to fetch bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceDescriptor {
    /// Primary quality URL.
    pub primary: Url,
    /// Optional fallback quality URL, tried when the primary fails with a
    /// retryable error.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback: Option<Url>,
    pub kind: MediaKind,
}

impl SourceDescriptor {
    pub fn new(primary: Url, kind: MediaKind) -> Self {
        Self {
            primary,
            fallback: None,
            kind,
        }
    }

    pub fn with_fallback(mut self, fallback: Url) -> Self {
        self.fallback = Some(fallback);
        self
    }
}

/// Immutable descriptor of one video, supplied by the external feed source.
///
/// Records are never mutated after insertion; the manager de-duplicates by
/// `id` and sorts by `sequence_key` descending.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoRecord {
    pub id: VideoId,
    pub sequence_key: SequenceKey,
    pub source: SourceDescriptor,
}

impl VideoRecord {
    pub fn new(id: impl Into<VideoId>, sequence_key: SequenceKey, source: SourceDescriptor) -> Self {
        Self {
            id: id.into(),
            sequence_key,
            source,
        }
    }
}
