// Feed manifest loading. The manifest is a JSON array of records:
//
//   [{"id": "v1", "sequence_key": 1700000000000,
//     "url": "https://cdn.example.com/v/v1.mp4",
//     "fallback_url": "https://cdn.example.com/v/v1_low.mp4",
//     "kind": "video"}, ...]

use crate::error::{CliError, Result};
use feed_types::{MediaKind, SourceDescriptor, VideoRecord};
use serde::Deserialize;
use std::path::Path;
use url::Url;

#[derive(Debug, Deserialize)]
struct ManifestEntry {
    id: String,
    sequence_key: i64,
    url: Url,
    #[serde(default)]
    fallback_url: Option<Url>,
    #[serde(default)]
    kind: MediaKind,
}

impl ManifestEntry {
    fn into_record(self) -> VideoRecord {
        let mut source = SourceDescriptor::new(self.url, self.kind);
        if let Some(fallback) = self.fallback_url {
            source = source.with_fallback(fallback);
        }
        VideoRecord::new(self.id, self.sequence_key, source)
    }
}

pub fn load(path: &Path) -> Result<Vec<VideoRecord>> {
    let raw = std::fs::read_to_string(path).map_err(|source| CliError::ManifestRead {
        path: path.to_path_buf(),
        source,
    })?;
    let entries: Vec<ManifestEntry> =
        serde_json::from_str(&raw).map_err(|source| CliError::ManifestParse {
            path: path.to_path_buf(),
            source,
        })?;
    if entries.is_empty() {
        return Err(CliError::EmptyManifest {
            path: path.to_path_buf(),
        });
    }
    Ok(entries.into_iter().map(ManifestEntry::into_record).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manifest_entries_map_to_records() {
        let json = r#"[
            {"id": "v1", "sequence_key": 200,
             "url": "https://cdn.example.com/v/v1.mp4",
             "fallback_url": "https://cdn.example.com/v/v1_low.mp4"},
            {"id": "v2", "sequence_key": 100,
             "url": "https://cdn.example.com/v/v2.webp",
             "kind": "looping_image"}
        ]"#;
        let entries: Vec<ManifestEntry> = serde_json::from_str(json).unwrap();
        let records: Vec<VideoRecord> =
            entries.into_iter().map(ManifestEntry::into_record).collect();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].id.as_str(), "v1");
        assert_eq!(records[0].source.kind, MediaKind::Video);
        assert!(records[0].source.fallback.is_some());
        assert_eq!(records[1].source.kind, MediaKind::LoopingImage);
        assert!(records[1].source.fallback.is_none());
    }
}
