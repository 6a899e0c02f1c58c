use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, CliError>;

#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error("failed to read manifest {path}: {source}")]
    ManifestRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse manifest {path}: {source}")]
    ManifestParse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("manifest {path} contains no records")]
    EmptyManifest { path: PathBuf },

    #[error(transparent)]
    Feed(#[from] feed_engine::FeedError),
}
