//! Error types for the core crate.

use std::path::PathBuf;

/// Errors from snapshot loading and intent construction.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("snapshot error: {0}")]
    Snapshot(String),

    #[error("failed to read snapshot file {path}: {source}")]
    SnapshotRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse snapshot JSON: {0}")]
    SnapshotParse(#[from] serde_json::Error),

    #[error("calendar error: {0}")]
    Calendar(String),

    #[error("intent build error: {0}")]
    Build(String),
}

pub type Result<T> = std::result::Result<T, Error>;
