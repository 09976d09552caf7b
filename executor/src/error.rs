//! Error types for the executor.

use std::path::PathBuf;

/// All errors that can occur during an executor run.
///
/// Fail-safe stops (holiday, stale data, capacity) are *not* errors — they
/// are `RunOutcome::Halted`. Only fatal input problems and unexpected
/// failures surface here.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("failed to read config file {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error(transparent)]
    Core(#[from] weightbridge::Error),

    #[error("adapter error: {0}")]
    Adapter(#[from] weightbridge_adapter::AdapterError),

    #[error("adapter reported failure: {0}")]
    AdapterFailed(String),

    #[error("ledger error: {0}")]
    Ledger(String),

    #[error("state store error: {0}")]
    State(String),

    #[error("run log error: {0}")]
    RunLog(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
