//! Run-guard state: the latest_date of the last completed run.
//!
//! Persisted so a rerun over unadvanced upstream data (holiday, stalled
//! pipeline) halts instead of re-emitting the same day's intents.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDate, Utc};
use log::warn;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunGuardState {
    pub last_executed_latest_date: NaiveDate,
    pub last_run_at: DateTime<Utc>,
}

/// Loads and saves the run-guard state file.
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
        }
    }

    /// The previous run's state, or `None` when absent or unreadable.
    /// An unreadable state file only weakens the guard; it must not stop
    /// the run.
    pub fn load(&self) -> Option<RunGuardState> {
        let contents = fs::read_to_string(&self.path).ok()?;
        match serde_json::from_str(&contents) {
            Ok(state) => Some(state),
            Err(e) => {
                warn!("ignoring corrupt state file {}: {e}", self.path.display());
                None
            }
        }
    }

    /// Record the latest_date of a completed run.
    pub fn save(&self, latest_date: NaiveDate, now: DateTime<Utc>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| Error::State(e.to_string()))?;
        }
        let state = RunGuardState {
            last_executed_latest_date: latest_date,
            last_run_at: now,
        };
        let json =
            serde_json::to_string_pretty(&state).map_err(|e| Error::State(e.to_string()))?;
        fs::write(&self.path, json).map_err(|e| Error::State(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    #[test]
    fn roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(&dir.path().join("state.json"));
        assert!(store.load().is_none());

        store.save(d("2026-02-06"), Utc::now()).unwrap();
        let state = store.load().unwrap();
        assert_eq!(state.last_executed_latest_date, d("2026-02-06"));
    }

    #[test]
    fn corrupt_state_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        fs::write(&path, "not json").unwrap();
        let store = StateStore::new(&path);
        assert!(store.load().is_none());
    }
}
