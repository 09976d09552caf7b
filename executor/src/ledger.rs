//! Idempotency/cooldown ledger: append-only JSONL of order events.
//!
//! One JSON object per line. The ledger is the single piece of state shared
//! across runs: it is read before building the live submission batch and
//! written only after a submission attempt completes, never during intent
//! construction, which keeps the builder pure.

use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDate, Utc};
use log::warn;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use weightbridge::types::{Side, Symbol};
use weightbridge_precheck::CooldownState;

use crate::error::{Error, Result};

/// Last known state of a logical order.
///
/// Variant order is progress order; `latest_status` keeps the
/// highest-progress event per key, so an `intent` written by a later dry run
/// can never mask an earlier `submitted`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LedgerStatus {
    Intent,
    Unknown,
    Failed,
    Submitted,
}

/// One order event, as appended to the JSONL file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerEvent {
    pub ts: DateTime<Utc>,
    pub run_id: String,
    pub latest_date: NaiveDate,
    pub order_key: String,
    pub symbol: Symbol,
    pub side: Side,
    pub notional: i64,
    pub status: LedgerStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Append-only order-event ledger.
pub struct OrderLedger {
    path: PathBuf,
}

impl OrderLedger {
    /// Open (or create) the ledger at `path`, creating parent directories.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| Error::Ledger(e.to_string()))?;
        }
        Ok(Self {
            path: path.to_path_buf(),
        })
    }

    /// Append one event and flush it to disk.
    pub fn append(&self, event: &LedgerEvent) -> Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| Error::Ledger(e.to_string()))?;
        let json = serde_json::to_string(event).map_err(|e| Error::Ledger(e.to_string()))?;
        writeln!(file, "{json}").map_err(|e| Error::Ledger(e.to_string()))?;
        file.flush().map_err(|e| Error::Ledger(e.to_string()))?;
        Ok(())
    }

    /// All parseable events. Corrupt lines are skipped with a warning —
    /// a torn write from a killed run must not brick every later run.
    pub fn events(&self) -> Result<Vec<LedgerEvent>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let file = fs::File::open(&self.path).map_err(|e| Error::Ledger(e.to_string()))?;
        let mut events = Vec::new();
        for (lineno, line) in BufReader::new(file).lines().enumerate() {
            let line = line.map_err(|e| Error::Ledger(e.to_string()))?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<LedgerEvent>(&line) {
                Ok(event) => events.push(event),
                Err(e) => warn!(
                    "skipping corrupt ledger line {} in {}: {e}",
                    lineno + 1,
                    self.path.display()
                ),
            }
        }
        Ok(events)
    }

    /// Highest-progress status recorded for an order key.
    pub fn latest_status(&self, order_key: &str) -> Result<Option<LedgerStatus>> {
        let mut best: FxHashMap<&str, LedgerStatus> = FxHashMap::default();
        let events = self.events()?;
        for event in &events {
            best.entry(event.order_key.as_str())
                .and_modify(|s| *s = (*s).max(event.status))
                .or_insert(event.status);
        }
        Ok(best.get(order_key).copied())
    }

    /// Order keys already submitted for `date`. These must be dropped from a
    /// live batch to guarantee at-most-once submission.
    pub fn submitted_keys(&self, date: NaiveDate) -> Result<Vec<String>> {
        let mut keys: Vec<String> = self
            .events()?
            .into_iter()
            .filter(|e| e.latest_date == date && e.status == LedgerStatus::Submitted)
            .map(|e| e.order_key)
            .collect();
        keys.sort_unstable();
        keys.dedup();
        Ok(keys)
    }

    /// Cooldown facts for `date`: which keys (and whether the day itself)
    /// saw an `unknown` outcome within the window ending at `now`.
    pub fn cooldown_state(
        &self,
        date: NaiveDate,
        now: DateTime<Utc>,
        cooldown_secs: u64,
    ) -> Result<CooldownState> {
        let threshold = now - chrono::Duration::seconds(cooldown_secs as i64);
        let mut keys: Vec<String> = Vec::new();
        for event in self.events()? {
            if event.latest_date == date
                && event.status == LedgerStatus::Unknown
                && event.ts > threshold
            {
                keys.push(event.order_key);
            }
        }
        keys.sort_unstable();
        keys.dedup();
        Ok(CooldownState {
            day_in_cooldown: !keys.is_empty(),
            keys_in_cooldown: keys,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    fn event(key: &str, status: LedgerStatus, ts: DateTime<Utc>) -> LedgerEvent {
        LedgerEvent {
            ts,
            run_id: "test_run".into(),
            latest_date: d("2026-02-06"),
            order_key: key.into(),
            symbol: Symbol::new("7203.T"),
            side: Side::Buy,
            notional: 1_000_000,
            status,
            detail: None,
        }
    }

    fn temp_ledger() -> (tempfile::TempDir, OrderLedger) {
        let dir = tempfile::tempdir().unwrap();
        let ledger = OrderLedger::open(&dir.path().join("order_events.jsonl")).unwrap();
        (dir, ledger)
    }

    #[test]
    fn append_and_read_back() {
        let (_dir, ledger) = temp_ledger();
        ledger
            .append(&event("key1", LedgerStatus::Intent, Utc::now()))
            .unwrap();
        ledger
            .append(&event("key2", LedgerStatus::Submitted, Utc::now()))
            .unwrap();
        assert_eq!(ledger.events().unwrap().len(), 2);
    }

    #[test]
    fn empty_ledger_reads_empty() {
        let (_dir, ledger) = temp_ledger();
        assert!(ledger.events().unwrap().is_empty());
        assert_eq!(ledger.latest_status("missing").unwrap(), None);
    }

    #[test]
    fn submitted_wins_over_later_intent() {
        let (_dir, ledger) = temp_ledger();
        ledger
            .append(&event("key1", LedgerStatus::Submitted, Utc::now()))
            .unwrap();
        // A later dry run records intent again; submitted must still win.
        ledger
            .append(&event("key1", LedgerStatus::Intent, Utc::now()))
            .unwrap();
        assert_eq!(
            ledger.latest_status("key1").unwrap(),
            Some(LedgerStatus::Submitted)
        );
    }

    #[test]
    fn submitted_keys_for_date() {
        let (_dir, ledger) = temp_ledger();
        ledger
            .append(&event("key1", LedgerStatus::Submitted, Utc::now()))
            .unwrap();
        ledger
            .append(&event("key2", LedgerStatus::Intent, Utc::now()))
            .unwrap();
        let keys = ledger.submitted_keys(d("2026-02-06")).unwrap();
        assert_eq!(keys, vec!["key1".to_string()]);
        assert!(ledger.submitted_keys(d("2026-02-09")).unwrap().is_empty());
    }

    #[test]
    fn cooldown_window_includes_recent_unknown_only() {
        let (_dir, ledger) = temp_ledger();
        let now = Utc::now();
        ledger
            .append(&event(
                "old",
                LedgerStatus::Unknown,
                now - chrono::Duration::seconds(3600),
            ))
            .unwrap();
        ledger
            .append(&event(
                "fresh",
                LedgerStatus::Unknown,
                now - chrono::Duration::seconds(60),
            ))
            .unwrap();

        let state = ledger.cooldown_state(d("2026-02-06"), now, 1800).unwrap();
        assert!(state.day_in_cooldown);
        assert_eq!(state.keys_in_cooldown, vec!["fresh".to_string()]);

        // Expired window: nothing in cooldown.
        let state = ledger.cooldown_state(d("2026-02-06"), now, 30).unwrap();
        assert!(!state.day_in_cooldown);
    }

    #[test]
    fn corrupt_lines_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("order_events.jsonl");
        let ledger = OrderLedger::open(&path).unwrap();
        ledger
            .append(&event("key1", LedgerStatus::Intent, Utc::now()))
            .unwrap();
        // Simulate a torn write.
        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        writeln!(file, "{{\"truncated").unwrap();
        ledger
            .append(&event("key2", LedgerStatus::Intent, Utc::now()))
            .unwrap();

        assert_eq!(ledger.events().unwrap().len(), 2);
    }
}
