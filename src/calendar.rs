//! Trading-day calendar.
//!
//! The calendar is sourced from the exchange index file upstream and loaded
//! here as a plain sorted date list. Membership is the whole contract.

use std::path::Path;

use chrono::NaiveDate;
use serde::Deserialize;

use crate::error::{Error, Result};

/// Sorted set of trading days.
#[derive(Debug, Clone, Deserialize)]
pub struct TradingCalendar {
    trading_days: Vec<NaiveDate>,
}

impl TradingCalendar {
    /// Load and validate a calendar file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| Error::SnapshotRead {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::from_json(&contents)
    }

    /// Parse from a JSON string (useful for testing).
    pub fn from_json(json: &str) -> Result<Self> {
        let mut calendar: TradingCalendar = serde_json::from_str(json)?;
        if calendar.trading_days.is_empty() {
            return Err(Error::Calendar("calendar has no trading days".into()));
        }
        calendar.trading_days.sort_unstable();
        calendar.trading_days.dedup();
        Ok(calendar)
    }

    /// Build from dates directly (useful for testing).
    pub fn from_days(mut days: Vec<NaiveDate>) -> Result<Self> {
        if days.is_empty() {
            return Err(Error::Calendar("calendar has no trading days".into()));
        }
        days.sort_unstable();
        days.dedup();
        Ok(TradingCalendar { trading_days: days })
    }

    /// Whether `date` is a trading day.
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.trading_days.binary_search(&date).is_ok()
    }

    /// First and last date covered by the calendar.
    pub fn range(&self) -> (NaiveDate, NaiveDate) {
        // Non-empty by construction.
        (self.trading_days[0], self.trading_days[self.trading_days.len() - 1])
    }
}
