//! Upstream snapshot loading: target weights, current positions, prices.
//!
//! These records are produced by the external scoring/portfolio pipeline and
//! consumed read-only. Loading validates shape up front so everything
//! downstream can assume clean data.

use std::path::Path;

use chrono::NaiveDate;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::hash;
use crate::types::{PriceRef, Symbol};

/// One `(date, symbol, weight)` row of the daily target-weight table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeightRow {
    pub date: NaiveDate,
    pub symbol: Symbol,
    pub weight: f64,
}

/// Portfolio beta measured as of `date` (the close of that day).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BetaRow {
    pub date: NaiveDate,
    pub cash: f64,
    pub margin: f64,
    pub status: BetaStatus,
}

/// Whether a beta measurement is usable for hedge sizing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BetaStatus {
    Ok,
    Stale,
    Fail,
}

/// The daily target-weight snapshot plus hedge betas.
#[derive(Debug, Clone, Deserialize)]
pub struct PortfolioSnapshot {
    pub rows: Vec<WeightRow>,
    #[serde(default)]
    pub betas: Vec<BetaRow>,
    /// Fingerprint of the raw input bytes, for the RunLog `inputs_hash`.
    #[serde(skip)]
    pub inputs_hash: String,
}

impl PortfolioSnapshot {
    /// Load and validate a portfolio snapshot file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| Error::SnapshotRead {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::from_json(&contents)
    }

    /// Parse from a JSON string (useful for testing).
    pub fn from_json(json: &str) -> Result<Self> {
        let mut snapshot: PortfolioSnapshot = serde_json::from_str(json)?;
        snapshot.inputs_hash = hash::fingerprint(json.as_bytes());
        snapshot.validate()?;
        Ok(snapshot)
    }

    fn validate(&self) -> Result<()> {
        if self.rows.is_empty() {
            return Err(Error::Snapshot("weight table is empty".into()));
        }

        let mut seen = std::collections::HashSet::new();
        let mut sums: FxHashMap<NaiveDate, f64> = FxHashMap::default();
        for row in &self.rows {
            if !seen.insert((row.date, row.symbol)) {
                return Err(Error::Snapshot(format!(
                    "duplicate weight row: {} {}",
                    row.date, row.symbol
                )));
            }
            if !row.weight.is_finite() || row.weight <= 0.0 || row.weight > 1.0 {
                return Err(Error::Snapshot(format!(
                    "weight for {} on {} must be in (0, 1], got {}",
                    row.symbol, row.date, row.weight
                )));
            }
            *sums.entry(row.date).or_insert(0.0) += row.weight;
        }

        // Long-only: weights sum to at most 1.0 per date (cash fills the rest).
        for (date, sum) in &sums {
            if *sum > 1.0 + 1e-6 {
                return Err(Error::Snapshot(format!(
                    "weights on {date} sum to {sum:.6} (> 1.0)"
                )));
            }
        }

        for beta in &self.betas {
            if !beta.cash.is_finite() || !beta.margin.is_finite() {
                return Err(Error::Snapshot(format!(
                    "beta row on {} has non-finite values",
                    beta.date
                )));
            }
        }

        Ok(())
    }

    /// The most recent date in the weight table.
    pub fn latest_date(&self) -> NaiveDate {
        self.rows
            .iter()
            .map(|r| r.date)
            .max()
            .unwrap_or_default() // rows validated non-empty
    }

    /// Target `(symbol, weight)` pairs for one date, sorted by symbol.
    pub fn weights_for(&self, date: NaiveDate) -> Vec<(Symbol, f64)> {
        let mut pairs: Vec<(Symbol, f64)> = self
            .rows
            .iter()
            .filter(|r| r.date == date)
            .map(|r| (r.symbol, r.weight))
            .collect();
        pairs.sort_by_key(|(sym, _)| *sym);
        pairs
    }

    /// The most recent beta row strictly before `date`.
    ///
    /// Strictness is the no-look-ahead guarantee: a hedge dated `t` must
    /// never see the beta measured at `t`'s own close.
    pub fn ref_beta_before(&self, date: NaiveDate) -> Option<&BetaRow> {
        self.betas
            .iter()
            .filter(|b| b.date < date)
            .max_by_key(|b| b.date)
    }
}

/// One current holding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub symbol: Symbol,
    /// Positive = long. Short positions never occur in this long-only book
    /// but are tolerated on load so a bad fill is visible, not hidden.
    pub qty: i64,
    pub avg_cost: i64,
}

/// Current holdings and capacity figures from the broker account.
#[derive(Debug, Clone, Deserialize)]
pub struct PositionSnapshot {
    pub positions: Vec<Position>,
    pub cash_available: i64,
    pub margin_available: i64,
}

impl PositionSnapshot {
    /// Load and validate a position snapshot file.
    ///
    /// A missing file is fatal: without current holdings no intent can be
    /// sized, so the caller must not fall back to an empty book.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| Error::SnapshotRead {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::from_json(&contents)
    }

    /// Parse from a JSON string (useful for testing).
    pub fn from_json(json: &str) -> Result<Self> {
        let snapshot: PositionSnapshot = serde_json::from_str(json)?;
        snapshot.validate()?;
        Ok(snapshot)
    }

    fn validate(&self) -> Result<()> {
        let mut seen = std::collections::HashSet::new();
        for pos in &self.positions {
            if !seen.insert(pos.symbol) {
                return Err(Error::Snapshot(format!(
                    "duplicate position: {}",
                    pos.symbol
                )));
            }
            if pos.avg_cost < 0 {
                return Err(Error::Snapshot(format!(
                    "negative avg_cost for {}",
                    pos.symbol
                )));
            }
        }
        if self.cash_available < 0 || self.margin_available < 0 {
            return Err(Error::Snapshot("negative capacity figures".into()));
        }
        Ok(())
    }

    /// Symbol → quantity map.
    pub fn qty_map(&self) -> FxHashMap<Symbol, i64> {
        self.positions.iter().map(|p| (p.symbol, p.qty)).collect()
    }
}

/// Latest reference prices per symbol, with the date each was observed.
#[derive(Debug, Clone, Deserialize)]
pub struct PriceTable {
    pub prices: Vec<PriceRow>,
}

/// One symbol's latest quote.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceRow {
    pub symbol: Symbol,
    /// Date the quote was observed; drives the freshness check.
    pub date: NaiveDate,
    pub last: i64,
    pub close: i64,
}

impl PriceTable {
    /// Load and validate a price table file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| Error::SnapshotRead {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::from_json(&contents)
    }

    /// Parse from a JSON string (useful for testing).
    pub fn from_json(json: &str) -> Result<Self> {
        let table: PriceTable = serde_json::from_str(json)?;
        table.validate()?;
        Ok(table)
    }

    fn validate(&self) -> Result<()> {
        let mut seen = std::collections::HashSet::new();
        for row in &self.prices {
            if !seen.insert(row.symbol) {
                return Err(Error::Snapshot(format!(
                    "duplicate price row: {}",
                    row.symbol
                )));
            }
            if row.last < 0 || row.close < 0 {
                return Err(Error::Snapshot(format!(
                    "negative price for {}",
                    row.symbol
                )));
            }
        }
        Ok(())
    }

    /// Price under the given reference, or `None` if absent or non-positive.
    pub fn price(&self, symbol: Symbol, price_ref: PriceRef) -> Option<i64> {
        self.prices.iter().find(|r| r.symbol == symbol).and_then(|r| {
            let p = match price_ref {
                PriceRef::Last => r.last,
                PriceRef::Close => r.close,
            };
            (p > 0).then_some(p)
        })
    }

    /// Observation date of a symbol's quote.
    pub fn asof(&self, symbol: Symbol) -> Option<NaiveDate> {
        self.prices.iter().find(|r| r.symbol == symbol).map(|r| r.date)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    fn valid_portfolio_json() -> &'static str {
        r#"{
            "rows": [
                { "date": "2026-02-05", "symbol": "7203.T", "weight": 0.12 },
                { "date": "2026-02-06", "symbol": "7203.T", "weight": 0.10 },
                { "date": "2026-02-06", "symbol": "6758.T", "weight": 0.20 }
            ],
            "betas": [
                { "date": "2026-02-05", "cash": 0.95, "margin": 1.02, "status": "ok" },
                { "date": "2026-02-06", "cash": 0.97, "margin": 1.01, "status": "ok" }
            ]
        }"#
    }

    #[test]
    fn parse_valid_portfolio() {
        let snap = PortfolioSnapshot::from_json(valid_portfolio_json()).unwrap();
        assert_eq!(snap.rows.len(), 3);
        assert_eq!(snap.latest_date(), d("2026-02-06"));
        assert_eq!(snap.inputs_hash.len(), 16);
    }

    #[test]
    fn weights_for_latest_date_sorted() {
        let snap = PortfolioSnapshot::from_json(valid_portfolio_json()).unwrap();
        let weights = snap.weights_for(d("2026-02-06"));
        assert_eq!(weights.len(), 2);
        // Sorted by symbol: 6758.T before 7203.T
        assert_eq!(weights[0].0.as_str(), "6758.T");
        assert_eq!(weights[1].0.as_str(), "7203.T");
    }

    #[test]
    fn ref_beta_is_strictly_prior() {
        let snap = PortfolioSnapshot::from_json(valid_portfolio_json()).unwrap();
        let beta = snap.ref_beta_before(d("2026-02-06")).unwrap();
        // Must pick 02-05, never the same-day row.
        assert_eq!(beta.date, d("2026-02-05"));
        assert_eq!(beta.cash, 0.95);
    }

    #[test]
    fn ref_beta_none_when_no_prior() {
        let snap = PortfolioSnapshot::from_json(valid_portfolio_json()).unwrap();
        assert!(snap.ref_beta_before(d("2026-02-05")).is_none());
    }

    #[test]
    fn inputs_hash_stable_across_loads() {
        let a = PortfolioSnapshot::from_json(valid_portfolio_json()).unwrap();
        let b = PortfolioSnapshot::from_json(valid_portfolio_json()).unwrap();
        assert_eq!(a.inputs_hash, b.inputs_hash);
    }

    #[test]
    fn load_from_file_matches_from_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("portfolio.json");
        std::fs::write(&path, valid_portfolio_json()).unwrap();
        let from_file = PortfolioSnapshot::load(&path).unwrap();
        let from_json = PortfolioSnapshot::from_json(valid_portfolio_json()).unwrap();
        assert_eq!(from_file.inputs_hash, from_json.inputs_hash);
        assert_eq!(from_file.rows.len(), from_json.rows.len());
    }

    #[test]
    fn load_missing_file_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let err = PositionSnapshot::load(&dir.path().join("nope.json")).unwrap_err();
        assert!(matches!(err, Error::SnapshotRead { .. }));
    }

    #[test]
    fn reject_empty_weight_table() {
        assert!(PortfolioSnapshot::from_json(r#"{"rows": []}"#).is_err());
    }

    #[test]
    fn reject_duplicate_weight_row() {
        let json = r#"{
            "rows": [
                { "date": "2026-02-06", "symbol": "7203.T", "weight": 0.1 },
                { "date": "2026-02-06", "symbol": "7203.T", "weight": 0.2 }
            ]
        }"#;
        assert!(PortfolioSnapshot::from_json(json).is_err());
    }

    #[test]
    fn reject_weight_sum_over_one() {
        let json = r#"{
            "rows": [
                { "date": "2026-02-06", "symbol": "7203.T", "weight": 0.6 },
                { "date": "2026-02-06", "symbol": "6758.T", "weight": 0.5 }
            ]
        }"#;
        assert!(PortfolioSnapshot::from_json(json).is_err());
    }

    #[test]
    fn reject_non_positive_weight() {
        let json = r#"{
            "rows": [ { "date": "2026-02-06", "symbol": "7203.T", "weight": 0.0 } ]
        }"#;
        assert!(PortfolioSnapshot::from_json(json).is_err());
    }

    #[test]
    fn positions_parse_and_map() {
        let json = r#"{
            "positions": [
                { "symbol": "7203.T", "qty": 300, "avg_cost": 9800 },
                { "symbol": "9984.T", "qty": 100, "avg_cost": 7900 }
            ],
            "cash_available": 50000000,
            "margin_available": 0
        }"#;
        let snap = PositionSnapshot::from_json(json).unwrap();
        let map = snap.qty_map();
        assert_eq!(map[&Symbol::new("7203.T")], 300);
        assert_eq!(map.len(), 2);
    }

    #[test]
    fn positions_reject_duplicates() {
        let json = r#"{
            "positions": [
                { "symbol": "7203.T", "qty": 300, "avg_cost": 9800 },
                { "symbol": "7203.T", "qty": 100, "avg_cost": 9900 }
            ],
            "cash_available": 0,
            "margin_available": 0
        }"#;
        assert!(PositionSnapshot::from_json(json).is_err());
    }

    #[test]
    fn price_lookup_by_ref() {
        let json = r#"{
            "prices": [
                { "symbol": "7203.T", "date": "2026-02-06", "last": 10050, "close": 10000 }
            ]
        }"#;
        let table = PriceTable::from_json(json).unwrap();
        let sym = Symbol::new("7203.T");
        assert_eq!(table.price(sym, PriceRef::Last), Some(10050));
        assert_eq!(table.price(sym, PriceRef::Close), Some(10000));
        assert_eq!(table.asof(sym), Some(d("2026-02-06")));
        assert_eq!(table.price(Symbol::new("6758.T"), PriceRef::Close), None);
    }

    #[test]
    fn zero_price_treated_as_missing() {
        let json = r#"{
            "prices": [
                { "symbol": "7203.T", "date": "2026-02-06", "last": 0, "close": 10000 }
            ]
        }"#;
        let table = PriceTable::from_json(json).unwrap();
        assert_eq!(table.price(Symbol::new("7203.T"), PriceRef::Last), None);
    }
}
