//! Precheck result and report types.
//!
//! Fail-safe decisions are data, not exceptions: every check returns a
//! `PrecheckResult` whose `action` field carries the policy consequence, and
//! the report aggregates them into a single run-level action.

use serde::{Deserialize, Serialize};
use weightbridge::Symbol;

/// The check categories, in evaluation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckCategory {
    TradingDay,
    PriceFreshness,
    CashCapacity,
    MarginCapacity,
    Connectivity,
}

impl std::fmt::Display for CheckCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            CheckCategory::TradingDay => "trading_day",
            CheckCategory::PriceFreshness => "price_freshness",
            CheckCategory::CashCapacity => "cash_capacity",
            CheckCategory::MarginCapacity => "margin_capacity",
            CheckCategory::Connectivity => "connectivity",
        };
        write!(f, "{name}")
    }
}

/// What a check observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckStatus {
    Pass,
    Warn,
    Fail,
    Unknown,
}

impl std::fmt::Display for CheckStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CheckStatus::Pass => write!(f, "PASS"),
            CheckStatus::Warn => write!(f, "WARN"),
            CheckStatus::Fail => write!(f, "FAIL"),
            CheckStatus::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

/// The policy consequence of a check.
///
/// Variant order is the precedence order: aggregation takes the maximum, so
/// a single `Halt` anywhere decides the whole run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PolicyAction {
    Proceed,
    Reduce,
    Skip,
    Halt,
}

impl std::fmt::Display for PolicyAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PolicyAction::Proceed => write!(f, "PROCEED"),
            PolicyAction::Reduce => write!(f, "REDUCE"),
            PolicyAction::Skip => write!(f, "SKIP"),
            PolicyAction::Halt => write!(f, "HALT"),
        }
    }
}

/// Outcome of one check category.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrecheckResult {
    pub category: CheckCategory,
    pub status: CheckStatus,
    /// Machine-readable reason tag, e.g. `non_trading_day`.
    pub reason: String,
    /// Structured explanation; recorded verbatim in the RunLog.
    pub detail: serde_json::Value,
    pub action: PolicyAction,
}

/// All check outcomes for one run, plus the derived adjustments the
/// orchestrator must apply before touching the adapter.
#[derive(Debug, Clone, Serialize)]
pub struct PrecheckReport {
    pub results: Vec<PrecheckResult>,
    /// Symbols whose quotes were stale under the SKIP policy; their intents
    /// are dropped from the batch.
    pub stale_symbols: Vec<Symbol>,
    /// Order keys inside the connectivity cooldown window (order_key scope).
    pub cooldown_keys: Vec<String>,
    /// Whole-day skip from a connectivity unknown under latest_date scope.
    pub day_skipped: bool,
    /// Proportional shrink factor from a capacity shortfall under REDUCE.
    pub reduce_scale: Option<f64>,
}

impl PrecheckReport {
    /// The single run-level action: `Halt > Skip > Reduce > Proceed`.
    pub fn run_action(&self) -> PolicyAction {
        self.results
            .iter()
            .map(|r| r.action)
            .max()
            .unwrap_or(PolicyAction::Proceed)
    }

    /// The reason tag of the highest-precedence non-proceed result, used as
    /// the RunLog `stop_reason` when the run halts.
    pub fn stop_reason(&self) -> Option<&str> {
        let worst = self.run_action();
        if worst == PolicyAction::Proceed {
            return None;
        }
        self.results
            .iter()
            .find(|r| r.action == worst)
            .map(|r| r.reason.as_str())
    }

    /// True if any category failed outright.
    pub fn has_failures(&self) -> bool {
        self.results.iter().any(|r| r.status == CheckStatus::Fail)
    }
}

impl std::fmt::Display for PrecheckReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "PRECHECKS:")?;
        for result in &self.results {
            writeln!(
                f,
                "  [{}] {}: {} -> {}",
                result.status, result.category, result.reason, result.action
            )?;
        }
        writeln!(f, "  run_action: {}", self.run_action())?;
        Ok(())
    }
}
