//! Individual precheck implementations.
//!
//! Each check observes one concern and maps what it sees through the
//! configured policy into a `PolicyAction`. No check performs I/O; the
//! orchestrator gathers every input beforehand.

use chrono::NaiveDate;
use weightbridge::{ProbeStatus, Symbol, TradingCalendar};

use crate::config::{CapacityAction, PrecheckConfig, StalenessPolicy, UnknownAction, UnknownScope};
use crate::report::{CheckCategory, CheckStatus, PolicyAction, PrecheckResult};

/// Trading-day check. A non-trading day, an unreadable calendar, or a
/// latest_date that did not advance since the last run all halt the run.
pub fn check_trading_day(
    latest_date: NaiveDate,
    calendar: Option<&TradingCalendar>,
    last_executed: Option<NaiveDate>,
) -> PrecheckResult {
    let Some(calendar) = calendar else {
        return PrecheckResult {
            category: CheckCategory::TradingDay,
            status: CheckStatus::Fail,
            reason: "calendar_load_error".into(),
            detail: serde_json::json!({ "latest_date": latest_date }),
            action: PolicyAction::Halt,
        };
    };

    if !calendar.contains(latest_date) {
        let (min, max) = calendar.range();
        return PrecheckResult {
            category: CheckCategory::TradingDay,
            status: CheckStatus::Fail,
            reason: "non_trading_day".into(),
            detail: serde_json::json!({
                "latest_date": latest_date,
                "calendar_range": { "min": min, "max": max },
            }),
            action: PolicyAction::Halt,
        };
    }

    if last_executed == Some(latest_date) {
        // Upstream data did not advance (holiday, stalled pipeline); a
        // second run over the same date would only duplicate intents.
        return PrecheckResult {
            category: CheckCategory::TradingDay,
            status: CheckStatus::Fail,
            reason: "latest_date_unchanged".into(),
            detail: serde_json::json!({
                "latest_date": latest_date,
                "last_executed_latest_date": last_executed,
            }),
            action: PolicyAction::Halt,
        };
    }

    PrecheckResult {
        category: CheckCategory::TradingDay,
        status: CheckStatus::Pass,
        reason: "trading_day".into(),
        detail: serde_json::json!({ "latest_date": latest_date }),
        action: PolicyAction::Proceed,
    }
}

/// Price-freshness check. Returns the result plus the stale symbols that the
/// orchestrator must drop when the policy is SKIP.
pub fn check_price_freshness(
    latest_date: NaiveDate,
    price_asof: &[(Symbol, Option<NaiveDate>)],
    config: &PrecheckConfig,
) -> (PrecheckResult, Vec<Symbol>) {
    let mut stale: Vec<Symbol> = Vec::new();
    let mut worst_delta = 0i64;
    for (symbol, asof) in price_asof {
        let Some(asof) = asof else { continue }; // missing quotes already errored upstream
        let delta = (latest_date - *asof).num_days();
        if delta > config.stale_price_threshold_days {
            stale.push(*symbol);
            worst_delta = worst_delta.max(delta);
        }
    }

    if stale.is_empty() {
        let result = PrecheckResult {
            category: CheckCategory::PriceFreshness,
            status: CheckStatus::Pass,
            reason: "price_fresh".into(),
            detail: serde_json::json!({
                "threshold_days": config.stale_price_threshold_days,
                "symbols_checked": price_asof.len(),
            }),
            action: PolicyAction::Proceed,
        };
        return (result, stale);
    }

    let detail = serde_json::json!({
        "threshold_days": config.stale_price_threshold_days,
        "stale_symbols": stale,
        "worst_delta_days": worst_delta,
        "policy": config.staleness_policy,
    });
    let result = match config.staleness_policy {
        StalenessPolicy::Halt => PrecheckResult {
            category: CheckCategory::PriceFreshness,
            status: CheckStatus::Fail,
            reason: "price_stale_halt".into(),
            detail,
            action: PolicyAction::Halt,
        },
        StalenessPolicy::Skip => PrecheckResult {
            category: CheckCategory::PriceFreshness,
            status: CheckStatus::Fail,
            reason: "price_stale_skip".into(),
            detail,
            action: PolicyAction::Skip,
        },
        StalenessPolicy::UseLast => PrecheckResult {
            category: CheckCategory::PriceFreshness,
            status: CheckStatus::Warn,
            reason: "price_stale_use_last".into(),
            detail,
            action: PolicyAction::Proceed,
        },
    };
    // Under USE_LAST the stale symbols still trade on their last quote, so
    // nothing is dropped.
    let dropped = if config.staleness_policy == StalenessPolicy::Skip {
        stale
    } else {
        Vec::new()
    };
    (result, dropped)
}

/// Capacity check shared by cash and margin. `required` is already grossed
/// up by the relevant buffer. Returns the result plus the REDUCE scale.
fn check_capacity(
    category: CheckCategory,
    required: i64,
    available: i64,
    action_on_shortfall: CapacityAction,
) -> (PrecheckResult, Option<f64>) {
    if required <= available {
        let result = PrecheckResult {
            category,
            status: CheckStatus::Pass,
            reason: format!("{category}_sufficient"),
            detail: serde_json::json!({ "required": required, "available": available }),
            action: PolicyAction::Proceed,
        };
        return (result, None);
    }

    let shortfall = required - available;
    let scale = if required > 0 {
        (available.max(0) as f64) / (required as f64)
    } else {
        0.0
    };
    let detail = serde_json::json!({
        "required": required,
        "available": available,
        "shortfall": shortfall,
        "action": action_on_shortfall,
        "scale": scale,
    });
    let (status, action, reduce) = match action_on_shortfall {
        CapacityAction::Halt => (CheckStatus::Fail, PolicyAction::Halt, None),
        CapacityAction::Reduce => (CheckStatus::Warn, PolicyAction::Reduce, Some(scale)),
        CapacityAction::Skip => (CheckStatus::Fail, PolicyAction::Skip, None),
    };
    let result = PrecheckResult {
        category,
        status,
        reason: format!("{category}_shortfall"),
        detail,
        action,
    };
    (result, reduce)
}

/// Cash buying-power check: buy notional plus the untouchable cash buffer
/// must fit in available cash.
pub fn check_cash_capacity(
    required_cash: i64,
    available_cash: i64,
    config: &PrecheckConfig,
) -> (PrecheckResult, Option<f64>) {
    check_capacity(
        CheckCategory::CashCapacity,
        required_cash.saturating_add(config.cash_buffer),
        available_cash,
        config.capacity_action,
    )
}

/// Margin check: required margin grossed up by the buffer ratio must fit in
/// available margin.
pub fn check_margin_capacity(
    required_margin: i64,
    available_margin: i64,
    config: &PrecheckConfig,
) -> (PrecheckResult, Option<f64>) {
    let with_buffer = (required_margin as f64 * (1.0 + config.margin_buffer_ratio)) as i64;
    check_capacity(
        CheckCategory::MarginCapacity,
        with_buffer,
        available_margin,
        config.capacity_action,
    )
}

/// Connectivity check. `probe` is `None` when a cooldown suppressed the
/// probe; the prior unknown outcome then decides via `unknown_action`.
pub fn check_connectivity(
    probe: Option<ProbeStatus>,
    cooldown_active: bool,
    config: &PrecheckConfig,
) -> PrecheckResult {
    if cooldown_active {
        let action = match config.unknown_action {
            UnknownAction::Skip => PolicyAction::Skip,
            UnknownAction::Halt => PolicyAction::Halt,
        };
        return PrecheckResult {
            category: CheckCategory::Connectivity,
            status: CheckStatus::Unknown,
            reason: "connectivity_cooldown".into(),
            detail: serde_json::json!({
                "cooldown_secs": config.cooldown_secs,
                "scope": config.unknown_scope,
                "unknown_action": config.unknown_action,
            }),
            action,
        };
    }

    match probe {
        Some(ProbeStatus::Ok) => PrecheckResult {
            category: CheckCategory::Connectivity,
            status: CheckStatus::Pass,
            reason: "connectivity_ok".into(),
            detail: serde_json::json!({}),
            action: PolicyAction::Proceed,
        },
        Some(ProbeStatus::Fail) => PrecheckResult {
            category: CheckCategory::Connectivity,
            status: CheckStatus::Fail,
            reason: "connectivity_fail".into(),
            detail: serde_json::json!({ "probe": "fail" }),
            action: PolicyAction::Halt,
        },
        Some(ProbeStatus::Unknown) | None => {
            let action = match config.unknown_action {
                UnknownAction::Skip => PolicyAction::Skip,
                UnknownAction::Halt => PolicyAction::Halt,
            };
            PrecheckResult {
                category: CheckCategory::Connectivity,
                status: CheckStatus::Unknown,
                reason: "connectivity_unknown".into(),
                detail: serde_json::json!({
                    "probe": "unknown",
                    "scope": config.unknown_scope,
                    "unknown_action": config.unknown_action,
                }),
                action,
            }
        }
    }
}

/// Whether an unknown under the configured scope skips the whole day.
pub fn unknown_skips_day(config: &PrecheckConfig) -> bool {
    config.unknown_scope == UnknownScope::LatestDate
}
