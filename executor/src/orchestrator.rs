//! Run orchestrator: snapshot → intents → precheck → (adapter | stop).
//!
//! Sequences one invocation through the state machine
//! `Started → SnapshotLoaded → IntentsBuilt → Prechecked →
//! {Halted | PreSubmitStopped | Submitted | Failed}` and owns the only two
//! pieces of cross-run state: the order ledger and the run-guard file.
//!
//! Fail-safe stops are `Ok(RunOutcome::Halted)`, not errors; the RunLog is
//! flushed on every exit path by the recorder's drop guard.

use chrono::{DateTime, NaiveDate, Utc};
use log::{info, warn};
use rustc_hash::FxHashSet;
use uuid::Uuid;

use weightbridge::builder::{BuildInputs, build_intents};
use weightbridge::snapshot::{PortfolioSnapshot, PositionSnapshot, PriceTable};
use weightbridge::types::{Account, Mode, ProbeStatus, Side, Symbol};
use weightbridge::{OrderIntent, TradingCalendar};
use weightbridge_adapter::{Adapter, AdapterStatus, SubmissionBatch};
use weightbridge_precheck::{CheckCategory, PolicyAction, PrecheckEngine, PrecheckInput};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::ledger::{LedgerEvent, LedgerStatus, OrderLedger};
use crate::runlog::{RunRecorder, RunState};
use crate::state::StateStore;

/// Options for a run.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Skip the interactive confirmation before live submission.
    pub force: bool,
}

/// How a run ended, short of an error.
///
/// The process exit-code contract hangs off this: `0` for both intentional
/// completions, `2` for a fail-safe halt. Errors map to `1` in `main`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    PreSubmitStopped,
    Submitted,
    Halted,
}

impl RunOutcome {
    /// The scheduler-facing exit code. `2` is an expected stop, not an
    /// error; a scheduler treating it as failure is misconfigured.
    pub fn exit_code(self) -> i32 {
        match self {
            RunOutcome::PreSubmitStopped | RunOutcome::Submitted => 0,
            RunOutcome::Halted => 2,
        }
    }
}

/// Execute one full run.
pub fn run(config: &Config, adapter: &mut dyn Adapter, opts: &RunOptions) -> Result<RunOutcome> {
    let created_at = Utc::now();
    let suffix = Uuid::new_v4().simple().to_string();
    let run_id = format!("{}_{}", created_at.format("%Y%m%d_%H%M%S"), &suffix[..8]);

    let mut recorder = RunRecorder::new(
        config.runlog_dir(),
        run_id,
        created_at,
        config.run.mode,
    )?;

    let outcome = execute(config, adapter, opts, &mut recorder, created_at);

    match &outcome {
        Ok(RunOutcome::PreSubmitStopped) => recorder.transition(RunState::PreSubmitStopped),
        Ok(RunOutcome::Submitted) => recorder.transition(RunState::Submitted),
        Ok(RunOutcome::Halted) => recorder.transition(RunState::Halted),
        Err(e) => {
            recorder.record_error("run", e.to_string());
            recorder.transition(RunState::Failed);
        }
    }

    let path = recorder.finish()?;
    info!("run log written to {}", path.display());
    outcome
}

fn execute(
    config: &Config,
    adapter: &mut dyn Adapter,
    opts: &RunOptions,
    rec: &mut RunRecorder,
    now: DateTime<Utc>,
) -> Result<RunOutcome> {
    let run_id = rec.log.run_id.clone();

    // 1. Load the upstream snapshots. A missing or malformed file here is
    // fatal: nothing can be sized without them.
    let portfolio = PortfolioSnapshot::load(&config.paths.portfolio)?;
    let positions = PositionSnapshot::load(&config.paths.positions)?;
    let prices = PriceTable::load(&config.paths.prices)?;

    let latest_date = portfolio.latest_date();
    rec.log.latest_date = Some(latest_date);
    rec.log.inputs_hash = Some(portfolio.inputs_hash.clone());
    rec.transition(RunState::SnapshotLoaded);
    info!("latest_date {latest_date}, inputs_hash {}", portfolio.inputs_hash);

    // An unreadable calendar is a fail-safe halt (decided by the precheck
    // engine), not a crash.
    let calendar = match TradingCalendar::load(&config.paths.calendar) {
        Ok(calendar) => Some(calendar),
        Err(e) => {
            warn!("calendar load failed: {e}");
            rec.record_error("calendar", e.to_string());
            None
        }
    };

    let state_store = StateStore::new(&config.state_path());
    let last_executed = state_store.load().map(|s| s.last_executed_latest_date);

    // 2. Build intents. Pure given the loaded snapshots.
    let targets = portfolio.weights_for(latest_date);
    let batch = build_intents(
        &BuildInputs {
            latest_date,
            targets: &targets,
            positions: &positions,
            prices: &prices,
            ref_beta: portfolio.ref_beta_before(latest_date),
        },
        &config.build_config(),
    );
    for build_error in &batch.errors {
        rec.record_error(
            "intent_builder",
            format!("{}: {}", build_error.symbol, build_error.detail),
        );
    }
    rec.log.order_intents = batch.order_intents.clone();
    rec.log.hedge_intents = batch.hedge_intents.clone();
    rec.log.intent_hash = Some(batch.intent_hash.clone());
    rec.transition(RunState::IntentsBuilt);
    info!(
        "built {} order intents, {} hedge intents, intent_hash {}",
        batch.order_intents.len(),
        batch.hedge_intents.len(),
        batch.intent_hash
    );

    // 3. Capacity requirements implied by the built batch.
    let hedge_cash_buys: i64 = batch
        .hedge_intents
        .iter()
        .filter(|h| h.side == Side::Buy)
        .map(|h| h.target_notional.abs())
        .sum();
    let required_cash = hedge_cash_buys
        + buy_notional(&batch.order_intents, Account::Cash);
    let required_margin = (config.account.leverage_ratio > 1.0).then(|| {
        let buys = buy_notional(&batch.order_intents, Account::Margin);
        (buys as f64 / config.account.leverage_ratio) as i64
    });

    // 4. Prechecks. The trading-day check runs first and alone: when it
    // halts, no ledger read, no connectivity probe, no broker interaction
    // of any kind happens afterward.
    let ledger = OrderLedger::open(&config.ledger_path())?;
    let trading_day = weightbridge_precheck::checks::check_trading_day(
        latest_date,
        calendar.as_ref(),
        last_executed,
    );
    let (report, probe) = if trading_day.action == PolicyAction::Halt {
        let report = weightbridge_precheck::PrecheckReport {
            results: vec![trading_day],
            stale_symbols: Vec::new(),
            cooldown_keys: Vec::new(),
            day_skipped: false,
            reduce_scale: None,
        };
        (report, None)
    } else {
        // Cooldown lookup, then (only outside a cooldown) the connectivity
        // probe. Within the window the prior unknown outcome stands
        // un-probed.
        let mut cooldown =
            ledger.cooldown_state(latest_date, now, config.precheck.cooldown_secs)?;
        let batch_keys: FxHashSet<&str> = batch
            .order_intents
            .iter()
            .map(|i| i.order_key.as_str())
            .collect();
        cooldown
            .keys_in_cooldown
            .retain(|key| batch_keys.contains(key.as_str()));

        let probe = if cooldown.is_active(config.precheck.unknown_scope) {
            None
        } else {
            Some(adapter.probe())
        };

        let price_asof: Vec<(Symbol, Option<NaiveDate>)> = batch
            .order_intents
            .iter()
            .map(|i| (i.symbol, prices.asof(i.symbol)))
            .collect();

        let engine = PrecheckEngine::new(config.precheck.clone());
        let report = engine.run(&PrecheckInput {
            latest_date,
            calendar: calendar.as_ref(),
            last_executed_latest_date: last_executed,
            price_asof,
            required_cash,
            available_cash: positions.cash_available,
            required_margin,
            available_margin: positions.margin_available,
            probe,
            cooldown,
        });
        (report, probe)
    };
    print!("{report}");
    rec.log.precheck_results = report.results.clone();
    let run_action = report.run_action();
    rec.log.run_action = Some(run_action);
    rec.record_snapshot(
        "capacity",
        serde_json::json!({
            "required_cash": required_cash,
            "available_cash": positions.cash_available,
            "required_margin": required_margin,
            "available_margin": positions.margin_available,
        }),
    );
    rec.transition(RunState::Prechecked);

    // A fresh unknown probe arms the cooldown for the whole batch scope;
    // later runs inside the window will skip or halt without re-probing.
    if probe == Some(ProbeStatus::Unknown) {
        record_order_events(
            &ledger,
            &batch.order_intents,
            &run_id,
            latest_date,
            LedgerStatus::Unknown,
            Some("connectivity probe unknown".into()),
        )?;
    }

    // 5. Halt is terminal: the adapter boundary is never reached and no
    // intents are emitted — the RunLog records an empty set alongside the
    // hash of what would have been built.
    if run_action == PolicyAction::Halt {
        let reason = report.stop_reason().unwrap_or("halt").to_string();
        info!("run halted: {reason}");
        rec.record_snapshot(
            "built_before_halt",
            serde_json::json!({
                "order_intents": rec.log.order_intents.len(),
                "hedge_intents": rec.log.hedge_intents.len(),
            }),
        );
        rec.log.order_intents.clear();
        rec.log.hedge_intents.clear();
        rec.log.stop_reason = Some(reason);
        return Ok(RunOutcome::Halted);
    }

    // 6. Apply SKIP and REDUCE decisions to a working copy. Skips are
    // applied before the reduction so a skipped symbol never trades at a
    // reduced size instead of not at all.
    let mut working = batch.order_intents.clone();
    let mut hedges = batch.hedge_intents.clone();
    let mut skipped: Vec<(Symbol, &'static str)> = Vec::new();

    if report.day_skipped {
        for intent in &working {
            skipped.push((intent.symbol, "connectivity_unknown_day"));
        }
        working.clear();
        hedges.clear();
    } else {
        retain_or_skip(&mut working, &mut skipped, "price_stale", |i| {
            !report.stale_symbols.contains(&i.symbol)
        });
        retain_or_skip(&mut working, &mut skipped, "connectivity_cooldown", |i| {
            !report.cooldown_keys.contains(&i.order_key)
        });
        // A fresh unknown under SKIP drops the whole batch this run; the
        // scope setting only decides how far the recorded cooldown reaches.
        if probe == Some(ProbeStatus::Unknown) {
            retain_or_skip(&mut working, &mut skipped, "connectivity_unknown", |_| false);
            hedges.clear();
        }
    }

    let capacity_skip = report
        .results
        .iter()
        .any(|r| r.category == CheckCategory::CashCapacity && r.action == PolicyAction::Skip);
    if capacity_skip {
        let capacity =
            positions.cash_available - config.precheck.cash_buffer - hedge_cash_buys;
        apply_capacity_skip(&mut working, Account::Cash, capacity, &mut skipped);
    }
    let margin_skip = report
        .results
        .iter()
        .any(|r| r.category == CheckCategory::MarginCapacity && r.action == PolicyAction::Skip);
    if margin_skip {
        let capacity = (positions.margin_available as f64
            / (1.0 + config.precheck.margin_buffer_ratio)
            * config.account.leverage_ratio) as i64;
        apply_capacity_skip(&mut working, Account::Margin, capacity, &mut skipped);
    }

    if let Some(scale) = report.reduce_scale {
        let affected = apply_reduction(&mut working, scale, &mut skipped);
        rec.record_snapshot(
            "reduction",
            serde_json::json!({ "scale": scale, "affected_symbols": affected }),
        );
        info!("capacity reduction applied: x{scale:.4}");
    }

    // 7. At-most-once: drop keys the ledger already saw submitted today.
    let effective_mode = config.effective_mode();
    if effective_mode == Mode::LiveSubmit {
        let already = ledger.submitted_keys(latest_date)?;
        retain_or_skip(&mut working, &mut skipped, "already_submitted", |i| {
            !already.contains(&i.order_key)
        });
    }

    if !skipped.is_empty() {
        for (symbol, reason) in &skipped {
            rec.record_error("precheck", format!("{symbol}: {reason}"));
        }
        rec.record_snapshot(
            "skipped_symbols",
            serde_json::json!(
                skipped
                    .iter()
                    .map(|(symbol, reason)| {
                        serde_json::json!({ "symbol": symbol, "reason": reason })
                    })
                    .collect::<Vec<_>>()
            ),
        );
    }

    // The RunLog records what is actually emitted; the intent_hash above
    // remains the fingerprint of the full built set.
    rec.log.order_intents = working.clone();
    rec.log.hedge_intents = hedges.clone();

    // 8. Confirmation gate for live submission.
    if effective_mode == Mode::LiveSubmit && !opts.force {
        let confirmed = dialoguer::Confirm::new()
            .with_prompt(format!(
                "Submit {} orders for {latest_date}?",
                working.len() + hedges.len()
            ))
            .default(false)
            .interact()
            .unwrap_or(false);
        if !confirmed {
            info!("live submission declined; stopping before submit");
            rec.log.stop_reason = Some("user_declined".into());
            return Ok(RunOutcome::PreSubmitStopped);
        }
    }

    // 9. The adapter boundary.
    let submission = SubmissionBatch {
        order_intents: &working,
        hedge_intents: &hedges,
    };
    info!(
        "invoking adapter '{}' with {} orders in {effective_mode}",
        adapter.name(),
        submission.len()
    );
    let result = match adapter.submit(&submission, effective_mode) {
        Ok(result) => result,
        Err(e) => {
            record_order_events(
                &ledger,
                &working,
                &run_id,
                latest_date,
                LedgerStatus::Failed,
                Some(e.to_string()),
            )?;
            return Err(e.into());
        }
    };

    rec.log.secrets_touched = result.credentials_entered;
    rec.record_snapshot(
        "adapter_result",
        serde_json::to_value(&result).unwrap_or_default(),
    );

    match result.status {
        AdapterStatus::PreSubmitStopped => {
            record_order_events(
                &ledger,
                &working,
                &run_id,
                latest_date,
                LedgerStatus::Intent,
                None,
            )?;
            rec.log.stop_reason = Some("STOP_BEFORE_SUBMIT".into());
            state_store.save(latest_date, now)?;
            Ok(RunOutcome::PreSubmitStopped)
        }
        AdapterStatus::Submitted => {
            record_order_events(
                &ledger,
                &working,
                &run_id,
                latest_date,
                LedgerStatus::Submitted,
                None,
            )?;
            rec.log.stop_reason = Some("SUBMITTED".into());
            state_store.save(latest_date, now)?;
            Ok(RunOutcome::Submitted)
        }
        AdapterStatus::Failed => {
            let detail = result.details.to_string();
            record_order_events(
                &ledger,
                &working,
                &run_id,
                latest_date,
                LedgerStatus::Failed,
                Some(detail.clone()),
            )?;
            rec.record_error("adapter", detail.clone());
            Err(Error::AdapterFailed(detail))
        }
    }
}

/// Sum of buy-side rounded notionals for one account.
fn buy_notional(intents: &[OrderIntent], account: Account) -> i64 {
    intents
        .iter()
        .filter(|i| i.account == account && i.side == Side::Buy)
        .map(|i| i.rounded_notional)
        .sum()
}

/// Retain intents matching `keep`; record the rest as skipped.
fn retain_or_skip(
    working: &mut Vec<OrderIntent>,
    skipped: &mut Vec<(Symbol, &'static str)>,
    reason: &'static str,
    keep: impl Fn(&OrderIntent) -> bool,
) {
    working.retain(|intent| {
        if keep(intent) {
            true
        } else {
            skipped.push((intent.symbol, reason));
            false
        }
    });
}

/// Drop the lowest-priority (smallest target-weight) buys for `account`
/// until their notional fits in `capacity`.
fn apply_capacity_skip(
    working: &mut Vec<OrderIntent>,
    account: Account,
    capacity: i64,
    skipped: &mut Vec<(Symbol, &'static str)>,
) {
    let capacity = capacity.max(0);
    loop {
        if buy_notional(working, account) <= capacity {
            return;
        }
        let lowest = working
            .iter()
            .enumerate()
            .filter(|(_, i)| i.account == account && i.side == Side::Buy)
            .min_by(|(_, a), (_, b)| {
                a.target_weight
                    .partial_cmp(&b.target_weight)
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .map(|(idx, _)| idx);
        match lowest {
            Some(idx) => {
                let intent = working.remove(idx);
                skipped.push((intent.symbol, "capacity_skip"));
            }
            None => return,
        }
    }
}

/// Shrink every remaining order intent by `scale`, re-rounding to lots.
/// Intents that shrink to zero shares are dropped. Returns the affected
/// symbols. The original `order_key` is kept: the key identifies the logical
/// order as built, which is what the ledger deduplicates on.
fn apply_reduction(
    working: &mut Vec<OrderIntent>,
    scale: f64,
    skipped: &mut Vec<(Symbol, &'static str)>,
) -> Vec<Symbol> {
    let mut affected = Vec::new();
    let mut kept = Vec::with_capacity(working.len());
    for mut intent in working.drain(..) {
        let lot = intent
            .constraints
            .get("lot_size")
            .and_then(|v| v.as_i64())
            .unwrap_or(1)
            .max(1);
        let price = intent.rounded_notional / intent.qty; // qty > 0 by construction
        let scaled = intent.rounded_notional as f64 * scale;
        let lots = ((scaled / (price * lot) as f64).abs() + 0.5).floor() as i64;
        let qty = lots * lot;
        if qty == 0 {
            skipped.push((intent.symbol, "reduced_to_zero"));
            continue;
        }
        if qty != intent.qty {
            affected.push(intent.symbol);
            intent.qty = qty;
            intent.rounded_notional = qty * price;
            if intent.notes.is_empty() {
                intent.notes = format!("reduced x{scale:.4}");
            } else {
                intent.notes = format!("{}; reduced x{scale:.4}", intent.notes);
            }
        }
        kept.push(intent);
    }
    *working = kept;
    affected
}

fn record_order_events(
    ledger: &OrderLedger,
    intents: &[OrderIntent],
    run_id: &str,
    latest_date: NaiveDate,
    status: LedgerStatus,
    detail: Option<String>,
) -> Result<()> {
    for intent in intents {
        ledger.append(&LedgerEvent {
            ts: Utc::now(),
            run_id: run_id.to_string(),
            latest_date,
            order_key: intent.order_key.clone(),
            symbol: intent.symbol,
            side: intent.side,
            notional: intent.rounded_notional,
            status,
            detail: detail.clone(),
        })?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use weightbridge::order_key;
    use weightbridge::types::{PriceRef, Reason};

    fn intent(symbol: &str, side: Side, qty: i64, price: i64, target_weight: f64) -> OrderIntent {
        let date = "2026-02-06".parse().unwrap();
        let symbol = Symbol::new(symbol);
        let rounded = qty * price;
        let mut constraints = BTreeMap::new();
        constraints.insert("lot_size".into(), serde_json::json!(1));
        OrderIntent {
            date,
            account: Account::Cash,
            symbol,
            side,
            qty,
            notional: rounded,
            rounded_notional: rounded,
            price_ref: PriceRef::Close,
            reason: Reason::Rebalance,
            constraints,
            order_key: order_key(date, symbol, side, rounded),
            prev_weight: 0.0,
            target_weight,
            delta_weight: target_weight,
            notes: String::new(),
        }
    }

    #[test]
    fn exit_codes() {
        assert_eq!(RunOutcome::PreSubmitStopped.exit_code(), 0);
        assert_eq!(RunOutcome::Submitted.exit_code(), 0);
        assert_eq!(RunOutcome::Halted.exit_code(), 2);
    }

    #[test]
    fn capacity_skip_drops_lowest_weight_first() {
        let mut working = vec![
            intent("7203.T", Side::Buy, 100, 10_000, 0.10), // 1M
            intent("6758.T", Side::Buy, 100, 10_000, 0.02), // 1M, lowest priority
            intent("9984.T", Side::Sell, 100, 10_000, 0.05),
        ];
        let mut skipped = Vec::new();
        apply_capacity_skip(&mut working, Account::Cash, 1_500_000, &mut skipped);

        // One buy dropped (the 0.02 weight), sells untouched.
        assert_eq!(working.len(), 2);
        assert!(working.iter().any(|i| i.symbol == Symbol::new("7203.T")));
        assert!(working.iter().any(|i| i.symbol == Symbol::new("9984.T")));
        assert_eq!(skipped, vec![(Symbol::new("6758.T"), "capacity_skip")]);
    }

    #[test]
    fn capacity_skip_noop_when_fits() {
        let mut working = vec![intent("7203.T", Side::Buy, 100, 10_000, 0.10)];
        let mut skipped = Vec::new();
        apply_capacity_skip(&mut working, Account::Cash, 10_000_000, &mut skipped);
        assert_eq!(working.len(), 1);
        assert!(skipped.is_empty());
    }

    #[test]
    fn reduction_rescales_and_keeps_order_key() {
        let original = intent("7203.T", Side::Buy, 1000, 10_000, 0.10);
        let original_key = original.order_key.clone();
        let mut working = vec![original];
        let mut skipped = Vec::new();
        let affected = apply_reduction(&mut working, 0.5, &mut skipped);

        assert_eq!(working.len(), 1);
        assert_eq!(working[0].qty, 500);
        assert_eq!(working[0].rounded_notional, 5_000_000);
        assert_eq!(working[0].order_key, original_key);
        assert_eq!(affected, vec![Symbol::new("7203.T")]);
        assert!(working[0].notes.contains("reduced x0.5000"));
    }

    #[test]
    fn reduction_to_zero_drops_intent() {
        let mut working = vec![intent("7203.T", Side::Buy, 1, 10_000, 0.001)];
        let mut skipped = Vec::new();
        apply_reduction(&mut working, 0.1, &mut skipped);
        assert!(working.is_empty());
        assert_eq!(skipped, vec![(Symbol::new("7203.T"), "reduced_to_zero")]);
    }

    #[test]
    fn buy_notional_sums_one_account_side() {
        let intents = vec![
            intent("7203.T", Side::Buy, 100, 10_000, 0.1),
            intent("6758.T", Side::Sell, 100, 10_000, 0.1),
        ];
        assert_eq!(buy_notional(&intents, Account::Cash), 1_000_000);
        assert_eq!(buy_notional(&intents, Account::Margin), 0);
    }
}
