//! TARGET→CURRENT intent builder.
//!
//! Converts the latest target-weight row set plus current positions into
//! lot-rounded order intents and a beta-hedge intent. Pure: no I/O, no
//! clock, no randomness — rerunning over identical inputs yields an
//! identical `order_key` set and `intent_hash`. That reproducibility is the
//! property everything downstream (ledger, RunLog diffing) leans on.

use chrono::NaiveDate;
use rustc_hash::FxHashMap;
use serde::Serialize;

use crate::intent::{
    self, HedgeIntent, IntentError, IntentErrorKind, OrderIntent, intent_hash,
};
use crate::snapshot::{BetaRow, BetaStatus, PositionSnapshot, PriceTable};
use crate::types::{Account, HedgeType, PriceRef, Reason, Side, Symbol};

/// Everything the builder reads. Prepared by the caller so the builder
/// itself performs no I/O.
pub struct BuildInputs<'a> {
    pub latest_date: NaiveDate,
    /// Target `(symbol, weight)` pairs for `latest_date`, sorted by symbol.
    pub targets: &'a [(Symbol, f64)],
    pub positions: &'a PositionSnapshot,
    pub prices: &'a PriceTable,
    /// Beta measured strictly before `latest_date`, if the snapshot has one.
    pub ref_beta: Option<&'a BetaRow>,
}

/// Sizing parameters, mapped from the executor configuration.
#[derive(Debug, Clone)]
pub struct BuildConfig {
    /// Assets under management in minor units.
    pub aum: i64,
    /// 1.0 = unlevered cash account; above 1.0 trades the margin account.
    pub leverage_ratio: f64,
    pub price_ref: PriceRef,
    /// Rebalance amounts below this are not worth trading.
    pub min_trade_notional: i64,
    /// Cap on total turnover per day, as a fraction of AUM.
    pub max_gross_notional_ratio: f64,
    /// Cap on any single symbol's rebalance, as a fraction of AUM.
    pub max_symbol_notional_ratio: f64,
    /// Tradable lot size per symbol; symbols not listed trade in single shares.
    pub lot_sizes: FxHashMap<Symbol, i64>,
    /// Hedge sizing; `None` disables hedging entirely.
    pub hedge: Option<HedgeConfig>,
}

/// Hedge instrument selection is configuration, not code: cash accounts buy
/// the inverse ETF, levered accounts short the CFD instrument.
#[derive(Debug, Clone)]
pub struct HedgeConfig {
    pub ratio_cash: f64,
    pub ratio_margin: f64,
    pub inverse_etf: Symbol,
    pub cfd_instrument: Symbol,
}

/// The builder's complete output for one run.
#[derive(Debug, Clone, Serialize)]
pub struct IntentBatch {
    pub latest_date: NaiveDate,
    pub order_intents: Vec<OrderIntent>,
    pub hedge_intents: Vec<HedgeIntent>,
    /// Symbols that could not produce an intent, with reasons.
    pub errors: Vec<IntentError>,
    /// Fingerprint of the full intent set; identical across reruns.
    pub intent_hash: String,
}

/// Round to the nearest integer, ties away from zero.
fn round_half_away(x: f64) -> i64 {
    let r = (x.abs() + 0.5).floor() as i64;
    if x < 0.0 { -r } else { r }
}

/// Build order and hedge intents from a day's snapshot.
pub fn build_intents(inputs: &BuildInputs<'_>, config: &BuildConfig) -> IntentBatch {
    let account = if config.leverage_ratio > 1.0 {
        Account::Margin
    } else {
        Account::Cash
    };
    let equity = config.aum as f64 * config.leverage_ratio;

    let target_map: FxHashMap<Symbol, f64> = inputs.targets.iter().copied().collect();
    let qty_map = inputs.positions.qty_map();

    // Union of target and held symbols, sorted for deterministic output order.
    let mut all_symbols: Vec<Symbol> = target_map.keys().copied().collect();
    for sym in qty_map.keys() {
        if !target_map.contains_key(sym) {
            all_symbols.push(*sym);
        }
    }
    all_symbols.sort_unstable();

    let mut errors = Vec::new();

    // Pass 1: raw rebalance notionals.
    let mut deltas: Vec<(Symbol, f64, i64)> = Vec::new();
    for &sym in &all_symbols {
        let target_w = target_map.get(&sym).copied().unwrap_or(0.0);
        let current_qty = qty_map.get(&sym).copied().unwrap_or(0);

        let Some(price) = inputs.prices.price(sym, config.price_ref) else {
            // A symbol we must trade but cannot price is an error entry,
            // never a silent drop.
            if target_w > 0.0 || current_qty != 0 {
                errors.push(IntentError {
                    symbol: sym,
                    kind: IntentErrorKind::MissingPrice,
                    detail: format!("no {} price for {}", config.price_ref, sym),
                });
            }
            continue;
        };

        let target_notional = equity * target_w;
        let current_notional = (current_qty * price) as f64;
        deltas.push((sym, target_notional - current_notional, price));
    }

    // Pass 2: portfolio-level caps, applied before rounding so the scale
    // factor spreads across all symbols.
    let gross: f64 = deltas.iter().map(|(_, d, _)| d.abs()).sum();
    let gross_cap = config.aum as f64 * config.max_gross_notional_ratio;
    if gross > gross_cap && gross > 0.0 {
        let scale = gross_cap / gross;
        for (_, d, _) in &mut deltas {
            *d *= scale;
        }
    }
    let symbol_cap = config.aum as f64 * config.max_symbol_notional_ratio;
    for (_, d, _) in &mut deltas {
        *d = d.clamp(-symbol_cap, symbol_cap);
    }

    // Pass 3: lot rounding and intent construction.
    let mut order_intents = Vec::new();
    for (sym, delta, price) in deltas {
        if delta.abs() < config.min_trade_notional as f64 {
            continue;
        }
        let lot = config.lot_sizes.get(&sym).copied().unwrap_or(1).max(1);

        let lots = round_half_away(delta.abs() / (price * lot) as f64);
        let qty = lots * lot;
        if qty == 0 {
            // A non-zero rebalance that rounds to zero shares is dropped,
            // never emitted as a zero-qty order.
            continue;
        }

        let side = if delta > 0.0 { Side::Buy } else { Side::Sell };
        let rounded_notional = qty * price;
        let prev_w = qty_map.get(&sym).copied().unwrap_or(0) as f64 * price as f64 / equity;
        let target_w = target_map.get(&sym).copied().unwrap_or(0.0);
        let delta_w = target_w - prev_w;

        let mut notes = Vec::new();
        if target_w == 0.0 && prev_w > 0.0 {
            notes.push("exit");
        } else if target_w > 0.0 && prev_w == 0.0 {
            notes.push("enter");
        }
        if delta_w.abs() < 0.001 {
            notes.push("delta_weight < 0.1%");
        }

        let mut constraints = std::collections::BTreeMap::new();
        constraints.insert("lot_size".into(), serde_json::json!(lot));
        constraints.insert(
            "max_leverage".into(),
            serde_json::json!(config.leverage_ratio),
        );

        order_intents.push(OrderIntent {
            date: inputs.latest_date,
            account,
            symbol: sym,
            side,
            qty,
            notional: delta as i64,
            rounded_notional,
            price_ref: config.price_ref,
            reason: Reason::Rebalance,
            constraints,
            order_key: intent::order_key(inputs.latest_date, sym, side, rounded_notional),
            prev_weight: prev_w,
            target_weight: target_w,
            delta_weight: delta_w,
            notes: notes.join("; "),
        });
    }

    // Hedge, sized from the strictly prior-close beta.
    let mut hedge_intents = Vec::new();
    if let Some(hedge_config) = &config.hedge {
        match build_hedge(inputs, config, hedge_config, account) {
            Ok(Some(hedge)) => hedge_intents.push(hedge),
            Ok(None) => {}
            Err(detail) => errors.push(IntentError {
                symbol: match account {
                    Account::Cash => hedge_config.inverse_etf,
                    Account::Margin => hedge_config.cfd_instrument,
                },
                kind: IntentErrorKind::HedgeSkipped,
                detail,
            }),
        }
    }

    let intent_hash = intent_hash(&order_intents, &hedge_intents);
    IntentBatch {
        latest_date: inputs.latest_date,
        order_intents,
        hedge_intents,
        errors,
        intent_hash,
    }
}

/// Size the beta hedge. `Ok(None)` means nothing to hedge; `Err` carries the
/// reason the hedge was skipped.
fn build_hedge(
    inputs: &BuildInputs<'_>,
    config: &BuildConfig,
    hedge_config: &HedgeConfig,
    account: Account,
) -> Result<Option<HedgeIntent>, String> {
    let Some(beta) = inputs.ref_beta else {
        return Err("no beta measured before the trading date".into());
    };
    if beta.status != BetaStatus::Ok {
        return Err(format!("prior-close beta status is {:?}", beta.status));
    }

    match account {
        Account::Cash => {
            let notional = config.aum as f64 * beta.cash * hedge_config.ratio_cash;
            if notional.abs() < config.min_trade_notional as f64 {
                return Ok(None);
            }
            let Some(price) = inputs.prices.price(hedge_config.inverse_etf, config.price_ref)
            else {
                return Err(format!(
                    "no {} price for hedge instrument {}",
                    config.price_ref, hedge_config.inverse_etf
                ));
            };
            let qty = round_half_away(notional / price as f64);
            if qty == 0 {
                return Ok(None);
            }
            Ok(Some(HedgeIntent {
                date: inputs.latest_date,
                hedge_type: HedgeType::InverseEtf,
                ref_beta: beta.cash,
                target_notional: (qty * price).abs() * notional.signum() as i64,
                hedge_ratio: hedge_config.ratio_cash,
                price_ref: config.price_ref,
                symbol: hedge_config.inverse_etf,
                // The inverse ETF moves opposite the index, so the hedge is a buy.
                side: Side::Buy,
                qty: Some(qty.abs()),
                notes: format!("beta={:.3} asof {}", beta.cash, beta.date),
            }))
        }
        Account::Margin => {
            let equity = config.aum as f64 * config.leverage_ratio;
            let notional = equity * beta.margin * hedge_config.ratio_margin;
            if notional.abs() < config.min_trade_notional as f64 {
                return Ok(None);
            }
            Ok(Some(HedgeIntent {
                date: inputs.latest_date,
                hedge_type: HedgeType::Cfd,
                ref_beta: beta.margin,
                target_notional: notional as i64,
                hedge_ratio: hedge_config.ratio_margin,
                price_ref: config.price_ref,
                symbol: hedge_config.cfd_instrument,
                side: Side::Sell,
                qty: None,
                notes: format!("beta={:.3} asof {}", beta.margin, beta.date),
            }))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::{PortfolioSnapshot, PositionSnapshot, PriceTable};

    fn d(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    fn empty_positions() -> PositionSnapshot {
        PositionSnapshot::from_json(
            r#"{"positions": [], "cash_available": 100000000, "margin_available": 0}"#,
        )
        .unwrap()
    }

    fn prices_json() -> &'static str {
        r#"{
            "prices": [
                { "symbol": "7203.T", "date": "2026-02-06", "last": 10050, "close": 10000 },
                { "symbol": "6758.T", "date": "2026-02-06", "last": 5010, "close": 5000 },
                { "symbol": "1571.T", "date": "2026-02-06", "last": 1500, "close": 1490 }
            ]
        }"#
    }

    fn base_config() -> BuildConfig {
        BuildConfig {
            aum: 100_000_000,
            leverage_ratio: 1.0,
            price_ref: PriceRef::Close,
            min_trade_notional: 20_000,
            max_gross_notional_ratio: 1.0,
            max_symbol_notional_ratio: 1.0,
            lot_sizes: FxHashMap::default(),
            hedge: None,
        }
    }

    fn build(
        targets: &[(Symbol, f64)],
        positions: &PositionSnapshot,
        config: &BuildConfig,
    ) -> IntentBatch {
        let prices = PriceTable::from_json(prices_json()).unwrap();
        build_intents(
            &BuildInputs {
                latest_date: d("2026-02-06"),
                targets,
                positions,
                prices: &prices,
                ref_beta: None,
            },
            config,
        )
    }

    #[test]
    fn basic_buy_from_flat() {
        let targets = vec![(Symbol::new("7203.T"), 0.10)];
        let batch = build(&targets, &empty_positions(), &base_config());

        assert_eq!(batch.order_intents.len(), 1);
        let intent = &batch.order_intents[0];
        assert_eq!(intent.side, Side::Buy);
        assert_eq!(intent.account, Account::Cash);
        // 10% of 100M = 10M; at 10,000 per share = 1,000 shares.
        assert_eq!(intent.qty, 1000);
        assert_eq!(intent.rounded_notional, 10_000_000);
        assert!(batch.errors.is_empty());
    }

    #[test]
    fn rerun_is_bit_for_bit_identical() {
        let targets = vec![
            (Symbol::new("6758.T"), 0.20),
            (Symbol::new("7203.T"), 0.10),
        ];
        let positions = empty_positions();
        let a = build(&targets, &positions, &base_config());
        let b = build(&targets, &positions, &base_config());

        assert_eq!(a.intent_hash, b.intent_hash);
        let keys_a: Vec<&str> = a.order_intents.iter().map(|i| i.order_key.as_str()).collect();
        let keys_b: Vec<&str> = b.order_intents.iter().map(|i| i.order_key.as_str()).collect();
        assert_eq!(keys_a, keys_b);
    }

    #[test]
    fn sells_down_to_target() {
        let positions = PositionSnapshot::from_json(
            r#"{
                "positions": [ { "symbol": "7203.T", "qty": 2000, "avg_cost": 9800 } ],
                "cash_available": 100000000,
                "margin_available": 0
            }"#,
        )
        .unwrap();
        let targets = vec![(Symbol::new("7203.T"), 0.10)];
        let batch = build(&targets, &positions, &base_config());

        // Current 2000 * 10,000 = 20M; target 10M → sell 10M = 1,000 shares.
        assert_eq!(batch.order_intents.len(), 1);
        assert_eq!(batch.order_intents[0].side, Side::Sell);
        assert_eq!(batch.order_intents[0].qty, 1000);
    }

    #[test]
    fn closes_position_not_in_targets() {
        let positions = PositionSnapshot::from_json(
            r#"{
                "positions": [ { "symbol": "6758.T", "qty": 100, "avg_cost": 5000 } ],
                "cash_available": 100000000,
                "margin_available": 0
            }"#,
        )
        .unwrap();
        let targets = vec![(Symbol::new("7203.T"), 0.10)];
        let batch = build(&targets, &positions, &base_config());

        let close = batch
            .order_intents
            .iter()
            .find(|i| i.symbol == Symbol::new("6758.T"))
            .unwrap();
        assert_eq!(close.side, Side::Sell);
        assert_eq!(close.qty, 100);
        assert!(close.notes.contains("exit"));
    }

    #[test]
    fn below_min_trade_dropped() {
        // 0.0001 of 100M = 10,000 < 20,000 min trade.
        let targets = vec![(Symbol::new("7203.T"), 0.0001)];
        let batch = build(&targets, &empty_positions(), &base_config());
        assert!(batch.order_intents.is_empty());
        assert!(batch.errors.is_empty());
    }

    #[test]
    fn rounds_to_zero_is_dropped_not_emitted() {
        let mut config = base_config();
        config.min_trade_notional = 0;
        config.lot_sizes.insert(Symbol::new("7203.T"), 100);
        // 30,000 notional at 10,000/share with lot 100 = 0.03 lots → 0.
        let targets = vec![(Symbol::new("7203.T"), 0.0003)];
        let batch = build(&targets, &empty_positions(), &config);
        assert!(batch.order_intents.is_empty());
        assert!(batch.order_intents.iter().all(|i| i.qty > 0));
    }

    #[test]
    fn lot_rounding_half_away_from_zero() {
        let mut config = base_config();
        config.min_trade_notional = 0;
        config.lot_sizes.insert(Symbol::new("7203.T"), 100);
        // 0.015 of 100M = 1.5M; lot notional = 1M → 1.5 lots → rounds to 2.
        let targets = vec![(Symbol::new("7203.T"), 0.015)];
        let batch = build(&targets, &empty_positions(), &config);
        assert_eq!(batch.order_intents[0].qty, 200);
    }

    #[test]
    fn missing_price_is_error_not_silence() {
        let targets = vec![
            (Symbol::new("7203.T"), 0.10),
            (Symbol::new("9984.T"), 0.10), // no price row
        ];
        let batch = build(&targets, &empty_positions(), &base_config());

        assert_eq!(batch.order_intents.len(), 1);
        assert_eq!(batch.errors.len(), 1);
        assert_eq!(batch.errors[0].symbol, Symbol::new("9984.T"));
        assert_eq!(batch.errors[0].kind, IntentErrorKind::MissingPrice);
    }

    #[test]
    fn gross_cap_scales_proportionally() {
        let mut config = base_config();
        config.max_gross_notional_ratio = 0.10; // 10M turnover cap
        let targets = vec![
            (Symbol::new("7203.T"), 0.10),
            (Symbol::new("6758.T"), 0.10),
        ];
        let batch = build(&targets, &empty_positions(), &config);

        let gross: i64 = batch.order_intents.iter().map(|i| i.rounded_notional).sum();
        // 20M raw turnover scaled to 10M, half each.
        assert!(gross <= 10_000_000 + 20_000, "gross {gross} over cap");
        for intent in &batch.order_intents {
            assert!((intent.rounded_notional - 5_000_000).abs() <= 10_000);
        }
    }

    #[test]
    fn symbol_cap_clamps_single_name() {
        let mut config = base_config();
        config.max_symbol_notional_ratio = 0.05; // 5M per symbol
        let targets = vec![(Symbol::new("7203.T"), 0.10)];
        let batch = build(&targets, &empty_positions(), &config);
        assert_eq!(batch.order_intents[0].rounded_notional, 5_000_000);
    }

    #[test]
    fn margin_account_above_one_leverage() {
        let mut config = base_config();
        config.leverage_ratio = 2.0;
        let targets = vec![(Symbol::new("7203.T"), 0.10)];
        let batch = build(&targets, &empty_positions(), &config);
        assert_eq!(batch.order_intents[0].account, Account::Margin);
        // Equity doubles with leverage: 2 * 100M * 0.10 = 20M → 2000 shares.
        assert_eq!(batch.order_intents[0].qty, 2000);
    }

    fn hedge_config() -> HedgeConfig {
        HedgeConfig {
            ratio_cash: 1.0,
            ratio_margin: 1.0,
            inverse_etf: Symbol::new("1571.T"),
            cfd_instrument: Symbol::new("TOPIX_CFD_SHORT"),
        }
    }

    fn snapshot_with_betas() -> PortfolioSnapshot {
        PortfolioSnapshot::from_json(
            r#"{
                "rows": [ { "date": "2026-02-06", "symbol": "7203.T", "weight": 0.10 } ],
                "betas": [
                    { "date": "2026-02-05", "cash": 0.90, "margin": 1.10, "status": "ok" },
                    { "date": "2026-02-06", "cash": 0.50, "margin": 0.50, "status": "ok" }
                ]
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn cash_hedge_buys_inverse_etf_with_prior_beta() {
        let snap = snapshot_with_betas();
        let positions = empty_positions();
        let prices = PriceTable::from_json(prices_json()).unwrap();
        let mut config = base_config();
        config.hedge = Some(hedge_config());

        let batch = build_intents(
            &BuildInputs {
                latest_date: d("2026-02-06"),
                targets: &snap.weights_for(d("2026-02-06")),
                positions: &positions,
                prices: &prices,
                ref_beta: snap.ref_beta_before(d("2026-02-06")),
            },
            &config,
        );

        assert_eq!(batch.hedge_intents.len(), 1);
        let hedge = &batch.hedge_intents[0];
        assert_eq!(hedge.hedge_type, HedgeType::InverseEtf);
        assert_eq!(hedge.side, Side::Buy);
        // Prior-close beta (0.90), never the same-day value (0.50).
        assert_eq!(hedge.ref_beta, 0.90);
        // 100M * 0.90 / 1490 = 60402.68... → 60403 shares.
        assert_eq!(hedge.qty, Some(60403));
    }

    #[test]
    fn margin_hedge_shorts_cfd() {
        let snap = snapshot_with_betas();
        let positions = empty_positions();
        let prices = PriceTable::from_json(prices_json()).unwrap();
        let mut config = base_config();
        config.leverage_ratio = 2.0;
        config.hedge = Some(hedge_config());

        let batch = build_intents(
            &BuildInputs {
                latest_date: d("2026-02-06"),
                targets: &snap.weights_for(d("2026-02-06")),
                positions: &positions,
                prices: &prices,
                ref_beta: snap.ref_beta_before(d("2026-02-06")),
            },
            &config,
        );

        let hedge = &batch.hedge_intents[0];
        assert_eq!(hedge.hedge_type, HedgeType::Cfd);
        assert_eq!(hedge.side, Side::Sell);
        assert_eq!(hedge.ref_beta, 1.10);
        assert_eq!(hedge.qty, None);
        // 200M equity * 1.10 beta = 220M.
        assert_eq!(hedge.target_notional, 220_000_000);
    }

    #[test]
    fn hedge_without_prior_beta_is_recorded_skip() {
        let positions = empty_positions();
        let prices = PriceTable::from_json(prices_json()).unwrap();
        let mut config = base_config();
        config.hedge = Some(hedge_config());
        let targets = vec![(Symbol::new("7203.T"), 0.10)];

        let batch = build_intents(
            &BuildInputs {
                latest_date: d("2026-02-06"),
                targets: &targets,
                positions: &positions,
                prices: &prices,
                ref_beta: None,
            },
            &config,
        );

        assert!(batch.hedge_intents.is_empty());
        assert!(
            batch
                .errors
                .iter()
                .any(|e| e.kind == IntentErrorKind::HedgeSkipped)
        );
    }
}
