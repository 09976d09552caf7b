//! Order and hedge intents, and their deterministic identities.
//!
//! An intent is a proposed order — never a submitted one. Intents are
//! immutable after construction and carry an `order_key` fingerprint that
//! identifies the logical order across repeated runs of the same day.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::hash;
use crate::types::{Account, HedgeType, PriceRef, Reason, Side, Symbol};

/// One proposed equity order derived from a weight delta.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderIntent {
    /// Trading date the intent targets.
    pub date: NaiveDate,
    pub account: Account,
    pub symbol: Symbol,
    pub side: Side,
    /// Lot-rounded share count, always positive.
    pub qty: i64,
    /// Signed rebalance amount in minor units, before lot rounding.
    pub notional: i64,
    /// `qty * price` — the value fingerprinted into `order_key`.
    pub rounded_notional: i64,
    pub price_ref: PriceRef,
    pub reason: Reason,
    /// Free-form constraints applied downstream (e.g. max participation).
    /// `BTreeMap` keeps serialization order deterministic.
    pub constraints: BTreeMap<String, serde_json::Value>,
    /// Deterministic idempotency key; see [`order_key`].
    pub order_key: String,
    pub prev_weight: f64,
    pub target_weight: f64,
    pub delta_weight: f64,
    #[serde(default)]
    pub notes: String,
}

/// One beta-hedge instrument trade.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HedgeIntent {
    pub date: NaiveDate,
    pub hedge_type: HedgeType,
    /// Beta measured as of the prior close — never same-day.
    pub ref_beta: f64,
    /// Notional the hedge offsets, in minor units.
    pub target_notional: i64,
    pub hedge_ratio: f64,
    pub price_ref: PriceRef,
    pub symbol: Symbol,
    pub side: Side,
    /// Share count for cash-settled instruments; `None` for CFD notional
    /// trades where the venue sizes the contract.
    pub qty: Option<i64>,
    #[serde(default)]
    pub notes: String,
}

impl HedgeIntent {
    /// Fingerprint contribution of this hedge to the run's `intent_hash`.
    pub fn hedge_key(&self) -> String {
        let kind = match self.hedge_type {
            HedgeType::InverseEtf => "inverse_etf",
            HedgeType::ShortFuture => "short_future",
            HedgeType::Cfd => "cfd",
        };
        hash::fingerprint(
            format!(
                "hedge|{}|{}|{}|{}|{}",
                self.date,
                kind,
                self.symbol,
                self.side.as_key_str(),
                self.target_notional,
            )
            .as_bytes(),
        )
    }
}

/// Deterministic idempotency key for one logical order.
///
/// Fingerprint of `date|symbol|side|rounded_notional`. Deliberately excludes
/// the run id: two runs over the same inputs must produce the same key so the
/// ledger can suppress duplicate submission.
pub fn order_key(date: NaiveDate, symbol: Symbol, side: Side, rounded_notional: i64) -> String {
    hash::fingerprint(
        format!("{date}|{symbol}|{}|{rounded_notional}", side.as_key_str()).as_bytes(),
    )
}

/// Fingerprint of the full intent set, order-insensitive.
///
/// Keys are sorted before hashing so the hash depends only on which logical
/// orders exist, not on construction order. Two runs over identical inputs
/// produce identical hashes — the idempotence proof recorded in every RunLog.
pub fn intent_hash(orders: &[OrderIntent], hedges: &[HedgeIntent]) -> String {
    let mut keys: Vec<String> = orders.iter().map(|o| o.order_key.clone()).collect();
    keys.extend(hedges.iter().map(|h| h.hedge_key()));
    keys.sort_unstable();
    hash::fingerprint(keys.join("|").as_bytes())
}

/// A symbol the builder could not convert into an intent.
///
/// Recorded instead of silently dropped, so every non-traded target is
/// explainable from the RunLog alone.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntentError {
    pub symbol: Symbol,
    pub kind: IntentErrorKind,
    pub detail: String,
}

/// Why a symbol failed to produce an intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentErrorKind {
    MissingPrice,
    HedgeSkipped,
}
