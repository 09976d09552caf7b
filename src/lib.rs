//! # weightbridge
//!
//! A deterministic order-intent engine: converts a daily target-weight
//! snapshot plus current positions into reproducible, idempotent order
//! intents.
//!
//! ## Guarantees
//!
//! - **Idempotence**: for fixed inputs, [`builder::build_intents`] yields an
//!   identical `order_key` set and `intent_hash` on every run — no clock, no
//!   randomness, no I/O inside the computation.
//! - **No zero-qty orders**: rebalance amounts that round to zero shares are
//!   dropped, never emitted.
//! - **No look-ahead**: hedge sizing only ever sees a beta measured strictly
//!   before the trading date.
//! - **Nothing silent**: a symbol that cannot be traded (missing price,
//!   unusable beta) becomes an error entry in the batch, not an omission.
//!
//! ## Quick Start
//!
//! ```
//! use weightbridge::builder::{BuildConfig, BuildInputs, build_intents};
//! use weightbridge::snapshot::{PortfolioSnapshot, PositionSnapshot, PriceTable};
//! use weightbridge::types::PriceRef;
//!
//! let portfolio = PortfolioSnapshot::from_json(r#"{
//!     "rows": [ { "date": "2026-02-06", "symbol": "7203.T", "weight": 0.10 } ]
//! }"#).unwrap();
//! let positions = PositionSnapshot::from_json(r#"{
//!     "positions": [], "cash_available": 100000000, "margin_available": 0
//! }"#).unwrap();
//! let prices = PriceTable::from_json(r#"{
//!     "prices": [ { "symbol": "7203.T", "date": "2026-02-06", "last": 10050, "close": 10000 } ]
//! }"#).unwrap();
//!
//! let date = portfolio.latest_date();
//! let batch = build_intents(
//!     &BuildInputs {
//!         latest_date: date,
//!         targets: &portfolio.weights_for(date),
//!         positions: &positions,
//!         prices: &prices,
//!         ref_beta: portfolio.ref_beta_before(date),
//!     },
//!     &BuildConfig {
//!         aum: 100_000_000,
//!         leverage_ratio: 1.0,
//!         price_ref: PriceRef::Close,
//!         min_trade_notional: 20_000,
//!         max_gross_notional_ratio: 1.0,
//!         max_symbol_notional_ratio: 1.0,
//!         lot_sizes: Default::default(),
//!         hedge: None,
//!     },
//! );
//!
//! assert_eq!(batch.order_intents.len(), 1);
//! assert_eq!(batch.order_intents[0].qty, 1000);
//! ```

pub mod builder;
pub mod calendar;
pub mod error;
pub mod hash;
pub mod intent;
pub mod snapshot;
pub mod types;

pub use builder::{BuildConfig, BuildInputs, IntentBatch, build_intents};
pub use calendar::TradingCalendar;
pub use error::{Error, Result};
pub use intent::{HedgeIntent, IntentError, IntentErrorKind, OrderIntent, intent_hash, order_key};
pub use snapshot::{PortfolioSnapshot, PositionSnapshot, PriceTable};
pub use types::{Account, HedgeType, Mode, PriceRef, ProbeStatus, Reason, Side, Symbol};
