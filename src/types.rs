//! Core types: Symbol, Side, Account, PriceRef, Reason, Mode, ProbeStatus.
//!
//! All monetary amounts in this crate are `i64` in the currency's minor
//! unit. Weights and ratios are `f64`.

use std::fmt;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A ticker symbol, stored inline (max 16 bytes, ASCII, no `|`).
///
/// Fixed-size and `Copy` so symbol-keyed maps stay allocation-free and
/// hashing is deterministic. The `|` exclusion keeps symbols safe to embed
/// in the `order_key` preimage.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Symbol {
    bytes: [u8; Symbol::MAX_LEN],
    len: u8,
}

impl Symbol {
    /// Maximum symbol length in bytes.
    pub const MAX_LEN: usize = 16;

    /// Create a symbol, panicking on invalid input.
    ///
    /// # Panics
    ///
    /// Panics if `s` is empty, longer than [`Symbol::MAX_LEN`] bytes, or
    /// contains non-printable-ASCII or `|` characters. Use [`Symbol::try_new`]
    /// for untrusted input; snapshot loading validates before constructing.
    #[track_caller]
    pub fn new(s: &str) -> Symbol {
        match Self::try_new(s) {
            Some(sym) => sym,
            None => panic!("invalid symbol: {s:?}"),
        }
    }

    /// Create a symbol, returning `None` on invalid input.
    pub fn try_new(s: &str) -> Option<Symbol> {
        if s.is_empty() || s.len() > Self::MAX_LEN {
            return None;
        }
        if !s.bytes().all(|b| b.is_ascii_graphic() && b != b'|') {
            return None;
        }
        let mut bytes = [0u8; Self::MAX_LEN];
        bytes[..s.len()].copy_from_slice(s.as_bytes());
        Some(Symbol {
            bytes,
            len: s.len() as u8,
        })
    }

    /// The symbol as a string slice.
    pub fn as_str(&self) -> &str {
        std::str::from_utf8(&self.bytes[..self.len as usize])
            .expect("symbol bytes are constructor-validated ASCII")
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl fmt::Debug for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Symbol({:?})", self.as_str())
    }
}

impl Serialize for Symbol {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Symbol {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Symbol::try_new(&s).ok_or_else(|| D::Error::custom(format!("invalid symbol {s:?}")))
    }
}

/// Trade direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    /// Lowercase form used in the `order_key` preimage.
    pub fn as_key_str(&self) -> &'static str {
        match self {
            Side::Buy => "buy",
            Side::Sell => "sell",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Buy => write!(f, "BUY"),
            Side::Sell => write!(f, "SELL"),
        }
    }
}

/// Which account an intent trades in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Account {
    Cash,
    Margin,
}

impl fmt::Display for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Account::Cash => write!(f, "cash"),
            Account::Margin => write!(f, "margin"),
        }
    }
}

/// Which reference price sized an order. Fixed once per run, never mixed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PriceRef {
    Last,
    Close,
}

impl fmt::Display for PriceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PriceRef::Last => write!(f, "last"),
            PriceRef::Close => write!(f, "close"),
        }
    }
}

/// Why an intent exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Reason {
    Rebalance,
    Hedge,
    Stop,
}

/// Hedge instrument class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HedgeType {
    InverseEtf,
    ShortFuture,
    Cfd,
}

/// Execution mode. `DryRunPreSubmit` stops one step before the final order
/// confirmation; `LiveSubmit` goes through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Mode {
    #[serde(rename = "DRYRUN_PRE_SUBMIT")]
    DryRunPreSubmit,
    LiveSubmit,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::DryRunPreSubmit => write!(f, "DRYRUN_PRE_SUBMIT"),
            Mode::LiveSubmit => write!(f, "LIVE_SUBMIT"),
        }
    }
}

/// Outcome of a broker connectivity probe.
///
/// `Unknown` (timeout, ambiguous response) is distinct from `Fail`
/// (explicitly unreachable): `Unknown` arms the cooldown ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProbeStatus {
    Ok,
    Fail,
    Unknown,
}
