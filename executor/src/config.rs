//! TOML configuration loading and validation.
//!
//! Every policy knob is a closed enum, so a typo in the config file is a
//! load-time error, never a silent default.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use rustc_hash::FxHashMap;
use serde::Deserialize;
use weightbridge::builder::{BuildConfig, HedgeConfig};
use weightbridge::types::{Mode, PriceRef, Symbol};
use weightbridge_precheck::PrecheckConfig;

use crate::error::{Error, Result};

/// Top-level configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub run: RunConfig,
    pub account: AccountConfig,
    #[serde(default)]
    pub limits: LimitsConfig,
    #[serde(default)]
    pub precheck: PrecheckConfig,
    #[serde(default)]
    pub hedge: Option<HedgeSection>,
    pub paths: PathsConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RunConfig {
    pub mode: Mode,
    /// Safety latch: while `true`, even `LIVE_SUBMIT` stops one step before
    /// confirmation. Flipping this to `false` is the explicit authorization
    /// for live orders.
    #[serde(default = "default_true")]
    pub stop_before_submit: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
pub struct AccountConfig {
    /// Assets under management in minor units.
    pub aum: i64,
    #[serde(default = "default_leverage")]
    pub leverage_ratio: f64,
    #[serde(default = "default_price_ref")]
    pub price_ref: PriceRef,
}

fn default_leverage() -> f64 {
    1.0
}
fn default_price_ref() -> PriceRef {
    PriceRef::Close
}

#[derive(Debug, Clone, Deserialize)]
pub struct LimitsConfig {
    #[serde(default = "default_min_trade")]
    pub min_trade_notional: i64,
    #[serde(default = "default_gross_ratio")]
    pub max_gross_notional_ratio: f64,
    #[serde(default = "default_symbol_ratio")]
    pub max_symbol_notional_ratio: f64,
    /// Tradable lot size per symbol; unlisted symbols trade single shares.
    #[serde(default)]
    pub lot_sizes: BTreeMap<String, i64>,
}

fn default_min_trade() -> i64 {
    20_000
}
fn default_gross_ratio() -> f64 {
    0.30
}
fn default_symbol_ratio() -> f64 {
    0.08
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            min_trade_notional: default_min_trade(),
            max_gross_notional_ratio: default_gross_ratio(),
            max_symbol_notional_ratio: default_symbol_ratio(),
            lot_sizes: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct HedgeSection {
    #[serde(default = "default_hedge_ratio")]
    pub ratio_cash: f64,
    #[serde(default = "default_hedge_ratio")]
    pub ratio_margin: f64,
    pub inverse_etf: String,
    pub cfd_instrument: String,
}

fn default_hedge_ratio() -> f64 {
    1.0
}

#[derive(Debug, Clone, Deserialize)]
pub struct PathsConfig {
    pub portfolio: PathBuf,
    pub positions: PathBuf,
    pub prices: PathBuf,
    pub calendar: PathBuf,
    /// RunLogs, the order ledger, and run-guard state live here.
    pub output_dir: PathBuf,
}

impl Config {
    /// Load config from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| Error::ConfigRead {
            path: path.to_path_buf(),
            source: e,
        })?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse from a TOML string (useful for testing).
    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate config invariants.
    fn validate(&self) -> Result<()> {
        if self.account.aum <= 0 {
            return Err(Error::Config("aum must be > 0".into()));
        }
        if !self.account.leverage_ratio.is_finite() || self.account.leverage_ratio < 1.0 {
            return Err(Error::Config("leverage_ratio must be >= 1.0".into()));
        }
        if self.limits.min_trade_notional < 0 {
            return Err(Error::Config("min_trade_notional must be >= 0".into()));
        }
        if !(0.0..=10.0).contains(&self.limits.max_gross_notional_ratio)
            || self.limits.max_gross_notional_ratio == 0.0
        {
            return Err(Error::Config(
                "max_gross_notional_ratio must be in (0, 10]".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.limits.max_symbol_notional_ratio)
            || self.limits.max_symbol_notional_ratio == 0.0
        {
            return Err(Error::Config(
                "max_symbol_notional_ratio must be in (0, 1]".into(),
            ));
        }
        for (symbol, lot) in &self.limits.lot_sizes {
            if Symbol::try_new(symbol).is_none() {
                return Err(Error::Config(format!("invalid lot symbol {symbol:?}")));
            }
            if *lot <= 0 {
                return Err(Error::Config(format!("lot size for {symbol} must be > 0")));
            }
        }
        if let Some(hedge) = &self.hedge {
            if Symbol::try_new(&hedge.inverse_etf).is_none() {
                return Err(Error::Config(format!(
                    "invalid hedge inverse_etf symbol {:?}",
                    hedge.inverse_etf
                )));
            }
            if Symbol::try_new(&hedge.cfd_instrument).is_none() {
                return Err(Error::Config(format!(
                    "invalid hedge cfd_instrument symbol {:?}",
                    hedge.cfd_instrument
                )));
            }
            if !hedge.ratio_cash.is_finite()
                || !hedge.ratio_margin.is_finite()
                || hedge.ratio_cash < 0.0
                || hedge.ratio_margin < 0.0
            {
                return Err(Error::Config("hedge ratios must be >= 0 and finite".into()));
            }
        }
        self.precheck
            .validate()
            .map_err(Error::Config)?;
        Ok(())
    }

    /// Map the sizing sections into the core builder's config.
    pub fn build_config(&self) -> BuildConfig {
        let mut lot_sizes = FxHashMap::default();
        for (symbol, lot) in &self.limits.lot_sizes {
            // Symbols were validated at load time.
            if let Some(sym) = Symbol::try_new(symbol) {
                lot_sizes.insert(sym, *lot);
            }
        }
        let hedge = self.hedge.as_ref().and_then(|h| {
            Some(HedgeConfig {
                ratio_cash: h.ratio_cash,
                ratio_margin: h.ratio_margin,
                inverse_etf: Symbol::try_new(&h.inverse_etf)?,
                cfd_instrument: Symbol::try_new(&h.cfd_instrument)?,
            })
        });
        BuildConfig {
            aum: self.account.aum,
            leverage_ratio: self.account.leverage_ratio,
            price_ref: self.account.price_ref,
            min_trade_notional: self.limits.min_trade_notional,
            max_gross_notional_ratio: self.limits.max_gross_notional_ratio,
            max_symbol_notional_ratio: self.limits.max_symbol_notional_ratio,
            lot_sizes,
            hedge,
        }
    }

    /// The mode actually executed: the safety latch wins over `mode`.
    pub fn effective_mode(&self) -> Mode {
        if self.run.stop_before_submit {
            Mode::DryRunPreSubmit
        } else {
            self.run.mode
        }
    }

    /// Directory for per-run RunLog files.
    pub fn runlog_dir(&self) -> PathBuf {
        self.paths.output_dir.join("runs")
    }

    /// Path to the append-only order-event ledger.
    pub fn ledger_path(&self) -> PathBuf {
        self.paths.output_dir.join("order_events.jsonl")
    }

    /// Path to the run-guard state file.
    pub fn state_path(&self) -> PathBuf {
        self.paths.output_dir.join("state.json")
    }
}
