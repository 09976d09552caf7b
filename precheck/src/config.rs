//! Precheck policy configuration.
//!
//! Policies are data, not code: each one is a closed enum, so an
//! unrecognized value in the configuration file fails at load time instead
//! of silently defaulting.

use serde::{Deserialize, Serialize};

/// What to do when a quote is older than the staleness threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StalenessPolicy {
    Halt,
    Skip,
    UseLast,
}

/// What to do on a cash/margin capacity shortfall.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CapacityAction {
    Halt,
    Reduce,
    Skip,
}

/// What to do when connectivity is `unknown` (timeout / ambiguous).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UnknownAction {
    Skip,
    Halt,
}

/// How wide an `unknown` outcome's cooldown reaches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnknownScope {
    OrderKey,
    LatestDate,
}

/// Configuration for the precheck engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrecheckConfig {
    /// Quotes older than this many days are stale.
    #[serde(default = "default_stale_days")]
    pub stale_price_threshold_days: i64,
    #[serde(default = "default_staleness_policy")]
    pub staleness_policy: StalenessPolicy,
    #[serde(default = "default_capacity_action")]
    pub capacity_action: CapacityAction,
    #[serde(default = "default_unknown_action")]
    pub unknown_action: UnknownAction,
    #[serde(default = "default_unknown_scope")]
    pub unknown_scope: UnknownScope,
    /// Window during which a prior `unknown` suppresses re-probing.
    #[serde(default = "default_cooldown_secs")]
    pub cooldown_secs: u64,
    /// Cash kept untouched in the account, in minor units.
    #[serde(default = "default_cash_buffer")]
    pub cash_buffer: i64,
    /// Extra margin headroom: required margin is grossed up by this ratio.
    #[serde(default = "default_margin_buffer_ratio")]
    pub margin_buffer_ratio: f64,
}

fn default_stale_days() -> i64 {
    2
}
fn default_staleness_policy() -> StalenessPolicy {
    StalenessPolicy::Skip
}
fn default_capacity_action() -> CapacityAction {
    CapacityAction::Reduce
}
fn default_unknown_action() -> UnknownAction {
    UnknownAction::Skip
}
fn default_unknown_scope() -> UnknownScope {
    UnknownScope::OrderKey
}
fn default_cooldown_secs() -> u64 {
    1800
}
fn default_cash_buffer() -> i64 {
    200_000
}
fn default_margin_buffer_ratio() -> f64 {
    0.25
}

impl Default for PrecheckConfig {
    fn default() -> Self {
        Self {
            stale_price_threshold_days: default_stale_days(),
            staleness_policy: default_staleness_policy(),
            capacity_action: default_capacity_action(),
            unknown_action: default_unknown_action(),
            unknown_scope: default_unknown_scope(),
            cooldown_secs: default_cooldown_secs(),
            cash_buffer: default_cash_buffer(),
            margin_buffer_ratio: default_margin_buffer_ratio(),
        }
    }
}

impl PrecheckConfig {
    /// Validate the config. Returns `Err` with a description if any field is
    /// nonsensical.
    pub fn validate(&self) -> Result<(), String> {
        if self.stale_price_threshold_days < 0 {
            return Err(format!(
                "stale_price_threshold_days must be >= 0, got {}",
                self.stale_price_threshold_days
            ));
        }
        if self.cash_buffer < 0 {
            return Err(format!("cash_buffer must be >= 0, got {}", self.cash_buffer));
        }
        if !self.margin_buffer_ratio.is_finite() || self.margin_buffer_ratio < 0.0 {
            return Err(format!(
                "margin_buffer_ratio must be >= 0 and finite, got {}",
                self.margin_buffer_ratio
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(PrecheckConfig::default().validate().is_ok());
        assert_eq!(PrecheckConfig::default().cooldown_secs, 1800);
    }

    #[test]
    fn policy_strings_are_closed_sets() {
        let p: StalenessPolicy = serde_json::from_str("\"USE_LAST\"").unwrap();
        assert_eq!(p, StalenessPolicy::UseLast);
        assert!(serde_json::from_str::<StalenessPolicy>("\"use_last\"").is_err());
        assert!(serde_json::from_str::<UnknownAction>("\"RETRY\"").is_err());

        let s: UnknownScope = serde_json::from_str("\"latest_date\"").unwrap();
        assert_eq!(s, UnknownScope::LatestDate);
        assert!(serde_json::from_str::<UnknownScope>("\"everything\"").is_err());
    }

    #[test]
    fn validate_catches_negative_threshold() {
        let config = PrecheckConfig {
            stale_price_threshold_days: -1,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_catches_bad_margin_buffer() {
        let config = PrecheckConfig {
            margin_buffer_ratio: f64::NAN,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
