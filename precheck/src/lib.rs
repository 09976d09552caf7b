//! Fail-safe pre-trade checks for weightbridge.
//!
//! Runs an ordered battery of checks (trading day, price freshness,
//! cash/margin capacity, connectivity) and derives a single run-level
//! policy decision. Pure given its inputs, so policies are unit-testable
//! without exception harnesses or network access.

pub mod checks;
pub mod config;
pub mod report;

pub use config::{
    CapacityAction, PrecheckConfig, StalenessPolicy, UnknownAction, UnknownScope,
};
pub use report::{CheckCategory, CheckStatus, PolicyAction, PrecheckReport, PrecheckResult};

use chrono::NaiveDate;
use weightbridge::{ProbeStatus, Symbol, TradingCalendar};

/// Connectivity cooldown facts, read from the ledger by the orchestrator.
#[derive(Debug, Clone, Default)]
pub struct CooldownState {
    /// A whole-day `unknown` is still inside the cooldown window.
    pub day_in_cooldown: bool,
    /// Order keys with an `unknown` event inside the cooldown window.
    pub keys_in_cooldown: Vec<String>,
}

impl CooldownState {
    /// Whether any cooldown is active under the given scope.
    pub fn is_active(&self, scope: UnknownScope) -> bool {
        match scope {
            UnknownScope::LatestDate => self.day_in_cooldown,
            UnknownScope::OrderKey => !self.keys_in_cooldown.is_empty(),
        }
    }
}

/// Everything the engine reads. Gathered by the orchestrator so the engine
/// itself performs no I/O and no probing.
pub struct PrecheckInput<'a> {
    pub latest_date: NaiveDate,
    /// `None` when the calendar could not be loaded — itself a halt.
    pub calendar: Option<&'a TradingCalendar>,
    /// The latest_date of the previous completed run, for the advance guard.
    pub last_executed_latest_date: Option<NaiveDate>,
    /// Quote observation date per batch symbol.
    pub price_asof: Vec<(Symbol, Option<NaiveDate>)>,
    /// Buy-side notional that must clear cash, in minor units.
    pub required_cash: i64,
    pub available_cash: i64,
    /// Required margin before buffer gross-up; `None` for unlevered runs.
    pub required_margin: Option<i64>,
    pub available_margin: i64,
    /// Probe outcome; `None` when a cooldown suppressed the probe.
    pub probe: Option<ProbeStatus>,
    pub cooldown: CooldownState,
}

/// Pre-trade check engine.
#[derive(Debug, Clone)]
pub struct PrecheckEngine {
    config: PrecheckConfig,
}

impl PrecheckEngine {
    /// Create a new engine with the given config.
    ///
    /// # Panics
    ///
    /// Panics if `config` fails validation (e.g., NaN ratios). This is
    /// intentional — fail-fast at construction, not at check time.
    #[track_caller]
    pub fn new(config: PrecheckConfig) -> Self {
        if let Err(msg) = config.validate() {
            panic!("invalid PrecheckConfig: {msg}");
        }
        Self { config }
    }

    /// Access the current config.
    pub fn config(&self) -> &PrecheckConfig {
        &self.config
    }

    /// Run every check and aggregate.
    ///
    /// Order matters for readability of the report, but not for the
    /// aggregate: `run_action` is the precedence-maximum over all results,
    /// so a halt anywhere decides the run regardless of position.
    pub fn run(&self, input: &PrecheckInput<'_>) -> PrecheckReport {
        let mut results = Vec::new();

        results.push(checks::check_trading_day(
            input.latest_date,
            input.calendar,
            input.last_executed_latest_date,
        ));

        let (freshness, stale_symbols) =
            checks::check_price_freshness(input.latest_date, &input.price_asof, &self.config);
        results.push(freshness);

        let (cash, cash_scale) =
            checks::check_cash_capacity(input.required_cash, input.available_cash, &self.config);
        results.push(cash);

        let mut margin_scale = None;
        if let Some(required_margin) = input.required_margin {
            let (margin, scale) = checks::check_margin_capacity(
                required_margin,
                input.available_margin,
                &self.config,
            );
            margin_scale = scale;
            results.push(margin);
        }

        let cooldown_active = input.cooldown.is_active(self.config.unknown_scope);
        let connectivity =
            checks::check_connectivity(input.probe, cooldown_active, &self.config);
        let connectivity_unknown = connectivity.status == CheckStatus::Unknown;
        results.push(connectivity);

        // When both cash and margin want a reduction, the tighter factor
        // satisfies both.
        let reduce_scale = match (cash_scale, margin_scale) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };

        let day_skipped = connectivity_unknown
            && checks::unknown_skips_day(&self.config)
            && self.config.unknown_action == UnknownAction::Skip;

        PrecheckReport {
            results,
            stale_symbols,
            cooldown_keys: input.cooldown.keys_in_cooldown.clone(),
            day_skipped,
            reduce_scale,
        }
    }
}
