//! Paper adapter: the dry-run reference implementation.
//!
//! Walks the same step sequence a UI adapter would — login, account
//! selection, order-page navigation, form population, trade-password entry —
//! against nothing, and stops exactly one step before confirmation. Each
//! step is logged and echoed into the result details so a RunLog shows how
//! far the run reached.

use log::info;
use weightbridge::{Mode, ProbeStatus};

use crate::error::AdapterError;
use crate::{Adapter, AdapterResult, AdapterStatus, SubmissionBatch};

/// An adapter that performs every pre-submit step in memory.
pub struct PaperAdapter {
    probe_status: ProbeStatus,
}

impl PaperAdapter {
    pub fn new() -> Self {
        Self {
            probe_status: ProbeStatus::Ok,
        }
    }

    /// Override the probe outcome (used to rehearse degraded scenarios).
    pub fn with_probe_status(mut self, status: ProbeStatus) -> Self {
        self.probe_status = status;
        self
    }
}

impl Default for PaperAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl Adapter for PaperAdapter {
    fn name(&self) -> &str {
        "paper"
    }

    fn probe(&self) -> ProbeStatus {
        self.probe_status
    }

    fn submit(
        &mut self,
        batch: &SubmissionBatch<'_>,
        mode: Mode,
    ) -> Result<AdapterResult, AdapterError> {
        let mut steps: Vec<&'static str> = Vec::new();

        info!("paper adapter: login");
        steps.push("login");
        info!("paper adapter: select account");
        steps.push("select_account");
        info!("paper adapter: navigate to order page");
        steps.push("navigate_order_page");

        let mut orders_reflected = 0usize;
        for intent in batch.order_intents {
            info!(
                "paper adapter: fill order form {} {} {} x{}",
                intent.account, intent.side, intent.symbol, intent.qty
            );
            orders_reflected += 1;
        }
        for hedge in batch.hedge_intents {
            info!(
                "paper adapter: fill hedge form {} {} notional {}",
                hedge.side, hedge.symbol, hedge.target_notional
            );
            orders_reflected += 1;
        }
        steps.push("fill_order_forms");

        // The trade password is entered here in a real adapter. Only the
        // fact of entry is recorded; the value never reaches this crate.
        steps.push("enter_trade_password");

        match mode {
            Mode::DryRunPreSubmit => {
                info!("paper adapter: stopping before final confirmation");
                steps.push("stop_before_submit");
                Ok(AdapterResult {
                    status: AdapterStatus::PreSubmitStopped,
                    credentials_entered: true,
                    details: serde_json::json!({
                        "adapter": "paper",
                        "steps": steps,
                        "orders_reflected": orders_reflected,
                    }),
                })
            }
            Mode::LiveSubmit => {
                info!("paper adapter: confirming {} orders (paper)", batch.len());
                steps.push("confirm");
                Ok(AdapterResult {
                    status: AdapterStatus::Submitted,
                    credentials_entered: true,
                    details: serde_json::json!({
                        "adapter": "paper",
                        "steps": steps,
                        "orders_reflected": orders_reflected,
                    }),
                })
            }
        }
    }
}
