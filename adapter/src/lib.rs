//! Broker adapter boundary for weightbridge.
//!
//! An adapter owns every broker-specific detail (session, navigation, order
//! forms). The orchestrator treats it as opaque: it only relies on the
//! narrow `submit` contract — did the batch stop before confirmation, get
//! submitted, or fail — and on the connectivity probe.
//!
//! Implementations:
//!
//! - [`paper::PaperAdapter`]: drives every pre-submit step against nothing,
//!   the default for dry runs and the stand-in until a real UI adapter lands
//! - [`mock::MockAdapter`]: configurable behavior for tests

pub mod error;
pub mod mock;
pub mod paper;

pub use error::AdapterError;

use serde::{Deserialize, Serialize};
use weightbridge::{HedgeIntent, Mode, OrderIntent, ProbeStatus};

/// Terminal status of one `submit` call. All-or-nothing per batch: an
/// adapter never partially submits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdapterStatus {
    /// Every step up to — but not including — final confirmation ran.
    PreSubmitStopped,
    Submitted,
    Failed,
}

impl std::fmt::Display for AdapterStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AdapterStatus::PreSubmitStopped => write!(f, "pre_submit_stopped"),
            AdapterStatus::Submitted => write!(f, "submitted"),
            AdapterStatus::Failed => write!(f, "failed"),
        }
    }
}

/// What came back across the boundary.
///
/// `credentials_entered` is a boolean fact only; no credential value ever
/// crosses this boundary in either direction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdapterResult {
    pub status: AdapterStatus,
    pub credentials_entered: bool,
    pub details: serde_json::Value,
}

/// The batch handed to an adapter: everything it may act on, nothing it may
/// mutate.
pub struct SubmissionBatch<'a> {
    pub order_intents: &'a [OrderIntent],
    pub hedge_intents: &'a [HedgeIntent],
}

impl SubmissionBatch<'_> {
    /// Total number of orders in the batch.
    pub fn len(&self) -> usize {
        self.order_intents.len() + self.hedge_intents.len()
    }

    /// True when there is nothing to act on.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A broker integration.
pub trait Adapter {
    /// Short name for logs and the RunLog.
    fn name(&self) -> &str;

    /// Probe broker reachability. Must return [`ProbeStatus::Unknown`] on
    /// timeout or ambiguity — never hang, never panic.
    fn probe(&self) -> ProbeStatus;

    /// Act on a batch. In [`Mode::DryRunPreSubmit`] the adapter performs
    /// every step that risks nothing irreversible and stops exactly one step
    /// before the action that would place a real order.
    fn submit(
        &mut self,
        batch: &SubmissionBatch<'_>,
        mode: Mode,
    ) -> Result<AdapterResult, AdapterError>;
}
