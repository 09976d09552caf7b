//! Mock adapter for testing — implements [`Adapter`] with configurable
//! behavior.
//!
//! Use this in integration tests to simulate adapter outcomes without any
//! broker session.
//!
//! ```
//! use weightbridge::ProbeStatus;
//! use weightbridge_adapter::mock::MockAdapter;
//!
//! let adapter = MockAdapter::builder()
//!     .probe_status(ProbeStatus::Unknown)
//!     .build();
//! ```

use weightbridge::{Mode, ProbeStatus};

use crate::error::AdapterError;
use crate::{Adapter, AdapterResult, AdapterStatus, SubmissionBatch};

/// How the mock responds to `submit`.
#[derive(Clone, Debug)]
pub enum SubmitBehavior {
    /// Follow the mode: dry-run stops pre-submit, live submits.
    FollowMode,
    /// Return `Failed` with the given message in the details.
    Fail(String),
    /// Return an `AdapterError` instead of a result.
    Error(String),
}

/// A recorded `submit` call for assertion in tests.
#[derive(Clone, Debug)]
pub struct RecordedBatch {
    pub mode: Mode,
    pub order_keys: Vec<String>,
    pub hedge_symbols: Vec<String>,
}

/// Builder for [`MockAdapter`].
pub struct MockAdapterBuilder {
    probe_status: ProbeStatus,
    behavior: SubmitBehavior,
}

impl MockAdapterBuilder {
    pub fn probe_status(mut self, status: ProbeStatus) -> Self {
        self.probe_status = status;
        self
    }

    pub fn behavior(mut self, behavior: SubmitBehavior) -> Self {
        self.behavior = behavior;
        self
    }

    pub fn build(self) -> MockAdapter {
        MockAdapter {
            probe_status: self.probe_status,
            behavior: self.behavior,
            submissions: Vec::new(),
            probe_calls: std::cell::Cell::new(0),
        }
    }
}

/// A mock adapter that records submitted batches and returns configurable
/// responses.
pub struct MockAdapter {
    probe_status: ProbeStatus,
    behavior: SubmitBehavior,
    submissions: Vec<RecordedBatch>,
    probe_calls: std::cell::Cell<usize>,
}

impl MockAdapter {
    pub fn builder() -> MockAdapterBuilder {
        MockAdapterBuilder {
            probe_status: ProbeStatus::Ok,
            behavior: SubmitBehavior::FollowMode,
        }
    }

    /// Batches seen so far, in call order.
    pub fn submissions(&self) -> &[RecordedBatch] {
        &self.submissions
    }

    /// How many times `probe` was called.
    pub fn probe_calls(&self) -> usize {
        self.probe_calls.get()
    }
}

impl Adapter for MockAdapter {
    fn name(&self) -> &str {
        "mock"
    }

    fn probe(&self) -> ProbeStatus {
        self.probe_calls.set(self.probe_calls.get() + 1);
        self.probe_status
    }

    fn submit(
        &mut self,
        batch: &SubmissionBatch<'_>,
        mode: Mode,
    ) -> Result<AdapterResult, AdapterError> {
        self.submissions.push(RecordedBatch {
            mode,
            order_keys: batch
                .order_intents
                .iter()
                .map(|i| i.order_key.clone())
                .collect(),
            hedge_symbols: batch
                .hedge_intents
                .iter()
                .map(|h| h.symbol.as_str().to_string())
                .collect(),
        });

        match &self.behavior {
            SubmitBehavior::Error(msg) => Err(AdapterError::Submit(msg.clone())),
            SubmitBehavior::Fail(msg) => Ok(AdapterResult {
                status: AdapterStatus::Failed,
                credentials_entered: false,
                details: serde_json::json!({ "adapter": "mock", "error": msg }),
            }),
            SubmitBehavior::FollowMode => {
                let status = match mode {
                    Mode::DryRunPreSubmit => AdapterStatus::PreSubmitStopped,
                    Mode::LiveSubmit => AdapterStatus::Submitted,
                };
                Ok(AdapterResult {
                    status,
                    credentials_entered: true,
                    details: serde_json::json!({
                        "adapter": "mock",
                        "orders_reflected": batch.len(),
                    }),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn follow_mode_maps_statuses() {
        let mut adapter = MockAdapter::builder().build();
        let batch = SubmissionBatch {
            order_intents: &[],
            hedge_intents: &[],
        };
        let result = adapter.submit(&batch, Mode::DryRunPreSubmit).unwrap();
        assert_eq!(result.status, AdapterStatus::PreSubmitStopped);
        let result = adapter.submit(&batch, Mode::LiveSubmit).unwrap();
        assert_eq!(result.status, AdapterStatus::Submitted);
        assert_eq!(adapter.submissions().len(), 2);
    }

    #[test]
    fn fail_behavior() {
        let mut adapter = MockAdapter::builder()
            .behavior(SubmitBehavior::Fail("session expired".into()))
            .build();
        let batch = SubmissionBatch {
            order_intents: &[],
            hedge_intents: &[],
        };
        let result = adapter.submit(&batch, Mode::DryRunPreSubmit).unwrap();
        assert_eq!(result.status, AdapterStatus::Failed);
    }

    #[test]
    fn error_behavior() {
        let mut adapter = MockAdapter::builder()
            .behavior(SubmitBehavior::Error("socket closed".into()))
            .build();
        let batch = SubmissionBatch {
            order_intents: &[],
            hedge_intents: &[],
        };
        assert!(adapter.submit(&batch, Mode::DryRunPreSubmit).is_err());
    }
}
