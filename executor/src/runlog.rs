//! RunLog: the complete, immutable audit record of one invocation.
//!
//! One run = one file: `runs/run_<run_id>.json`. The recorder guarantees the
//! file is written on every exit path — normal completion, halt, error
//! return, or panic — via its `Drop` implementation. A RunLog is never
//! mutated after it is written.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDate, Utc};
use log::{error, info};
use serde::Serialize;
use serde_json::Value;
use weightbridge::{HedgeIntent, OrderIntent};
use weightbridge::types::Mode;
use weightbridge_precheck::{PolicyAction, PrecheckResult};

/// Orchestrator state machine positions, recorded for the audit trail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Started,
    SnapshotLoaded,
    IntentsBuilt,
    Prechecked,
    Halted,
    PreSubmitStopped,
    Submitted,
    Failed,
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            RunState::Started => "started",
            RunState::SnapshotLoaded => "snapshot_loaded",
            RunState::IntentsBuilt => "intents_built",
            RunState::Prechecked => "prechecked",
            RunState::Halted => "halted",
            RunState::PreSubmitStopped => "pre_submit_stopped",
            RunState::Submitted => "submitted",
            RunState::Failed => "failed",
        };
        write!(f, "{name}")
    }
}

/// One recorded failure.
#[derive(Debug, Clone, Serialize)]
pub struct RunError {
    pub step: String,
    pub detail: String,
}

/// The audit record. Serialized exactly once per invocation.
#[derive(Debug, Clone, Serialize)]
pub struct RunLog {
    pub run_id: String,
    pub created_at: DateTime<Utc>,
    pub mode: Mode,
    pub state: RunState,
    pub latest_date: Option<NaiveDate>,
    /// Fingerprint of the upstream weight snapshot.
    pub inputs_hash: Option<String>,
    /// Fingerprint of the full built intent set.
    pub intent_hash: Option<String>,
    pub order_intents: Vec<OrderIntent>,
    pub hedge_intents: Vec<HedgeIntent>,
    pub precheck_results: Vec<PrecheckResult>,
    pub run_action: Option<PolicyAction>,
    pub stop_reason: Option<String>,
    pub errors: Vec<RunError>,
    /// Capacity figures, reduction factors, adapter details and other
    /// structured observations, keyed by name.
    pub snapshots: serde_json::Map<String, Value>,
    /// Boolean facts only (e.g. credentials were entered). Never values.
    pub secrets_touched: bool,
}

impl RunLog {
    fn new(run_id: String, created_at: DateTime<Utc>, mode: Mode) -> Self {
        Self {
            run_id,
            created_at,
            mode,
            state: RunState::Started,
            latest_date: None,
            inputs_hash: None,
            intent_hash: None,
            order_intents: Vec::new(),
            hedge_intents: Vec::new(),
            precheck_results: Vec::new(),
            run_action: None,
            stop_reason: None,
            errors: Vec::new(),
            snapshots: serde_json::Map::new(),
            secrets_touched: false,
        }
    }
}

/// Scoped recorder: owns the RunLog for the duration of a run and flushes it
/// on release, whatever the exit path.
pub struct RunRecorder {
    pub log: RunLog,
    dir: PathBuf,
    written: bool,
}

impl RunRecorder {
    /// Create the recorder and eagerly create the output directory, so a
    /// permission problem surfaces before any work is done.
    pub fn new(
        dir: PathBuf,
        run_id: String,
        created_at: DateTime<Utc>,
        mode: Mode,
    ) -> std::io::Result<Self> {
        fs::create_dir_all(&dir)?;
        Ok(Self {
            log: RunLog::new(run_id, created_at, mode),
            dir,
            written: false,
        })
    }

    /// Advance the recorded state machine position.
    pub fn transition(&mut self, state: RunState) {
        info!("run {}: {} -> {}", self.log.run_id, self.log.state, state);
        self.log.state = state;
    }

    /// Record a failure; the run may still continue (partial degradation).
    pub fn record_error(&mut self, step: &str, detail: impl Into<String>) {
        self.log.errors.push(RunError {
            step: step.to_string(),
            detail: detail.into(),
        });
    }

    /// Record a named structured observation.
    pub fn record_snapshot(&mut self, name: &str, value: Value) {
        self.log.snapshots.insert(name.to_string(), value);
    }

    fn log_path(&self) -> PathBuf {
        self.dir.join(format!("run_{}.json", self.log.run_id))
    }

    fn write_log(&self) -> std::io::Result<PathBuf> {
        let path = self.log_path();
        let json = serde_json::to_string_pretty(&self.log)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        let mut file = fs::File::create(&path)?;
        file.write_all(json.as_bytes())?;
        file.write_all(b"\n")?;
        file.flush()?;
        Ok(path)
    }

    /// Flush the RunLog and the intent CSV export. Consumes the recorder so
    /// the log cannot be mutated afterward.
    pub fn finish(mut self) -> std::io::Result<PathBuf> {
        let path = self.write_log()?;
        self.written = true;

        // The CSV export is an audit convenience; its failure must not turn
        // a completed run into an error.
        match write_intent_csv(&self.log, &self.dir) {
            Ok(csv_path) => info!("order intents exported to {}", csv_path.display()),
            Err(e) => error!("order intent CSV export failed: {e}"),
        }

        Ok(path)
    }
}

impl Drop for RunRecorder {
    fn drop(&mut self) {
        if self.written {
            return;
        }
        // Reached only on panic or an early return that skipped finish();
        // the RunLog must survive either way.
        match self.write_log() {
            Ok(path) => error!(
                "run {} terminated unexpectedly; run log preserved at {}",
                self.log.run_id,
                path.display()
            ),
            Err(e) => error!("run {}: failed to preserve run log: {e}", self.log.run_id),
        }
    }
}

/// Tabular export of the run's order intents for audit diffing.
pub fn write_intent_csv(log: &RunLog, dir: &Path) -> std::io::Result<PathBuf> {
    let path = dir.join(format!("order_intent_{}.csv", log.run_id));
    let mut file = fs::File::create(&path)?;
    writeln!(
        file,
        "order_key,date,account,symbol,side,qty,notional,rounded_notional,price_ref,reason,prev_weight,target_weight,delta_weight,notes"
    )?;
    for intent in &log.order_intents {
        writeln!(
            file,
            "{},{},{},{},{},{},{},{},{},{:?},{:.6},{:.6},{:.6},{}",
            intent.order_key,
            intent.date,
            intent.account,
            intent.symbol,
            intent.side,
            intent.qty,
            intent.notional,
            intent.rounded_notional,
            intent.price_ref,
            intent.reason,
            intent.prev_weight,
            intent.target_weight,
            intent.delta_weight,
            intent.notes.replace(',', ";"),
        )?;
    }
    file.flush()?;
    Ok(path)
}
