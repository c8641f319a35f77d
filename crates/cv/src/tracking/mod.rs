//! Experiment tracking
//!
//! Runs are grouped into named experiments. Each run takes scalar metrics
//! (optionally stepped), string params and artifact files, and ends with a
//! final status. Two backends share the [`Tracker`] trait: a local MLflow
//! file store and the MLflow REST API.

pub mod file;
pub mod rest;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::warn;

use crate::errors::Result;

pub use file::FileTracker;
pub use rest::RestTracker;

/// Longest param value the tracking server accepts
pub const MAX_PARAM_VALUE_LEN: usize = 6000;

/// Identifies a started run
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RunHandle {
    pub run_id: String,
    pub experiment_id: String,
    pub run_name: String,
    pub artifact_uri: String,
}

/// Final (or current) state of a run
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    Running,
    Scheduled,
    Finished,
    Failed,
    Killed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Running => "RUNNING",
            RunStatus::Scheduled => "SCHEDULED",
            RunStatus::Finished => "FINISHED",
            RunStatus::Failed => "FAILED",
            RunStatus::Killed => "KILLED",
        }
    }

    /// Numeric code stored in file-store run metadata
    pub fn code(&self) -> i32 {
        match self {
            RunStatus::Running => 1,
            RunStatus::Scheduled => 2,
            RunStatus::Finished => 3,
            RunStatus::Failed => 4,
            RunStatus::Killed => 5,
        }
    }

    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            1 => Some(RunStatus::Running),
            2 => Some(RunStatus::Scheduled),
            3 => Some(RunStatus::Finished),
            4 => Some(RunStatus::Failed),
            5 => Some(RunStatus::Killed),
            _ => None,
        }
    }
}

/// One metric observation
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MetricPoint {
    pub key: String,
    pub value: f64,
    /// Milliseconds since the Unix epoch
    pub timestamp: i64,
    pub step: i64,
}

impl MetricPoint {
    /// Metric at step 0, stamped now
    pub fn new(key: impl Into<String>, value: f64) -> Self {
        Self {
            key: key.into(),
            value,
            timestamp: now_millis(),
            step: 0,
        }
    }

    pub fn at_step(mut self, step: i64) -> Self {
        self.step = step;
        self
    }
}

/// Experiment tracking backend
pub trait Tracker {
    /// Start a run in `experiment`, creating the experiment if needed.
    fn start_run(&self, experiment: &str, run_name: &str) -> Result<RunHandle>;

    fn log_metrics(&self, run: &RunHandle, metrics: &[MetricPoint]) -> Result<()>;

    fn log_params(&self, run: &RunHandle, params: &BTreeMap<String, String>) -> Result<()>;

    /// Store a copy of the file at `path` under the run's artifacts.
    fn log_artifact(&self, run: &RunHandle, path: &Path) -> Result<()>;

    fn end_run(&self, run: &RunHandle, status: RunStatus) -> Result<()>;

    /// Single-param convenience wrapper
    fn log_param(&self, run: &RunHandle, key: &str, value: &str) -> Result<()> {
        let mut params = BTreeMap::new();
        params.insert(key.to_string(), value.to_string());
        self.log_params(run, &params)
    }
}

/// Run `f` inside a run that ends `FINISHED` on success and `FAILED` on error.
///
/// The error from `f` is returned as is; a failure to mark the run failed is
/// only logged.
pub fn with_run<T, F>(tracker: &dyn Tracker, experiment: &str, run_name: &str, f: F) -> Result<T>
where
    F: FnOnce(&RunHandle) -> Result<T>,
{
    let run = tracker.start_run(experiment, run_name)?;
    match f(&run) {
        Ok(value) => {
            tracker.end_run(&run, RunStatus::Finished)?;
            Ok(value)
        }
        Err(err) => {
            if let Err(end_err) = tracker.end_run(&run, RunStatus::Failed) {
                warn!("Failed to mark run {} as failed: {}", run.run_id, end_err);
            }
            Err(err)
        }
    }
}

/// Pick a backend from a tracking URI: `http(s)://` talks to a server,
/// anything else (optionally `file://`) is a local store directory.
pub fn from_uri(uri: &str) -> Result<Box<dyn Tracker>> {
    if uri.starts_with("http://") || uri.starts_with("https://") {
        Ok(Box::new(RestTracker::new(uri)?))
    } else {
        let path = uri.strip_prefix("file://").unwrap_or(uri);
        Ok(Box::new(FileTracker::new(path)?))
    }
}

/// Cut a param value down to [`MAX_PARAM_VALUE_LEN`] characters.
pub fn truncate_param(key: &str, value: &str) -> String {
    if value.chars().count() <= MAX_PARAM_VALUE_LEN {
        return value.to_string();
    }
    warn!(
        "Param {} is longer than {} characters, truncating",
        key, MAX_PARAM_VALUE_LEN
    );
    value.chars().take(MAX_PARAM_VALUE_LEN).collect()
}

pub(crate) fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
