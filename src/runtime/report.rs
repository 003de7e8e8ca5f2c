use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uase_core_types::{EngineError, RunId};

use perf_observe::PerfValues;

/// Lifecycle states of one scenario run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScenarioState {
    Init,
    Arming,
    Running,
    Recording,
    Cleanup,
    Terminal,
}

impl fmt::Display for ScenarioState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ScenarioState::Init => "init",
            ScenarioState::Arming => "arming",
            ScenarioState::Running => "running",
            ScenarioState::Recording => "recording",
            ScenarioState::Cleanup => "cleanup",
            ScenarioState::Terminal => "terminal",
        };
        f.write_str(s)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Passed,
    Failed,
}

/// What the harness gets back from one run.
#[derive(Debug)]
pub struct ScenarioReport {
    pub scenario: String,
    pub run_id: RunId,
    pub outcome: Outcome,
    /// Last state entered before cleanup.
    pub reached: ScenarioState,
    pub error: Option<EngineError>,
    /// Empty unless recording finished.
    pub metrics: PerfValues,
    pub results_file: Option<PathBuf>,
    pub artifacts: Vec<PathBuf>,
    /// Cleanup and teardown labels in execution order.
    pub cleanup: Vec<String>,
    /// Cleanup failures of a run that otherwise passed.
    pub cleanup_errors: Vec<EngineError>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl ScenarioReport {
    pub fn is_ok(&self) -> bool {
        self.outcome == Outcome::Passed
    }

    pub fn elapsed(&self) -> chrono::Duration {
        self.finished_at - self.started_at
    }

    pub fn into_result(self) -> Result<ScenarioReport, EngineError> {
        match self.error {
            Some(err) => Err(err),
            None => Ok(self),
        }
    }
}
