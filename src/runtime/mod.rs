//! Scenario runtime
//!
//! Runs one scenario through `Init -> Arming -> Running -> Recording ->
//! Cleanup -> Terminal`:
//! - resources are acquired in order and each pushes its release closure
//!   onto the cleanup stack the moment it is acquired
//! - steps and recording run under the harness deadline shortened by the
//!   cleanup reserve
//! - failure telemetry is captured once, before anything is released
//! - teardown steps and the cleanup stack always run, under a context derived
//!   from the unshortened harness context

mod cleanup;
mod report;
mod telemetry;

pub use cleanup::*;
pub use report::*;
pub use telemetry::*;

use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::FutureExt;
use tracing::{debug, error, info, instrument, warn};
use uase_core_types::{EngineError, RunId};

use action_flow::Action;
use action_primitives::ExecCtx;
use perf_observe::{store_mean, MetricConfig, PerfValues, Recorder};

use crate::config::MIN_CLEANUP_RESERVE;
use crate::ports::TelemetryPort;

/// Label under which recording failures are reported.
pub const RECORDING_STEP: &str = "recording";

pub struct Step {
    pub label: String,
    pub action: Action,
}

impl Step {
    pub fn new(label: impl Into<String>, action: Action) -> Self {
        Self {
            label: label.into(),
            action,
        }
    }
}

/// Histograms sampled around `action` after the steps succeeded.
pub struct Recording {
    pub action: Action,
    pub metrics: Vec<MetricConfig>,
    /// `Some` waits for every histogram to get a sample.
    pub wait: Option<Duration>,
}

pub struct Scenario {
    pub name: String,
    pub resources: Vec<Arc<dyn Resource>>,
    pub steps: Vec<Step>,
    pub recording: Option<Recording>,
    pub teardown: Vec<Step>,
}

impl Scenario {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            resources: Vec::new(),
            steps: Vec::new(),
            recording: None,
            teardown: Vec::new(),
        }
    }

    pub fn resource(mut self, resource: Arc<dyn Resource>) -> Self {
        self.resources.push(resource);
        self
    }

    pub fn step(mut self, label: impl Into<String>, action: Action) -> Self {
        self.steps.push(Step::new(label, action));
        self
    }

    pub fn recording(mut self, recording: Recording) -> Self {
        self.recording = Some(recording);
        self
    }

    pub fn teardown(mut self, label: impl Into<String>, action: Action) -> Self {
        self.teardown.push(Step::new(label, action));
        self
    }
}

struct Failure {
    error: EngineError,
    state: ScenarioState,
    step: String,
}

#[derive(Clone)]
pub struct ScenarioRuntime {
    cleanup_reserve: Duration,
    artifact_dir: PathBuf,
    results_dir: Option<PathBuf>,
    telemetry: Option<Arc<dyn TelemetryPort>>,
    recorder: Option<Recorder>,
}

impl ScenarioRuntime {
    pub fn new(artifact_dir: impl Into<PathBuf>) -> Self {
        Self {
            cleanup_reserve: Duration::from_secs(10),
            artifact_dir: artifact_dir.into(),
            results_dir: None,
            telemetry: None,
            recorder: None,
        }
    }

    /// Clamped to at least five seconds.
    pub fn with_cleanup_reserve(mut self, reserve: Duration) -> Self {
        self.cleanup_reserve = reserve.max(MIN_CLEANUP_RESERVE);
        self
    }

    pub fn with_results_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.results_dir = Some(dir.into());
        self
    }

    pub fn with_telemetry(mut self, telemetry: Arc<dyn TelemetryPort>) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    pub fn with_recorder(mut self, recorder: Recorder) -> Self {
        self.recorder = Some(recorder);
        self
    }

    pub fn cleanup_reserve(&self) -> Duration {
        self.cleanup_reserve
    }

    #[instrument(skip_all, fields(scenario = %scenario.name))]
    pub async fn run(&self, parent: &ExecCtx, scenario: Scenario) -> ScenarioReport {
        let started_at = Utc::now();
        let run_id = RunId::new();
        let name = scenario.name.clone();
        info!(run_id = %run_id, "scenario started");

        let ctx = parent.shorten(self.cleanup_reserve);
        let mut stack = CleanupStack::new();
        let mut failure: Option<Failure> = None;
        let mut state = ScenarioState::Init;
        let mut metrics = PerfValues::new();
        let mut results_file = None;

        state = self.enter(state, ScenarioState::Arming);
        for resource in &scenario.resources {
            let label = resource.label();
            match guarded(resource.acquire(&ctx)).await {
                Ok(cleanup) => stack.push(cleanup),
                Err(err) => {
                    failure = Some(Failure {
                        error: err.with_label(format!("acquire {}", label)),
                        state,
                        step: label,
                    });
                    break;
                }
            }
        }

        if failure.is_none() {
            state = self.enter(state, ScenarioState::Running);
            for step in &scenario.steps {
                if let Err(err) = run_step(&ctx, step).await {
                    failure = Some(Failure {
                        error: err,
                        state,
                        step: step.label.clone(),
                    });
                    break;
                }
            }
        }

        match (&scenario.recording, failure.is_none()) {
            (Some(recording), true) => {
                state = self.enter(state, ScenarioState::Recording);
                match self.record(&ctx, &name, recording).await {
                    Ok((values, file)) => {
                        metrics = values;
                        results_file = file;
                    }
                    Err(err) => {
                        failure = Some(Failure {
                            error: err.with_label(RECORDING_STEP),
                            state,
                            step: RECORDING_STEP.to_string(),
                        });
                    }
                }
            }
            _ => {}
        }
        let reached = state;

        let cleanup_ctx = parent.cleanup_ctx(self.cleanup_reserve);
        let mut artifacts = Vec::new();
        if let Some(failure) = &failure {
            self.report_failure(&cleanup_ctx, &name, failure, &mut artifacts)
                .await;
        }

        state = self.enter(state, ScenarioState::Cleanup);
        let mut cleanup_labels = Vec::new();
        let mut cleanup_errors = Vec::new();
        for step in &scenario.teardown {
            let label = format!("teardown: {}", step.label);
            if let Err(err) = run_step(&cleanup_ctx.cleanup_ctx(CLEANUP_STEP_FLOOR), step).await {
                warn!(step = %step.label, error = %err, "teardown step failed");
                cleanup_errors.push(err.with_label("teardown"));
            }
            cleanup_labels.push(label);
        }
        let drained = stack.drain(&cleanup_ctx).await;
        cleanup_labels.extend(drained.ran);
        cleanup_errors.extend(drained.errors);
        self.enter(state, ScenarioState::Terminal);

        let error = failure.map(|failure| {
            let mut err = failure.error.with_scenario(name.clone());
            for suppressed in cleanup_errors.drain(..) {
                err = err.with_suppressed(suppressed);
            }
            err
        });
        let outcome = if error.is_some() {
            Outcome::Failed
        } else {
            Outcome::Passed
        };
        info!(run_id = %run_id, ?outcome, metrics = metrics.len(), cleanup = cleanup_labels.len(), "scenario finished");

        ScenarioReport {
            scenario: name,
            run_id,
            outcome,
            reached,
            error,
            metrics,
            results_file,
            artifacts,
            cleanup: cleanup_labels,
            cleanup_errors,
            started_at,
            finished_at: Utc::now(),
        }
    }

    fn enter(&self, from: ScenarioState, to: ScenarioState) -> ScenarioState {
        debug!(from = %from, to = %to, "scenario state");
        to
    }

    async fn record(
        &self,
        ctx: &ExecCtx,
        scenario: &str,
        recording: &Recording,
    ) -> Result<(PerfValues, Option<PathBuf>), EngineError> {
        let recorder = self
            .recorder
            .as_ref()
            .ok_or_else(|| EngineError::precondition("no histogram source configured"))?;
        let names: Vec<String> = recording
            .metrics
            .iter()
            .map(|m| m.histogram.clone())
            .collect();
        let histograms = guarded(async {
            match recording.wait {
                Some(wait) => {
                    recorder
                        .run_and_wait_all(ctx, &recording.action, wait, &names)
                        .await
                }
                None => recorder.run(ctx, &recording.action, &names).await,
            }
        })
        .await?;

        let values = PerfValues::new();
        for (histogram, config) in histograms.iter().zip(&recording.metrics) {
            store_mean(&values, histogram, config)?;
        }
        let file = match &self.results_dir {
            Some(dir) => Some(values.save(&dir.join(artifact_name(scenario)))?),
            None => None,
        };
        Ok((values, file))
    }

    async fn report_failure(
        &self,
        ctx: &ExecCtx,
        scenario: &str,
        failure: &Failure,
        artifacts: &mut Vec<PathBuf>,
    ) {
        let err = &failure.error;
        if err.is(uase_core_types::ErrorKind::Cancelled) {
            warn!(scenario, step = %failure.step, "scenario cancelled");
            return;
        }
        error!(
            scenario,
            step = %failure.step,
            kind = %err.kind(),
            finder = err.finder().unwrap_or("-"),
            state = %failure.state,
            error = %err,
            "scenario failed"
        );
        if failure.state == ScenarioState::Arming {
            return;
        }
        if let Some(telemetry) = &self.telemetry {
            artifacts.extend(
                capture_failure(
                    ctx,
                    telemetry.as_ref(),
                    &self.artifact_dir,
                    scenario,
                    &failure.step,
                )
                .await,
            );
        }
    }
}

/// Runs a step under `ctx`, labelling its failure with the step name.
///
/// An action already labelled with the step name is not labelled twice. An
/// expired deadline does not skip the step; its own waits get one attempt.
async fn run_step(ctx: &ExecCtx, step: &Step) -> Result<(), EngineError> {
    if ctx.is_cancelled() {
        return Err(EngineError::cancelled("context cancelled").with_label(step.label.clone()));
    }
    debug!(step = %step.label, "running step");
    let self_labelled = step.action.label() == Some(step.label.as_str());
    guarded(step.action.run(ctx)).await.map_err(|err| {
        if self_labelled {
            err
        } else {
            err.with_label(step.label.clone())
        }
    })
}

/// Turns a panic inside `fut` into an `Assertion` error.
async fn guarded<T, F>(fut: F) -> Result<T, EngineError>
where
    F: std::future::Future<Output = Result<T, EngineError>>,
{
    match AssertUnwindSafe(fut).catch_unwind().await {
        Ok(result) => result,
        Err(payload) => Err(panic_error(payload)),
    }
}
