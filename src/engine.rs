//! Engine assembly
//!
//! [`EngineBuilder`] wires the session collaborators into one [`Engine`],
//! which runs descriptors one at a time against that session.

use std::sync::Arc;

use tracing::{info, instrument};
use uase_core_types::EngineError;

use action_flow::UiContext;
use action_locator::{Evaluator, Locator};
use action_primitives::{DriverSet, ExecCtx, InputSubsystem};
use perf_observe::{HistogramSource, Recorder};

use crate::config::EngineConfig;
use crate::descriptor::{check_preconditions, validate, Descriptor, Interpreter, Timings};
use crate::ports::{ShellPort, TelemetryPort};
use crate::runtime::{ScenarioReport, ScenarioRuntime};
use crate::session::Session;

#[derive(Default)]
pub struct EngineBuilder {
    config: EngineConfig,
    evaluator: Option<Arc<dyn Evaluator>>,
    input: Option<Arc<dyn InputSubsystem>>,
    shell: Option<Arc<dyn ShellPort>>,
    histograms: Option<Arc<dyn HistogramSource>>,
    telemetry: Option<Arc<dyn TelemetryPort>>,
}

impl EngineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn evaluator(mut self, evaluator: Arc<dyn Evaluator>) -> Self {
        self.evaluator = Some(evaluator);
        self
    }

    pub fn input(mut self, input: Arc<dyn InputSubsystem>) -> Self {
        self.input = Some(input);
        self
    }

    pub fn shell(mut self, shell: Arc<dyn ShellPort>) -> Self {
        self.shell = Some(shell);
        self
    }

    pub fn histograms(mut self, source: Arc<dyn HistogramSource>) -> Self {
        self.histograms = Some(source);
        self
    }

    pub fn telemetry(mut self, telemetry: Arc<dyn TelemetryPort>) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    /// Fails with `Precondition` when the evaluator, input subsystem or shell is missing.
    pub fn build(self) -> Result<Engine, EngineError> {
        let evaluator = self
            .evaluator
            .ok_or_else(|| EngineError::precondition("engine needs an evaluator"))?;
        let input = self
            .input
            .ok_or_else(|| EngineError::precondition("engine needs an input subsystem"))?;
        let shell = self
            .shell
            .ok_or_else(|| EngineError::precondition("engine needs a shell port"))?;

        let ui = UiContext::new(Locator::new(evaluator), DriverSet::new());
        let session = Session::new(
            ui,
            shell,
            input,
            self.config.keyboard_layout,
            self.config.swipe_duration(),
        );
        Ok(Engine {
            config: self.config,
            session: Arc::new(session),
            histograms: self.histograms,
            telemetry: self.telemetry,
        })
    }
}

pub struct Engine {
    config: EngineConfig,
    session: Arc<Session>,
    histograms: Option<Arc<dyn HistogramSource>>,
    telemetry: Option<Arc<dyn TelemetryPort>>,
}

impl Engine {
    pub fn builder() -> EngineBuilder {
        EngineBuilder::new()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    /// Runtime configured with `timings` and the engine's sinks.
    pub fn runtime(&self, timings: &Timings) -> ScenarioRuntime {
        let mut runtime = ScenarioRuntime::new(self.config.artifact_dir.clone())
            .with_cleanup_reserve(timings.cleanup_reserve)
            .with_results_dir(self.config.results_dir.clone());
        if let Some(telemetry) = &self.telemetry {
            runtime = runtime.with_telemetry(telemetry.clone());
        }
        if let Some(source) = &self.histograms {
            runtime = runtime
                .with_recorder(Recorder::new(source.clone()).with_poll_interval(timings.poll_interval));
        }
        runtime
    }

    /// Runs one descriptor.
    ///
    /// Invalid descriptors and unmet preconditions are returned as errors
    /// before any resource is acquired. Everything after that ends up in the
    /// report, whose `error` carries the single top-level failure.
    #[instrument(skip_all, fields(scenario = %descriptor.name))]
    pub async fn run(
        &self,
        ctx: &ExecCtx,
        descriptor: &Descriptor,
    ) -> Result<ScenarioReport, EngineError> {
        validate(descriptor)?;
        check_preconditions(ctx, self.session.shell().as_ref(), descriptor).await?;

        let timings = Timings::resolve(&self.config, &descriptor.options);
        let scenario = Interpreter::new(self.session.clone(), timings).scenario(descriptor)?;
        let runtime = self.runtime(&timings);

        self.session.set_mode(descriptor.options.ui_mode);
        let report = runtime.run(ctx, scenario).await;
        self.session.set_mode(None);

        info!(
            outcome = ?report.outcome,
            artifacts = report.artifacts.len(),
            elapsed_ms = report.elapsed().num_milliseconds(),
            "descriptor finished"
        );
        Ok(report)
    }
}
