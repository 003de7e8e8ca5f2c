//! Turns a [`Descriptor`] into a runnable [`Scenario`].

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};
use uase_core_types::EngineError;

use action_flow::{
    combine, if_success_then, repeat, retry, retry_until, sleep, Action, UiContext,
};
use action_locator::Finder;
use action_primitives::{ExecCtx, PollOptions};
use perf_observe::MetricConfig;

use super::{validate, Descriptor, DescriptorError, ResourceSpec, ScenarioOptions, StepOp, StepSpec};
use crate::config::EngineConfig;
use crate::ports::ShellPort;
use crate::resources::{
    BrowserWindow, KeyboardResource, LandscapeRotation, MouseResource, TouchscreenResource,
    TrackpadResource, UiModeResource,
};
use crate::runtime::{Recording, Resource, Scenario};
use crate::session::Session;
use crate::ui_mode::UiActionHandler;

/// Pause between two wheel notches when a scroll step does not name one.
pub const DEFAULT_WHEEL_INTERVAL: Duration = Duration::from_millis(50);

/// Label of the action recorded in the metrics window.
pub const METRICS_ACTION: &str = "metrics action";

/// Fails with `Precondition` unless the session satisfies the descriptor.
pub async fn check_preconditions(
    ctx: &ExecCtx,
    shell: &dyn ShellPort,
    descriptor: &Descriptor,
) -> Result<(), EngineError> {
    let info = ctx.run(shell.session_info(ctx)).await?;
    let unmet = descriptor.preconditions.unmet(&info);
    if unmet.is_empty() {
        return Ok(());
    }
    info!(scenario = %descriptor.name, unmet = unmet.len(), "preconditions not met");
    Err(DescriptorError::Unmet {
        scenario: descriptor.name.clone(),
        reason: unmet.join(", "),
    }
    .into())
}

/// Timing values after the descriptor options were applied.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Timings {
    pub poll_interval: Duration,
    pub wait_timeout: Duration,
    pub cleanup_reserve: Duration,
    pub metric_wait: Duration,
    pub swipe_duration: Duration,
    pub long_press: Duration,
}

impl Timings {
    pub fn resolve(config: &EngineConfig, options: &ScenarioOptions) -> Self {
        let pick = |option: Option<super::HumanDuration>, default: Duration| {
            option.map(|d| d.get()).unwrap_or(default)
        };
        Self {
            poll_interval: pick(options.poll_interval, config.poll_interval()),
            wait_timeout: pick(options.wait_timeout, config.wait_timeout()),
            cleanup_reserve: pick(options.cleanup_reserve, config.cleanup_reserve()),
            metric_wait: pick(options.metric_wait, config.metric_wait()),
            swipe_duration: config.swipe_duration(),
            long_press: config.long_press(),
        }
    }

    pub fn poll_options(&self) -> PollOptions {
        PollOptions::with_timeout(self.wait_timeout).interval(self.poll_interval)
    }
}

/// Builds actions for one descriptor against a session.
pub struct Interpreter {
    session: Arc<Session>,
    ui: UiContext,
    timings: Timings,
}

impl Interpreter {
    pub fn new(session: Arc<Session>, timings: Timings) -> Self {
        let ui = session
            .ui()
            .with_timeout(timings.wait_timeout)
            .with_interval(timings.poll_interval);
        Self {
            session,
            ui,
            timings,
        }
    }

    pub fn timings(&self) -> Timings {
        self.timings
    }

    /// Validates `descriptor` and builds its scenario. Nothing touches the session yet.
    pub fn scenario(&self, descriptor: &Descriptor) -> Result<Scenario, DescriptorError> {
        validate(descriptor)?;

        let mut scenario = Scenario::new(descriptor.name.clone());
        for spec in &descriptor.resources {
            scenario = scenario.resource(self.resource(spec));
        }
        for step in &descriptor.steps {
            scenario = scenario.step(step.name.clone(), self.action(step));
        }
        for step in &descriptor.teardown {
            scenario = scenario.teardown(step.name.clone(), self.action(step));
        }
        if let Some(metrics) = &descriptor.metrics {
            let configs = metrics
                .histograms
                .iter()
                .map(|h| h.metric_config())
                .collect::<Result<Vec<MetricConfig>, String>>()
                .map_err(|reason| descriptor.invalid(reason))?;
            let action = if metrics.action.is_empty() {
                Action::noop()
            } else {
                combine(
                    METRICS_ACTION,
                    metrics.action.iter().map(|step| self.labelled(step)),
                )
            };
            let wait = metrics.wait_for_samples.then(|| {
                metrics
                    .wait
                    .map(|d| d.get())
                    .unwrap_or(self.timings.metric_wait)
            });
            scenario = scenario.recording(Recording {
                action,
                metrics: configs,
                wait,
            });
        }
        debug!(
            scenario = %descriptor.name,
            resources = scenario.resources.len(),
            steps = scenario.steps.len(),
            "descriptor interpreted"
        );
        Ok(scenario)
    }

    pub fn resource(&self, spec: &ResourceSpec) -> Arc<dyn Resource> {
        let session = self.session.clone();
        let poll = self.timings.poll_options();
        match spec {
            ResourceSpec::Keyboard => Arc::new(KeyboardResource::new(session)),
            ResourceSpec::Mouse => Arc::new(MouseResource::new(session)),
            ResourceSpec::Touchscreen => Arc::new(TouchscreenResource::new(session)),
            ResourceSpec::Trackpad => Arc::new(TrackpadResource::new(session)),
            ResourceSpec::LandscapeRotation => Arc::new(LandscapeRotation::new(session, poll)),
            ResourceSpec::UiMode { mode } => Arc::new(UiModeResource::new(session, *mode, poll)),
            ResourceSpec::BrowserWindow { url } => Arc::new(BrowserWindow::new(session, url.clone())),
        }
    }

    /// The step's action labelled with its name.
    pub fn labelled(&self, step: &StepSpec) -> Action {
        let action = self.action(step);
        if action.label() == Some(step.name.as_str()) {
            action
        } else {
            action.with_label(step.name.clone())
        }
    }

    /// The step's action; nested steps are labelled, the step itself is not
    /// unless it is a sequence.
    pub fn action(&self, step: &StepSpec) -> Action {
        match &step.op {
            StepOp::WaitUntilExists { finder, timeout } => self
                .ui_for(*timeout)
                .wait_until_exists(finder.clone()),
            StepOp::WaitUntilGone { finder, timeout } => {
                self.ui_for(*timeout).wait_until_gone(finder.clone())
            }
            StepOp::WaitForLocation { finder, timeout } => self
                .ui_for(*timeout)
                .wait_for_location(finder.clone()),
            StepOp::EnsureGoneFor { finder, duration } => {
                self.ui.ensure_gone_for(finder.clone(), duration.get())
            }
            StepOp::Click { finder } => {
                let finder = finder.clone();
                self.with_handler(move |h| h.click(finder.clone()))
            }
            StepOp::LeftClick { finder } => self.ui.left_click(finder.clone()),
            StepOp::RightClick { finder } => self.ui.right_click(finder.clone()),
            StepOp::DoubleClick { finder } => self.ui.double_click(finder.clone()),
            StepOp::FocusAndWait { finder } => self.ui.focus_and_wait(finder.clone()),
            StepOp::Accel { keys } => self.ui.accel(keys.clone()),
            StepOp::Type { text } => self.ui.type_text(text.clone()),
            StepOp::PressAndHold { keys, hold } => {
                self.ui.accel_press_and_hold(keys.clone(), hold.get())
            }
            StepOp::Swipe { from, to, duration } => {
                let (from, to) = (*from, *to);
                let duration = duration.map(|d| d.get()).unwrap_or(self.timings.swipe_duration);
                let drivers = self.session.drivers().clone();
                Action::new(move |ctx| {
                    let drivers = drivers.clone();
                    async move { drivers.touch()?.swipe(&ctx, from, to, duration).await }
                })
            }
            StepOp::LongPress { at, hold } => {
                let at = *at;
                let hold = hold.map(|d| d.get()).unwrap_or(self.timings.long_press);
                let drivers = self.session.drivers().clone();
                Action::new(move |ctx| {
                    let drivers = drivers.clone();
                    async move { drivers.touch()?.long_press(&ctx, at, hold).await }
                })
            }
            StepOp::Scroll { ticks, interval } => {
                let ticks = *ticks;
                let interval = interval.map(|d| d.get()).unwrap_or(DEFAULT_WHEEL_INTERVAL);
                let drivers = self.session.drivers().clone();
                Action::new(move |ctx| {
                    let drivers = drivers.clone();
                    async move { drivers.mouse()?.wheel(&ctx, ticks, interval).await }
                })
            }
            StepOp::TrackpadScroll { dx, dy, duration } => {
                let (dx, dy) = (*dx, *dy);
                let duration = duration.map(|d| d.get()).unwrap_or(self.timings.swipe_duration);
                let drivers = self.session.drivers().clone();
                Action::new(move |ctx| {
                    let drivers = drivers.clone();
                    async move { drivers.trackpad()?.scroll(&ctx, dx, dy, duration).await }
                })
            }
            StepOp::TrackpadSwipe {
                direction,
                fingers,
                distance,
                duration,
            } => {
                let (direction, fingers, distance) = (*direction, *fingers, *distance);
                let duration = duration.map(|d| d.get()).unwrap_or(self.timings.swipe_duration);
                let drivers = self.session.drivers().clone();
                Action::new(move |ctx| {
                    let drivers = drivers.clone();
                    async move {
                        drivers
                            .trackpad()?
                            .swipe(&ctx, direction, fingers, distance, duration)
                            .await
                    }
                })
            }
            StepOp::OpenLauncher => self.with_handler(|h| h.open_launcher()),
            StepOp::ShowHotseat => self.with_handler(|h| h.show_hotseat()),
            StepOp::SwitchTabForward => self.with_handler(|h| h.switch_tab_forward()),
            StepOp::SwipePage { direction } => {
                let direction = *direction;
                self.with_handler(move |h| h.swipe_page(direction))
            }
            StepOp::Sleep { duration } => sleep(duration.get()),
            StepOp::AssertExists { finder } => self.ui.exists(finder.clone()),
            StepOp::AssertGone { finder } => self.ui.gone(finder.clone()),
            StepOp::AssertCount { finder, count } => self.assert_count(finder.clone(), *count),
            StepOp::Sequence { steps } => combine(
                step.name.clone(),
                steps.iter().map(|child| self.labelled(child)),
            ),
            StepOp::RetryUntil {
                action,
                condition,
                timeout,
            } => {
                let mut opts = self.timings.poll_options();
                if let Some(timeout) = timeout {
                    opts = opts.timeout(timeout.get());
                }
                retry_until(self.labelled(action), self.labelled(condition), opts)
            }
            StepOp::IfSuccessThen { probe, then } => if_success_then(
                self.labelled(probe),
                then.as_ref().map(|then| self.labelled(then)),
            ),
            StepOp::Repeat { times, step } => repeat(*times, self.labelled(step)),
            StepOp::Retry {
                attempts,
                step,
                interval,
            } => retry(
                *attempts,
                self.labelled(step),
                interval.map(|d| d.get()).unwrap_or(self.timings.poll_interval),
            ),
        }
    }

    fn ui_for(&self, timeout: Option<super::HumanDuration>) -> UiContext {
        match timeout {
            Some(timeout) => self.ui.with_timeout(timeout.get()),
            None => self.ui.clone(),
        }
    }

    /// Defers to the handler of whatever mode the session is in when the step runs.
    fn with_handler<F>(&self, build: F) -> Action
    where
        F: Fn(&dyn UiActionHandler) -> Action + Send + Sync + 'static,
    {
        let session = self.session.clone();
        let ui = self.ui.clone();
        let build = Arc::new(build);
        Action::new(move |ctx| {
            let session = session.clone();
            let ui = ui.clone();
            let build = build.clone();
            async move {
                let handler = session.handler(&ctx, &ui).await?;
                let action = build(handler.as_ref());
                action.run(&ctx).await
            }
        })
    }

    fn assert_count(&self, finder: Finder, expected: usize) -> Action {
        let locator = self.ui.locator().clone();
        Action::new(move |ctx| {
            let locator = locator.clone();
            let finder = finder.clone();
            async move {
                let found = locator.count(&ctx, &finder).await?;
                if found == expected {
                    Ok(())
                } else {
                    Err(EngineError::assertion(format!(
                        "expected {} nodes, found {}: {}",
                        expected, found, finder
                    ))
                    .with_finder(finder.pretty()))
                }
            }
        })
    }
}
