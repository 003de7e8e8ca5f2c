//! Scenario descriptors
//!
//! A [`Descriptor`] is the structured value a harness hands the engine: what
//! the session must look like, which resources to hold, the steps to run,
//! the histograms to record and the teardown to run on every exit path.
//! Descriptors are plain serde values, usually written in YAML:
//!
//! ```yaml
//! name: launcher_open
//! resources:
//!   - kind: keyboard
//!   - kind: ui_mode
//!     mode: tablet
//! steps:
//!   - name: open
//!     op: open_launcher
//!   - name: check
//!     op: assert_exists
//!     finder: { role: window, class_name: AppList }
//! ```

mod duration;
mod interpret;
mod validate;

pub use duration::HumanDuration;
pub use interpret::*;
pub use validate::*;

use std::collections::BTreeSet;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uase_core_types::{EngineError, ErrorKind, Point, UiMode};

use action_locator::Finder;
use action_primitives::SwipeDirection;
use perf_observe::{Direction, MetricConfig};

use crate::ports::SessionInfo;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DescriptorError {
    #[error("failed to parse descriptor: {0}")]
    Parse(String),

    #[error("invalid descriptor {scenario}: {reason}")]
    Invalid { scenario: String, reason: String },

    #[error("precondition not met for {scenario}: {reason}")]
    Unmet { scenario: String, reason: String },
}

impl DescriptorError {
    pub fn is_retryable(&self) -> bool {
        false
    }

    pub fn kind(&self) -> ErrorKind {
        ErrorKind::Precondition
    }
}

impl From<DescriptorError> for EngineError {
    fn from(err: DescriptorError) -> Self {
        let scenario = match &err {
            DescriptorError::Invalid { scenario, .. } | DescriptorError::Unmet { scenario, .. } => {
                Some(scenario.clone())
            }
            DescriptorError::Parse(_) => None,
        };
        let engine = EngineError::new(err.kind(), err.to_string());
        match scenario {
            Some(name) => engine.with_scenario(name),
            None => engine,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Descriptor {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub preconditions: Preconditions,
    /// Acquired in order, released in reverse.
    #[serde(default)]
    pub resources: Vec<ResourceSpec>,
    pub steps: Vec<StepSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics: Option<MetricsSpec>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub teardown: Vec<StepSpec>,
    #[serde(default)]
    pub options: ScenarioOptions,
}

impl Descriptor {
    pub fn from_yaml(text: &str) -> Result<Self, DescriptorError> {
        serde_yaml::from_str(text).map_err(|e| DescriptorError::Parse(e.to_string()))
    }

    pub fn from_json(text: &str) -> Result<Self, DescriptorError> {
        serde_json::from_str(text).map_err(|e| DescriptorError::Parse(e.to_string()))
    }

    /// Reads a `.json` file as JSON and anything else as YAML.
    pub async fn load(path: &Path) -> Result<Self, DescriptorError> {
        let text = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| DescriptorError::Parse(format!("{}: {}", path.display(), e)))?;
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => Self::from_json(&text),
            _ => Self::from_yaml(&text),
        }
    }

    /// The mode the steps will run in, when the descriptor pins one.
    pub fn pinned_mode(&self) -> Option<UiMode> {
        self.resources
            .iter()
            .find_map(|r| match r {
                ResourceSpec::UiMode { mode } => Some(*mode),
                _ => None,
            })
            .or(self.options.ui_mode)
            .or(self.preconditions.ui_mode)
    }

    pub(crate) fn invalid(&self, reason: impl Into<String>) -> DescriptorError {
        DescriptorError::Invalid {
            scenario: self.name.clone(),
            reason: reason.into(),
        }
    }
}

/// Session state required before any resource is acquired.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Preconditions {
    pub logged_in: bool,
    pub guest: bool,
    pub arc: bool,
    /// The session must already be in this mode. Use a `ui_mode` resource to switch instead.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ui_mode: Option<UiMode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_displays: Option<usize>,
    #[serde(skip_serializing_if = "BTreeSet::is_empty")]
    pub features: BTreeSet<String>,
}

impl Preconditions {
    /// Lists every unmet requirement, empty when the session qualifies.
    pub fn unmet(&self, info: &SessionInfo) -> Vec<String> {
        let mut unmet = Vec::new();
        if self.logged_in && !info.logged_in {
            unmet.push("session is not logged in".to_string());
        }
        if self.guest && !info.guest {
            unmet.push("session is not a guest session".to_string());
        }
        if self.arc && !info.arc_enabled {
            unmet.push("ARC is not enabled".to_string());
        }
        if let Some(mode) = self.ui_mode {
            if mode.is_tablet() != info.tablet_mode {
                unmet.push(format!("session is not in {} mode", mode));
            }
        }
        if let Some(min) = self.min_displays {
            if info.display_count < min {
                unmet.push(format!(
                    "needs {} displays, session has {}",
                    min, info.display_count
                ));
            }
        }
        for feature in self.features.difference(&info.features) {
            unmet.push(format!("feature {} is not enabled", feature));
        }
        unmet
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResourceSpec {
    Keyboard,
    Mouse,
    Touchscreen,
    Trackpad,
    LandscapeRotation,
    UiMode { mode: UiMode },
    BrowserWindow { url: String },
}

impl ResourceSpec {
    pub fn kind(&self) -> &'static str {
        match self {
            ResourceSpec::Keyboard => "keyboard",
            ResourceSpec::Mouse => "mouse",
            ResourceSpec::Touchscreen => "touchscreen",
            ResourceSpec::Trackpad => "trackpad",
            ResourceSpec::LandscapeRotation => "landscape_rotation",
            ResourceSpec::UiMode { .. } => "ui_mode",
            ResourceSpec::BrowserWindow { .. } => "browser_window",
        }
    }
}

/// One named step; the name labels failures and telemetry artifacts.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StepSpec {
    pub name: String,
    #[serde(flatten)]
    pub op: StepOp,
}

impl StepSpec {
    pub fn new(name: impl Into<String>, op: StepOp) -> Self {
        Self {
            name: name.into(),
            op,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum StepOp {
    WaitUntilExists {
        finder: Finder,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timeout: Option<HumanDuration>,
    },
    WaitUntilGone {
        finder: Finder,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timeout: Option<HumanDuration>,
    },
    WaitForLocation {
        finder: Finder,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timeout: Option<HumanDuration>,
    },
    EnsureGoneFor {
        finder: Finder,
        duration: HumanDuration,
    },
    /// Mouse click in clamshell mode, tap in tablet mode.
    Click {
        finder: Finder,
    },
    LeftClick {
        finder: Finder,
    },
    RightClick {
        finder: Finder,
    },
    DoubleClick {
        finder: Finder,
    },
    FocusAndWait {
        finder: Finder,
    },
    Accel {
        keys: String,
    },
    Type {
        text: String,
    },
    PressAndHold {
        keys: String,
        hold: HumanDuration,
    },
    Swipe {
        from: Point,
        to: Point,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        duration: Option<HumanDuration>,
    },
    LongPress {
        at: Point,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        hold: Option<HumanDuration>,
    },
    /// Mouse wheel; positive ticks scroll down.
    Scroll {
        ticks: i32,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        interval: Option<HumanDuration>,
    },
    TrackpadScroll {
        dx: i32,
        dy: i32,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        duration: Option<HumanDuration>,
    },
    TrackpadSwipe {
        direction: SwipeDirection,
        fingers: u8,
        #[serde(default = "default_swipe_distance")]
        distance: f64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        duration: Option<HumanDuration>,
    },
    OpenLauncher,
    ShowHotseat,
    SwitchTabForward,
    SwipePage {
        direction: SwipeDirection,
    },
    Sleep {
        duration: HumanDuration,
    },
    AssertExists {
        finder: Finder,
    },
    AssertGone {
        finder: Finder,
    },
    AssertCount {
        finder: Finder,
        count: usize,
    },
    Sequence {
        steps: Vec<StepSpec>,
    },
    RetryUntil {
        action: Box<StepSpec>,
        condition: Box<StepSpec>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timeout: Option<HumanDuration>,
    },
    IfSuccessThen {
        probe: Box<StepSpec>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        then: Option<Box<StepSpec>>,
    },
    Repeat {
        times: u32,
        step: Box<StepSpec>,
    },
    Retry {
        attempts: u32,
        step: Box<StepSpec>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        interval: Option<HumanDuration>,
    },
}

fn default_swipe_distance() -> f64 {
    0.5
}

impl StepOp {
    pub fn name(&self) -> &'static str {
        match self {
            StepOp::WaitUntilExists { .. } => "wait_until_exists",
            StepOp::WaitUntilGone { .. } => "wait_until_gone",
            StepOp::WaitForLocation { .. } => "wait_for_location",
            StepOp::EnsureGoneFor { .. } => "ensure_gone_for",
            StepOp::Click { .. } => "click",
            StepOp::LeftClick { .. } => "left_click",
            StepOp::RightClick { .. } => "right_click",
            StepOp::DoubleClick { .. } => "double_click",
            StepOp::FocusAndWait { .. } => "focus_and_wait",
            StepOp::Accel { .. } => "accel",
            StepOp::Type { .. } => "type",
            StepOp::PressAndHold { .. } => "press_and_hold",
            StepOp::Swipe { .. } => "swipe",
            StepOp::LongPress { .. } => "long_press",
            StepOp::Scroll { .. } => "scroll",
            StepOp::TrackpadScroll { .. } => "trackpad_scroll",
            StepOp::TrackpadSwipe { .. } => "trackpad_swipe",
            StepOp::OpenLauncher => "open_launcher",
            StepOp::ShowHotseat => "show_hotseat",
            StepOp::SwitchTabForward => "switch_tab_forward",
            StepOp::SwipePage { .. } => "swipe_page",
            StepOp::Sleep { .. } => "sleep",
            StepOp::AssertExists { .. } => "assert_exists",
            StepOp::AssertGone { .. } => "assert_gone",
            StepOp::AssertCount { .. } => "assert_count",
            StepOp::Sequence { .. } => "sequence",
            StepOp::RetryUntil { .. } => "retry_until",
            StepOp::IfSuccessThen { .. } => "if_success_then",
            StepOp::Repeat { .. } => "repeat",
            StepOp::Retry { .. } => "retry",
        }
    }

    /// Steps nested directly under this one.
    pub fn children(&self) -> Vec<&StepSpec> {
        match self {
            StepOp::Sequence { steps } => steps.iter().collect(),
            StepOp::RetryUntil {
                action, condition, ..
            } => vec![action.as_ref(), condition.as_ref()],
            StepOp::IfSuccessThen { probe, then } => {
                let mut children = vec![probe.as_ref()];
                if let Some(then) = then {
                    children.push(then.as_ref());
                }
                children
            }
            StepOp::Repeat { step, .. } | StepOp::Retry { step, .. } => vec![step.as_ref()],
            _ => Vec::new(),
        }
    }

    pub fn finder(&self) -> Option<&Finder> {
        match self {
            StepOp::WaitUntilExists { finder, .. }
            | StepOp::WaitUntilGone { finder, .. }
            | StepOp::WaitForLocation { finder, .. }
            | StepOp::EnsureGoneFor { finder, .. }
            | StepOp::Click { finder }
            | StepOp::LeftClick { finder }
            | StepOp::RightClick { finder }
            | StepOp::DoubleClick { finder }
            | StepOp::FocusAndWait { finder }
            | StepOp::AssertExists { finder }
            | StepOp::AssertGone { finder }
            | StepOp::AssertCount { finder, .. } => Some(finder),
            _ => None,
        }
    }
}

/// Histograms recorded around `action` once every step has passed.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MetricsSpec {
    pub histograms: Vec<HistogramSpec>,
    #[serde(default)]
    pub action: Vec<StepSpec>,
    /// Wait for every histogram to get a sample. Defaults to true.
    #[serde(default = "default_wait_for_samples")]
    pub wait_for_samples: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wait: Option<HumanDuration>,
}

fn default_wait_for_samples() -> bool {
    true
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricPreset {
    Smoothness,
    Jank,
    Latency,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HistogramSpec {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preset: Option<MetricPreset>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub direction: Option<Direction>,
}

impl HistogramSpec {
    /// A preset may have its unit or direction overridden; without a preset both are required.
    pub fn metric_config(&self) -> Result<MetricConfig, String> {
        let base = match self.preset {
            Some(MetricPreset::Smoothness) => Some(MetricConfig::smoothness(self.name.clone())),
            Some(MetricPreset::Jank) => Some(MetricConfig::jank(self.name.clone())),
            Some(MetricPreset::Latency) => Some(MetricConfig::latency(self.name.clone())),
            None => None,
        };
        let unit = self
            .unit
            .clone()
            .or_else(|| base.as_ref().map(|b| b.unit.clone()));
        let direction = self.direction.or_else(|| base.as_ref().map(|b| b.direction));
        match (unit, direction) {
            (Some(unit), Some(direction)) => {
                Ok(MetricConfig::custom(self.name.clone(), unit, direction))
            }
            _ => Err(format!(
                "histogram {} needs a preset or both unit and direction",
                self.name
            )),
        }
    }
}

/// Per-scenario overrides of the engine configuration.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScenarioOptions {
    /// Mode mode-dependent steps use when no `ui_mode` resource pins one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ui_mode: Option<UiMode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wait_timeout: Option<HumanDuration>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub poll_interval: Option<HumanDuration>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cleanup_reserve: Option<HumanDuration>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metric_wait: Option<HumanDuration>,
}
