//! Session collaborators the engine consumes but does not implement.
//!
//! The accessibility-tree evaluator, the input subsystem and the histogram
//! source are declared next to the code that drives them
//! ([`action_locator::Evaluator`], [`action_primitives::InputSubsystem`],
//! [`perf_observe::HistogramSource`]). The shell and telemetry ports below
//! are only needed by the scenario runtime.

use std::collections::BTreeSet;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uase_core_types::{EngineError, Rect, Rotation};

use action_primitives::ExecCtx;

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionInfo {
    pub logged_in: bool,
    pub guest: bool,
    pub arc_enabled: bool,
    pub tablet_mode: bool,
    pub display_count: usize,
    /// Extra features the session was started with.
    pub features: BTreeSet<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayInfo {
    pub id: String,
    pub bounds: Rect,
    pub rotation: Rotation,
    #[serde(default)]
    pub is_internal: bool,
}

impl DisplayInfo {
    pub fn is_landscape(&self) -> bool {
        self.bounds.width >= self.bounds.height
    }
}

/// Shell state the runtime reads and scopes.
#[async_trait]
pub trait ShellPort: Send + Sync {
    async fn session_info(&self, ctx: &ExecCtx) -> Result<SessionInfo, EngineError>;

    async fn tablet_mode(&self, ctx: &ExecCtx) -> Result<bool, EngineError>;

    async fn set_tablet_mode(&self, ctx: &ExecCtx, enabled: bool) -> Result<(), EngineError>;

    async fn primary_display(&self, ctx: &ExecCtx) -> Result<DisplayInfo, EngineError>;

    async fn set_display_rotation(
        &self,
        ctx: &ExecCtx,
        display_id: &str,
        rotation: Rotation,
    ) -> Result<(), EngineError>;

    /// Opens a browser window on `url` and returns its id.
    async fn open_browser(&self, ctx: &ExecCtx, url: &str) -> Result<String, EngineError>;

    async fn close_browser(&self, ctx: &ExecCtx, window_id: &str) -> Result<(), EngineError>;
}

/// Failure artifacts, captured while the session still exists.
#[async_trait]
pub trait TelemetryPort: Send + Sync {
    /// PNG screenshot, base64 encoded; a `data:` URL is accepted too.
    async fn screenshot(&self, ctx: &ExecCtx) -> Result<String, EngineError>;

    /// Text dump of the accessibility tree.
    async fn tree_dump(&self, ctx: &ExecCtx) -> Result<String, EngineError>;
}
