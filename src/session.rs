//! Per-run engine handle captured by resources and step actions.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::debug;
use uase_core_types::{EngineError, UiMode};

use action_flow::UiContext;
use action_primitives::{
    DriverSet, ExecCtx, InputSubsystem, KeyboardLayout, MultiTouchDevice, Touch,
    TouchCoordConverter,
};

use crate::ports::{DisplayInfo, ShellPort};
use crate::ui_mode::{current_mode, handler_for, UiActionHandler};

pub struct Session {
    ui: UiContext,
    shell: Arc<dyn ShellPort>,
    input: Arc<dyn InputSubsystem>,
    layout: KeyboardLayout,
    swipe_duration: Duration,
    touch_device: Mutex<Option<Arc<dyn MultiTouchDevice>>>,
    mode: Mutex<Option<UiMode>>,
}

impl Session {
    pub fn new(
        ui: UiContext,
        shell: Arc<dyn ShellPort>,
        input: Arc<dyn InputSubsystem>,
        layout: KeyboardLayout,
        swipe_duration: Duration,
    ) -> Self {
        Self {
            ui,
            shell,
            input,
            layout,
            swipe_duration,
            touch_device: Mutex::new(None),
            mode: Mutex::new(None),
        }
    }

    pub fn ui(&self) -> &UiContext {
        &self.ui
    }

    pub fn drivers(&self) -> &Arc<DriverSet> {
        self.ui.drivers()
    }

    pub fn shell(&self) -> &Arc<dyn ShellPort> {
        &self.shell
    }

    pub fn input(&self) -> &Arc<dyn InputSubsystem> {
        &self.input
    }

    pub fn layout(&self) -> KeyboardLayout {
        self.layout
    }

    pub fn swipe_duration(&self) -> Duration {
        self.swipe_duration
    }

    /// Pins the mode handlers use instead of asking the shell.
    pub fn set_mode(&self, mode: Option<UiMode>) {
        *self.mode.lock() = mode;
    }

    pub async fn mode(&self, ctx: &ExecCtx) -> Result<UiMode, EngineError> {
        let pinned = *self.mode.lock();
        match pinned {
            Some(mode) => Ok(mode),
            None => current_mode(ctx, self.shell.as_ref()).await,
        }
    }

    /// Handler for the current mode and display, acting through `ui`.
    pub async fn handler(
        &self,
        ctx: &ExecCtx,
        ui: &UiContext,
    ) -> Result<Arc<dyn UiActionHandler>, EngineError> {
        let mode = self.mode(ctx).await?;
        let display = self.shell.primary_display(ctx).await?;
        debug!(action_id = %ctx.action_id, mode = %mode, "ui handler selected");
        Ok(handler_for(
            mode,
            ui.clone(),
            display.bounds,
            self.swipe_duration,
        ))
    }

    /// Installs the touch driver for `device` on the current display.
    pub async fn attach_touchscreen(
        &self,
        ctx: &ExecCtx,
        device: Arc<dyn MultiTouchDevice>,
    ) -> Result<(), EngineError> {
        let display = self.shell.primary_display(ctx).await?;
        self.install_touch(device.clone(), &display);
        *self.touch_device.lock() = Some(device);
        Ok(())
    }

    pub fn detach_touchscreen(&self) -> Option<Arc<dyn MultiTouchDevice>> {
        self.drivers().set_touch(None);
        self.touch_device.lock().take()
    }

    /// Rebuilds the touch coordinate mapping after the display changed.
    pub async fn refresh_touch(&self, ctx: &ExecCtx) -> Result<(), EngineError> {
        let device = self.touch_device.lock().clone();
        if let Some(device) = device {
            let display = self.shell.primary_display(ctx).await?;
            self.install_touch(device, &display);
        }
        Ok(())
    }

    fn install_touch(&self, device: Arc<dyn MultiTouchDevice>, display: &DisplayInfo) {
        let converter =
            TouchCoordConverter::new(display.bounds.size(), device.range(), display.rotation);
        let (display_id, degrees) = (&display.id, display.rotation.degrees());
        debug!(display = %display_id, rotation = degrees, "touch mapping installed");
        self.drivers()
            .set_touch(Some(Arc::new(Touch::new(device, converter))));
    }
}
