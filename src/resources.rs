//! Resources a descriptor can ask for.
//!
//! Each one installs its handle into the [`Session`] on acquire and returns the
//! cleanup closure that takes it out again.

use std::sync::Arc;

use async_trait::async_trait;
use futures::TryFutureExt;
use tracing::{info, warn};
use uase_core_types::{EngineError, Rotation, UiMode};

use action_primitives::{poll, ExecCtx, Keyboard, Mouse, PollError, PollOptions, Trackpad};

use crate::runtime::{Cleanup, Resource};
use crate::session::Session;
use crate::ui_mode::acquire_ui_mode;

pub struct KeyboardResource {
    session: Arc<Session>,
}

impl KeyboardResource {
    pub fn new(session: Arc<Session>) -> Self {
        Self { session }
    }
}

#[async_trait]
impl Resource for KeyboardResource {
    fn label(&self) -> String {
        "keyboard".to_string()
    }

    async fn acquire(&self, ctx: &ExecCtx) -> Result<Cleanup, EngineError> {
        let device = ctx
            .run(self.session.input().open_keyboard().map_err(EngineError::from))
            .await?;
        let keyboard = Arc::new(Keyboard::new(device, self.session.layout()));
        self.session.drivers().set_keyboard(Some(keyboard.clone()));
        let session = self.session.clone();
        Ok(Cleanup::new("close keyboard", move |_ctx| async move {
            session.drivers().set_keyboard(None);
            keyboard.close().await
        }))
    }
}

pub struct MouseResource {
    session: Arc<Session>,
}

impl MouseResource {
    pub fn new(session: Arc<Session>) -> Self {
        Self { session }
    }
}

#[async_trait]
impl Resource for MouseResource {
    fn label(&self) -> String {
        "mouse".to_string()
    }

    async fn acquire(&self, ctx: &ExecCtx) -> Result<Cleanup, EngineError> {
        let device = ctx
            .run(self.session.input().open_mouse().map_err(EngineError::from))
            .await?;
        let mouse = Arc::new(Mouse::new(device));
        self.session.drivers().set_mouse(Some(mouse.clone()));
        let session = self.session.clone();
        Ok(Cleanup::new("close mouse", move |_ctx| async move {
            session.drivers().set_mouse(None);
            mouse.close().await
        }))
    }
}

pub struct TouchscreenResource {
    session: Arc<Session>,
}

impl TouchscreenResource {
    pub fn new(session: Arc<Session>) -> Self {
        Self { session }
    }
}

#[async_trait]
impl Resource for TouchscreenResource {
    fn label(&self) -> String {
        "touchscreen".to_string()
    }

    async fn acquire(&self, ctx: &ExecCtx) -> Result<Cleanup, EngineError> {
        let device = ctx
            .run(self.session.input().open_touchscreen().map_err(EngineError::from))
            .await?;
        if let Err(err) = self.session.attach_touchscreen(ctx, device.clone()).await {
            if let Err(close_err) = device.close().await {
                warn!(error = %close_err, "closing touchscreen after failed attach failed");
            }
            return Err(err);
        }
        let session = self.session.clone();
        Ok(Cleanup::new("close touchscreen", move |_ctx| async move {
            let touch = session.drivers().touch().ok();
            session.detach_touchscreen();
            match touch {
                Some(touch) => touch.close().await,
                None => device.close().await.map_err(EngineError::from),
            }
        }))
    }
}

pub struct TrackpadResource {
    session: Arc<Session>,
}

impl TrackpadResource {
    pub fn new(session: Arc<Session>) -> Self {
        Self { session }
    }
}

#[async_trait]
impl Resource for TrackpadResource {
    fn label(&self) -> String {
        "trackpad".to_string()
    }

    async fn acquire(&self, ctx: &ExecCtx) -> Result<Cleanup, EngineError> {
        let device = ctx
            .run(self.session.input().open_trackpad().map_err(EngineError::from))
            .await?;
        let trackpad = Arc::new(Trackpad::new(device));
        self.session.drivers().set_trackpad(Some(trackpad.clone()));
        let session = self.session.clone();
        Ok(Cleanup::new("close trackpad", move |_ctx| async move {
            session.drivers().set_trackpad(None);
            trackpad.close().await
        }))
    }
}

/// Rotates the primary display to a landscape orientation for the run.
pub struct LandscapeRotation {
    session: Arc<Session>,
    poll: PollOptions,
}

impl LandscapeRotation {
    pub fn new(session: Arc<Session>, poll: PollOptions) -> Self {
        Self { session, poll }
    }
}

#[async_trait]
impl Resource for LandscapeRotation {
    fn label(&self) -> String {
        "landscape rotation".to_string()
    }

    async fn acquire(&self, ctx: &ExecCtx) -> Result<Cleanup, EngineError> {
        let shell = self.session.shell().clone();
        let display = shell.primary_display(ctx).await?;
        let original = display.rotation;
        if !display.is_landscape() {
            let target = Rotation::from_degrees(i32::from(original.degrees()) + 90)?;
            let display_id = &display.id;
            info!(display = %display_id, from = original.degrees(), to = target.degrees(), "rotating to landscape");
            shell.set_display_rotation(ctx, &display.id, target).await?;
            let port = shell.as_ref();
            poll(ctx, self.poll, move |attempt| async move {
                if port.primary_display(&attempt).await?.is_landscape() {
                    Ok(())
                } else {
                    Err(PollError::Transient(EngineError::assertion(
                        "display is still in portrait",
                    )))
                }
            })
            .await?;
            self.session.refresh_touch(ctx).await?;
        }

        let session = self.session.clone();
        let display_id = display.id.clone();
        Ok(Cleanup::new("restore rotation", move |ctx| async move {
            let shell = session.shell().clone();
            if shell.primary_display(&ctx).await?.rotation != original {
                shell.set_display_rotation(&ctx, &display_id, original).await?;
                session.refresh_touch(&ctx).await?;
            }
            Ok(())
        }))
    }
}

pub struct UiModeResource {
    session: Arc<Session>,
    mode: UiMode,
    poll: PollOptions,
}

impl UiModeResource {
    pub fn new(session: Arc<Session>, mode: UiMode, poll: PollOptions) -> Self {
        Self {
            session,
            mode,
            poll,
        }
    }
}

#[async_trait]
impl Resource for UiModeResource {
    fn label(&self) -> String {
        format!("{} mode", self.mode)
    }

    async fn acquire(&self, ctx: &ExecCtx) -> Result<Cleanup, EngineError> {
        let guard = acquire_ui_mode(ctx, self.session.shell().clone(), self.mode, self.poll).await?;
        self.session.set_mode(Some(self.mode));
        let session = self.session.clone();
        Ok(Cleanup::new(
            format!("restore {} mode", guard.original()),
            move |ctx| async move {
                session.set_mode(None);
                guard.restore(&ctx).await
            },
        ))
    }
}

pub struct BrowserWindow {
    session: Arc<Session>,
    url: String,
}

impl BrowserWindow {
    pub fn new(session: Arc<Session>, url: impl Into<String>) -> Self {
        Self {
            session,
            url: url.into(),
        }
    }
}

#[async_trait]
impl Resource for BrowserWindow {
    fn label(&self) -> String {
        format!("browser window {}", self.url)
    }

    async fn acquire(&self, ctx: &ExecCtx) -> Result<Cleanup, EngineError> {
        let id = self.session.shell().open_browser(ctx, &self.url).await?;
        let session = self.session.clone();
        Ok(Cleanup::new("close browser", move |ctx| async move {
            session.shell().close_browser(&ctx, &id).await
        }))
    }
}
