//! Clamshell and tablet flavours of the shell gestures.
//!
//! Scenario steps such as "open the launcher" or "click this node" do not
//! care about the form factor. [`UiActionHandler`] maps them onto mouse and
//! keyboard in clamshell mode and onto touch gestures in tablet mode.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};
use uase_core_types::{EngineError, Point, Rect, UiMode};

use action_flow::{combine, Action, UiContext};
use action_locator::Finder;
use action_primitives::{poll, ExecCtx, PollError, PollOptions, SwipeDirection};

use crate::ports::ShellPort;

pub fn launcher_finder() -> Finder {
    Finder::new()
        .role("window")
        .class_name("AppList")
        .labelled("launcher")
}

pub fn shelf_finder() -> Finder {
    Finder::new().class_name("ShelfView").labelled("shelf")
}

pub fn hotseat_finder() -> Finder {
    Finder::new()
        .class_name("HotseatWidget")
        .labelled("hotseat")
}

pub trait UiActionHandler: Send + Sync {
    fn mode(&self) -> UiMode;

    /// Activates the node the way a user of this form factor would.
    fn click(&self, finder: Finder) -> Action;

    /// Moves the current page of a paged view (launcher, overview) one page.
    fn swipe_page(&self, direction: SwipeDirection) -> Action;

    fn switch_tab_forward(&self) -> Action;

    /// Opens the launcher and waits until it is shown.
    fn open_launcher(&self) -> Action;

    fn show_hotseat(&self) -> Action;
}

/// Start and end of a swipe across a third of `display`, centred.
fn page_swipe_points(display: &Rect, direction: SwipeDirection) -> (Point, Point) {
    let center = display.center_point();
    let (ux, uy) = direction.unit();
    let end = Point::new(
        center.x + ux * display.width / 3,
        center.y + uy * display.height / 3,
    );
    (center, end)
}

pub struct ClamshellActionHandler {
    ui: UiContext,
    display: Rect,
    swipe_duration: Duration,
}

impl ClamshellActionHandler {
    pub fn new(ui: UiContext, display: Rect, swipe_duration: Duration) -> Self {
        Self {
            ui,
            display,
            swipe_duration,
        }
    }
}

impl UiActionHandler for ClamshellActionHandler {
    fn mode(&self) -> UiMode {
        UiMode::Clamshell
    }

    fn click(&self, finder: Finder) -> Action {
        self.ui.left_click(finder)
    }

    fn swipe_page(&self, direction: SwipeDirection) -> Action {
        let (from, to) = page_swipe_points(&self.display, direction);
        let drivers = self.ui.drivers().clone();
        let duration = self.swipe_duration;
        Action::new(move |ctx| {
            let drivers = drivers.clone();
            async move { drivers.mouse()?.drag(&ctx, from, to, duration).await }
        })
    }

    fn switch_tab_forward(&self) -> Action {
        self.ui.accel("Ctrl+Tab")
    }

    fn open_launcher(&self) -> Action {
        combine(
            "open launcher",
            [
                self.ui.accel("Shift+Search"),
                self.ui.wait_until_exists(launcher_finder()),
            ],
        )
    }

    fn show_hotseat(&self) -> Action {
        // The shelf is always shown in clamshell mode.
        self.ui.wait_until_exists(shelf_finder())
    }
}

pub struct TabletActionHandler {
    ui: UiContext,
    display: Rect,
    swipe_duration: Duration,
}

impl TabletActionHandler {
    pub fn new(ui: UiContext, display: Rect, swipe_duration: Duration) -> Self {
        Self {
            ui,
            display,
            swipe_duration,
        }
    }

    fn swipe(&self, from: Point, to: Point) -> Action {
        let drivers = self.ui.drivers().clone();
        let duration = self.swipe_duration;
        Action::new(move |ctx| {
            let drivers = drivers.clone();
            async move { drivers.touch()?.swipe(&ctx, from, to, duration).await }
        })
    }
}

impl UiActionHandler for TabletActionHandler {
    fn mode(&self) -> UiMode {
        UiMode::Tablet
    }

    fn click(&self, finder: Finder) -> Action {
        let ui = self.ui.clone();
        Action::new(move |ctx| {
            let ui = ui.clone();
            let finder = finder.clone();
            async move {
                let bounds = ui.locator().location(&ctx, &finder).await?;
                debug!(action_id = %ctx.action_id, finder = %finder, bounds = %bounds, "tapping node");
                ui.drivers().touch()?.tap(&ctx, bounds.center_point()).await
            }
        })
    }

    fn swipe_page(&self, direction: SwipeDirection) -> Action {
        let (from, to) = page_swipe_points(&self.display, direction);
        self.swipe(from, to)
    }

    fn switch_tab_forward(&self) -> Action {
        // Horizontal swipe on the browser toolbar.
        let y = self.display.top + 20;
        let from = Point::new(self.display.left + self.display.width * 3 / 4, y);
        let to = Point::new(self.display.left + self.display.width / 4, y);
        self.swipe(from, to)
    }

    fn open_launcher(&self) -> Action {
        combine(
            "open launcher",
            [
                self.ui.accel("Search"),
                self.ui.wait_until_exists(launcher_finder()),
            ],
        )
    }

    fn show_hotseat(&self) -> Action {
        let x = self.display.center_point().x;
        let bottom = self.display.bottom() - 1;
        combine(
            "show hotseat",
            [
                self.swipe(Point::new(x, bottom), Point::new(x, bottom - self.display.height / 5)),
                self.ui.wait_until_exists(hotseat_finder()),
            ],
        )
    }
}

pub fn handler_for(
    mode: UiMode,
    ui: UiContext,
    display: Rect,
    swipe_duration: Duration,
) -> Arc<dyn UiActionHandler> {
    match mode {
        UiMode::Clamshell => Arc::new(ClamshellActionHandler::new(ui, display, swipe_duration)),
        UiMode::Tablet => Arc::new(TabletActionHandler::new(ui, display, swipe_duration)),
    }
}

pub async fn current_mode(ctx: &ExecCtx, shell: &dyn ShellPort) -> Result<UiMode, EngineError> {
    Ok(if shell.tablet_mode(ctx).await? {
        UiMode::Tablet
    } else {
        UiMode::Clamshell
    })
}

/// Puts the shell back into the mode it was in before [`acquire_ui_mode`].
pub struct ModeRestore {
    shell: Arc<dyn ShellPort>,
    original: UiMode,
    restored: AtomicBool,
}

impl ModeRestore {
    pub fn original(&self) -> UiMode {
        self.original
    }

    /// Only the first call does anything.
    pub async fn restore(&self, ctx: &ExecCtx) -> Result<(), EngineError> {
        if self.restored.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        if current_mode(ctx, self.shell.as_ref()).await? != self.original {
            info!(mode = %self.original, "restoring ui mode");
            self.shell
                .set_tablet_mode(ctx, self.original.is_tablet())
                .await?;
        }
        Ok(())
    }
}

/// Switches the shell into `want` and waits until it reports that mode.
pub async fn acquire_ui_mode(
    ctx: &ExecCtx,
    shell: Arc<dyn ShellPort>,
    want: UiMode,
    poll_opts: PollOptions,
) -> Result<ModeRestore, EngineError> {
    let original = current_mode(ctx, shell.as_ref()).await?;
    if original != want {
        info!(from = %original, to = %want, "switching ui mode");
        shell.set_tablet_mode(ctx, want.is_tablet()).await?;
        let port = shell.as_ref();
        poll(ctx, poll_opts, move |attempt| async move {
            if current_mode(&attempt, port).await? == want {
                Ok(())
            } else {
                Err(PollError::Transient(EngineError::assertion(format!(
                    "shell is not in {} mode yet",
                    want
                ))))
            }
        })
        .await?;
    }
    Ok(ModeRestore {
        shell,
        original,
        restored: AtomicBool::new(false),
    })
}
