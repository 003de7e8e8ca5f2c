//! Finder-driven UI actions
//!
//! `UiContext` pairs a [`Locator`] with the scenario's [`DriverSet`] and hands
//! out [`Action`] values. Nothing is resolved when an action is built; every
//! run re-resolves its finder.

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;
use uase_core_types::EngineError;

use action_locator::{Finder, Locator};
use action_primitives::{poll, DriverSet, MouseBtn, PollError};

use crate::action::{retry_until, Action};

#[derive(Clone)]
pub struct UiContext {
    locator: Locator,
    drivers: Arc<DriverSet>,
}

impl UiContext {
    pub fn new(locator: Locator, drivers: Arc<DriverSet>) -> Self {
        Self { locator, drivers }
    }

    /// Same context with a different wait budget.
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        let poll = self.locator.poll_options().timeout(timeout);
        Self {
            locator: self.locator.clone().with_poll_options(poll),
            drivers: self.drivers.clone(),
        }
    }

    /// Same context with a different poll interval.
    pub fn with_interval(&self, interval: Duration) -> Self {
        let poll = self.locator.poll_options().interval(interval);
        Self {
            locator: self.locator.clone().with_poll_options(poll),
            drivers: self.drivers.clone(),
        }
    }

    pub fn locator(&self) -> &Locator {
        &self.locator
    }

    pub fn drivers(&self) -> &Arc<DriverSet> {
        &self.drivers
    }

    pub fn wait_until_exists(&self, finder: Finder) -> Action {
        let locator = self.locator.clone();
        Action::new(move |ctx| {
            let locator = locator.clone();
            let finder = finder.clone();
            async move { locator.wait_until_exists(&ctx, &finder, None).await }
        })
    }

    pub fn wait_until_gone(&self, finder: Finder) -> Action {
        let locator = self.locator.clone();
        Action::new(move |ctx| {
            let locator = locator.clone();
            let finder = finder.clone();
            async move { locator.wait_until_gone(&ctx, &finder, None).await }
        })
    }

    pub fn wait_for_location(&self, finder: Finder) -> Action {
        let locator = self.locator.clone();
        Action::new(move |ctx| {
            let locator = locator.clone();
            let finder = finder.clone();
            async move { locator.wait_for_location(&ctx, &finder, None).await }
        })
    }

    pub fn ensure_gone_for(&self, finder: Finder, duration: Duration) -> Action {
        let locator = self.locator.clone();
        Action::new(move |ctx| {
            let locator = locator.clone();
            let finder = finder.clone();
            async move { locator.ensure_gone_for(&ctx, &finder, duration).await }
        })
    }

    pub fn wait_until_count(&self, finder: Finder, count: usize) -> Action {
        let locator = self.locator.clone();
        Action::new(move |ctx| {
            let locator = locator.clone();
            let finder = finder.clone();
            async move { locator.wait_until_count(&ctx, &finder, count, None).await }
        })
    }

    /// Fails with `NotFound` unless the node exists right now.
    pub fn exists(&self, finder: Finder) -> Action {
        let locator = self.locator.clone();
        Action::new(move |ctx| {
            let locator = locator.clone();
            let finder = finder.clone();
            async move {
                if locator.exists(&ctx, &finder).await? {
                    Ok(())
                } else {
                    Err(EngineError::not_found(format!("node does not exist: {}", finder))
                        .with_finder(finder.pretty()))
                }
            }
        })
    }

    /// Fails with `Assertion` if the node exists right now.
    pub fn gone(&self, finder: Finder) -> Action {
        let locator = self.locator.clone();
        Action::new(move |ctx| {
            let locator = locator.clone();
            let finder = finder.clone();
            async move {
                if locator.exists(&ctx, &finder).await? {
                    Err(EngineError::assertion(format!("node still exists: {}", finder))
                        .with_finder(finder.pretty()))
                } else {
                    Ok(())
                }
            }
        })
    }

    /// Clicks the center of the node once its location is stable.
    pub fn left_click(&self, finder: Finder) -> Action {
        self.mouse_click(finder, MouseBtn::Left, 1, true)
    }

    pub fn right_click(&self, finder: Finder) -> Action {
        self.mouse_click(finder, MouseBtn::Right, 1, true)
    }

    pub fn double_click(&self, finder: Finder) -> Action {
        self.mouse_click(finder, MouseBtn::Left, 2, true)
    }

    /// Clicks wherever the node is right now, even mid-animation.
    pub fn immediate_left_click(&self, finder: Finder) -> Action {
        self.mouse_click(finder, MouseBtn::Left, 1, false)
    }

    /// Clicks the node until `condition` holds.
    pub fn left_click_until(&self, finder: Finder, condition: Action) -> Action {
        retry_until(
            self.left_click(finder),
            condition,
            self.locator.poll_options(),
        )
    }

    pub fn mouse_move_to(&self, finder: Finder, duration: Duration) -> Action {
        let ui = self.clone();
        Action::new(move |ctx| {
            let ui = ui.clone();
            let finder = finder.clone();
            async move {
                let bounds = ui.locator.location(&ctx, &finder).await?;
                ui.drivers
                    .mouse()?
                    .move_to(&ctx, bounds.center_point(), duration)
                    .await
            }
        })
    }

    /// Focuses the node and waits until it reports the focused state.
    pub fn focus_and_wait(&self, finder: Finder) -> Action {
        let locator = self.locator.clone();
        Action::new(move |ctx| {
            let locator = locator.clone();
            let finder = finder.clone();
            async move {
                locator.focus(&ctx, &finder).await?;
                let (locator, target) = (&locator, &finder);
                poll(&ctx, locator.poll_options(), move |attempt| async move {
                    if locator.info(&attempt, target).await?.is_focused() {
                        Ok(())
                    } else {
                        Err(PollError::Transient(EngineError::assertion(
                            "node is not focused yet",
                        )))
                    }
                })
                .await
                .map_err(|err| err.with_finder(finder.pretty()))
            }
        })
    }

    pub fn do_default(&self, finder: Finder) -> Action {
        let locator = self.locator.clone();
        Action::new(move |ctx| {
            let locator = locator.clone();
            let finder = finder.clone();
            async move { locator.do_default(&ctx, &finder).await }
        })
    }

    pub fn make_visible(&self, finder: Finder) -> Action {
        let locator = self.locator.clone();
        Action::new(move |ctx| {
            let locator = locator.clone();
            let finder = finder.clone();
            async move { locator.make_visible(&ctx, &finder).await }
        })
    }

    pub fn accel(&self, chord: impl Into<String>) -> Action {
        let drivers = self.drivers.clone();
        let chord = chord.into();
        Action::new(move |ctx| {
            let drivers = drivers.clone();
            let chord = chord.clone();
            async move { drivers.keyboard()?.accel(&ctx, &chord).await }
        })
    }

    pub fn accel_press_and_hold(&self, chord: impl Into<String>, hold: Duration) -> Action {
        let drivers = self.drivers.clone();
        let chord = chord.into();
        Action::new(move |ctx| {
            let drivers = drivers.clone();
            let chord = chord.clone();
            async move {
                drivers
                    .keyboard()?
                    .accel_press_and_hold(&ctx, &chord, hold)
                    .await
            }
        })
    }

    pub fn type_text(&self, text: impl Into<String>) -> Action {
        let drivers = self.drivers.clone();
        let text = text.into();
        Action::new(move |ctx| {
            let drivers = drivers.clone();
            let text = text.clone();
            async move { drivers.keyboard()?.type_text(&ctx, &text).await }
        })
    }

    fn mouse_click(&self, finder: Finder, button: MouseBtn, count: u8, stable: bool) -> Action {
        let ui = self.clone();
        Action::new(move |ctx| {
            let ui = ui.clone();
            let finder = finder.clone();
            async move {
                let bounds = if stable {
                    ui.locator.location(&ctx, &finder).await?
                } else {
                    ui.locator.immediate_location(&ctx, &finder).await?
                };
                debug!(action_id = %ctx.action_id, finder = %finder, bounds = %bounds, ?button, "clicking node");
                ui.drivers
                    .mouse()?
                    .click_button(&ctx, bounds.center_point(), button, count)
                    .await
            }
        })
    }
}
