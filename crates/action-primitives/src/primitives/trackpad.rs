//! Trackpad driver - two-finger scroll and n-finger swipes
//!
//! Coordinates here are trackpad device units; there is no display mapping.

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;
use uase_core_types::{EngineError, Point, Rect, Size};

use super::{FingerPath, SwipeDirection, Touch, TouchCoordConverter};
use crate::ports::MultiTouchDevice;
use crate::types::ExecCtx;

/// Horizontal distance between neighbouring fingers, as a fraction of the pad width.
const FINGER_SPACING: f64 = 0.08;

pub struct Trackpad {
    inner: Touch,
    range: Size,
}

impl Trackpad {
    pub fn new(device: Arc<dyn MultiTouchDevice>) -> Self {
        let range = device.range();
        let converter = TouchCoordConverter::new(range, range, Default::default());
        Self {
            inner: Touch::new(device, converter),
            range,
        }
    }

    pub fn with_step_interval(mut self, interval: Duration) -> Self {
        self.inner = self.inner.with_step_interval(interval);
        self
    }

    /// Two-finger scroll by `(dx, dy)` device units.
    pub async fn scroll(
        &self,
        ctx: &ExecCtx,
        dx: i32,
        dy: i32,
        duration: Duration,
    ) -> Result<(), EngineError> {
        debug!(action_id = %ctx.action_id, dx, dy, "trackpad scroll");
        let start = self.pad().center_point();
        let fingers = self.finger_paths(start, (dx, dy), 2);
        self.inner.multi_touch(ctx, &fingers, duration).await
    }

    /// Swipe with `fingers` fingers across `distance` (0..=1) of the pad.
    pub async fn swipe(
        &self,
        ctx: &ExecCtx,
        direction: SwipeDirection,
        fingers: u8,
        distance: f64,
        duration: Duration,
    ) -> Result<(), EngineError> {
        if !(1..=5).contains(&fingers) {
            return Err(EngineError::driver(format!(
                "trackpad swipe needs 1..=5 fingers, got {}",
                fingers
            )));
        }
        debug!(action_id = %ctx.action_id, ?direction, fingers, "trackpad swipe");
        let distance = distance.clamp(0.0, 1.0);
        let (ux, uy) = direction.unit();
        let travel = (
            (f64::from(ux) * distance * f64::from(self.range.width) * 0.8) as i32,
            (f64::from(uy) * distance * f64::from(self.range.height) * 0.8) as i32,
        );
        // Start opposite to the travel direction so the whole path stays on the pad.
        let pad = self.pad();
        let start = Point::new(
            pad.center_point().x - travel.0 / 2,
            pad.center_point().y - travel.1 / 2,
        );
        let paths = self.finger_paths(start, travel, fingers);
        self.inner.multi_touch(ctx, &paths, duration).await
    }

    pub async fn release_all(&self) -> Result<(), EngineError> {
        self.inner.release_all().await
    }

    pub async fn close(&self) -> Result<(), EngineError> {
        self.inner.close().await
    }

    fn pad(&self) -> Rect {
        Rect::new(0, 0, self.range.width - 1, self.range.height - 1)
    }

    fn finger_paths(&self, start: Point, travel: (i32, i32), fingers: u8) -> Vec<FingerPath> {
        let spacing = (f64::from(self.range.width) * FINGER_SPACING) as i32;
        let first_offset = -(spacing * (i32::from(fingers) - 1)) / 2;
        let clamp = |p: Point| {
            Point::new(
                p.x.clamp(0, self.range.width - 1),
                p.y.clamp(0, self.range.height - 1),
            )
        };
        (0..i32::from(fingers))
            .map(|i| {
                let from = Point::new(start.x + first_offset + i * spacing, start.y);
                let to = Point::new(from.x + travel.0, from.y + travel.1);
                FingerPath::new(clamp(from), clamp(to))
            })
            .collect()
    }
}
