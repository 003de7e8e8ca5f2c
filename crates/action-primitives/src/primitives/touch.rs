//! Touchscreen driver - taps, swipes, long presses, multi-finger paths

use std::collections::BTreeSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, warn};
use uase_core_types::{EngineError, Point, Rotation, Size};

use super::{steps_for, DEFAULT_STEP_INTERVAL};
use crate::errors::DriverError;
use crate::ports::{MultiTouchDevice, TouchEvent};
use crate::types::ExecCtx;

/// Maps display pixels to touchscreen device coordinates.
///
/// `display` is the logical display size in its current orientation. The
/// panel reports coordinates in its native orientation, so rotation is undone
/// before scaling to the device range.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TouchCoordConverter {
    display: Size,
    range: Size,
    rotation: Rotation,
}

impl TouchCoordConverter {
    pub fn new(display: Size, range: Size, rotation: Rotation) -> Self {
        Self {
            display,
            range,
            rotation,
        }
    }

    pub fn rotation(&self) -> Rotation {
        self.rotation
    }

    pub fn convert(&self, p: Point) -> Result<Point, DriverError> {
        let (w, h) = (self.display.width, self.display.height);
        if p.x < 0 || p.y < 0 || p.x > w || p.y > h || w <= 0 || h <= 0 {
            return Err(DriverError::OutOfBounds(p.to_string()));
        }
        let (nx, ny) = match self.rotation {
            Rotation::R0 => (p.x, p.y),
            Rotation::R90 => (p.y, w - p.x),
            Rotation::R180 => (w - p.x, h - p.y),
            Rotation::R270 => (h - p.y, p.x),
        };
        let (native_w, native_h) = if self.rotation.is_transposed() {
            (h, w)
        } else {
            (w, h)
        };
        let scale = |v: i32, native: i32, range: i32| {
            let scaled = (i64::from(v) * i64::from(range) / i64::from(native)) as i32;
            scaled.clamp(0, (range - 1).max(0))
        };
        Ok(Point::new(
            scale(nx, native_w, self.range.width),
            scale(ny, native_h, self.range.height),
        ))
    }
}

/// Start and end of one finger's path, in display pixels.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FingerPath {
    pub from: Point,
    pub to: Point,
}

impl FingerPath {
    pub fn new(from: Point, to: Point) -> Self {
        Self { from, to }
    }
}

pub struct Touch {
    device: Arc<dyn MultiTouchDevice>,
    converter: TouchCoordConverter,
    active: Mutex<BTreeSet<u8>>,
    step_interval: Duration,
}

impl Touch {
    pub fn new(device: Arc<dyn MultiTouchDevice>, converter: TouchCoordConverter) -> Self {
        Self {
            device,
            converter,
            active: Mutex::new(BTreeSet::new()),
            step_interval: DEFAULT_STEP_INTERVAL,
        }
    }

    pub fn with_step_interval(mut self, interval: Duration) -> Self {
        self.step_interval = interval;
        self
    }

    pub fn converter(&self) -> &TouchCoordConverter {
        &self.converter
    }

    pub async fn tap(&self, ctx: &ExecCtx, at: Point) -> Result<(), EngineError> {
        debug!(action_id = %ctx.action_id, point = %at, "tap");
        self.multi_touch(ctx, &[FingerPath::new(at, at)], Duration::ZERO)
            .await
    }

    pub async fn swipe(
        &self,
        ctx: &ExecCtx,
        from: Point,
        to: Point,
        duration: Duration,
    ) -> Result<(), EngineError> {
        debug!(action_id = %ctx.action_id, from = %from, to = %to, "swipe");
        self.multi_touch(ctx, &[FingerPath::new(from, to)], duration)
            .await
    }

    pub async fn long_press(
        &self,
        ctx: &ExecCtx,
        at: Point,
        hold: Duration,
    ) -> Result<(), EngineError> {
        debug!(action_id = %ctx.action_id, point = %at, hold_ms = hold.as_millis() as u64, "long press");
        let at = self.converter.convert(at)?;
        self.guarded(async {
            ctx.check()?;
            self.frame(&[TouchEvent::Down { slot: 0, at }]).await?;
            self.device.sync().await?;
            ctx.sleep(hold).await?;
            self.frame(&[TouchEvent::Up { slot: 0 }]).await
        })
        .await
    }

    /// Moves every finger along its path at the same pace, one slot per finger.
    pub async fn multi_touch(
        &self,
        ctx: &ExecCtx,
        fingers: &[FingerPath],
        duration: Duration,
    ) -> Result<(), EngineError> {
        if fingers.is_empty() || fingers.len() > usize::from(u8::MAX) {
            return Err(EngineError::driver(format!(
                "unsupported finger count {}",
                fingers.len()
            )));
        }
        let paths = fingers
            .iter()
            .map(|f| Ok((self.converter.convert(f.from)?, self.converter.convert(f.to)?)))
            .collect::<Result<Vec<_>, DriverError>>()?;

        self.guarded(async {
            ctx.check()?;
            let down: Vec<TouchEvent> = paths
                .iter()
                .enumerate()
                .map(|(slot, (from, _))| TouchEvent::Down {
                    slot: slot as u8,
                    at: *from,
                })
                .collect();
            self.frame(&down).await?;

            let moving = paths.iter().any(|(from, to)| from != to);
            if moving {
                let steps = steps_for(duration, self.step_interval);
                let pause = duration / steps;
                for i in 1..=steps {
                    ctx.sleep(pause).await?;
                    let t = f64::from(i) / f64::from(steps);
                    let moves: Vec<TouchEvent> = paths
                        .iter()
                        .enumerate()
                        .map(|(slot, (from, to))| TouchEvent::Move {
                            slot: slot as u8,
                            at: from.lerp(*to, t),
                        })
                        .collect();
                    self.frame(&moves).await?;
                }
            } else if !duration.is_zero() {
                self.device.sync().await?;
                ctx.sleep(duration).await?;
            }

            let up: Vec<TouchEvent> = (0..paths.len())
                .map(|slot| TouchEvent::Up { slot: slot as u8 })
                .collect();
            self.frame(&up).await
        })
        .await
    }

    /// Lifts every active contact without consulting any context.
    pub async fn release_all(&self) -> Result<(), EngineError> {
        let slots: Vec<u8> = std::mem::take(&mut *self.active.lock()).into_iter().collect();
        if slots.is_empty() {
            return Ok(());
        }
        let up: Vec<TouchEvent> = slots.into_iter().map(|slot| TouchEvent::Up { slot }).collect();
        self.device.write_frame(&up).await?;
        Ok(self.device.sync().await?)
    }

    pub async fn close(&self) -> Result<(), EngineError> {
        let released = self.release_all().await;
        self.device.close().await?;
        released
    }

    async fn frame(&self, events: &[TouchEvent]) -> Result<(), EngineError> {
        self.device.write_frame(events).await?;
        let mut active = self.active.lock();
        for event in events {
            match event {
                TouchEvent::Down { slot, .. } | TouchEvent::Move { slot, .. } => {
                    active.insert(*slot);
                }
                TouchEvent::Up { slot } => {
                    active.remove(slot);
                }
            }
        }
        Ok(())
    }

    async fn guarded<Fut>(&self, body: Fut) -> Result<(), EngineError>
    where
        Fut: Future<Output = Result<(), EngineError>>,
    {
        match body.await {
            Ok(()) => Ok(self.device.sync().await?),
            Err(err) => {
                if let Err(release_err) = self.release_all().await {
                    warn!(error = %release_err, "lifting touch points after failure failed");
                }
                Err(err)
            }
        }
    }
}
