//! Mouse driver - moves, clicks, drags and wheel

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, warn};
use uase_core_types::{EngineError, Point};

use super::{steps_for, DEFAULT_STEP_INTERVAL};
use crate::ports::{MouseBtn, PointerDevice, PointerEvent};
use crate::types::ExecCtx;

pub struct Mouse {
    device: Arc<dyn PointerDevice>,
    position: Mutex<Option<Point>>,
    pressed: Mutex<Vec<MouseBtn>>,
    step_interval: Duration,
}

impl Mouse {
    pub fn new(device: Arc<dyn PointerDevice>) -> Self {
        Self {
            device,
            position: Mutex::new(None),
            pressed: Mutex::new(Vec::new()),
            step_interval: DEFAULT_STEP_INTERVAL,
        }
    }

    pub fn with_step_interval(mut self, interval: Duration) -> Self {
        self.step_interval = interval;
        self
    }

    /// Last position written, if any.
    pub fn position(&self) -> Option<Point> {
        *self.position.lock()
    }

    /// Moves the pointer to `to`, interpolating over `duration`.
    pub async fn move_to(
        &self,
        ctx: &ExecCtx,
        to: Point,
        duration: Duration,
    ) -> Result<(), EngineError> {
        self.guarded(self.move_inner(ctx, to, duration)).await
    }

    pub async fn click(&self, ctx: &ExecCtx, at: Point) -> Result<(), EngineError> {
        self.click_button(ctx, at, MouseBtn::Left, 1).await
    }

    pub async fn double_click(&self, ctx: &ExecCtx, at: Point) -> Result<(), EngineError> {
        self.click_button(ctx, at, MouseBtn::Left, 2).await
    }

    pub async fn right_click(&self, ctx: &ExecCtx, at: Point) -> Result<(), EngineError> {
        self.click_button(ctx, at, MouseBtn::Right, 1).await
    }

    pub async fn click_button(
        &self,
        ctx: &ExecCtx,
        at: Point,
        button: MouseBtn,
        count: u8,
    ) -> Result<(), EngineError> {
        debug!(action_id = %ctx.action_id, point = %at, ?button, count, "mouse click");
        self.guarded(async {
            self.move_inner(ctx, at, Duration::ZERO).await?;
            for _ in 0..count.max(1) {
                ctx.check()?;
                self.press_inner(button).await?;
                self.release_inner(button).await?;
            }
            Ok(())
        })
        .await
    }

    /// Presses `button` at `start`, moves to `end` over `duration`, releases.
    pub async fn drag(
        &self,
        ctx: &ExecCtx,
        start: Point,
        end: Point,
        duration: Duration,
    ) -> Result<(), EngineError> {
        debug!(action_id = %ctx.action_id, from = %start, to = %end, "mouse drag");
        self.guarded(async {
            self.move_inner(ctx, start, Duration::ZERO).await?;
            self.press_inner(MouseBtn::Left).await?;
            self.move_inner(ctx, end, duration).await?;
            self.release_inner(MouseBtn::Left).await
        })
        .await
    }

    pub async fn press(&self, ctx: &ExecCtx, button: MouseBtn) -> Result<(), EngineError> {
        ctx.check()?;
        self.guarded(self.press_inner(button)).await
    }

    pub async fn release(&self, ctx: &ExecCtx, button: MouseBtn) -> Result<(), EngineError> {
        ctx.check()?;
        self.guarded(self.release_inner(button)).await
    }

    /// Scrolls `ticks` wheel notches, one every `interval`. Positive scrolls down.
    pub async fn wheel(
        &self,
        ctx: &ExecCtx,
        ticks: i32,
        interval: Duration,
    ) -> Result<(), EngineError> {
        let step = ticks.signum();
        self.guarded(async {
            for i in 0..ticks.unsigned_abs() {
                if i > 0 {
                    ctx.sleep(interval).await?;
                } else {
                    ctx.check()?;
                }
                self.device.write(PointerEvent::Wheel(step)).await?;
            }
            Ok(())
        })
        .await
    }

    /// Releases pressed buttons without consulting any context.
    pub async fn release_all(&self) -> Result<(), EngineError> {
        let pressed: Vec<MouseBtn> = self.pressed.lock().drain(..).collect();
        let mut first_err: Option<EngineError> = None;
        for button in pressed {
            if let Err(err) = self.device.write(PointerEvent::Release(button)).await {
                warn!(?button, error = %err, "failed to release mouse button");
                first_err.get_or_insert(err.into());
            }
        }
        if let Err(err) = self.device.sync().await {
            first_err.get_or_insert(err.into());
        }
        first_err.map_or(Ok(()), Err)
    }

    pub async fn close(&self) -> Result<(), EngineError> {
        let released = self.release_all().await;
        self.device.close().await?;
        released
    }

    async fn move_inner(
        &self,
        ctx: &ExecCtx,
        to: Point,
        duration: Duration,
    ) -> Result<(), EngineError> {
        ctx.check()?;
        let from = self.position().unwrap_or(to);
        if duration.is_zero() || from == to {
            return self.write_move(to).await;
        }
        let steps = steps_for(duration, self.step_interval);
        let pause = duration / steps;
        for i in 1..=steps {
            ctx.sleep(pause).await?;
            self.write_move(from.lerp(to, f64::from(i) / f64::from(steps)))
                .await?;
        }
        Ok(())
    }

    async fn write_move(&self, to: Point) -> Result<(), EngineError> {
        self.device.write(PointerEvent::Move(to)).await?;
        *self.position.lock() = Some(to);
        Ok(())
    }

    async fn press_inner(&self, button: MouseBtn) -> Result<(), EngineError> {
        self.device.write(PointerEvent::Press(button)).await?;
        self.pressed.lock().push(button);
        Ok(())
    }

    async fn release_inner(&self, button: MouseBtn) -> Result<(), EngineError> {
        self.device.write(PointerEvent::Release(button)).await?;
        self.pressed.lock().retain(|b| *b != button);
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
                    warn!(error = %release_err, "releasing mouse buttons after failure failed");
                }
                Err(err)
            }
        }
    }
}
