//! Keyboard driver - typing, accelerators and held keys

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, warn};
use uase_core_types::EngineError;

use crate::keys::{Accelerator, KeyCode, KeyboardLayout};
use crate::ports::{KeyState, KeyboardDevice};
use crate::types::ExecCtx;

pub struct Keyboard {
    device: Arc<dyn KeyboardDevice>,
    layout: KeyboardLayout,
    held: Mutex<Vec<KeyCode>>,
    key_delay: Duration,
}

impl Keyboard {
    pub fn new(device: Arc<dyn KeyboardDevice>, layout: KeyboardLayout) -> Self {
        Self {
            device,
            layout,
            held: Mutex::new(Vec::new()),
            key_delay: Duration::ZERO,
        }
    }

    /// Pause between two typed characters.
    pub fn with_key_delay(mut self, delay: Duration) -> Self {
        self.key_delay = delay;
        self
    }

    pub fn layout(&self) -> &KeyboardLayout {
        &self.layout
    }

    /// Keys currently held down, in press order.
    pub fn held_keys(&self) -> Vec<KeyCode> {
        self.held.lock().clone()
    }

    /// Types `text` character by character.
    pub async fn type_text(&self, ctx: &ExecCtx, text: &str) -> Result<(), EngineError> {
        debug!(action_id = %ctx.action_id, chars = text.chars().count(), "typing text");
        let strokes = text
            .chars()
            .map(|c| self.layout.char_key(c))
            .collect::<Result<Vec<_>, _>>()?;

        self.guarded(async {
            for (idx, (code, shift)) in strokes.iter().enumerate() {
                ctx.check()?;
                if idx > 0 && !self.key_delay.is_zero() {
                    ctx.sleep(self.key_delay).await?;
                }
                if *shift {
                    self.down(KeyCode::LEFT_SHIFT).await?;
                }
                self.down(*code).await?;
                self.up(*code).await?;
                if *shift {
                    self.up(KeyCode::LEFT_SHIFT).await?;
                }
            }
            Ok(())
        })
        .await
    }

    /// Presses and releases an accelerator such as `Ctrl+Shift+Search`.
    pub async fn accel(&self, ctx: &ExecCtx, chord: &str) -> Result<(), EngineError> {
        self.accel_press_and_hold(ctx, chord, Duration::ZERO).await
    }

    /// Presses an accelerator, keeps it held for `hold`, then releases it.
    pub async fn accel_press_and_hold(
        &self,
        ctx: &ExecCtx,
        chord: &str,
        hold: Duration,
    ) -> Result<(), EngineError> {
        let accel = Accelerator::parse(chord, &self.layout)?;
        debug!(action_id = %ctx.action_id, chord, hold_ms = hold.as_millis() as u64, "sending accelerator");
        let sequence = accel.press_sequence();

        self.guarded(async {
            ctx.check()?;
            for code in &sequence {
                self.down(*code).await?;
            }
            if !hold.is_zero() {
                self.device.sync().await?;
                ctx.sleep(hold).await?;
            }
            for code in sequence.iter().rev() {
                self.up(*code).await?;
            }
            Ok(())
        })
        .await
    }

    /// Presses the keys of `chord` and leaves them held.
    pub async fn press_hold(&self, ctx: &ExecCtx, chord: &str) -> Result<(), EngineError> {
        let accel = Accelerator::parse(chord, &self.layout)?;
        self.guarded(async {
            ctx.check()?;
            for code in accel.press_sequence() {
                self.down(code).await?;
            }
            Ok(())
        })
        .await
    }

    /// Releases the keys of `chord` that are currently held.
    pub async fn release(&self, ctx: &ExecCtx, chord: &str) -> Result<(), EngineError> {
        let accel = Accelerator::parse(chord, &self.layout)?;
        self.guarded(async {
            ctx.check()?;
            for code in accel.press_sequence().into_iter().rev() {
                if self.held.lock().contains(&code) {
                    self.up(code).await?;
                }
            }
            Ok(())
        })
        .await
    }

    /// Releases every held key, latest first.
    ///
    /// Does not take a context: it runs on the way out of cancelled work.
    pub async fn release_all(&self) -> Result<(), EngineError> {
        let held: Vec<KeyCode> = self.held.lock().drain(..).rev().collect();
        if held.is_empty() {
            return Ok(());
        }
        debug!(count = held.len(), "releasing held keys");
        let mut first_err: Option<EngineError> = None;
        for code in held {
            if let Err(err) = self.device.write_key(code, KeyState::Up).await {
                warn!(key = %code, error = %err, "failed to release key");
                first_err.get_or_insert(err.into());
            }
        }
        if let Err(err) = self.device.sync().await {
            first_err.get_or_insert(err.into());
        }
        first_err.map_or(Ok(()), Err)
    }

    /// Releases held keys and closes the device.
    pub async fn close(&self) -> Result<(), EngineError> {
        let released = self.release_all().await;
        self.device.close().await?;
        released
    }

    async fn down(&self, code: KeyCode) -> Result<(), EngineError> {
        self.device.write_key(code, KeyState::Down).await?;
        self.held.lock().push(code);
        Ok(())
    }

    async fn up(&self, code: KeyCode) -> Result<(), EngineError> {
        self.device.write_key(code, KeyState::Up).await?;
        self.held.lock().retain(|held| *held != code);
        Ok(())
    }

    /// Syncs after `body` succeeds; releases held keys when it fails.
    async fn guarded<Fut>(&self, body: Fut) -> Result<(), EngineError>
    where
        Fut: Future<Output = Result<(), EngineError>>,
    {
        match body.await {
            Ok(()) => Ok(self.device.sync().await?),
            Err(err) => {
                if let Err(release_err) = self.release_all().await {
                    warn!(error = %release_err, "releasing keys after failure failed");
                }
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::DriverError;
    use async_trait::async_trait;
    use uase_core_types::ErrorKind;

    #[derive(Default)]
    struct RecordingKeyboard {
        events: Mutex<Vec<(KeyCode, KeyState)>>,
    }

    #[async_trait]
    impl KeyboardDevice for RecordingKeyboard {
        async fn write_key(&self, code: KeyCode, state: KeyState) -> Result<(), DriverError> {
            self.events.lock().push((code, state));
            Ok(())
        }

        async fn close(&self) -> Result<(), DriverError> {
            Ok(())
        }
    }

    fn keyboard() -> (Arc<RecordingKeyboard>, Keyboard) {
        let device = Arc::new(RecordingKeyboard::default());
        let kb = Keyboard::new(device.clone(), KeyboardLayout::default());
        (device, kb)
    }

    #[tokio::test]
    async fn accel_releases_in_reverse_order() {
        let (device, kb) = keyboard();
        kb.accel(&ExecCtx::background(), "Shift+Ctrl+Tab").await.unwrap();
        let events = device.events.lock().clone();
        assert_eq!(
            events,
            vec![
                (KeyCode::LEFT_CTRL, KeyState::Down),
                (KeyCode::LEFT_SHIFT, KeyState::Down),
                (KeyCode::TAB, KeyState::Down),
                (KeyCode::TAB, KeyState::Up),
                (KeyCode::LEFT_SHIFT, KeyState::Up),
                (KeyCode::LEFT_CTRL, KeyState::Up),
            ]
        );
        assert!(kb.held_keys().is_empty());
    }

    #[tokio::test]
    async fn cancelled_hold_releases_modifier() {
        let (device, kb) = keyboard();
        let ctx = ExecCtx::with_timeout(Duration::from_secs(30));
        let canceller = ctx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            canceller.cancel();
        });

        let err = kb
            .accel_press_and_hold(&ctx, "Alt", Duration::from_secs(10))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Cancelled);
        let events = device.events.lock().clone();
        assert_eq!(
            events,
            vec![
                (KeyCode::LEFT_ALT, KeyState::Down),
                (KeyCode::LEFT_ALT, KeyState::Up),
            ]
        );
        assert!(kb.held_keys().is_empty());
    }

    #[tokio::test]
    async fn press_hold_then_release() {
        let (device, kb) = keyboard();
        let ctx = ExecCtx::background();
        kb.press_hold(&ctx, "Alt+Tab").await.unwrap();
        assert_eq!(kb.held_keys(), vec![KeyCode::LEFT_ALT, KeyCode::TAB]);
        kb.release(&ctx, "Alt+Tab").await.unwrap();
        assert!(kb.held_keys().is_empty());
        let events = device.events.lock().clone();
        assert_eq!(events.last(), Some(&(KeyCode::LEFT_ALT, KeyState::Up)));
    }

    #[tokio::test]
    async fn types_uppercase_with_shift() {
        let (device, kb) = keyboard();
        kb.type_text(&ExecCtx::background(), "Hi").await.unwrap();
        let events = device.events.lock().clone();
        assert_eq!(events.len(), 6);
        assert_eq!(events[0], (KeyCode::LEFT_SHIFT, KeyState::Down));
        assert_eq!(events[3], (KeyCode::LEFT_SHIFT, KeyState::Up));
    }

    #[tokio::test]
    async fn untypeable_text_sends_nothing() {
        let (device, kb) = keyboard();
        let err = kb.type_text(&ExecCtx::background(), "héllo").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Driver);
        assert!(device.events.lock().is_empty());
    }
}
