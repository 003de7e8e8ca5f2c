use std::sync::Arc;

use async_trait::async_trait;
use uase_core_types::{Point, Size};

use crate::errors::DriverError;
use crate::keys::KeyCode;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum KeyState {
    Down,
    Up,
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash)]
pub enum MouseBtn {
    #[default]
    Left,
    Middle,
    Right,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PointerEvent {
    Move(Point),
    Press(MouseBtn),
    Release(MouseBtn),
    /// Positive ticks scroll down.
    Wheel(i32),
}

/// One contact change in device coordinates. `slot` identifies the finger.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TouchEvent {
    Down { slot: u8, at: Point },
    Move { slot: u8, at: Point },
    Up { slot: u8 },
}

#[async_trait]
pub trait KeyboardDevice: Send + Sync {
    async fn write_key(&self, code: KeyCode, state: KeyState) -> Result<(), DriverError>;

    /// Returns once every written event has been delivered to the session.
    async fn sync(&self) -> Result<(), DriverError> {
        Ok(())
    }

    async fn close(&self) -> Result<(), DriverError>;
}

#[async_trait]
pub trait PointerDevice: Send + Sync {
    async fn write(&self, event: PointerEvent) -> Result<(), DriverError>;

    async fn sync(&self) -> Result<(), DriverError> {
        Ok(())
    }

    async fn close(&self) -> Result<(), DriverError>;
}

/// Touchscreens and trackpads. Events written in one call form one frame.
#[async_trait]
pub trait MultiTouchDevice: Send + Sync {
    /// Exclusive upper bound of device coordinates.
    fn range(&self) -> Size;

    async fn write_frame(&self, events: &[TouchEvent]) -> Result<(), DriverError>;

    async fn sync(&self) -> Result<(), DriverError> {
        Ok(())
    }

    async fn close(&self) -> Result<(), DriverError>;
}

/// Opens one handle per physical device category.
#[async_trait]
pub trait InputSubsystem: Send + Sync {
    async fn open_keyboard(&self) -> Result<Arc<dyn KeyboardDevice>, DriverError>;
    async fn open_mouse(&self) -> Result<Arc<dyn PointerDevice>, DriverError>;
    async fn open_touchscreen(&self) -> Result<Arc<dyn MultiTouchDevice>, DriverError>;
    async fn open_trackpad(&self) -> Result<Arc<dyn MultiTouchDevice>, DriverError>;
}
