use std::sync::Arc;

use parking_lot::RwLock;

use crate::errors::DriverError;
use crate::primitives::{Keyboard, Mouse, Touch, Trackpad};

/// Drivers acquired for one scenario run.
///
/// Slots are filled while resources are acquired and emptied by their
/// cleanup; actions built before acquisition look drivers up when they run.
#[derive(Default)]
pub struct DriverSet {
    keyboard: RwLock<Option<Arc<Keyboard>>>,
    mouse: RwLock<Option<Arc<Mouse>>>,
    touch: RwLock<Option<Arc<Touch>>>,
    trackpad: RwLock<Option<Arc<Trackpad>>>,
}

impl DriverSet {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn keyboard(&self) -> Result<Arc<Keyboard>, DriverError> {
        self.keyboard
            .read()
            .clone()
            .ok_or(DriverError::NotAcquired("keyboard"))
    }

    pub fn mouse(&self) -> Result<Arc<Mouse>, DriverError> {
        self.mouse
            .read()
            .clone()
            .ok_or(DriverError::NotAcquired("mouse"))
    }

    pub fn touch(&self) -> Result<Arc<Touch>, DriverError> {
        self.touch
            .read()
            .clone()
            .ok_or(DriverError::NotAcquired("touchscreen"))
    }

    pub fn trackpad(&self) -> Result<Arc<Trackpad>, DriverError> {
        self.trackpad
            .read()
            .clone()
            .ok_or(DriverError::NotAcquired("trackpad"))
    }

    pub fn set_keyboard(&self, keyboard: Option<Arc<Keyboard>>) {
        *self.keyboard.write() = keyboard;
    }

    pub fn set_mouse(&self, mouse: Option<Arc<Mouse>>) {
        *self.mouse.write() = mouse;
    }

    pub fn set_touch(&self, touch: Option<Arc<Touch>>) {
        *self.touch.write() = touch;
    }

    pub fn set_trackpad(&self, trackpad: Option<Arc<Trackpad>>) {
        *self.trackpad.write() = trackpad;
    }
}
