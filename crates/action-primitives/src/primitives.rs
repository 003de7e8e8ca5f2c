//! Input drivers
//!
//! Four drivers sit on top of the device ports:
//! 1. keyboard - typing, accelerators, held keys
//! 2. mouse - moves, clicks, drags, wheel
//! 3. touch - taps, swipes, long presses, multi-finger paths
//! 4. trackpad - two-finger scroll and n-finger swipes
//!
//! Every sequence ends with a device sync, so a successful return means the
//! session has observed all events. A failed or cancelled sequence releases
//! whatever it left pressed before returning.

mod keyboard;
mod mouse;
mod touch;
mod trackpad;

pub use keyboard::*;
pub use mouse::*;
pub use touch::*;
pub use trackpad::*;

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Pause between interpolated move events.
pub const DEFAULT_STEP_INTERVAL: Duration = Duration::from_millis(16);

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SwipeDirection {
    Up,
    Down,
    Left,
    Right,
}

impl SwipeDirection {
    /// Unit vector in screen coordinates (y grows downwards).
    pub fn unit(&self) -> (i32, i32) {
        match self {
            SwipeDirection::Up => (0, -1),
            SwipeDirection::Down => (0, 1),
            SwipeDirection::Left => (-1, 0),
            SwipeDirection::Right => (1, 0),
        }
    }
}

/// Number of interpolation steps for a gesture lasting `duration`.
pub(crate) fn steps_for(duration: Duration, interval: Duration) -> u32 {
    if duration.is_zero() || interval.is_zero() {
        return 1;
    }
    let (total, step) = (duration.as_micros(), interval.as_micros());
    let steps = (total + step - 1) / step;
    steps.clamp(1, u32::MAX as u128) as u32
}
