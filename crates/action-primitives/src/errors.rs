//! Error types for input drivers

use thiserror::Error;
use uase_core_types::EngineError;

/// Failures raised by the input device layer.
#[derive(Debug, Error, Clone)]
pub enum DriverError {
    /// Device could not be opened
    #[error("failed to open {device}: {reason}")]
    Open { device: &'static str, reason: String },

    /// Writing an event to the device failed
    #[error("failed to write {device} event: {reason}")]
    Write { device: &'static str, reason: String },

    /// Device was already closed
    #[error("{0} device is closed")]
    Closed(&'static str),

    /// Accelerator or key name could not be resolved
    #[error("invalid key or accelerator: {0}")]
    InvalidKey(String),

    /// Character has no key on the active layout
    #[error("character {0:?} cannot be typed on this layout")]
    Untypeable(char),

    /// Coordinates outside the display
    #[error("point {0} lies outside the display")]
    OutOfBounds(String),

    /// A driver that was required for this step has not been acquired
    #[error("{0} has not been acquired for this scenario")]
    NotAcquired(&'static str),
}

impl DriverError {
    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(self, DriverError::Write { .. })
    }
}

impl From<DriverError> for EngineError {
    fn from(err: DriverError) -> Self {
        match err {
            DriverError::NotAcquired(_) => EngineError::precondition(err.to_string()),
            _ => EngineError::driver(err.to_string()),
        }
    }
}
