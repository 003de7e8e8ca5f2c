//! Action Primitives - execution context, polling and input drivers
//!
//! This crate provides the low-level building blocks every scenario step uses:
//! - `ExecCtx` with deadline shortening and cooperative cancellation
//! - `poll`, the single condition-wait loop of the engine
//! - keyboard, mouse, touch and trackpad drivers over device ports
//! - accelerator parsing across keyboard layouts

pub mod drivers;
pub mod errors;
pub mod keys;
pub mod ports;
mod primitives;
pub mod types;
mod waiting;

pub use drivers::*;
pub use errors::*;
pub use keys::*;
pub use ports::*;
pub use primitives::*;
pub use types::*;
pub use waiting::*;
