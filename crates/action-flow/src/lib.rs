//! Flow Orchestration Layer
//!
//! Scenario steps are [`Action`] values composed with sequential, retrying
//! and conditional combinators. [`UiContext`] builds finder-driven actions
//! (clicks, waits, focus) on top of the locator and the input drivers.

pub mod action;
pub mod ui;

pub use action::{
    combine, if_success_then, named, repeat, retry, retry_until, sleep, Action,
    CONDITION_NOT_MET,
};
pub use ui::UiContext;
