//! UI automation scenario engine
//!
//! Runs declarative scenario descriptors against a live desktop session:
//! finders locate accessibility-tree nodes, input drivers act on them, the
//! runtime scopes every acquired resource and records histogram metrics.
//!
//! The building blocks live in the workspace crates and are re-exported here:
//! - [`uase_core_types`]: errors, geometry and ids
//! - [`action_primitives`]: context, polling and input drivers
//! - [`action_locator`]: finders and the locator
//! - [`action_flow`]: actions and combinators
//! - [`perf_observe`]: histogram sampling and results files

pub mod config;
pub mod descriptor;
pub mod engine;
pub mod logging;
pub mod ports;
pub mod resources;
pub mod runtime;
pub mod session;
pub mod ui_mode;

pub use action_flow;
pub use action_locator;
pub use action_primitives;
pub use perf_observe;
pub use uase_core_types;

pub use config::EngineConfig;
pub use descriptor::{Descriptor, DescriptorError};
pub use engine::{Engine, EngineBuilder};
pub use ports::{DisplayInfo, SessionInfo, ShellPort, TelemetryPort};
pub use runtime::{Outcome, Scenario, ScenarioReport, ScenarioRuntime, ScenarioState};
pub use session::Session;
pub use ui_mode::UiActionHandler;
