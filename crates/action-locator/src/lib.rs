//! Action Locator - accessibility-tree node lookup
//!
//! This crate turns declarative node descriptions into live answers:
//! - `Finder` values composed by conjunction, scoping and ordinals
//! - query compilation for the automation evaluator
//! - `NodeSnapshot` decoding of returned node info
//! - `Locator` with existence, location and count waits built on `poll`

pub mod errors;
pub mod finder;
pub mod ports;
pub mod query;
pub mod resolver;
pub mod snapshot;

pub use errors::*;
pub use finder::*;
pub use ports::*;
pub use query::*;
pub use resolver::*;
pub use snapshot::*;
