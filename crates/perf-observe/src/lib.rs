//! Histogram recording windows and performance value export.

pub mod errors;
pub mod histogram;
pub mod perf;
pub mod sampler;

pub use errors::*;
pub use histogram::*;
pub use perf::*;
pub use sampler::*;
