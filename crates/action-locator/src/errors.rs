//! Error types for node lookup

use thiserror::Error;
use uase_core_types::{EngineError, ErrorKind};

/// Message prefix thrown by the query prelude when nothing matched.
pub const NOT_FOUND_MARKER: &str = "failed to find node with properties";

/// Message prefix thrown by the query prelude when a single-node query matched several nodes.
pub const AMBIGUOUS_MARKER: &str = "multiple nodes matched";

/// Locator error enumeration
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LocatorError {
    /// No node matched
    #[error("failed to find node with properties: {0}")]
    NotFound(String),

    /// More than one node matched a single-node query
    #[error("multiple nodes matched: {0}")]
    Ambiguous(String),

    /// A node observed earlier is no longer there
    #[error("node went away while being observed: {0}")]
    Stale(String),

    /// Finder cannot be compiled
    #[error("invalid finder: {0}")]
    InvalidFinder(String),

    /// Evaluator transport or script failure
    #[error("evaluator error: {0}")]
    Evaluator(String),

    /// Evaluator returned something that is not node info
    #[error("failed to decode node info: {0}")]
    Decode(String),
}

impl LocatorError {
    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            LocatorError::NotFound(_) | LocatorError::Ambiguous(_) | LocatorError::Stale(_)
        )
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            LocatorError::NotFound(_) => ErrorKind::NotFound,
            LocatorError::Ambiguous(_) => ErrorKind::Ambiguous,
            LocatorError::Stale(_) => ErrorKind::Stale,
            LocatorError::InvalidFinder(_) => ErrorKind::Precondition,
            LocatorError::Evaluator(_) | LocatorError::Decode(_) => ErrorKind::Driver,
        }
    }
}

/// Failure reported by an [`Evaluator`](crate::Evaluator).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EvalError {
    /// The expression threw
    #[error("expression threw: {0}")]
    Exception(String),

    /// The evaluator could not be reached
    #[error("evaluator transport failed: {0}")]
    Transport(String),
}

impl EvalError {
    /// Classifies a failed node query; `finder` is the pretty form of the finder queried.
    pub fn into_locator_error(self, finder: &str) -> LocatorError {
        match self {
            EvalError::Exception(msg) if msg.contains(NOT_FOUND_MARKER) => {
                LocatorError::NotFound(finder.to_string())
            }
            EvalError::Exception(msg) if msg.contains(AMBIGUOUS_MARKER) => {
                LocatorError::Ambiguous(finder.to_string())
            }
            other => LocatorError::Evaluator(other.to_string()),
        }
    }
}

impl From<EvalError> for EngineError {
    fn from(err: EvalError) -> Self {
        EngineError::driver(err.to_string())
    }
}

impl From<LocatorError> for EngineError {
    fn from(err: LocatorError) -> Self {
        EngineError::new(err.kind(), err.to_string())
    }
}
