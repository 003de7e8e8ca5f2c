use thiserror::Error;
use uase_core_types::{EngineError, ErrorKind};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SamplerError {
    #[error("histogram {0} has no samples")]
    Empty(String),

    #[error("histogram {0} did not receive any sample in time")]
    Missing(String),

    #[error("cannot diff histogram {name}: {reason}")]
    Mismatch { name: String, reason: String },

    #[error("histogram source failed: {0}")]
    Source(String),

    #[error("invalid metric: {0}")]
    InvalidMetric(String),

    #[error("failed to write results: {0}")]
    Io(String),
}

impl SamplerError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, SamplerError::Source(_))
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            SamplerError::Empty(_) => ErrorKind::Assertion,
            SamplerError::Missing(_) => ErrorKind::Timeout,
            SamplerError::InvalidMetric(_) => ErrorKind::Precondition,
            SamplerError::Mismatch { .. } | SamplerError::Source(_) | SamplerError::Io(_) => {
                ErrorKind::Driver
            }
        }
    }
}

impl From<SamplerError> for EngineError {
    fn from(err: SamplerError) -> Self {
        EngineError::new(err.kind(), err.to_string())
    }
}

impl From<std::io::Error> for SamplerError {
    fn from(err: std::io::Error) -> Self {
        SamplerError::Io(err.to_string())
    }
}
