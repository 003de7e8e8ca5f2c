//! Engine-wide error taxonomy.
//!
//! Every failure the engine surfaces is an [`EngineError`]. Its [`ErrorKind`] is
//! fixed when the error is created; wrapping prepends step labels and attaches
//! the scenario name or finder text, but the kind of the original failure stays
//! reachable through [`EngineError::is`].

use std::fmt;

use thiserror::Error;

/// Semantic classification of a failure.
#[cfg_attr(feature = "serde-full", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum ErrorKind {
    /// A finder produced zero matches within the window.
    NotFound,
    /// A finder required uniqueness but matched several nodes.
    Ambiguous,
    /// A node disappeared or moved between resolve and use.
    Stale,
    /// Deadline exceeded.
    Timeout,
    /// Parent cancellation.
    Cancelled,
    /// A required invariant was false before the work started.
    Precondition,
    /// Input, metric or session transport failure.
    Driver,
    /// A test-visible expectation failed.
    Assertion,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::NotFound => "not_found",
            ErrorKind::Ambiguous => "ambiguous",
            ErrorKind::Stale => "stale",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::Precondition => "precondition",
            ErrorKind::Driver => "driver",
            ErrorKind::Assertion => "assertion",
        }
    }

    /// Kinds a polling loop keeps retrying on.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ErrorKind::NotFound
                | ErrorKind::Ambiguous
                | ErrorKind::Stale
                | ErrorKind::Timeout
                | ErrorKind::Assertion
        )
    }

    /// Get error severity level (0=low, 1=medium, 2=high, 3=critical)
    pub fn severity(&self) -> u8 {
        match self {
            ErrorKind::Driver | ErrorKind::Precondition => 3,
            ErrorKind::Assertion | ErrorKind::Timeout => 2,
            ErrorKind::NotFound | ErrorKind::Ambiguous | ErrorKind::Stale => 1,
            ErrorKind::Cancelled => 0,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A classified failure with its context and causal chain.
#[derive(Clone, Debug)]
pub struct EngineError {
    kind: ErrorKind,
    message: String,
    scenario: Option<String>,
    labels: Vec<String>,
    finder: Option<String>,
    cause: Option<Box<EngineError>>,
    suppressed: Vec<EngineError>,
}

pub type EngineResult<T> = Result<T, EngineError>;

impl EngineError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            scenario: None,
            labels: Vec::new(),
            finder: None,
            cause: None,
            suppressed: Vec::new(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    pub fn ambiguous(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Ambiguous, message)
    }

    pub fn stale(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Stale, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Timeout, message)
    }

    pub fn cancelled(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Cancelled, message)
    }

    pub fn precondition(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Precondition, message)
    }

    pub fn driver(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Driver, message)
    }

    pub fn assertion(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Assertion, message)
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn scenario(&self) -> Option<&str> {
        self.scenario.as_deref()
    }

    /// Label path, outermost first.
    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    /// Label path joined the way it is shown to people, e.g. `open menu: waitB`.
    pub fn label(&self) -> String {
        self.labels.join(": ")
    }

    /// Outermost label, which the runtime sets to the failing step name.
    pub fn step(&self) -> Option<&str> {
        self.labels.first().map(String::as_str)
    }

    /// Finder text attached closest to the failure.
    pub fn finder(&self) -> Option<&str> {
        self.finder
            .as_deref()
            .or_else(|| self.cause.as_ref().and_then(|cause| cause.finder()))
    }

    pub fn cause(&self) -> Option<&EngineError> {
        self.cause.as_deref()
    }

    /// Errors raised after this one (cleanup failures) that did not replace it.
    pub fn suppressed(&self) -> &[EngineError] {
        &self.suppressed
    }

    /// Prepends a label to the label path.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.labels.insert(0, label.into());
        self
    }

    /// Sets the scenario name unless one is already present.
    pub fn with_scenario(mut self, scenario: impl Into<String>) -> Self {
        if self.scenario.is_none() {
            self.scenario = Some(scenario.into());
        }
        self
    }

    /// Sets the finder text unless one is already present.
    pub fn with_finder(mut self, finder: impl Into<String>) -> Self {
        if self.finder.is_none() {
            self.finder = Some(finder.into());
        }
        self
    }

    pub fn with_cause(mut self, cause: EngineError) -> Self {
        self.cause = Some(Box::new(cause));
        self
    }

    pub fn with_suppressed(mut self, err: EngineError) -> Self {
        self.suppressed.push(err);
        self
    }

    /// Iterates over this error and its causes, outermost first.
    pub fn chain(&self) -> impl Iterator<Item = &EngineError> {
        std::iter::successors(Some(self), |err| err.cause())
    }

    pub fn root_cause(&self) -> &EngineError {
        self.chain().last().unwrap_or(self)
    }

    /// True when this error or any of its causes carries `kind`.
    pub fn is(&self, kind: ErrorKind) -> bool {
        self.chain().any(|err| err.kind == kind)
    }

    pub fn is_cancelled(&self) -> bool {
        self.kind == ErrorKind::Cancelled
    }
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for label in &self.labels {
            write!(f, "{}: ", label)?;
        }
        f.write_str(&self.message)?;
        if let Some(cause) = &self.cause {
            write!(f, ": {}", cause)?;
        }
        Ok(())
    }
}

impl std::error::Error for EngineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.cause
            .as_deref()
            .map(|cause| cause as &(dyn std::error::Error + 'static))
    }
}

/// Failure to parse one of the shared value types from text.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseValueError {
    #[error("unknown ui mode: {0}")]
    UiMode(String),
    #[error("unsupported rotation: {0}")]
    Rotation(String),
}

impl From<ParseValueError> for EngineError {
    fn from(err: ParseValueError) -> Self {
        EngineError::precondition(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn wrapping_keeps_the_original_kind() {
        let err = EngineError::not_found("failed to find node")
            .with_label("waitB")
            .with_label("open menu");
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(err.label(), "open menu: waitB");
        assert_eq!(err.step(), Some("open menu"));
        assert_eq!(err.to_string(), "open menu: waitB: failed to find node");
    }

    #[test]
    fn is_walks_the_cause_chain() {
        let err = EngineError::timeout("condition not met")
            .with_cause(EngineError::not_found("no node").with_finder("{role: button}"));
        assert!(err.is(ErrorKind::Timeout));
        assert!(err.is(ErrorKind::NotFound));
        assert!(!err.is(ErrorKind::Driver));
        assert_eq!(err.finder(), Some("{role: button}"));
        assert_eq!(err.root_cause().message(), "no node");
        assert_eq!(err.chain().count(), 2);
    }

    #[test]
    fn scenario_and_finder_are_set_once() {
        let err = EngineError::assertion("boom")
            .with_scenario("inner")
            .with_scenario("outer")
            .with_finder("a")
            .with_finder("b");
        assert_eq!(err.scenario(), Some("inner"));
        assert_eq!(err.finder(), Some("a"));
    }

    #[test]
    fn transient_kinds() {
        assert!(ErrorKind::NotFound.is_transient());
        assert!(ErrorKind::Stale.is_transient());
        assert!(!ErrorKind::Driver.is_transient());
        assert!(!ErrorKind::Cancelled.is_transient());
        assert!(!ErrorKind::Precondition.is_transient());
    }
}
