//! Condition polling shared by every wait in the engine

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::trace;
use uase_core_types::{EngineError, ErrorKind};

use crate::types::{earliest, ExecCtx};

/// Interval between predicate invocations unless overridden.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Polling configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollOptions {
    /// Delay between two predicate invocations
    pub interval: Duration,

    /// Upper bound for the whole poll; the context deadline applies when absent
    pub timeout: Option<Duration>,
}

impl Default for PollOptions {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            timeout: None,
        }
    }
}

impl PollOptions {
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout: Some(timeout),
            ..Self::default()
        }
    }

    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Failure outcome of one predicate invocation.
#[derive(Debug, Clone)]
pub enum PollError {
    /// Keep polling
    Transient(EngineError),
    /// Abandon polling and surface the error as is
    Break(EngineError),
}

impl PollError {
    pub fn into_inner(self) -> EngineError {
        match self {
            PollError::Transient(err) | PollError::Break(err) => err,
        }
    }
}

impl From<EngineError> for PollError {
    fn from(err: EngineError) -> Self {
        if err.kind().is_transient() {
            PollError::Transient(err)
        } else {
            PollError::Break(err)
        }
    }
}

/// Invokes `predicate` until it succeeds, breaks, or the deadline passes.
///
/// The predicate runs at least once, even when the deadline has already
/// passed. Cancellation is observed while sleeping and while the predicate is
/// in flight and wins over timeout. A timeout error carries the last transient
/// failure as its cause.
pub async fn poll<T, F, Fut>(
    ctx: &ExecCtx,
    opts: PollOptions,
    mut predicate: F,
) -> Result<T, EngineError>
where
    F: FnMut(ExecCtx) -> Fut,
    Fut: Future<Output = Result<T, PollError>>,
{
    if ctx.is_cancelled() {
        return Err(EngineError::cancelled("polling cancelled before start"));
    }

    let started = Instant::now();
    let deadline = earliest(ctx.deadline, opts.timeout.map(|timeout| started + timeout));
    let base = ctx.child();

    let mut attempts: u32 = 0;
    let mut last: Option<EngineError> = None;

    loop {
        attempts += 1;
        // An attempt may run one interval past the deadline so that a zero
        // budget still gets one complete invocation.
        let grace = remaining(deadline).map(|rem| rem.max(opts.interval));
        let mut attempt_ctx = base.clone();
        attempt_ctx.deadline = grace.map(|grace| Instant::now() + grace);
        let outcome = tokio::select! {
            biased;
            _ = ctx.cancel_token.cancelled() => {
                return Err(cancelled_error(last));
            }
            res = predicate(attempt_ctx) => res,
            _ = tokio::time::sleep(grace.unwrap_or(Duration::MAX)) => Err(PollError::Transient(EngineError::timeout(
                "predicate did not finish before the deadline",
            ))),
        };

        match outcome {
            Ok(value) => return Ok(value),
            Err(PollError::Break(err)) => return Err(err),
            Err(PollError::Transient(err)) => {
                trace!(attempt = attempts, error = %err, "poll attempt failed");
                last = Some(err);
            }
        }

        let nap = match remaining(deadline) {
            Some(rem) if rem.is_zero() => {
                return Err(timeout_error(started.elapsed(), attempts, last));
            }
            Some(rem) => opts.interval.min(rem),
            None => opts.interval,
        };

        tokio::select! {
            biased;
            _ = ctx.cancel_token.cancelled() => {
                return Err(cancelled_error(last));
            }
            _ = tokio::time::sleep(nap) => {}
        }
    }
}

fn remaining(deadline: Option<Instant>) -> Option<Duration> {
    deadline.map(|deadline| deadline.saturating_duration_since(Instant::now()))
}

fn timeout_error(elapsed: Duration, attempts: u32, last: Option<EngineError>) -> EngineError {
    let err = EngineError::timeout(format!(
        "condition not met within {:?} after {} attempts",
        elapsed, attempts
    ));
    match last {
        Some(cause) => err.with_cause(cause),
        None => err,
    }
}

fn cancelled_error(last: Option<EngineError>) -> EngineError {
    let err = EngineError::cancelled("polling cancelled");
    match last {
        Some(cause) if cause.kind() != ErrorKind::Cancelled => err.with_cause(cause),
        _ => err,
    }
}
