//! Execution context carried by every engine operation

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use uase_core_types::{ActionId, EngineError};

/// Execution context for engine operations
///
/// Carries the deadline and the cancellation signal. Derived contexts share
/// cancellation with their parent through child tokens, so cancelling the
/// harness context reaches every in-flight wait.
#[derive(Clone, Debug)]
pub struct ExecCtx {
    /// Deadline for this operation; `None` means unbounded
    pub deadline: Option<Instant>,

    /// Cancellation token for cooperative cancellation
    pub cancel_token: CancellationToken,

    /// Unique identifier used to correlate log lines
    pub action_id: ActionId,
}

impl ExecCtx {
    pub fn new(deadline: Option<Instant>, cancel_token: CancellationToken) -> Self {
        Self {
            deadline,
            cancel_token,
            action_id: ActionId::new(),
        }
    }

    /// Unbounded context with a fresh cancellation token.
    pub fn background() -> Self {
        Self::new(None, CancellationToken::new())
    }

    /// Root context that expires `timeout` from now.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self::new(Some(Instant::now() + timeout), CancellationToken::new())
    }

    /// Derived context with the same deadline and a child cancellation token.
    pub fn child(&self) -> Self {
        Self {
            deadline: self.deadline,
            cancel_token: self.cancel_token.child_token(),
            action_id: ActionId::new(),
        }
    }

    /// Derived context whose deadline is the earlier of the parent's and `timeout` from now.
    pub fn child_with_timeout(&self, timeout: Duration) -> Self {
        let mut child = self.child();
        child.deadline = earliest(self.deadline, Some(Instant::now() + timeout));
        child
    }

    /// Derived context with the deadline moved `reserve` earlier.
    ///
    /// Used to keep time for cleanup: work runs under the shortened context
    /// while cleanup keeps the original one.
    pub fn shorten(&self, reserve: Duration) -> Self {
        let mut child = self.child();
        child.deadline = self.deadline.map(|deadline| {
            deadline
                .checked_sub(reserve)
                .map(|shortened| shortened.max(Instant::now()))
                .unwrap_or_else(Instant::now)
        });
        child
    }

    /// Context for draining cleanup.
    ///
    /// Not linked to this context's cancellation. The deadline is the parent's,
    /// extended so that at least `minimum` remains.
    pub fn cleanup_ctx(&self, minimum: Duration) -> Self {
        let floor = Instant::now() + minimum;
        Self {
            deadline: self.deadline.map(|deadline| deadline.max(floor)),
            cancel_token: CancellationToken::new(),
            action_id: ActionId::new(),
        }
    }

    /// Check if this context has been cancelled
    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }

    /// Check if this context has exceeded its deadline
    pub fn is_timeout(&self) -> bool {
        self.deadline
            .map(|deadline| Instant::now() >= deadline)
            .unwrap_or(false)
    }

    /// Get remaining time until deadline
    pub fn remaining_time(&self) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    /// Fails with `Cancelled` or `Timeout`; cancellation wins when both hold.
    pub fn check(&self) -> Result<(), EngineError> {
        if self.is_cancelled() {
            return Err(EngineError::cancelled("context cancelled"));
        }
        if self.is_timeout() {
            return Err(EngineError::timeout("context deadline exceeded"));
        }
        Ok(())
    }

    /// Sleeps for `duration`, waking early on cancellation or deadline.
    pub async fn sleep(&self, duration: Duration) -> Result<(), EngineError> {
        self.check()?;
        let (nap, truncated) = match self.remaining_time() {
            Some(remaining) if remaining < duration => (remaining, true),
            _ => (duration, false),
        };
        tokio::select! {
            biased;
            _ = self.cancel_token.cancelled() => Err(EngineError::cancelled("context cancelled during sleep")),
            _ = tokio::time::sleep(nap) => {
                if truncated {
                    Err(EngineError::timeout(format!(
                        "context deadline exceeded while sleeping for {:?}",
                        duration
                    )))
                } else {
                    Ok(())
                }
            }
        }
    }

    /// Runs `fut` bounded by this context's cancellation and deadline.
    pub async fn run<T, F>(&self, fut: F) -> Result<T, EngineError>
    where
        F: Future<Output = Result<T, EngineError>>,
    {
        self.check()?;
        tokio::select! {
            biased;
            _ = self.cancel_token.cancelled() => Err(EngineError::cancelled("context cancelled")),
            _ = deadline_elapsed(self.deadline) => Err(EngineError::timeout("context deadline exceeded")),
            res = fut => res,
        }
    }
}

/// Resolves when `deadline` passes; never resolves for `None`.
pub(crate) async fn deadline_elapsed(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending::<()>().await,
    }
}

pub(crate) fn earliest(a: Option<Instant>, b: Option<Instant>) -> Option<Instant> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, None) => a,
        (None, b) => b,
    }
}
