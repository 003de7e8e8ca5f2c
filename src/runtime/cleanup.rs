use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::FutureExt;
use tracing::{debug, warn};
use uase_core_types::EngineError;

use action_primitives::ExecCtx;

/// Every cleanup entry gets at least this long, even after earlier entries
/// used up the cleanup deadline.
pub const CLEANUP_STEP_FLOOR: Duration = Duration::from_secs(1);

type CleanupFn = Box<dyn FnOnce(ExecCtx) -> BoxFuture<'static, Result<(), EngineError>> + Send>;

/// Release closure of one acquired resource.
pub struct Cleanup {
    label: String,
    run: CleanupFn,
}

impl Cleanup {
    pub fn new<F, Fut>(label: impl Into<String>, f: F) -> Self
    where
        F: FnOnce(ExecCtx) -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), EngineError>> + Send + 'static,
    {
        Self {
            label: label.into(),
            run: Box::new(move |ctx| f(ctx).boxed()),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }
}

impl std::fmt::Debug for Cleanup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cleanup").field("label", &self.label).finish()
    }
}

/// Something a scenario holds for its whole run.
#[async_trait]
pub trait Resource: Send + Sync {
    fn label(&self) -> String;

    /// Acquires the resource and hands back the closure releasing it.
    async fn acquire(&self, ctx: &ExecCtx) -> Result<Cleanup, EngineError>;
}

#[derive(Debug, Default)]
pub struct DrainOutcome {
    /// Labels in the order the entries ran.
    pub ran: Vec<String>,
    pub errors: Vec<EngineError>,
}

/// LIFO of release closures. Draining never stops at a failing entry.
#[derive(Debug, Default)]
pub struct CleanupStack {
    entries: Vec<Cleanup>,
}

impl CleanupStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, cleanup: Cleanup) {
        debug!(cleanup = %cleanup.label, depth = self.entries.len() + 1, "cleanup armed");
        self.entries.push(cleanup);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub async fn drain(&mut self, ctx: &ExecCtx) -> DrainOutcome {
        let mut outcome = DrainOutcome::default();
        while let Some(entry) = self.entries.pop() {
            let label = entry.label;
            let entry_ctx = ctx.cleanup_ctx(CLEANUP_STEP_FLOOR);
            let fut = (entry.run)(entry_ctx.clone());
            let result = match AssertUnwindSafe(entry_ctx.run(fut)).catch_unwind().await {
                Ok(result) => result,
                Err(payload) => Err(panic_error(payload)),
            };
            if let Err(err) = result {
                warn!(cleanup = %label, error = %err, "cleanup failed");
                outcome.errors.push(err.with_label(label.clone()));
            }
            outcome.ran.push(label);
        }
        outcome
    }
}

pub(crate) fn panic_error(payload: Box<dyn Any + Send>) -> EngineError {
    let message = if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    };
    EngineError::assertion(format!("panicked: {}", message))
}
