//! Locator - finder resolution and condition waits over an [`Evaluator`]

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::Value;
use tokio::time::Instant;
use tracing::{debug, info};
use uase_core_types::{EngineError, ErrorKind, Rect};

use action_primitives::{poll, ExecCtx, PollError, PollOptions};

use crate::errors::LocatorError;
use crate::finder::{Finder, Ordinal};
use crate::ports::Evaluator;
use crate::query::{compile, NodeAction, QueryMode};
use crate::snapshot::NodeSnapshot;

/// Wait budget used when neither the caller nor the context gives one.
pub const DEFAULT_WAIT_TIMEOUT: Duration = Duration::from_secs(15);

/// Resolves finders against the live tree.
///
/// Cheap to clone; clones share the evaluator.
#[derive(Clone)]
pub struct Locator {
    evaluator: Arc<dyn Evaluator>,
    poll: PollOptions,
}

impl Locator {
    pub fn new(evaluator: Arc<dyn Evaluator>) -> Self {
        Self {
            evaluator,
            poll: PollOptions::with_timeout(DEFAULT_WAIT_TIMEOUT),
        }
    }

    /// Interval and default timeout for every wait of this locator.
    pub fn with_poll_options(mut self, poll: PollOptions) -> Self {
        self.poll = poll;
        self
    }

    pub fn poll_options(&self) -> PollOptions {
        self.poll
    }

    pub fn evaluator(&self) -> &Arc<dyn Evaluator> {
        &self.evaluator
    }

    /// Whether the finder currently matches; an unresolvable scope counts as absent.
    pub async fn exists(&self, ctx: &ExecCtx, finder: &Finder) -> Result<bool, EngineError> {
        let count = self.count(ctx, finder).await?;
        Ok(match finder.ordinal() {
            Some(Ordinal::Nth(n)) => count > n,
            _ => count > 0,
        })
    }

    /// Number of nodes matching the finder's predicates inside its scope.
    pub async fn count(&self, ctx: &ExecCtx, finder: &Finder) -> Result<usize, EngineError> {
        match self.query(ctx, finder, QueryMode::Count).await {
            Ok(value) => value.as_u64().map(|n| n as usize).ok_or_else(|| {
                let err: EngineError =
                    LocatorError::Decode(format!("expected a node count, got {}", value)).into();
                err.with_finder(finder.pretty())
            }),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(0),
            Err(err) => Err(err),
        }
    }

    /// Info of the single node the finder selects.
    pub async fn info(&self, ctx: &ExecCtx, finder: &Finder) -> Result<NodeSnapshot, EngineError> {
        let value = self.query(ctx, finder, QueryMode::Single).await?;
        NodeSnapshot::decode(value).map_err(|err| self.fail(err, finder))
    }

    /// Info of every matching node, in tree order.
    pub async fn nodes_info(
        &self,
        ctx: &ExecCtx,
        finder: &Finder,
    ) -> Result<Vec<NodeSnapshot>, EngineError> {
        let value = self.query(ctx, finder, QueryMode::All).await?;
        NodeSnapshot::decode_all(value).map_err(|err| self.fail(err, finder))
    }

    pub async fn wait_until_exists(
        &self,
        ctx: &ExecCtx,
        finder: &Finder,
        timeout: Option<Duration>,
    ) -> Result<(), EngineError> {
        debug!(action_id = %ctx.action_id, finder = %finder, "waiting for node");
        poll(ctx, self.wait_options(timeout), move |attempt| async move {
            if self.exists(&attempt, finder).await? {
                Ok(())
            } else {
                Err(PollError::Transient(
                    LocatorError::NotFound(finder.pretty()).into(),
                ))
            }
        })
        .await
        .map_err(|err| err.with_finder(finder.pretty()))
    }

    pub async fn wait_until_gone(
        &self,
        ctx: &ExecCtx,
        finder: &Finder,
        timeout: Option<Duration>,
    ) -> Result<(), EngineError> {
        debug!(action_id = %ctx.action_id, finder = %finder, "waiting for node to go away");
        poll(ctx, self.wait_options(timeout), move |attempt| async move {
            if self.exists(&attempt, finder).await? {
                Err(PollError::Transient(EngineError::assertion(format!(
                    "node still present: {}",
                    finder.pretty()
                ))))
            } else {
                Ok(())
            }
        })
        .await
        .map_err(|err| err.with_finder(finder.pretty()))
    }

    /// Waits until two consecutive observations report the same bounds.
    pub async fn wait_for_location(
        &self,
        ctx: &ExecCtx,
        finder: &Finder,
        timeout: Option<Duration>,
    ) -> Result<(), EngineError> {
        self.stable_location(ctx, finder, timeout).await.map(|_| ())
    }

    /// Bounds of the node once it stopped moving.
    pub async fn location(&self, ctx: &ExecCtx, finder: &Finder) -> Result<Rect, EngineError> {
        self.stable_location(ctx, finder, None).await
    }

    /// Bounds of the node right now, moving or not.
    pub async fn immediate_location(
        &self,
        ctx: &ExecCtx,
        finder: &Finder,
    ) -> Result<Rect, EngineError> {
        Ok(self.info(ctx, finder).await?.bounds())
    }

    /// Fails with `Assertion` if the node shows up at any point during `duration`.
    pub async fn ensure_gone_for(
        &self,
        ctx: &ExecCtx,
        finder: &Finder,
        duration: Duration,
    ) -> Result<(), EngineError> {
        let end = Instant::now() + duration;
        loop {
            if self.exists(ctx, finder).await? {
                return Err(EngineError::assertion(format!(
                    "node appeared within {:?}: {}",
                    duration,
                    finder.pretty()
                ))
                .with_finder(finder.pretty()));
            }
            let now = Instant::now();
            if now >= end {
                return Ok(());
            }
            ctx.sleep(self.poll.interval.min(end - now)).await?;
        }
    }

    pub async fn wait_until_count(
        &self,
        ctx: &ExecCtx,
        finder: &Finder,
        expected: usize,
        timeout: Option<Duration>,
    ) -> Result<(), EngineError> {
        poll(ctx, self.wait_options(timeout), move |attempt| async move {
            let found = self.count(&attempt, finder).await?;
            if found == expected {
                Ok(())
            } else {
                Err(PollError::Transient(EngineError::assertion(format!(
                    "found {} nodes, want {}",
                    found, expected
                ))))
            }
        })
        .await
        .map_err(|err| err.with_finder(finder.pretty()))
    }

    pub async fn invoke(
        &self,
        ctx: &ExecCtx,
        finder: &Finder,
        action: NodeAction,
    ) -> Result<(), EngineError> {
        info!(action_id = %ctx.action_id, finder = %finder, method = action.method(), "invoking node action");
        self.query(ctx, finder, QueryMode::Invoke(action))
            .await
            .map(|_| ())
    }

    pub async fn do_default(&self, ctx: &ExecCtx, finder: &Finder) -> Result<(), EngineError> {
        self.invoke(ctx, finder, NodeAction::DoDefault).await
    }

    pub async fn focus(&self, ctx: &ExecCtx, finder: &Finder) -> Result<(), EngineError> {
        self.invoke(ctx, finder, NodeAction::Focus).await
    }

    pub async fn make_visible(&self, ctx: &ExecCtx, finder: &Finder) -> Result<(), EngineError> {
        self.invoke(ctx, finder, NodeAction::MakeVisible).await
    }

    async fn stable_location(
        &self,
        ctx: &ExecCtx,
        finder: &Finder,
        timeout: Option<Duration>,
    ) -> Result<Rect, EngineError> {
        debug!(action_id = %ctx.action_id, finder = %finder, "waiting for node location");
        let previous: Mutex<Option<Rect>> = Mutex::new(None);
        let previous = &previous;
        poll(ctx, self.wait_options(timeout), move |attempt| async move {
            match self.info(&attempt, finder).await {
                Ok(node) => {
                    let bounds = node.bounds();
                    if previous.lock().replace(bounds) == Some(bounds) {
                        Ok(bounds)
                    } else {
                        Err(PollError::Transient(EngineError::stale(format!(
                            "location still changing, last seen {}",
                            bounds
                        ))))
                    }
                }
                Err(err) => {
                    let seen = previous.lock().take().is_some();
                    if seen && err.kind() == ErrorKind::NotFound {
                        let stale: EngineError = LocatorError::Stale(finder.pretty()).into();
                        Err(PollError::Transient(stale.with_cause(err)))
                    } else {
                        Err(err.into())
                    }
                }
            }
        })
        .await
        .map_err(|err| err.with_finder(finder.pretty()))
    }

    async fn query(
        &self,
        ctx: &ExecCtx,
        finder: &Finder,
        mode: QueryMode,
    ) -> Result<Value, EngineError> {
        let expression = compile(finder, mode).map_err(|err| self.fail(err, finder))?;
        ctx.run(async {
            self.evaluator
                .eval(ctx, &expression)
                .await
                .map_err(|err| self.fail(err.into_locator_error(&finder.pretty()), finder))
        })
        .await
    }

    fn wait_options(&self, timeout: Option<Duration>) -> PollOptions {
        match timeout {
            Some(timeout) => self.poll.timeout(timeout),
            None => self.poll,
        }
    }

    fn fail(&self, err: LocatorError, finder: &Finder) -> EngineError {
        EngineError::from(err).with_finder(finder.pretty())
    }
}
