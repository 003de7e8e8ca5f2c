//! Actions and their combinators
//!
//! An [`Action`] is a cloneable value wrapping one unit of scenario work.
//! Labels attached with [`named`] or [`combine`] are prepended to failures
//! as they propagate, so a failing sub-step of `combine("open menu", ..)`
//! surfaces as `open menu: <sub-step>: <message>` with its kind untouched.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;
use tracing::{debug, warn};
use uase_core_types::{EngineError, ErrorKind};

use action_primitives::{poll, ExecCtx, PollError, PollOptions};

/// Message of the error `retry_until` wraps around the last unmet condition.
pub const CONDITION_NOT_MET: &str = "action has been done but condition is not met";

type ActionFn = dyn Fn(ExecCtx) -> BoxFuture<'static, Result<(), EngineError>> + Send + Sync;

/// One unit of scenario work.
#[derive(Clone)]
pub struct Action {
    label: Option<String>,
    body: Arc<ActionFn>,
}

impl Action {
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: Fn(ExecCtx) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), EngineError>> + Send + 'static,
    {
        Self {
            label: None,
            body: Arc::new(move |ctx| f(ctx).boxed()),
        }
    }

    /// Shorthand for `named(label, Action::new(f))`.
    pub fn named<F, Fut>(label: impl Into<String>, f: F) -> Self
    where
        F: Fn(ExecCtx) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), EngineError>> + Send + 'static,
    {
        Self::new(f).with_label(label)
    }

    /// An action that does nothing.
    pub fn noop() -> Self {
        Self::new(|_| async { Ok(()) })
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    /// Attaches `label`; an already labelled action is wrapped so both labels survive.
    pub fn with_label(self, label: impl Into<String>) -> Self {
        let label = label.into();
        if self.label.is_none() {
            return Self {
                label: Some(label),
                body: self.body,
            };
        }
        let inner = self;
        Self {
            label: Some(label),
            body: Arc::new(move |ctx| {
                let inner = inner.clone();
                async move { inner.run(&ctx).await }.boxed()
            }),
        }
    }

    /// Runs the action, prefixing failures with its label.
    pub async fn run(&self, ctx: &ExecCtx) -> Result<(), EngineError> {
        match (self.body)(ctx.clone()).await {
            Ok(()) => Ok(()),
            Err(err) => Err(match &self.label {
                Some(label) => err.with_label(label.clone()),
                None => err,
            }),
        }
    }
}

impl fmt::Debug for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Action").field("label", &self.label).finish()
    }
}

/// Gives `action` a name used in logs and error labels.
pub fn named(label: impl Into<String>, action: Action) -> Action {
    action.with_label(label)
}

/// Runs `actions` in order, stopping at the first failure.
///
/// The context is checked before every sub-action, so cancellation between
/// two sub-actions aborts before the second one starts.
pub fn combine(label: impl Into<String>, actions: impl IntoIterator<Item = Action>) -> Action {
    let label = label.into();
    let actions: Arc<[Action]> = actions.into_iter().collect();
    let log_label = label.clone();
    Action::named(label, move |ctx| {
        let actions = actions.clone();
        let label = log_label.clone();
        async move {
            for (index, action) in actions.iter().enumerate() {
                ctx.check()?;
                debug!(
                    action_id = %ctx.action_id,
                    combined = %label,
                    index,
                    step = action.label().unwrap_or("-"),
                    "running combined step"
                );
                action.run(&ctx).await?;
            }
            Ok(())
        }
    })
}

/// Runs `action` until `condition` succeeds.
///
/// The action runs once, then after one poll interval the condition is
/// checked; each time it is still unmet the action runs again. `Driver`,
/// `Cancelled` and `Precondition` failures end the loop immediately.
pub fn retry_until(action: Action, condition: Action, opts: PollOptions) -> Action {
    Action::new(move |ctx| {
        let action = action.clone();
        let condition = condition.clone();
        async move {
            action.run(&ctx).await.map_err(|err| {
                EngineError::new(err.kind(), "failed to initially do action").with_cause(err)
            })?;
            ctx.sleep(opts.interval).await?;
            poll(&ctx, opts, |attempt| {
                let action = action.clone();
                let condition = condition.clone();
                async move {
                    let unmet = match condition.run(&attempt).await {
                        Ok(()) => return Ok(()),
                        Err(err) => err,
                    };
                    if let Err(err) = action.run(&attempt).await {
                        let err = EngineError::new(err.kind(), "failed to do action").with_cause(err);
                        return Err(PollError::from(err));
                    }
                    Err(PollError::from(
                        EngineError::new(unmet.kind(), CONDITION_NOT_MET).with_cause(unmet),
                    ))
                }
            })
            .await
        }
    })
}

/// Runs `then` only if `probe` succeeds.
///
/// A probe failing with `NotFound` anywhere in its cause chain (including a
/// wait that timed out on `NotFound`) is swallowed; other probe failures and
/// any failure of `then` propagate.
pub fn if_success_then(probe: Action, then: Option<Action>) -> Action {
    Action::new(move |ctx| {
        let probe = probe.clone();
        let then = then.clone();
        async move {
            match probe.run(&ctx).await {
                Ok(()) => match then {
                    Some(then) => then.run(&ctx).await,
                    None => Ok(()),
                },
                Err(err) if err.is(ErrorKind::NotFound) && !err.is_cancelled() => {
                    debug!(action_id = %ctx.action_id, error = %err, "probe failed, skipping action");
                    Ok(())
                }
                Err(err) => Err(err),
            }
        }
    })
}

/// Sleeps for `duration`. Prefer a condition wait whenever there is a signal to wait for.
pub fn sleep(duration: Duration) -> Action {
    Action::new(move |ctx| async move { ctx.sleep(duration).await })
}

/// Runs `action` up to `attempts` times, sleeping `interval` between attempts.
///
/// Earlier failures are logged; the last one is returned. Cancellation is
/// never retried.
pub fn retry(attempts: u32, action: Action, interval: Duration) -> Action {
    Action::new(move |ctx| {
        let action = action.clone();
        async move {
            let attempts = attempts.max(1);
            let mut attempt = 1;
            loop {
                match action.run(&ctx).await {
                    Ok(()) => return Ok(()),
                    Err(err) if err.is_cancelled() || attempt >= attempts => return Err(err),
                    Err(err) => {
                        warn!(action_id = %ctx.action_id, attempt, error = %err, "action failed, retrying");
                    }
                }
                attempt += 1;
                if !interval.is_zero() {
                    ctx.sleep(interval).await?;
                }
            }
        }
    })
}

/// Runs `action` `times` times in a row.
pub fn repeat(times: u32, action: Action) -> Action {
    Action::new(move |ctx| {
        let action = action.clone();
        async move {
            for _ in 0..times {
                ctx.check()?;
                action.run(&ctx).await?;
            }
            Ok(())
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;

    fn recorder() -> Arc<Mutex<Vec<&'static str>>> {
        Arc::new(Mutex::new(Vec::new()))
    }

    fn record(log: &Arc<Mutex<Vec<&'static str>>>, name: &'static str) -> Action {
        let log = log.clone();
        Action::named(name, move |_| {
            let log = log.clone();
            async move {
                log.lock().push(name);
                Ok(())
            }
        })
    }

    fn fail(name: &'static str, kind: ErrorKind) -> Action {
        Action::named(name, move |_| async move { Err(EngineError::new(kind, "no such node")) })
    }

    #[tokio::test]
    async fn combine_short_circuits_and_labels() {
        let log = recorder();
        let open_menu = combine(
            "open menu",
            vec![
                record(&log, "clickA"),
                fail("waitB", ErrorKind::NotFound),
                record(&log, "clickC"),
            ],
        );
        let err = open_menu.run(&ExecCtx::background()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(err.label(), "open menu: waitB");
        assert_eq!(*log.lock(), vec!["clickA"]);
    }

    #[tokio::test]
    async fn nested_combine_runs_in_order() {
        let log = recorder();
        let inner = combine("inner", vec![record(&log, "a"), record(&log, "b")]);
        let outer = combine("outer", vec![inner, record(&log, "c")]);
        outer.run(&ExecCtx::background()).await.unwrap();
        assert_eq!(*log.lock(), vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn cancellation_between_steps_stops_the_sequence() {
        let log = recorder();
        let ctx = ExecCtx::background();
        let canceller = ctx.clone();
        let cancel = Action::new(move |_| {
            let canceller = canceller.clone();
            async move {
                canceller.cancel();
                Ok(())
            }
        });
        let seq = combine("seq", vec![cancel, record(&log, "second")]);
        let err = seq.run(&ctx).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Cancelled);
        assert!(log.lock().is_empty());
    }

    #[tokio::test]
    async fn relabelling_keeps_both_labels() {
        let action = named("outer", fail("inner", ErrorKind::Assertion));
        let err = action.run(&ExecCtx::background()).await.unwrap_err();
        assert_eq!(err.label(), "outer: inner");
    }

    #[tokio::test]
    async fn if_success_then_swallows_not_found_only() {
        let log = recorder();
        let skipped = if_success_then(fail("probe", ErrorKind::NotFound), Some(record(&log, "then")));
        skipped.run(&ExecCtx::background()).await.unwrap();
        assert!(log.lock().is_empty());

        let timed_out = Action::new(|_| async {
            Err(EngineError::timeout("gave up").with_cause(EngineError::not_found("dialog")))
        });
        if_success_then(timed_out, None)
            .run(&ExecCtx::background())
            .await
            .unwrap();

        let broken = if_success_then(fail("probe", ErrorKind::Driver), Some(record(&log, "then")));
        let err = broken.run(&ExecCtx::background()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Driver);

        let ran = if_success_then(Action::noop(), Some(record(&log, "then")));
        ran.run(&ExecCtx::background()).await.unwrap();
        assert_eq!(*log.lock(), vec!["then"]);
    }

    #[tokio::test(start_paused = true)]
    async fn retry_until_reruns_action_until_condition_holds() {
        let clicks = Arc::new(Mutex::new(0u32));
        let counter = clicks.clone();
        let click = Action::new(move |_| {
            let counter = counter.clone();
            async move {
                *counter.lock() += 1;
                Ok(())
            }
        });
        let seen = clicks.clone();
        let opened = Action::new(move |_| {
            let seen = seen.clone();
            async move {
                if *seen.lock() >= 3 {
                    Ok(())
                } else {
                    Err(EngineError::not_found("menu not open"))
                }
            }
        });
        retry_until(click, opened, PollOptions::with_timeout(Duration::from_secs(5)))
            .run(&ExecCtx::background())
            .await
            .unwrap();
        assert_eq!(*clicks.lock(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn retry_until_reports_unmet_condition() {
        let err = retry_until(
            Action::noop(),
            fail("opened", ErrorKind::NotFound),
            PollOptions::with_timeout(Duration::from_millis(500)),
        )
        .run(&ExecCtx::background())
        .await
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Timeout);
        let cause = err.cause().unwrap();
        assert_eq!(cause.message(), CONDITION_NOT_MET);
        assert!(err.is(ErrorKind::NotFound));
    }

    #[tokio::test(start_paused = true)]
    async fn retry_until_breaks_on_driver_failure() {
        let calls = Arc::new(Mutex::new(0u32));
        let counter = calls.clone();
        let flaky = Action::new(move |_| {
            let counter = counter.clone();
            async move {
                let mut n = counter.lock();
                *n += 1;
                if *n > 1 {
                    Err(EngineError::driver("device gone"))
                } else {
                    Ok(())
                }
            }
        });
        let err = retry_until(
            flaky,
            fail("opened", ErrorKind::NotFound),
            PollOptions::with_timeout(Duration::from_secs(10)),
        )
        .run(&ExecCtx::background())
        .await
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Driver);
        assert_eq!(*calls.lock(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn retry_returns_last_error() {
        let calls = Arc::new(Mutex::new(0u32));
        let counter = calls.clone();
        let always = Action::new(move |_| {
            let counter = counter.clone();
            async move {
                *counter.lock() += 1;
                Err(EngineError::stale("moved"))
            }
        });
        let err = retry(3, always, Duration::from_millis(100))
            .run(&ExecCtx::background())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Stale);
        assert_eq!(*calls.lock(), 3);
    }

    #[test]
    fn repeat_runs_n_times() {
        let log = recorder();
        tokio_test::block_on(repeat(3, record(&log, "tap")).run(&ExecCtx::background())).unwrap();
        assert_eq!(log.lock().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn sleep_respects_deadline() {
        let ctx = ExecCtx::with_timeout(Duration::from_millis(50));
        let err = sleep(Duration::from_secs(1)).run(&ctx).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Timeout);
    }
}
