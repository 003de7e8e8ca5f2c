//! Evaluator port - runs expressions in the automation context

use async_trait::async_trait;
use serde_json::Value;
use uase_core_types::EngineError;

use action_primitives::{poll, ExecCtx, PollError, PollOptions};

use crate::errors::EvalError;

/// Executes script expressions against the live accessibility tree.
///
/// Implementations resolve promises before returning and report thrown
/// exceptions as [`EvalError::Exception`] with the thrown message intact.
#[async_trait]
pub trait Evaluator: Send + Sync {
    async fn eval(&self, ctx: &ExecCtx, expression: &str) -> Result<Value, EvalError>;

    /// Calls `function` (an expression evaluating to a function) with `args`.
    async fn call(&self, ctx: &ExecCtx, function: &str, args: &[Value])
        -> Result<Value, EvalError>;

    /// Polls `expression` until it evaluates to `true`.
    ///
    /// Thrown exceptions count as "not yet"; transport failures end the wait.
    async fn wait_for_expr(
        &self,
        ctx: &ExecCtx,
        expression: &str,
        opts: PollOptions,
    ) -> Result<(), EngineError> {
        poll(ctx, opts, move |attempt| async move {
            match self.eval(&attempt, expression).await {
                Ok(Value::Bool(true)) => Ok(()),
                Ok(other) => Err(PollError::Transient(EngineError::assertion(format!(
                    "{} evaluated to {}",
                    expression, other
                )))),
                Err(err @ EvalError::Exception(_)) => {
                    Err(PollError::Transient(EngineError::assertion(err.to_string())))
                }
                Err(err) => Err(PollError::Break(err.into())),
            }
        })
        .await
    }
}
