//! Action Invocation
//!
//! Dispatches an action to the code that executes its kind:
//! - `value` actions render their constant result against the context
//! - `flow` actions run a nested flow orchestrator
//! - every other kind goes to the [`ActionHandler`] registered for it
//!
//! Handlers are the collaborator boundary for outbound kinds (HTTP calls,
//! model calls, row storage). They must be safe to call concurrently and
//! should honor the context deadline, e.g. through
//! [`ExecutionContext::clamp_timeout`].

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

use log::{debug, error};
use serde_json::Value;

use super::flow::execute_flow;
use crate::context::ExecutionContext;
use crate::error::{ActionError, EngineError};
use crate::workflow::model::{ActionKind, ActionSpec, StepResult, ValueAction};

/// Executes actions of one external kind.
pub trait ActionHandler: Send + Sync {
    /// Invokes `action` with its rendered `input`.
    ///
    /// `ctx` is the derived context of the invocation; its deadline is the
    /// one the handler should respect. Failures are reported as
    /// [`ActionError`] and are retried by the calling step.
    fn invoke(
        &self,
        action: &ActionSpec,
        input: &Value,
        ctx: &ExecutionContext,
    ) -> Result<StepResult, ActionError>;
}

/// Handler backed by a closure; see [`handler_fn`].
pub struct FnHandler<F>(F);

/// Wraps a closure as an [`ActionHandler`].
///
/// # Example
///
/// ```
/// use serde_json::json;
/// use stepflow::execution::handler_fn;
/// use stepflow::workflow::{ActionRegistry, StepResult};
///
/// let registry = ActionRegistry::new().with_handler(
///     "echo",
///     handler_fn(|_, input, _| Ok(StepResult::success(json!({ "echo": input })))),
/// );
/// assert!(registry.handler("echo").is_some());
/// ```
pub fn handler_fn<F>(f: F) -> FnHandler<F>
where
    F: Fn(&ActionSpec, &Value, &ExecutionContext) -> Result<StepResult, ActionError> + Send + Sync,
{
    FnHandler(f)
}

impl<F> ActionHandler for FnHandler<F>
where
    F: Fn(&ActionSpec, &Value, &ExecutionContext) -> Result<StepResult, ActionError> + Send + Sync,
{
    fn invoke(
        &self,
        action: &ActionSpec,
        input: &Value,
        ctx: &ExecutionContext,
    ) -> Result<StepResult, ActionError> {
        (self.0)(action, input, ctx)
    }
}

/// Invokes an action against `ctx`, whose `input` is the action input.
///
/// Configuration problems (unknown kinds, nested flow violations) come
/// back as configuration [`EngineError`]s; handler failures come back as
/// [`EngineError::Action`]. A `flow` action runs directly on `ctx`, so its
/// `vars` and `steps` writes are left there for the caller.
pub fn invoke_action(action: &ActionSpec, ctx: &mut ExecutionContext) -> Result<StepResult, EngineError> {
    debug!(
        "Invoking action '{}' (kind: {}, depth: {})",
        action.name,
        action.kind.name(),
        ctx.depth()
    );

    match &action.kind {
        ActionKind::Value(value) => Ok(render_value_action(value, ctx)),
        ActionKind::Flow(flow) => execute_flow(action, flow, ctx),
        ActionKind::External { kind, .. } => {
            let handler = ctx
                .registry()
                .handler(kind)
                .ok_or_else(|| EngineError::UnknownKind {
                    kind: kind.clone(),
                    action: action.name.clone(),
                })?;
            Ok(handler.invoke(action, &ctx.input, ctx)?)
        }
    }
}

/// [`invoke_action`], with a panicking handler reported as [`ActionError::Failed`].
pub fn invoke_guarded(action: &ActionSpec, ctx: &mut ExecutionContext) -> Result<StepResult, EngineError> {
    panic::catch_unwind(AssertUnwindSafe(|| invoke_action(action, ctx))).unwrap_or_else(|payload| {
        let reason = panic_message(payload.as_ref());
        error!("Action '{}' panicked: {}", action.name, reason);
        Err(ActionError::Failed(format!("action '{}' panicked: {}", action.name, reason)).into())
    })
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

fn render_value_action(value: &ValueAction, ctx: &ExecutionContext) -> StepResult {
    StepResult {
        ok: value.ok,
        status: value.status,
        data: ctx.render(&value.data),
        skipped: false,
    }
}
