//! Step Execution
//!
//! Runs a single flow step: resolves its action, renders its input,
//! derives the step deadline and drives the retry loop. Every attempt goes
//! through [`invoke_guarded`], so a raising or panicking handler counts as
//! a 500 failure and is retried like any other.

use std::thread;
use std::time::{Duration, Instant};

use log::{debug, info, warn};

use super::invoker::invoke_guarded;
use crate::config::EngineConfig;
use crate::context::{earliest, ExecutionContext, ScopeWrites};
use crate::error::EngineError;
use crate::monitoring::{EventType, FlowEvent};
use crate::workflow::model::{ActionKind, ActionSpec, FlowStep, StepResult};
use crate::workflow::registry::ActionRegistry;

/// Looks up a step's action and enforces auth containment against its flow.
pub fn resolve_step_action<'r>(
    parent: &ActionSpec,
    step: &FlowStep,
    registry: &'r ActionRegistry,
) -> Result<&'r ActionSpec, EngineError> {
    let action = registry
        .get(&step.uses)
        .ok_or_else(|| EngineError::UnknownStepAction {
            flow: parent.name.clone(),
            step: step.id.clone(),
            action: step.uses.clone(),
        })?;

    if action.auth > parent.auth {
        return Err(EngineError::AuthEscalation {
            flow: parent.name.clone(),
            action: action.name.clone(),
            action_auth: action.auth,
            flow_auth: parent.auth,
        });
    }

    Ok(action)
}

/// Deadline for a step: the parent's, tightened by `timeout_s` if set.
///
/// A timeout too large to represent as an instant imposes no deadline.
pub fn step_deadline(parent: Option<Instant>, timeout_s: Option<u64>) -> Option<Instant> {
    let own = timeout_s.and_then(|secs| Instant::now().checked_add(Duration::from_secs(secs)));
    earliest(parent, own)
}

/// A finished step: its result and, for a `flow` action, the scope the
/// nested flow left behind.
#[derive(Debug)]
pub struct StepRun {
    pub result: StepResult,
    pub writes: Option<ScopeWrites>,
}

/// Delay before the retry following `attempt` (0-based).
///
/// Exponential backoff with random jitter, capped by the configuration and
/// by the time left before the deadline.
pub fn retry_delay(config: &EngineConfig, attempt: u32, remaining: Option<Duration>) -> Duration {
    let base = config.backoff(attempt);
    let spread = config.jitter.max(0.0) * rand::random::<f64>();
    let delay = (base + base.mul_f64(spread)).min(config.retry_cap);
    match remaining {
        Some(remaining) => delay.min(remaining),
        None => delay,
    }
}

/// Executes one step against `ctx` and returns its result.
///
/// `ctx` is the context the step reads from: the live flow context for
/// sequential steps, a group snapshot for parallel ones. Transport failures
/// and handler panics are folded into the returned result; configuration
/// errors abort.
pub fn run_step(
    parent: &ActionSpec,
    step: &FlowStep,
    ctx: &ExecutionContext,
) -> Result<StepRun, EngineError> {
    let action = resolve_step_action(parent, step, ctx.registry())?;
    let flow = parent.name.as_str();

    let input = match &step.input {
        Some(template) => ctx.render(template),
        None => ctx.input.clone(),
    };
    let mut child = ctx
        .child(input, step_deadline(ctx.deadline(), step.timeout_s))
        .called_from(format!("{}.{}", flow, step.id));
    let nested = matches!(action.kind, ActionKind::Flow(_));
    let finish = |child: ExecutionContext, result: StepResult| StepRun {
        result,
        writes: nested.then(|| child.into_writes()),
    };

    info!("Starting step: {}.{}", flow, step.id);
    ctx.emit(FlowEvent::new(flow, &step.id, EventType::Started));

    let mut attempt: u32 = 0;
    loop {
        if child.is_expired() {
            warn!("Step '{}.{}' timed out before attempt {}", flow, step.id, attempt + 1);
            ctx.emit(FlowEvent::new(flow, &step.id, EventType::TimedOut));
            return Ok(finish(child, StepResult::timeout()));
        }

        let result = match invoke_guarded(action, &mut child) {
            Ok(result) => result,
            Err(EngineError::Action(err)) => {
                warn!("Step '{}.{}' attempt {} raised: {}", flow, step.id, attempt + 1, err);
                StepResult::error(err.status(), err.to_string())
            }
            Err(err) => return Err(err),
        };

        if result.ok {
            info!("Step '{}.{}' completed (status {})", flow, step.id, result.status);
            ctx.emit(
                FlowEvent::new(flow, &step.id, EventType::Completed)
                    .with_detail(result.status.to_string()),
            );
            return Ok(finish(child, result));
        }

        if attempt >= step.retries {
            let result = if child.is_expired() {
                StepResult::timeout()
            } else {
                result
            };
            let event_type = if result.is_timeout() {
                EventType::TimedOut
            } else {
                EventType::Failed
            };
            warn!(
                "Step '{}.{}' failed after {} attempt(s) (status {})",
                flow,
                step.id,
                attempt + 1,
                result.status
            );
            ctx.emit(
                FlowEvent::new(flow, &step.id, event_type).with_detail(result.status.to_string()),
            );
            return Ok(finish(child, result));
        }

        let delay = retry_delay(ctx.config(), attempt, child.remaining());
        debug!(
            "Retrying step '{}.{}' in {} ms (status {})",
            flow,
            step.id,
            delay.as_millis(),
            result.status
        );
        ctx.emit(
            FlowEvent::new(flow, &step.id, EventType::Retrying)
                .with_detail(format!("attempt {}", attempt + 1)),
        );
        thread::sleep(delay);
        attempt += 1;
    }
}
