//! Flow Orchestration
//!
//! Walks a flow's planned segments in declared order:
//! - Sequential steps are gated and run against the live context, and
//!   their writes are committed before the next gate is evaluated. A
//!   nested flow run this way writes through to the live `vars`/`steps`
//! - Parallel groups are gated against a snapshot taken before the group,
//!   run fork-join on scoped threads, then merged in declared order; only
//!   each member's own result and `set` reach the live context
//!
//! After each commit the step's `set` clause is applied and `on_error`
//! decides whether the flow goes on.

use std::thread;

use log::{error, info, warn};
use serde_json::Value;

use super::step::{resolve_step_action, run_step};
use crate::context::ExecutionContext;
use crate::error::EngineError;
use crate::monitoring::{EventType, FlowEvent};
use crate::workflow::model::{ActionSpec, FlowSpec, FlowStep, StepResult};
use crate::workflow::planner::{plan_segments, Segment};

/// Deepest allowed flow nesting; the root invocation is depth 0.
pub const MAX_FLOW_DEPTH: usize = 24;

/// Runs the flow action `parent` with configuration `flow` in `ctx`.
///
/// Step results and `set` values are written into `ctx`. Returns the
/// flow's result, or a configuration error that aborts the whole
/// invocation (recursion limit, unknown step action, auth escalation,
/// missing handler).
pub fn execute_flow(
    parent: &ActionSpec,
    flow: &FlowSpec,
    ctx: &mut ExecutionContext,
) -> Result<StepResult, EngineError> {
    if ctx.depth() > MAX_FLOW_DEPTH {
        error!("Flow '{}' nested too deep (depth {})", parent.name, ctx.depth());
        return Err(EngineError::RecursionLimit {
            flow: parent.name.clone(),
            depth: ctx.depth(),
            limit: MAX_FLOW_DEPTH,
        });
    }

    // Every referenced action must exist and be within the flow's privilege,
    // including steps that end up gated out.
    for step in &flow.steps {
        resolve_step_action(parent, step, ctx.registry())?;
    }

    info!(
        "Running flow '{}' ({} steps, depth {})",
        parent.name,
        flow.len(),
        ctx.depth()
    );
    ctx.emit(FlowEvent::flow(&parent.name, EventType::FlowStarted));

    if let Some(initial) = &flow.vars {
        if let Value::Object(vars) = ctx.render(initial) {
            for (name, value) in vars {
                if !name.is_empty() {
                    ctx.set_var(name, value);
                }
            }
        }
    }

    let result = run_segments(parent, flow, ctx)?;

    info!(
        "Flow '{}' finished: ok={} status={}",
        parent.name, result.ok, result.status
    );
    ctx.emit(
        FlowEvent::flow(&parent.name, EventType::FlowFinished)
            .with_detail(result.status.to_string()),
    );
    Ok(result)
}

fn run_segments(
    parent: &ActionSpec,
    flow: &FlowSpec,
    ctx: &mut ExecutionContext,
) -> Result<StepResult, EngineError> {
    let mut last: Option<StepResult> = None;

    for segment in plan_segments(&flow.steps) {
        match segment {
            Segment::Sequential(index) => {
                let step = &flow.steps[index];
                let result = if gate_open(step, ctx) {
                    let run = run_step(parent, step, ctx)?;
                    if let Some(writes) = run.writes {
                        ctx.absorb(writes);
                    }
                    run.result
                } else {
                    skip(parent, step, ctx)
                };
                if let Some(failure) = commit(step, result, ctx, &mut last) {
                    return Ok(failure);
                }
            }
            Segment::Parallel { start, end } => {
                let group = &flow.steps[start..end];
                let results = run_parallel(parent, group, ctx)?;
                for (step, result) in group.iter().zip(results) {
                    if let Some(failure) = commit(step, result, ctx, &mut last) {
                        return Ok(failure);
                    }
                }
            }
        }
    }

    Ok(match &flow.return_step {
        Some(id) => ctx.steps.get(id).cloned().unwrap_or_else(|| {
            warn!("Flow '{}' return_step '{}' has no result", parent.name, id);
            StepResult::error(500, "flow return_step missing")
        }),
        None => last.unwrap_or_else(StepResult::empty),
    })
}

/// Runs a parallel group and returns one result per step, in declared order.
///
/// Gates are evaluated against a snapshot taken before any member runs, and
/// every member reads that same snapshot, so siblings never see each
/// other's writes. Writes made inside a nested flow member are dropped.
/// Handler panics are already caught per attempt; the join check only
/// covers a panic in the engine itself.
fn run_parallel(
    parent: &ActionSpec,
    group: &[FlowStep],
    ctx: &ExecutionContext,
) -> Result<Vec<StepResult>, EngineError> {
    let snapshot = ctx.clone();
    let snapshot = &snapshot;
    let runnable: Vec<bool> = group.iter().map(|step| gate_open(step, snapshot)).collect();
    info!(
        "Running parallel group of {} steps ({} gated out)",
        group.len(),
        runnable.iter().filter(|run| !**run).count()
    );

    let outcomes: Vec<Result<StepResult, EngineError>> = thread::scope(|scope| {
        let handles: Vec<_> = group
            .iter()
            .zip(&runnable)
            .map(|(step, run)| {
                if *run {
                    Some(scope.spawn(move || run_step(parent, step, snapshot).map(|run| run.result)))
                } else {
                    None
                }
            })
            .collect();

        handles
            .into_iter()
            .zip(group)
            .map(|(handle, step)| match handle {
                None => Ok(skip(parent, step, snapshot)),
                Some(handle) => handle.join().unwrap_or_else(|_| {
                    error!("Step '{}.{}' panicked", parent.name, step.id);
                    Ok(StepResult::error(500, format!("step '{}' panicked", step.id)))
                }),
            })
            .collect()
    });

    outcomes.into_iter().collect()
}

fn gate_open(step: &FlowStep, ctx: &ExecutionContext) -> bool {
    step.when.as_ref().map_or(true, |cond| cond.evaluate(ctx))
}

fn skip(parent: &ActionSpec, step: &FlowStep, ctx: &ExecutionContext) -> StepResult {
    info!("Skipping step '{}.{}': condition not met", parent.name, step.id);
    ctx.emit(FlowEvent::new(&parent.name, &step.id, EventType::Skipped));
    StepResult::skipped()
}

/// Records a step result, applies `set`, and returns the result if it ends the flow.
fn commit(
    step: &FlowStep,
    result: StepResult,
    ctx: &mut ExecutionContext,
    last: &mut Option<StepResult>,
) -> Option<StepResult> {
    ctx.record_step(&step.id, result.clone());
    apply_set(step, ctx);

    *last = Some(result.clone());
    if !result.ok && !step.continues_on_error() {
        Some(result)
    } else {
        None
    }
}

/// Publishes a step's `set` entries, rendered against the context as it now stands.
fn apply_set(step: &FlowStep, ctx: &mut ExecutionContext) {
    let Some(set) = &step.set else {
        return;
    };
    let rendered: Vec<(String, Value)> = set
        .iter()
        .filter(|(name, _)| !name.is_empty())
        .map(|(name, template)| (name.clone(), ctx.render(template)))
        .collect();
    for (name, value) in rendered {
        ctx.set_var(name, value);
    }
}
