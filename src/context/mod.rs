//! Execution Context
//!
//! The state visible to a flow and its steps: the invocation `input`,
//! `query` parameters, flow `vars`, prior `steps` results, nesting depth
//! and deadline. It also carries the shared registry, engine configuration
//! and event sink, so nothing is looked up through global state.
//!
//! Path roots available to conditions and templates are `input`, `query`,
//! `vars`, `steps`, `_flow_depth` and any key placed in `extra`.

pub mod path;
pub mod template;

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::{Map, Value};

use crate::config::EngineConfig;
use crate::monitoring::{EventSink, FlowEvent, LogSink};
use crate::workflow::model::StepResult;
use crate::workflow::registry::ActionRegistry;

pub use path::{resolve, Scope};
pub use template::{render, render_str, stringify};

/// Mutable state owned by one flow invocation.
///
/// Cloning produces an independent snapshot of `vars` and `steps`; the
/// shared handles are reference counted. A sequential nested flow hands its
/// final scope back through [`ExecutionContext::into_writes`] and
/// [`ExecutionContext::absorb`]; parallel members keep their snapshot.
#[derive(Clone)]
pub struct ExecutionContext {
    pub input: Value,
    pub query: BTreeMap<String, String>,
    pub vars: Map<String, Value>,
    pub steps: BTreeMap<String, StepResult>,
    /// Additional pass-through roots (e.g. `request`)
    pub extra: Map<String, Value>,
    depth: usize,
    deadline: Option<Instant>,
    /// `flow.step` chain of the steps that led to this invocation
    caller: Option<String>,
    registry: Arc<ActionRegistry>,
    config: Arc<EngineConfig>,
    sink: Arc<dyn EventSink>,
}

impl ExecutionContext {
    /// Creates a root context with default configuration and a [`LogSink`].
    pub fn new(registry: Arc<ActionRegistry>, input: Value) -> Self {
        Self {
            input,
            query: BTreeMap::new(),
            vars: Map::new(),
            steps: BTreeMap::new(),
            extra: Map::new(),
            depth: 0,
            deadline: None,
            caller: None,
            registry,
            config: Arc::new(EngineConfig::default()),
            sink: Arc::new(LogSink),
        }
    }

    pub fn with_config(mut self, config: Arc<EngineConfig>) -> Self {
        self.config = config;
        self
    }

    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn with_query(mut self, query: BTreeMap<String, String>) -> Self {
        self.query = query;
        self
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }

    /// Tightens the deadline; a later deadline than the current one is ignored.
    pub fn with_deadline(mut self, deadline: Option<Instant>) -> Self {
        self.deadline = earliest(self.deadline, deadline);
        self
    }

    /// Derives the context for a nested invocation.
    ///
    /// The child starts from copies of this context's `vars` and `steps`,
    /// one more level of depth, and a deadline no later than this one's.
    pub fn child(&self, input: Value, deadline: Option<Instant>) -> Self {
        let mut child = self.clone();
        child.input = input;
        child.depth = self.depth + 1;
        child.deadline = earliest(self.deadline, deadline);
        child
    }

    /// Appends `label` (usually `flow.step`) to the caller chain.
    pub fn called_from(mut self, label: impl AsRef<str>) -> Self {
        self.caller = Some(match self.caller.take() {
            Some(chain) => format!("{}/{}", chain, label.as_ref()),
            None => label.as_ref().to_string(),
        });
        self
    }

    pub fn caller(&self) -> Option<&str> {
        self.caller.as_deref()
    }

    /// Consumes the context, keeping only the scope a nested flow wrote.
    pub fn into_writes(self) -> ScopeWrites {
        ScopeWrites {
            vars: self.vars,
            steps: self.steps,
        }
    }

    /// Takes over the scope of a nested flow that ran against a child of this context.
    pub fn absorb(&mut self, writes: ScopeWrites) {
        self.vars.extend(writes.vars);
        self.steps.extend(writes.steps);
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn registry(&self) -> &ActionRegistry {
        &self.registry
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Time left before the deadline, `None` when unbounded.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    pub fn is_expired(&self) -> bool {
        self.deadline.map_or(false, |deadline| Instant::now() >= deadline)
    }

    /// Caps a collaborator's own timeout at the remaining flow budget.
    pub fn clamp_timeout(&self, timeout: Duration) -> Duration {
        match self.remaining() {
            Some(remaining) => timeout.min(remaining),
            None => timeout,
        }
    }

    pub fn emit(&self, event: FlowEvent) {
        match &self.caller {
            Some(caller) => self.sink.record(event.with_caller(caller.clone())),
            None => self.sink.record(event),
        }
    }

    pub fn record_step(&mut self, id: impl Into<String>, result: StepResult) {
        self.steps.insert(id.into(), result);
    }

    pub fn set_var(&mut self, name: impl Into<String>, value: Value) {
        self.vars.insert(name.into(), value);
    }

    /// Renders a template value against this context.
    pub fn render(&self, value: &Value) -> Value {
        render(value, self)
    }

    /// Resolves a dot-path against this context.
    pub fn resolve(&self, path: &str) -> Value {
        resolve(path, self)
    }
}

impl Scope for ExecutionContext {
    fn root(&self, key: &str) -> Option<Cow<'_, Value>> {
        match key {
            "input" => Some(Cow::Borrowed(&self.input)),
            "query" => Some(Cow::Owned(Value::Object(
                self.query
                    .iter()
                    .map(|(k, v)| (k.clone(), Value::String(v.clone())))
                    .collect(),
            ))),
            "vars" => Some(Cow::Owned(Value::Object(self.vars.clone()))),
            "steps" => Some(Cow::Owned(Value::Object(
                self.steps
                    .iter()
                    .map(|(id, result)| (id.clone(), result.to_value()))
                    .collect(),
            ))),
            "_flow_depth" => Some(Cow::Owned(Value::from(self.depth))),
            _ => self.extra.get(key).map(Cow::Borrowed),
        }
    }
}

impl fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("input", &self.input)
            .field("query", &self.query)
            .field("vars", &self.vars)
            .field("steps", &self.steps)
            .field("extra", &self.extra)
            .field("depth", &self.depth)
            .field("deadline", &self.deadline)
            .field("caller", &self.caller)
            .finish_non_exhaustive()
    }
}

/// `vars` and `steps` left behind by a nested flow.
#[derive(Debug, Clone, Default)]
pub struct ScopeWrites {
    pub vars: Map<String, Value>,
    pub steps: BTreeMap<String, StepResult>,
}

/// The earlier of two optional deadlines.
pub fn earliest(a: Option<Instant>, b: Option<Instant>) -> Option<Instant> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, b) => a.or(b),
    }
}
