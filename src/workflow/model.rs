//! Workflow Data Model
//!
//! Core data structures describing actions, flows and their steps.
//!
//! # Example YAML Format
//!
//! ```yaml
//! actions:
//!   - name: fallback
//!     kind: value
//!     auth: api
//!     value:
//!       data: { fallback: true }
//!
//!   - name: workflow
//!     kind: flow
//!     auth: api
//!     flow:
//!       steps:
//!         - id: try
//!           use: bad_http
//!           on_error: continue
//!         - id: fb
//!           use: fallback
//!           when: { "steps.try.ok": false }
//!       return_step: fb
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::condition::Condition;

/// Ordered privilege tier of an action.
///
/// A flow may only invoke actions whose level is less than or equal to its own.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum AuthLevel {
    #[default]
    None,
    Api,
    Admin,
}

impl fmt::Display for AuthLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::None => "none",
            Self::Api => "api",
            Self::Admin => "admin",
        };
        f.write_str(name)
    }
}

/// What a flow does when a step finishes with `ok: false`.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum OnError {
    /// End the flow with the failing result
    #[default]
    Stop,
    /// Record the failure and move on to the next step
    Continue,
    /// Same as `Stop`; kept as a distinct spelling for flow authors
    Return,
}

/// Uniform result of every action invocation, flow step and flow.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct StepResult {
    pub ok: bool,
    pub status: u16,
    #[serde(default)]
    pub data: Value,
    /// Set only for steps whose `when` gate was false
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub skipped: bool,
}

impl StepResult {
    /// Successful result with status 200.
    pub fn success(data: Value) -> Self {
        Self {
            ok: true,
            status: 200,
            data,
            skipped: false,
        }
    }

    /// Failed result carrying arbitrary data.
    pub fn failure(status: u16, data: Value) -> Self {
        Self {
            ok: false,
            status,
            data,
            skipped: false,
        }
    }

    /// Failed result with `{"error": message}` as data.
    pub fn error(status: u16, message: impl Into<String>) -> Self {
        Self::failure(status, json!({ "error": message.into() }))
    }

    /// Result recorded for a step whose gate evaluated to false.
    pub fn skipped() -> Self {
        Self {
            ok: true,
            status: 204,
            data: Value::Null,
            skipped: true,
        }
    }

    /// Result of a step that ran out of time.
    pub fn timeout() -> Self {
        Self::error(504, "timeout")
    }

    /// Result of a flow with no steps.
    pub fn empty() -> Self {
        Self::success(Value::Null)
    }

    /// Converts a fatal engine error into a well-formed result for external callers.
    pub fn from_error(err: &crate::error::EngineError) -> Self {
        Self::error(500, err.to_string())
    }

    /// Returns true if this is the timeout result produced by the engine.
    pub fn is_timeout(&self) -> bool {
        !self.ok && self.status == 504
    }

    /// JSON view of this result, as seen by path lookups like `steps.a.data`.
    pub fn to_value(&self) -> Value {
        let mut map = Map::new();
        map.insert("ok".into(), Value::Bool(self.ok));
        map.insert("status".into(), Value::from(self.status));
        map.insert("data".into(), self.data.clone());
        if self.skipped {
            map.insert("skipped".into(), Value::Bool(true));
        }
        Value::Object(map)
    }
}

/// A single step in a flow.
///
/// Each step invokes a registered action, optionally gated by a condition,
/// and may publish values into the flow's `vars` scope through `set`.
#[derive(Deserialize, Debug, Clone)]
pub struct FlowStep {
    /// Unique identifier within the flow (identifier syntax)
    pub id: String,

    /// Name of the registered action to invoke
    #[serde(rename = "use")]
    pub uses: String,

    /// Input template; the parent input is forwarded when absent
    #[serde(default)]
    pub input: Option<Value>,

    /// Gate evaluated before the step runs
    #[serde(default)]
    pub when: Option<Condition>,

    #[serde(default)]
    pub on_error: OnError,

    /// Variables to publish after the step, rendered against the context
    #[serde(default)]
    pub set: Option<Map<String, Value>>,

    /// Extra attempts after the first failure
    #[serde(default)]
    pub retries: u32,

    /// Per-step time budget in seconds
    #[serde(default)]
    pub timeout_s: Option<u64>,

    /// Contiguous parallel steps run together as one group
    #[serde(default)]
    pub parallel: bool,
}

impl FlowStep {
    /// Creates a step invoking `uses` with every option at its default.
    ///
    /// # Example
    ///
    /// ```
    /// use stepflow::workflow::{FlowStep, OnError};
    ///
    /// let step = FlowStep::new("invoice", "create_invoice")
    ///     .with_retries(2)
    ///     .with_timeout(5)
    ///     .with_on_error(OnError::Continue);
    /// assert_eq!(step.uses, "create_invoice");
    /// ```
    pub fn new(id: impl Into<String>, uses: impl Into<String>) -> Self {
        Self {
            id: id.into().trim().to_string(),
            uses: uses.into().trim().to_string(),
            input: None,
            when: None,
            on_error: OnError::Stop,
            set: None,
            retries: 0,
            timeout_s: None,
            parallel: false,
        }
    }

    pub fn with_input(mut self, input: Value) -> Self {
        self.input = Some(input);
        self
    }

    pub fn with_when(mut self, when: Condition) -> Self {
        self.when = Some(when);
        self
    }

    pub fn with_on_error(mut self, on_error: OnError) -> Self {
        self.on_error = on_error;
        self
    }

    /// Adds one `set` entry; values may be `${...}` templates.
    pub fn with_set(mut self, name: impl Into<String>, value: Value) -> Self {
        self.set
            .get_or_insert_with(Map::new)
            .insert(name.into(), value);
        self
    }

    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    pub fn with_timeout(mut self, seconds: u64) -> Self {
        self.timeout_s = Some(seconds);
        self
    }

    /// Marks the step as a member of a parallel group.
    pub fn in_parallel(mut self) -> Self {
        self.parallel = true;
        self
    }

    /// Returns true if a failure of this step lets the flow continue.
    pub fn continues_on_error(&self) -> bool {
        self.on_error == OnError::Continue
    }
}

/// Configuration of a `flow` action.
#[derive(Deserialize, Debug, Clone, Default)]
pub struct FlowSpec {
    /// Ordered list of steps
    #[serde(default)]
    pub steps: Vec<FlowStep>,

    /// Step whose stored result becomes the flow result
    #[serde(default)]
    pub return_step: Option<String>,

    /// Variables initialised before the first step (templates allowed)
    #[serde(default)]
    pub vars: Option<Value>,
}

impl FlowSpec {
    pub fn new(steps: Vec<FlowStep>) -> Self {
        Self {
            steps,
            return_step: None,
            vars: None,
        }
    }

    pub fn with_return_step(mut self, id: impl Into<String>) -> Self {
        self.return_step = Some(id.into());
        self
    }

    pub fn with_vars(mut self, vars: Value) -> Self {
        self.vars = Some(vars);
        self
    }

    /// Gets a step by ID.
    pub fn get_step(&self, id: &str) -> Option<&FlowStep> {
        self.steps.iter().find(|s| s.id == id)
    }

    /// Returns the number of steps in the flow.
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Returns true if the flow has no steps.
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

/// Configuration of a `value` action: a constant (templated) result.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ValueAction {
    #[serde(default)]
    pub data: Value,
    #[serde(default = "default_status")]
    pub status: u16,
    #[serde(default = "default_ok")]
    pub ok: bool,
}

fn default_status() -> u16 {
    200
}

fn default_ok() -> bool {
    true
}

impl ValueAction {
    pub fn new(data: Value) -> Self {
        Self {
            data,
            status: 200,
            ok: true,
        }
    }
}

/// Kind-specific part of an action.
#[derive(Debug, Clone)]
pub enum ActionKind {
    /// Constant result, rendered against the invocation context
    Value(ValueAction),
    /// Nested flow
    Flow(FlowSpec),
    /// Any other kind (http, llm, db, ...), executed by a registered handler
    External { kind: String, config: Value },
}

impl ActionKind {
    /// Kind name as written in registry documents.
    pub fn name(&self) -> &str {
        match self {
            Self::Value(_) => "value",
            Self::Flow(_) => "flow",
            Self::External { kind, .. } => kind,
        }
    }
}

/// An invocable, named unit with a declared auth level.
#[derive(Deserialize, Debug, Clone)]
#[serde(try_from = "RawAction")]
pub struct ActionSpec {
    pub name: String,
    pub auth: AuthLevel,
    pub kind: ActionKind,
}

impl ActionSpec {
    /// Creates a `value` action returning `data` with status 200.
    pub fn value(name: impl Into<String>, data: Value) -> Self {
        Self {
            name: name.into(),
            auth: AuthLevel::None,
            kind: ActionKind::Value(ValueAction::new(data)),
        }
    }

    /// Creates a `flow` action.
    pub fn flow(name: impl Into<String>, flow: FlowSpec) -> Self {
        Self {
            name: name.into(),
            auth: AuthLevel::None,
            kind: ActionKind::Flow(flow),
        }
    }

    /// Creates an action of an externally handled kind.
    pub fn external(name: impl Into<String>, kind: impl Into<String>, config: Value) -> Self {
        Self {
            name: name.into(),
            auth: AuthLevel::None,
            kind: ActionKind::External {
                kind: kind.into(),
                config,
            },
        }
    }

    pub fn with_auth(mut self, auth: AuthLevel) -> Self {
        self.auth = auth;
        self
    }

    /// Returns the flow configuration if this is a flow action.
    pub fn as_flow(&self) -> Option<&FlowSpec> {
        match &self.kind {
            ActionKind::Flow(flow) => Some(flow),
            _ => None,
        }
    }
}

/// Wire shape of an action: `kind` names the key holding its configuration.
#[derive(Deserialize)]
struct RawAction {
    name: String,
    kind: String,
    #[serde(default)]
    auth: AuthLevel,
    #[serde(flatten)]
    rest: Map<String, Value>,
}

impl TryFrom<RawAction> for ActionSpec {
    type Error = String;

    fn try_from(raw: RawAction) -> Result<Self, Self::Error> {
        let RawAction {
            name,
            kind,
            auth,
            mut rest,
        } = raw;
        let config = rest.remove(&kind);

        let kind = match kind.as_str() {
            "value" => {
                let config = config.unwrap_or_else(|| Value::Object(Map::new()));
                let value = serde_json::from_value(config)
                    .map_err(|e| format!("action '{}': invalid value config: {}", name, e))?;
                ActionKind::Value(value)
            }
            "flow" => {
                let config =
                    config.ok_or_else(|| format!("flow action '{}' missing 'flow' config", name))?;
                let flow = serde_json::from_value(config)
                    .map_err(|e| format!("action '{}': invalid flow config: {}", name, e))?;
                ActionKind::Flow(flow)
            }
            "" => return Err(format!("action '{}' has an empty kind", name)),
            _ => ActionKind::External {
                kind,
                config: config.unwrap_or(Value::Null),
            },
        };

        Ok(Self { name, auth, kind })
    }
}
