//! Action Execution Engine
//!
//! The front door for running actions:
//! - Builds the root execution context (depth 0, overall deadline)
//! - Looks up the named action in the registry
//! - Converts collaborator failures and handler panics at the top level
//!   into results

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use log::{error, info, warn};
use serde_json::Value;

use super::invoker::invoke_guarded;
use crate::config::EngineConfig;
use crate::context::ExecutionContext;
use crate::error::EngineError;
use crate::monitoring::{EventSink, LogSink};
use crate::workflow::model::StepResult;
use crate::workflow::registry::ActionRegistry;

/// Action execution engine.
///
/// Owns the registry, configuration and event sink shared by every
/// invocation. Each run gets a fresh root context, so one engine can serve
/// many concurrent callers.
///
/// # Example
///
/// ```rust,no_run
/// use serde_json::json;
/// use stepflow::execution::Engine;
/// use stepflow::workflow::load_registry;
///
/// fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let registry = load_registry("actions.yaml")?;
///     let engine = Engine::new(registry);
///
///     let result = engine.run("workflow", json!({ "hello": "world" }))?;
///     println!("{}", serde_json::to_string(&result)?);
///     Ok(())
/// }
/// ```
pub struct Engine {
    registry: Arc<ActionRegistry>,
    config: Arc<EngineConfig>,
    sink: Arc<dyn EventSink>,
}

impl Engine {
    /// Creates an engine with default configuration and a [`LogSink`].
    pub fn new(registry: ActionRegistry) -> Self {
        Self {
            registry: Arc::new(registry),
            config: Arc::new(EngineConfig::default()),
            sink: Arc::new(LogSink),
        }
    }

    /// Sets the retry and timeout configuration.
    pub fn set_config(&mut self, config: EngineConfig) {
        self.config = Arc::new(config);
    }

    /// Sets where execution events are sent.
    pub fn set_event_sink(&mut self, sink: Arc<dyn EventSink>) {
        self.sink = sink;
    }

    pub fn registry(&self) -> &ActionRegistry {
        &self.registry
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Builds a root context for `input`.
    ///
    /// Callers that need extra path roots (such as `request`) can extend it
    /// and pass it to [`Engine::run_in`].
    ///
    /// A budget too large to represent as an instant leaves the run unbounded.
    pub fn context(&self, input: Value) -> ExecutionContext {
        let deadline = self
            .config
            .timeout
            .and_then(|budget| Instant::now().checked_add(budget));
        ExecutionContext::new(Arc::clone(&self.registry), input)
            .with_config(Arc::clone(&self.config))
            .with_event_sink(Arc::clone(&self.sink))
            .with_deadline(deadline)
    }

    /// Runs the named action with `input`.
    pub fn run(&self, name: &str, input: Value) -> Result<StepResult, EngineError> {
        self.run_in(name, self.context(input))
    }

    /// Runs the named action with `input` and query parameters.
    pub fn run_with_query(
        &self,
        name: &str,
        input: Value,
        query: BTreeMap<String, String>,
    ) -> Result<StepResult, EngineError> {
        self.run_in(name, self.context(input).with_query(query))
    }

    /// Runs the named action in a caller-built root context.
    ///
    /// # Returns
    ///
    /// * `Ok(StepResult)` - The action's result, successful or not
    /// * `Err(EngineError)` - A configuration error aborted the invocation
    pub fn run_in(&self, name: &str, mut ctx: ExecutionContext) -> Result<StepResult, EngineError> {
        let start_time = Instant::now();

        let action = self
            .registry
            .get(name)
            .ok_or_else(|| EngineError::UnknownAction(name.to_string()))?;
        info!("Running action '{}' (kind: {})", name, action.kind.name());

        let result = match invoke_guarded(action, &mut ctx) {
            Ok(result) => result,
            Err(EngineError::Action(err)) => {
                warn!("Action '{}' failed: {}", name, err);
                StepResult::error(err.status(), err.to_string())
            }
            Err(err) => {
                error!("Action '{}' aborted: {}", name, err);
                return Err(err);
            }
        };

        info!(
            "Action '{}' finished in {:.2}s: ok={} status={}",
            name,
            start_time.elapsed().as_secs_f64(),
            result.ok,
            result.status
        );
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ActionError;
    use crate::execution::invoker::handler_fn;
    use crate::monitoring::{EventType, ExecutionTimeline};
    use crate::workflow::model::{ActionSpec, AuthLevel, FlowSpec, FlowStep};
    use crate::workflow::parser::load_registry_str;
    use serde_json::json;
    use std::time::Duration;

    #[test]
    fn test_run_value_action() {
        let engine = Engine::new(ActionRegistry::new().with_action(ActionSpec::value("hi", json!("hello ${input.name}"))));
        let result = engine.run("hi", json!({"name": "Ann"})).unwrap();
        assert_eq!(result, StepResult::success(json!("hello Ann")));
    }

    #[test]
    fn test_unknown_action() {
        let engine = Engine::new(ActionRegistry::new());
        let err = engine.run("nope", Value::Null).unwrap_err();
        assert_eq!(err, EngineError::UnknownAction("nope".into()));
        assert_eq!(StepResult::from_error(&err).status, 500);
    }

    #[test]
    fn test_query_parameters() {
        let engine = Engine::new(ActionRegistry::new().with_action(ActionSpec::value("page", json!("${query.page}"))));
        let mut query = BTreeMap::new();
        query.insert("page".to_string(), "3".to_string());
        let result = engine.run_with_query("page", Value::Null, query).unwrap();
        assert_eq!(result.data, json!("3"));
    }

    #[test]
    fn test_extra_roots() {
        let engine = Engine::new(ActionRegistry::new().with_action(ActionSpec::value("m", json!("${request.method}"))));
        let ctx = engine.context(Value::Null).with_extra("request", json!({"method": "POST"}));
        assert_eq!(engine.run_in("m", ctx).unwrap().data, json!("POST"));
    }

    #[test]
    fn test_top_level_handler_failure_becomes_result() {
        let registry = ActionRegistry::new()
            .with_action(ActionSpec::external("call", "http", json!({})))
            .with_handler("http", handler_fn(|_, _, _| Err(ActionError::Timeout("upstream".into()))));
        let result = Engine::new(registry).run("call", Value::Null).unwrap();
        assert_eq!(result.status, 504);
        assert!(!result.ok);
    }

    #[test]
    fn test_overall_timeout() {
        let registry = ActionRegistry::new()
            .with_action(ActionSpec::value("v", json!(1)))
            .with_action(ActionSpec::flow("wf", FlowSpec::new(vec![FlowStep::new("a", "v")])));
        let mut engine = Engine::new(registry);
        engine.set_config(EngineConfig::default().with_timeout(Duration::ZERO));

        let result = engine.run("wf", Value::Null).unwrap();
        assert_eq!(result, StepResult::timeout());
    }

    #[test]
    fn test_top_level_panic_becomes_result() {
        let registry = ActionRegistry::new()
            .with_action(ActionSpec::external("call", "http", json!({})))
            .with_handler("http", handler_fn(|_, _, _| panic!("tls handshake")));
        let result = Engine::new(registry).run("call", Value::Null).unwrap();
        assert_eq!(result.status, 500);
        assert_eq!(result.data, json!({"error": "action 'call' panicked: tls handshake"}));
    }

    #[test]
    fn test_unrepresentable_budget_runs_unbounded() {
        let mut engine = Engine::new(ActionRegistry::new().with_action(ActionSpec::value("v", json!(1))));
        engine.set_config(EngineConfig::default().with_timeout(Duration::MAX));
        assert!(engine.context(Value::Null).deadline().is_none());
        assert_eq!(engine.run("v", Value::Null).unwrap(), StepResult::success(json!(1)));
    }

    #[test]
    fn test_events_reach_sink() {
        let registry = ActionRegistry::new()
            .with_action(ActionSpec::value("v", json!(1)))
            .with_action(ActionSpec::flow("wf", FlowSpec::new(vec![FlowStep::new("a", "v")])));
        let timeline = Arc::new(ExecutionTimeline::new());
        let mut engine = Engine::new(registry);
        engine.set_event_sink(timeline.clone());

        engine.run("wf", Value::Null).unwrap();
        assert_eq!(timeline.count(EventType::FlowStarted), 1);
        assert_eq!(timeline.count(EventType::Completed), 1);
        assert_eq!(timeline.count(EventType::FlowFinished), 1);
    }

    #[test]
    fn test_loaded_fallback_workflow() {
        let registry = load_registry_str(
            r#"
actions:
  - { name: bad_http, kind: http, auth: api, http: { url: notaurl } }
  - { name: fallback, kind: value, auth: api, value: { data: { fallback: true } } }
  - name: workflow
    kind: flow
    auth: api
    flow:
      steps:
        - { id: try, use: bad_http, on_error: continue }
        - { id: fb, use: fallback, when: { "steps.try.ok": false } }
      return_step: fb
"#,
        )
        .unwrap()
        .with_handler("http", handler_fn(|_, _, _| Err(ActionError::Failed("invalid url".into()))));

        let result = Engine::new(registry).run("workflow", json!({"hello": "world"})).unwrap();
        assert_eq!(serde_json::to_value(&result).unwrap(), json!({"ok": true, "status": 200, "data": {"fallback": true}}));
    }

    #[test]
    fn test_escalation_reported_as_configuration_error() {
        let registry = ActionRegistry::new()
            .with_action(ActionSpec::value("purge", Value::Null).with_auth(AuthLevel::Admin))
            .with_action(
                ActionSpec::flow("wf", FlowSpec::new(vec![FlowStep::new("p", "purge")])).with_auth(AuthLevel::Api),
            );
        let err = Engine::new(registry).run("wf", Value::Null).unwrap_err();
        assert!(err.is_configuration());
        assert!(err.to_string().contains("auth='admin'"));
    }
}
