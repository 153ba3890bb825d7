//! Action Registry
//!
//! Actions by name plus the handlers that execute external kinds. A
//! registry is built once, wrapped in an `Arc`, and threaded through every
//! execution context.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use log::debug;

use super::model::{ActionKind, ActionSpec, FlowSpec};
use crate::error::LoadError;
use crate::execution::invoker::ActionHandler;

/// Registered actions and kind handlers.
#[derive(Default, Clone)]
pub struct ActionRegistry {
    actions: BTreeMap<String, ActionSpec>,
    handlers: HashMap<String, Arc<dyn ActionHandler>>,
}

impl ActionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a registry from a list of actions, rejecting duplicate names.
    pub fn from_actions(actions: Vec<ActionSpec>) -> Result<Self, LoadError> {
        let mut registry = Self::new();
        for action in actions {
            registry.add_action(action)?;
        }
        Ok(registry)
    }

    /// Adds an action; names must be unique.
    pub fn add_action(&mut self, action: ActionSpec) -> Result<(), LoadError> {
        if self.actions.contains_key(&action.name) {
            return Err(LoadError::DuplicateAction(action.name));
        }
        debug!("Registered action '{}' (kind: {})", action.name, action.kind.name());
        self.actions.insert(action.name.clone(), action);
        Ok(())
    }

    /// Builder-style [`add_action`](Self::add_action) that replaces silently.
    pub fn with_action(mut self, action: ActionSpec) -> Self {
        self.actions.insert(action.name.clone(), action);
        self
    }

    /// Registers the handler for an external action kind.
    pub fn register_handler(&mut self, kind: impl Into<String>, handler: impl ActionHandler + 'static) {
        self.handlers.insert(kind.into(), Arc::new(handler));
    }

    pub fn with_handler(mut self, kind: impl Into<String>, handler: impl ActionHandler + 'static) -> Self {
        self.register_handler(kind, handler);
        self
    }

    pub fn get(&self, name: &str) -> Option<&ActionSpec> {
        self.actions.get(name)
    }

    pub fn handler(&self, kind: &str) -> Option<&Arc<dyn ActionHandler>> {
        self.handlers.get(kind)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.actions.contains_key(name)
    }

    /// Iterates over actions in name order.
    pub fn actions(&self) -> impl Iterator<Item = &ActionSpec> {
        self.actions.values()
    }

    /// Iterates over `(name, flow)` for every flow action.
    pub fn flows(&self) -> impl Iterator<Item = (&str, &FlowSpec)> {
        self.actions.values().filter_map(|a| match &a.kind {
            ActionKind::Flow(flow) => Some((a.name.as_str(), flow)),
            _ => None,
        })
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}

impl fmt::Debug for ActionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut kinds: Vec<_> = self.handlers.keys().collect();
        kinds.sort();
        f.debug_struct("ActionRegistry")
            .field("actions", &self.actions.keys().collect::<Vec<_>>())
            .field("handlers", &kinds)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::invoker::handler_fn;
    use crate::workflow::model::StepResult;
    use serde_json::json;

    #[test]
    fn test_add_and_get() {
        let registry = ActionRegistry::from_actions(vec![
            ActionSpec::value("a", json!(1)),
            ActionSpec::flow("f", FlowSpec::default()),
        ])
        .unwrap();

        assert_eq!(registry.len(), 2);
        assert!(registry.contains("a"));
        assert!(registry.get("zzz").is_none());
        assert_eq!(registry.flows().count(), 1);
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let result = ActionRegistry::from_actions(vec![
            ActionSpec::value("a", json!(1)),
            ActionSpec::value("a", json!(2)),
        ]);
        assert!(matches!(result, Err(LoadError::DuplicateAction(name)) if name == "a"));
    }

    #[test]
    fn test_handlers_by_kind() {
        let registry = ActionRegistry::new()
            .with_handler("http", handler_fn(|_, _, _| Ok(StepResult::success(json!("pong")))));
        assert!(registry.handler("http").is_some());
        assert!(registry.handler("llm").is_none());
        assert!(format!("{:?}", registry).contains("http"));
    }
}
