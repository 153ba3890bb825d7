//! Registry Validation
//!
//! Static checks over every flow in a registry:
//! - Step ids are present, identifier-shaped and unique
//! - Every step names an existing action
//! - No step escalates privilege above its flow's auth level
//! - `timeout_s`, `set` and `return_step` are well formed
//!
//! All problems are collected so a registry author sees them at once.

use std::collections::HashSet;

use log::{debug, info};

use super::model::{AuthLevel, FlowSpec, FlowStep};
use super::registry::ActionRegistry;

/// Validation error types for user-friendly error messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    EmptyStepId {
        flow: String,
    },
    InvalidStepId {
        flow: String,
        step: String,
    },
    DuplicateStepId {
        flow: String,
        step: String,
    },
    EmptyUse {
        flow: String,
        step: String,
    },
    UnknownAction {
        flow: String,
        step: String,
        action: String,
    },
    AuthEscalation {
        flow: String,
        step: String,
        action: String,
        action_auth: AuthLevel,
        flow_auth: AuthLevel,
    },
    InvalidTimeout {
        flow: String,
        step: String,
    },
    EmptySetKey {
        flow: String,
        step: String,
    },
    UnknownReturnStep {
        flow: String,
        step: String,
    },
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyStepId { flow } => {
                write!(f, "Flow '{}': a step has an empty or whitespace-only id", flow)
            }
            Self::InvalidStepId { flow, step } => write!(
                f,
                "Flow '{}': step id '{}' must match [A-Za-z_][A-Za-z0-9_]*",
                flow, step
            ),
            Self::DuplicateStepId { flow, step } => {
                write!(f, "Flow '{}': duplicate step id '{}'", flow, step)
            }
            Self::EmptyUse { flow, step } => {
                write!(f, "Flow '{}': step '{}' has no action in 'use'", flow, step)
            }
            Self::UnknownAction { flow, step, action } => write!(
                f,
                "Flow '{}': step '{}' uses unknown action '{}'",
                flow, step, action
            ),
            Self::AuthEscalation {
                flow,
                step,
                action,
                action_auth,
                flow_auth,
            } => write!(
                f,
                "Flow '{}' (auth='{}'): step '{}' cannot use action '{}' with auth='{}'",
                flow, flow_auth, step, action, action_auth
            ),
            Self::InvalidTimeout { flow, step } => {
                write!(f, "Flow '{}': step '{}' timeout_s must be at least 1", flow, step)
            }
            Self::EmptySetKey { flow, step } => {
                write!(f, "Flow '{}': step '{}' has an empty 'set' key", flow, step)
            }
            Self::UnknownReturnStep { flow, step } => {
                write!(f, "Flow '{}': return_step '{}' is not a declared step", flow, step)
            }
        }
    }
}

impl std::error::Error for ValidationError {}

/// Returns true for `[A-Za-z_][A-Za-z0-9_]*`.
pub fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Validates a single step's fields.
fn validate_step(flow: &str, step: &FlowStep) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    if step.id.trim().is_empty() {
        errors.push(ValidationError::EmptyStepId { flow: flow.into() });
        return errors; // Can't name anything else without an id
    }
    if !is_identifier(&step.id) {
        errors.push(ValidationError::InvalidStepId {
            flow: flow.into(),
            step: step.id.clone(),
        });
    }

    if step.uses.trim().is_empty() {
        errors.push(ValidationError::EmptyUse {
            flow: flow.into(),
            step: step.id.clone(),
        });
    }

    if step.timeout_s == Some(0) {
        errors.push(ValidationError::InvalidTimeout {
            flow: flow.into(),
            step: step.id.clone(),
        });
    }

    if let Some(set) = &step.set {
        if set.keys().any(|k| k.trim().is_empty()) {
            errors.push(ValidationError::EmptySetKey {
                flow: flow.into(),
                step: step.id.clone(),
            });
        }
    }

    errors
}

/// Validates the structure of one flow, without looking at other actions.
///
/// Checks step fields, id uniqueness and `return_step`.
pub fn validate_flow(name: &str, flow: &FlowSpec) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    let mut seen_ids: HashSet<&str> = HashSet::new();

    for step in &flow.steps {
        errors.extend(validate_step(name, step));
        if !step.id.trim().is_empty() && !seen_ids.insert(step.id.as_str()) {
            errors.push(ValidationError::DuplicateStepId {
                flow: name.into(),
                step: step.id.clone(),
            });
        }
    }

    if let Some(ret) = &flow.return_step {
        if !seen_ids.contains(ret.as_str()) {
            errors.push(ValidationError::UnknownReturnStep {
                flow: name.into(),
                step: ret.clone(),
            });
        }
    }

    errors
}

/// Validates every flow in the registry, including cross-action references.
pub fn validate_registry(registry: &ActionRegistry) -> Result<(), Vec<ValidationError>> {
    info!("Validating registry with {} actions", registry.len());
    let mut errors = Vec::new();

    for (name, flow) in registry.flows() {
        errors.extend(validate_flow(name, flow));

        let flow_auth = registry.get(name).map(|a| a.auth).unwrap_or_default();
        for step in &flow.steps {
            if step.uses.trim().is_empty() {
                continue;
            }
            match registry.get(&step.uses) {
                None => errors.push(ValidationError::UnknownAction {
                    flow: name.into(),
                    step: step.id.clone(),
                    action: step.uses.clone(),
                }),
                Some(target) if target.auth > flow_auth => {
                    errors.push(ValidationError::AuthEscalation {
                        flow: name.into(),
                        step: step.id.clone(),
                        action: step.uses.clone(),
                        action_auth: target.auth,
                        flow_auth,
                    })
                }
                Some(_) => {}
            }
        }
        debug!("Flow '{}' checked: {} steps", name, flow.len());
    }

    if errors.is_empty() {
        info!("Registry validated: {} flows", registry.flows().count());
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::model::ActionSpec;
    use serde_json::json;

    fn registry_with(flow: FlowSpec, flow_auth: AuthLevel) -> ActionRegistry {
        ActionRegistry::new()
            .with_action(ActionSpec::value("noop", json!(null)))
            .with_action(ActionSpec::value("purge", json!(null)).with_auth(AuthLevel::Admin))
            .with_action(ActionSpec::flow("main", flow).with_auth(flow_auth))
    }

    #[test]
    fn test_is_identifier() {
        assert!(is_identifier("fetch_1"));
        assert!(is_identifier("_x"));
        assert!(!is_identifier("1st"));
        assert!(!is_identifier("a-b"));
        assert!(!is_identifier(""));
    }

    #[test]
    fn test_valid_flow() {
        let flow = FlowSpec::new(vec![FlowStep::new("a", "noop"), FlowStep::new("b", "noop")])
            .with_return_step("a");
        assert!(validate_flow("main", &flow).is_empty());
        assert!(validate_registry(&registry_with(flow, AuthLevel::None)).is_ok());
    }

    #[test]
    fn test_step_field_errors() {
        let flow = FlowSpec::new(vec![
            FlowStep::new("  ", "noop"),
            FlowStep::new("bad-id", "noop"),
            FlowStep::new("c", ""),
            FlowStep::new("d", "noop").with_timeout(0),
            FlowStep::new("e", "noop").with_set(" ", json!(1)),
        ]);
        let errors = validate_flow("main", &flow);
        assert_eq!(errors.len(), 5);
        assert!(errors.contains(&ValidationError::EmptyStepId { flow: "main".into() }));
        assert!(errors.contains(&ValidationError::EmptyUse {
            flow: "main".into(),
            step: "c".into()
        }));
        assert!(errors.contains(&ValidationError::InvalidTimeout {
            flow: "main".into(),
            step: "d".into()
        }));
    }

    #[test]
    fn test_duplicate_ids_and_return_step() {
        let flow = FlowSpec::new(vec![FlowStep::new("a", "noop"), FlowStep::new("a", "noop")])
            .with_return_step("zzz");
        let errors = validate_flow("main", &flow);
        assert_eq!(
            errors,
            vec![
                ValidationError::DuplicateStepId {
                    flow: "main".into(),
                    step: "a".into()
                },
                ValidationError::UnknownReturnStep {
                    flow: "main".into(),
                    step: "zzz".into()
                },
            ]
        );
    }

    #[test]
    fn test_unknown_action_reference() {
        let flow = FlowSpec::new(vec![FlowStep::new("a", "missing")]);
        let errors = validate_registry(&registry_with(flow, AuthLevel::Admin)).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].to_string().contains("'missing'"));
    }

    #[test]
    fn test_auth_escalation_detected() {
        let flow = FlowSpec::new(vec![FlowStep::new("wipe", "purge")]);
        let errors = validate_registry(&registry_with(flow.clone(), AuthLevel::Api)).unwrap_err();
        assert!(matches!(
            &errors[0],
            ValidationError::AuthEscalation {
                action_auth: AuthLevel::Admin,
                flow_auth: AuthLevel::Api,
                ..
            }
        ));

        assert!(validate_registry(&registry_with(flow, AuthLevel::Admin)).is_ok());
    }

    #[test]
    fn test_messages_are_single_line() {
        let err = ValidationError::AuthEscalation {
            flow: "f".into(),
            step: "s".into(),
            action: "purge".into(),
            action_auth: AuthLevel::Admin,
            flow_auth: AuthLevel::None,
        };
        assert_eq!(err.to_string().lines().count(), 1);
        assert!(err.to_string().contains("auth='admin'"));
    }
}
