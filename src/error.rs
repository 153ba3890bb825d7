//! Error Types
//!
//! Errors are split by who can cause them:
//!
//! - [`ConditionError`]: a malformed condition tree (caught when a flow is loaded)
//! - [`ActionError`]: an action collaborator failed; retried by the step loop
//! - [`EngineError`]: configuration errors that abort a whole invocation
//! - [`LoadError`]: reading, parsing or validating a registry document

use thiserror::Error;

use crate::workflow::model::AuthLevel;
use crate::workflow::validator::ValidationError;

/// A condition tree that cannot be evaluated.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConditionError {
    #[error("operator condition objects must have exactly one $operator key")]
    MixedOperatorKeys,

    #[error("invalid $operator key: '{0}'")]
    InvalidOperator(String),

    #[error("unknown operator: {0}")]
    UnknownOperator(String),

    #[error("{op} expects {expected}")]
    BadArgument { op: String, expected: &'static str },

    #[error("{op} path must be a non-empty string")]
    EmptyPath { op: String },

    #[error("invalid regex '{pattern}': {reason}")]
    InvalidRegex { pattern: String, reason: String },
}

/// Failure reported by an action collaborator.
///
/// These never abort a flow on their own: the step loop converts them into
/// `ok: false` results and retries according to the step configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ActionError {
    #[error("{0}")]
    Failed(String),

    #[error("timed out: {0}")]
    Timeout(String),
}

impl ActionError {
    /// Status code used when this error is folded into a step result.
    pub fn status(&self) -> u16 {
        match self {
            Self::Failed(_) => 500,
            Self::Timeout(_) => 504,
        }
    }
}

/// Errors raised by the execution engine.
///
/// Everything except [`EngineError::Action`] is a configuration error: it is
/// surfaced immediately, never retried, and fails every enclosing flow.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    #[error("unknown action: '{0}'")]
    UnknownAction(String),

    #[error("flow '{flow}' step '{step}' references unknown action '{action}'")]
    UnknownStepAction {
        flow: String,
        step: String,
        action: String,
    },

    #[error("flow '{flow}' cannot use action '{action}' with auth='{action_auth}' from flow auth='{flow_auth}'")]
    AuthEscalation {
        flow: String,
        action: String,
        action_auth: AuthLevel,
        flow_auth: AuthLevel,
    },

    #[error("flow nesting too deep in '{flow}': depth {depth} exceeds limit {limit}")]
    RecursionLimit {
        flow: String,
        depth: usize,
        limit: usize,
    },

    #[error("no handler registered for kind '{kind}' (action '{action}')")]
    UnknownKind { kind: String, action: String },

    #[error(transparent)]
    Action(#[from] ActionError),
}

impl EngineError {
    /// True for errors that must abort the invocation instead of being retried.
    pub fn is_configuration(&self) -> bool {
        !matches!(self, Self::Action(_))
    }
}

/// Errors produced while loading a registry document.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to read registry file '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse registry document: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("duplicate action name: '{0}'")]
    DuplicateAction(String),

    #[error("invalid registry:\n{}", join_errors(.0))]
    Invalid(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| format!("  - {}", e))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_error_status() {
        assert_eq!(ActionError::Failed("boom".into()).status(), 500);
        assert_eq!(ActionError::Timeout("slow".into()).status(), 504);
    }

    #[test]
    fn test_configuration_classification() {
        assert!(EngineError::UnknownAction("x".into()).is_configuration());
        assert!(EngineError::RecursionLimit {
            flow: "f".into(),
            depth: 25,
            limit: 24
        }
        .is_configuration());
        assert!(!EngineError::Action(ActionError::Failed("x".into())).is_configuration());
    }

    #[test]
    fn test_auth_escalation_message() {
        let err = EngineError::AuthEscalation {
            flow: "workflow".into(),
            action: "purge".into(),
            action_auth: AuthLevel::Admin,
            flow_auth: AuthLevel::Api,
        };
        let msg = err.to_string();
        assert!(msg.contains("auth='admin'"));
        assert!(msg.contains("auth='api'"));
    }

    #[test]
    fn test_invalid_registry_lists_every_error() {
        let err = LoadError::Invalid(vec![
            ValidationError::EmptyUse {
                flow: "f".into(),
                step: "a".into(),
            },
            ValidationError::UnknownReturnStep {
                flow: "f".into(),
                step: "zzz".into(),
            },
        ]);
        let msg = err.to_string();
        assert!(msg.contains("'a'"));
        assert!(msg.contains("zzz"));
        assert_eq!(msg.lines().count(), 3);
    }
}
