//! Workflow Definition Module
//!
//! Provides data structures and utilities for defining, loading and
//! validating actions and the flows built from them.
//!
//! # Structure
//!
//! - [`model`]: Core data structures (ActionSpec, FlowSpec, FlowStep, StepResult)
//! - [`registry`]: Actions by name and handlers by kind
//! - [`parser`]: YAML/JSON loading
//! - [`validator`]: Static checks over flows
//! - [`planner`]: Sequential steps and parallel groups

pub mod model;
pub mod parser;
pub mod planner;
pub mod registry;
pub mod validator;

pub use model::{
    ActionKind, ActionSpec, AuthLevel, FlowSpec, FlowStep, OnError, StepResult, ValueAction,
};
pub use parser::{load_registry, load_registry_str};
pub use planner::{plan_segments, Segment};
pub use registry::ActionRegistry;
pub use validator::{validate_flow, validate_registry, ValidationError};
