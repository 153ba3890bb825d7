//! StepFlow - Declarative Action Execution Engine
//!
//! Runs small workflows declared as data: named sequences of steps, each
//! invoking a registered action, gated by conditions, optionally run in
//! parallel, with retries, per-step deadlines, variable passing and
//! explicit error-continuation modes.
//!
//! # Architecture
//!
//! The library is organized into these modules:
//!
//! - [`workflow`]: Action and flow definitions, loading, validation and planning
//! - [`condition`]: The closed condition language used to gate steps
//! - [`context`]: Execution context, dot-path lookup and `${...}` templating
//! - [`execution`]: The engine, flow orchestrator and action dispatch
//! - [`monitoring`]: Execution events and timeline
//! - [`config`]: Retry and timeout configuration
//! - [`error`]: Error types
//!
//! # Example
//!
//! ```rust,no_run
//! use serde_json::json;
//! use stepflow::execution::{handler_fn, Engine};
//! use stepflow::workflow::StepResult;
//! use stepflow::load_registry;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Load actions from YAML and plug in a handler for `http` actions
//!     let registry = load_registry("actions.yaml")?
//!         .with_handler("http", handler_fn(|_, input, _| Ok(StepResult::success(input.clone()))));
//!
//!     // Run a flow
//!     let engine = Engine::new(registry);
//!     let result = engine.run("workflow", json!({ "hello": "world" }))?;
//!     println!("ok={} status={}", result.ok, result.status);
//!     Ok(())
//! }
//! ```

pub mod condition;
pub mod config;
pub mod context;
pub mod error;
pub mod execution;
pub mod monitoring;
pub mod workflow;

pub use condition::{eval_condition, Condition};
pub use config::EngineConfig;
pub use context::ExecutionContext;
pub use error::{ActionError, ConditionError, EngineError, LoadError};
pub use execution::engine::Engine;
pub use workflow::model::{ActionSpec, FlowSpec, FlowStep, StepResult};
pub use workflow::parser::load_registry;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = "StepFlow";
