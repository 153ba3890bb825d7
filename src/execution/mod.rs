//! Action Execution Module
//!
//! Runs actions against an execution context: nested flows with gating,
//! parallel groups, retries and deadlines.
//!
//! # Architecture
//!
//! - [`engine`]: Front door building root contexts and running named actions
//! - [`flow`]: Flow orchestration over sequential steps and parallel groups
//! - [`step`]: Single step execution with retries and deadlines
//! - [`invoker`]: Dispatch by action kind and the handler trait for external kinds

pub mod engine;
pub mod flow;
pub mod invoker;
pub mod step;

pub use engine::Engine;
pub use flow::{execute_flow, MAX_FLOW_DEPTH};
pub use invoker::{handler_fn, invoke_action, invoke_guarded, ActionHandler, FnHandler};
