//! Execution Monitoring Module
//!
//! Provides the event sink threaded through every execution context,
//! replacing any process-wide "current execution" state.
//!
//! # Components
//!
//! - [`EventSink`]: receiver for flow and step events
//! - [`ExecutionTimeline`]: step start/end timing for Gantt charts
//! - [`LogSink`]: forwards events to the debug log

pub mod timeline;

pub use timeline::{EventSink, EventType, ExecutionTimeline, FlowEvent, LogSink, Outcome, StepSpan};
