//! Execution Timeline
//!
//! Flow events flow through an [`EventSink`] carried by the execution
//! context. [`ExecutionTimeline`] records them for timing reports and
//! Gantt charts; [`LogSink`] just forwards them to the `log` facade.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use log::debug;

/// Type of timeline event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventType {
    /// A flow action began executing
    FlowStarted,
    /// A flow action produced its result
    FlowFinished,
    /// Step started executing
    Started,
    /// Step gated out by its `when` condition
    Skipped,
    /// Step attempt failed and will be retried
    Retrying,
    /// Step completed successfully
    Completed,
    /// Step failed
    Failed,
    /// Step ran out of time
    TimedOut,
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::FlowStarted => "flow_started",
            Self::FlowFinished => "flow_finished",
            Self::Started => "started",
            Self::Skipped => "skipped",
            Self::Retrying => "retrying",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::TimedOut => "timed_out",
        };
        f.write_str(name)
    }
}

/// A single event emitted while a flow runs.
#[derive(Debug, Clone)]
pub struct FlowEvent {
    /// Name of the flow action
    pub flow: String,
    /// Step id, empty for flow-level events
    pub step_id: String,
    pub event_type: EventType,
    /// Free-form detail such as a status code or attempt number
    pub detail: Option<String>,
    /// Chain of `flow.step` labels that invoked this flow, `None` at top level
    pub caller: Option<String>,
    /// Monotonic time, used for durations
    pub timestamp: Instant,
    /// Wall-clock time, used for display
    pub recorded_at: DateTime<Utc>,
}

impl FlowEvent {
    pub fn new(flow: impl Into<String>, step_id: impl Into<String>, event_type: EventType) -> Self {
        Self {
            flow: flow.into(),
            step_id: step_id.into(),
            event_type,
            detail: None,
            caller: None,
            timestamp: Instant::now(),
            recorded_at: Utc::now(),
        }
    }

    /// Creates a flow-level event with no step id.
    pub fn flow(flow: impl Into<String>, event_type: EventType) -> Self {
        Self::new(flow, "", event_type)
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub fn with_caller(mut self, caller: impl Into<String>) -> Self {
        self.caller = Some(caller.into());
        self
    }

    /// `flow.step`, or just the flow name for flow-level events.
    pub fn label(&self) -> String {
        if self.step_id.is_empty() {
            self.flow.clone()
        } else {
            format!("{}.{}", self.flow, self.step_id)
        }
    }
}

/// Receives execution events.
///
/// Sinks are shared across parallel workers, so they must be thread-safe.
pub trait EventSink: Send + Sync {
    fn record(&self, event: FlowEvent);
}

/// Sink that writes every event to the debug log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl EventSink for LogSink {
    fn record(&self, event: FlowEvent) {
        match &event.detail {
            Some(detail) => debug!("[{}] {} ({})", event.label(), event.event_type, detail),
            None => debug!("[{}] {}", event.label(), event.event_type),
        }
    }
}

/// How a recorded step ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Completed,
    Failed,
    TimedOut,
}

impl Outcome {
    fn from_event(event_type: EventType) -> Option<Self> {
        match event_type {
            EventType::Completed => Some(Self::Completed),
            EventType::Failed => Some(Self::Failed),
            EventType::TimedOut => Some(Self::TimedOut),
            _ => None,
        }
    }

    /// Bar glyph used in the chart.
    fn glyph(self) -> char {
        match self {
            Self::Completed => '=',
            Self::Failed => 'x',
            Self::TimedOut => '!',
        }
    }
}

/// A finished step, offsets in milliseconds from timeline creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepSpan {
    pub label: String,
    /// Caller chain of the flow the step belongs to
    pub caller: Option<String>,
    pub start_ms: u128,
    pub end_ms: u128,
    pub outcome: Outcome,
    /// Attempts made, including the first
    pub attempts: u32,
}

impl StepSpan {
    pub fn duration_ms(&self) -> u128 {
        self.end_ms - self.start_ms
    }
}

/// Collects every event of an invocation for later inspection.
///
/// Step spans are rebuilt from `started` and terminal events; parallel
/// steps show up as overlapping bars in [`ExecutionTimeline::gantt_chart`].
#[derive(Debug)]
pub struct ExecutionTimeline {
    events: Mutex<Vec<FlowEvent>>,
    start_time: Instant,
    started_at: DateTime<Utc>,
}

impl ExecutionTimeline {
    pub fn new() -> Self {
        Self {
            events: Mutex::new(Vec::new()),
            start_time: Instant::now(),
            started_at: Utc::now(),
        }
    }

    /// Returns a copy of all recorded events in arrival order.
    pub fn get_events(&self) -> Vec<FlowEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of recorded events of the given type.
    pub fn count(&self, event_type: EventType) -> usize {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|e| e.event_type == event_type)
            .count()
    }

    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Returns step durations in milliseconds, keyed by `flow.step`.
    ///
    /// Spans sharing a label under different callers collapse to the
    /// longest one; use [`ExecutionTimeline::spans`] to tell them apart.
    pub fn get_durations(&self) -> HashMap<String, u128> {
        let mut durations = HashMap::new();
        for span in self.spans() {
            let entry = durations.entry(span.label.clone()).or_insert(0);
            *entry = span.duration_ms().max(*entry);
        }
        durations
    }

    /// Finished steps ordered by start offset.
    ///
    /// Spans are keyed by caller chain and label, so one nested flow called
    /// from two parallel siblings yields two spans. The same step run twice
    /// from the same place keeps its latest span.
    pub fn spans(&self) -> Vec<StepSpan> {
        type Key = (Option<String>, String);
        let mut open: HashMap<Key, (u128, u32)> = HashMap::new();
        let mut spans: HashMap<Key, StepSpan> = HashMap::new();

        for event in self.get_events() {
            if event.step_id.is_empty() {
                continue;
            }
            let offset = event.timestamp.duration_since(self.start_time).as_millis();
            let key = (event.caller.clone(), event.label());
            match event.event_type {
                EventType::Started => {
                    open.insert(key, (offset, 1));
                }
                EventType::Retrying => {
                    if let Some((_, attempts)) = open.get_mut(&key) {
                        *attempts += 1;
                    }
                }
                other => {
                    let Some(outcome) = Outcome::from_event(other) else {
                        continue;
                    };
                    if let Some((start_ms, attempts)) = open.remove(&key) {
                        let span = StepSpan {
                            label: key.1.clone(),
                            caller: key.0.clone(),
                            start_ms,
                            end_ms: offset.max(start_ms),
                            outcome,
                            attempts,
                        };
                        spans.insert(key, span);
                    }
                }
            }
        }

        let mut spans: Vec<StepSpan> = spans.into_values().collect();
        spans.sort_by(|a, b| {
            (a.start_ms, &a.label, &a.caller).cmp(&(b.start_ms, &b.label, &b.caller))
        });
        spans
    }

    /// Renders an ASCII Gantt chart of the recorded steps.
    ///
    /// Bars are drawn with `=` for completed steps, `x` for failures and `!`
    /// for timeouts. Skipped steps are listed underneath.
    pub fn gantt_chart(&self) -> String {
        const WIDTH: f64 = 50.0;

        let mut chart = format!(
            "\nExecution Timeline (started {}):\n\n",
            self.started_at.format("%Y-%m-%d %H:%M:%S%.3f UTC")
        );

        let total_ms = self.elapsed().as_millis().max(1);
        let per_ms = WIDTH / total_ms as f64;

        for span in self.spans() {
            let offset = (span.start_ms as f64 * per_ms) as usize;
            let length = ((span.duration_ms() as f64 * per_ms) as usize).max(1);
            let bar: String = std::iter::repeat(' ')
                .take(offset)
                .chain(std::iter::repeat(span.outcome.glyph()).take(length))
                .collect();
            let retries = if span.attempts > 1 {
                format!(", {} attempts", span.attempts)
            } else {
                String::new()
            };
            chart.push_str(&format!(
                "{} |{:<52}| {} ms{}\n",
                fit(&span.label, 24),
                bar,
                span.duration_ms(),
                retries
            ));
        }

        let skipped: Vec<String> = self
            .get_events()
            .iter()
            .filter(|e| e.event_type == EventType::Skipped)
            .map(FlowEvent::label)
            .collect();
        if !skipped.is_empty() {
            chart.push_str(&format!("\nSkipped: {}\n", skipped.join(", ")));
        }

        chart.push_str(&format!("\nTotal: {} ms\n", self.elapsed().as_millis()));
        chart
    }
}

impl Default for ExecutionTimeline {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSink for ExecutionTimeline {
    fn record(&self, event: FlowEvent) {
        LogSink.record(event.clone());
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }
}

/// Pads or shortens `label` to exactly `width` characters.
fn fit(label: &str, width: usize) -> String {
    if label.chars().count() <= width {
        format!("{:<width$}", label, width = width)
    } else {
        let head: String = label.chars().take(width.saturating_sub(1)).collect();
        format!("{}~", head)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn step(id: &str, event_type: EventType) -> FlowEvent {
        FlowEvent::new("checkout", id, event_type)
    }

    #[test]
    fn test_event_label() {
        assert_eq!(step("charge", EventType::Started).label(), "checkout.charge");
        assert_eq!(FlowEvent::flow("checkout", EventType::FlowStarted).label(), "checkout");
        assert_eq!(EventType::TimedOut.to_string(), "timed_out");
    }

    #[test]
    fn test_spans_track_outcome_and_attempts() {
        let timeline = ExecutionTimeline::new();
        timeline.record(FlowEvent::flow("checkout", EventType::FlowStarted));
        timeline.record(step("charge", EventType::Started));
        timeline.record(step("charge", EventType::Retrying).with_detail("attempt 1"));
        timeline.record(step("charge", EventType::Retrying).with_detail("attempt 2"));
        timeline.record(step("charge", EventType::TimedOut));
        timeline.record(step("receipt", EventType::Started));

        let spans = timeline.spans();
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].label, "checkout.charge");
        assert_eq!(spans[0].outcome, Outcome::TimedOut);
        assert_eq!(spans[0].attempts, 3);
        assert_eq!(timeline.count(EventType::Retrying), 2);
    }

    #[test]
    fn test_same_nested_step_under_two_callers() {
        let timeline = ExecutionTimeline::new();
        let left = |t| FlowEvent::new("inner", "a", t).with_caller("outer.left");
        let right = |t| FlowEvent::new("inner", "a", t).with_caller("outer.right");
        timeline.record(left(EventType::Started));
        timeline.record(right(EventType::Started));
        timeline.record(right(EventType::Failed));
        timeline.record(left(EventType::Completed));

        let spans = timeline.spans();
        assert_eq!(spans.len(), 2);
        let outcome_of = |caller: &str| {
            spans
                .iter()
                .find(|s| s.caller.as_deref() == Some(caller))
                .map(|s| s.outcome)
        };
        assert_eq!(outcome_of("outer.left"), Some(Outcome::Completed));
        assert_eq!(outcome_of("outer.right"), Some(Outcome::Failed));
        assert!(spans.iter().all(|s| s.label == "inner.a"));
    }

    #[test]
    fn test_durations() {
        let timeline = ExecutionTimeline::new();
        timeline.record(step("load", EventType::Started));
        thread::sleep(Duration::from_millis(30));
        timeline.record(step("load", EventType::Completed));

        let durations = timeline.get_durations();
        assert!(durations["checkout.load"] >= 30);
    }

    #[test]
    fn test_gantt_chart_marks_outcomes() {
        let timeline = ExecutionTimeline::new();
        timeline.record(step("load", EventType::Started));
        thread::sleep(Duration::from_millis(10));
        timeline.record(step("load", EventType::Completed));
        timeline.record(step("charge", EventType::Started));
        thread::sleep(Duration::from_millis(10));
        timeline.record(step("charge", EventType::Failed));
        timeline.record(step("notify", EventType::Skipped));

        let chart = timeline.gantt_chart();
        let load = chart.lines().find(|l| l.starts_with("checkout.load")).unwrap();
        let charge = chart.lines().find(|l| l.starts_with("checkout.charge")).unwrap();
        assert!(load.contains('='));
        assert!(charge.contains('x'));
        assert!(chart.contains("Skipped: checkout.notify"));
        assert!(chart.contains("Total:"));
    }

    #[test]
    fn test_records_from_many_threads() {
        let timeline = Arc::new(ExecutionTimeline::new());
        thread::scope(|scope| {
            for i in 0..4 {
                let timeline = Arc::clone(&timeline);
                scope.spawn(move || timeline.record(step(&format!("s{}", i), EventType::Started)));
            }
        });
        assert_eq!(timeline.count(EventType::Started), 4);
    }

    #[test]
    fn test_fit() {
        assert_eq!(fit("abc", 5), "abc  ");
        assert_eq!(fit("abcdefgh", 6), "abcde~");
    }
}
