//! Functional routing state machine: threads a typed [`Request`] through a
//! dynamically chosen sequence of named state functions.
//!
//! Each state is registered as a [`Named`] pair of a stable name and a
//! callable, the same way a `CommandMeta`-style type asks callers to supply
//! an explicit label rather than deriving one at runtime. The name is used
//! in span labels and in the cycle-detection trace.

use crate::retry::Deadline;
use crate::telemetry::{FieldValue, NullSink, TraceSink};
use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;

/// Produces the span-attachable snapshot of a state's data payload that
/// `run`'s tracing events carry on entry and exit.
///
/// Behind the `serde` feature this serializes to JSON via `serde_json`, the
/// same way the CLI renders a `Policy`; without it, every `Request<T>`
/// payload only needs to derive `Debug`, matching the bound the rest of this
/// module already expects of test and demo payloads.
pub trait DataSnapshot {
    /// Render this value as a tracing field.
    fn snapshot(&self) -> FieldValue;
}

#[cfg(feature = "serde")]
impl<T: serde::Serialize> DataSnapshot for T {
    fn snapshot(&self) -> FieldValue {
        match serde_json::to_string(self) {
            Ok(json) => FieldValue::from(json),
            Err(_) => FieldValue::from("<unserializable>"),
        }
    }
}

#[cfg(not(feature = "serde"))]
impl<T: fmt::Debug> DataSnapshot for T {
    fn snapshot(&self) -> FieldValue {
        FieldValue::from(format!("{:?}", self))
    }
}

/// A bare function pointer state, for states with no captured environment.
pub type State<T> = fn(Request<T>) -> Request<T>;

/// A boxed closure state, for states that close over captured data.
pub type BoxedState<T> = Arc<dyn Fn(Request<T>) -> Request<T> + Send + Sync>;

/// A state paired with the stable name used in tracing spans and cycle
/// traces.
pub struct Named<T> {
    name: Cow<'static, str>,
    func: BoxedState<T>,
}

// Hand-written: `#[derive(Clone)]` would add a spurious `T: Clone` bound even
// though only the `Arc<dyn Fn>` is ever cloned here.
impl<T> Clone for Named<T> {
    fn clone(&self) -> Self {
        Self { name: self.name.clone(), func: self.func.clone() }
    }
}

impl<T> fmt::Debug for Named<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Named").field("name", &self.name).finish_non_exhaustive()
    }
}

impl<T> Named<T> {
    /// Wrap a bare function pointer with a stable name.
    pub fn new(name: impl Into<Cow<'static, str>>, func: State<T>) -> Self {
        Self { name: name.into(), func: Arc::new(func) }
    }

    /// Wrap a closure (or anything `Fn`) with a stable name.
    pub fn from_closure(
        name: impl Into<Cow<'static, str>>,
        func: impl Fn(Request<T>) -> Request<T> + Send + Sync + 'static,
    ) -> Self {
        Self { name: name.into(), func: Arc::new(func) }
    }

    /// The state's stable name.
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Boxed error type carried by [`Request::err`], wide enough to hold either
/// a caller's domain error or a [`StateMachineError`] raised by the runner
/// itself.
pub use crate::error::BoxError;

/// The typed payload threaded through every state.
pub struct Request<T> {
    /// Cancellation handle available to every state.
    pub ctx: Deadline,
    /// Caller-owned payload.
    pub data: T,
    /// Set by a state (or the runner) to terminate with failure.
    pub err: Option<BoxError>,
    /// The next state to execute, or `None` to terminate successfully.
    pub next: Option<Named<T>>,
    seen: Vec<Cow<'static, str>>,
}

impl<T> fmt::Debug for Request<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Request")
            .field("err", &self.err.as_ref().map(|e| e.to_string()))
            .field("next", &self.next.as_ref().map(Named::name))
            .field("seen", &self.seen)
            .finish_non_exhaustive()
    }
}

impl<T> Request<T> {
    /// Start a request at `initial`, with no error and an empty trace.
    pub fn new(ctx: Deadline, data: T, initial: Named<T>) -> Self {
        Self { ctx, data, err: None, next: Some(initial), seen: Vec::new() }
    }

    /// Names visited so far, in order (only populated when cycle detection
    /// is enabled).
    pub fn seen(&self) -> &[Cow<'static, str>] {
        &self.seen
    }
}

/// Errors raised by the state machine runner itself, as opposed to errors a
/// state sets on `request.err`.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum StateMachineError {
    /// A precondition of `run` was violated.
    #[error("state machine precondition violated: {0}")]
    Precondition(&'static str),
    /// Cycle detection found a repeated state name.
    #[error("cycle detected: {trace}")]
    Cycle {
        /// Arrow-joined trace, e.g. `"A -> B -> C -> A"`.
        trace: String,
    },
    /// Internal bug sentinel: never raised by valid input.
    #[error("state machine invariant violated: {0}")]
    Invariant(&'static str),
}

/// Options controlling a single [`run`] invocation.
#[derive(Clone)]
pub struct RunOptions {
    detect_cycles: bool,
    max_seen_inline: usize,
    sink: Arc<dyn TraceSink>,
}

impl fmt::Debug for RunOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunOptions")
            .field("detect_cycles", &self.detect_cycles)
            .field("max_seen_inline", &self.max_seen_inline)
            .finish_non_exhaustive()
    }
}

impl Default for RunOptions {
    fn default() -> Self {
        Self { detect_cycles: false, max_seen_inline: 16, sink: Arc::new(NullSink) }
    }
}

impl RunOptions {
    /// Start from the defaults: no cycle detection, no tracing sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable cycle detection.
    pub fn detect_cycles(mut self, detect: bool) -> Self {
        self.detect_cycles = detect;
        self
    }

    /// Pre-reserve capacity for the visited-name trace. Expected routing
    /// depths are small (well under 20 states), so this just avoids a few
    /// reallocations rather than bounding anything.
    pub fn max_seen_inline(mut self, capacity: usize) -> Self {
        self.max_seen_inline = capacity;
        self
    }

    /// Attach a tracing sink. Defaults to [`NullSink`], which records
    /// nothing and costs nothing.
    pub fn sink(mut self, sink: Arc<dyn TraceSink>) -> Self {
        self.sink = sink;
        self
    }
}

/// Drives a [`Request`] through its chain of [`Named`] states.
///
/// Preconditions (checked before any state runs): `name` non-empty once
/// trimmed, `request.next` present, `request.err` absent. Violating any of
/// these returns immediately with that specific [`StateMachineError`] and
/// `request.next` cleared.
pub fn run<T: DataSnapshot>(name: &str, mut request: Request<T>, options: RunOptions) -> Request<T> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        request.err = Some(Box::new(StateMachineError::Precondition("run name must not be empty")));
        request.next = None;
        return request;
    }
    if request.err.is_some() {
        request.err =
            Some(Box::new(StateMachineError::Precondition("request.err must be absent on entry")));
        request.next = None;
        return request;
    }
    if request.next.is_none() {
        request.err =
            Some(Box::new(StateMachineError::Precondition("request.next must be set on entry")));
        return request;
    }

    if options.detect_cycles {
        request.seen = Vec::with_capacity(options.max_seen_inline);
    }

    let recording = options.sink.is_recording();
    let mut root_span = recording.then(|| options.sink.new_span(&format!("statemachine({trimmed})")));
    if let Some(span) = root_span.as_deref_mut() {
        span.event("start", &[("name", FieldValue::from(trimmed)), ("data", request.data.snapshot())]);
    }

    loop {
        let Some(state) = request.next.take() else { break };
        let state_name = state.name.clone();

        if options.detect_cycles {
            if request.seen.iter().any(|seen| *seen == state_name) {
                request.seen.push(state_name.clone());
                let trace = request
                    .seen
                    .iter()
                    .map(|s| s.as_ref())
                    .collect::<Vec<_>>()
                    .join(" -> ");
                tracing::warn!(%trace, "statemachine: cycle detected");
                request.err = Some(Box::new(StateMachineError::Cycle { trace }));
                request.next = None;
                if let Some(span) = root_span.as_deref_mut() {
                    span.status(crate::telemetry::StatusCode::Error, "cycle detected");
                    span.end();
                }
                return request;
            }
            request.seen.push(state_name.clone());
        }

        let mut child_span =
            recording.then(|| options.sink.new_span(&format!("State({state_name})")));
        if let Some(span) = child_span.as_deref_mut() {
            span.event("enter", &[("data", request.data.snapshot())]);
        }

        request = (state.func)(request);

        if let Some(span) = child_span.as_deref_mut() {
            span.event("exit", &[("data", request.data.snapshot())]);
            span.end();
        }

        if request.err.is_some() {
            request.next = None;
            if let Some(span) = root_span.as_deref_mut() {
                span.status(crate::telemetry::StatusCode::Error, "state returned an error");
                span.end();
            }
            return request;
        }
    }

    if let Some(span) = root_span.as_deref_mut() {
        span.status(crate::telemetry::StatusCode::Ok, "completed");
        span.end();
    }
    request
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use tokio_util::sync::CancellationToken;

    fn ctx() -> Deadline {
        Deadline::new(CancellationToken::new())
    }

    /// A recording sink that stashes every event's fields for inspection,
    /// standing in for a real exporter in tests. Every span it hands out
    /// shares the same underlying buffer via a cloned `Arc`.
    #[derive(Debug, Default)]
    struct RecordingSink {
        events: Arc<Mutex<Vec<(String, Vec<FieldValue>)>>>,
    }

    impl TraceSink for RecordingSink {
        fn new_span(&self, _name: &str) -> Box<dyn Span> {
            Box::new(RecordingSpan { events: self.events.clone() })
        }
    }

    #[derive(Debug)]
    struct RecordingSpan {
        events: Arc<Mutex<Vec<(String, Vec<FieldValue>)>>>,
    }

    impl crate::telemetry::Span for RecordingSpan {
        fn is_recording(&self) -> bool {
            true
        }

        fn event(&mut self, name: &str, fields: &[(&str, FieldValue)]) {
            self.events
                .lock()
                .unwrap()
                .push((name.to_string(), fields.iter().map(|(_, v)| v.clone()).collect()));
        }

        fn status(&mut self, _code: crate::telemetry::StatusCode, _message: &str) {}

        fn end(&mut self) {}
    }

    #[test]
    fn enter_and_exit_events_carry_a_data_snapshot() {
        fn increment(mut req: Request<u32>) -> Request<u32> {
            req.data += 1;
            req
        }
        let start = Named::new("increment", increment);
        let request = Request::new(ctx(), 41u32, start);
        let sink = Arc::new(RecordingSink::default());
        let options = RunOptions::new().sink(sink.clone());

        let result = run("test", request, options);
        assert!(result.err.is_none());

        let events = sink.events.lock().unwrap();
        let enter = events.iter().find(|(name, _)| name == "enter").expect("enter event");
        assert_eq!(enter.1, vec![FieldValue::from(format!("{:?}", 41u32))]);
        let exit = events.iter().find(|(name, _)| name == "exit").expect("exit event");
        assert_eq!(exit.1, vec![FieldValue::from(format!("{:?}", 42u32))]);
    }

    fn chain_of(names: &'static [&'static str]) -> Named<u32> {
        fn step(mut req: Request<u32>) -> Request<u32> {
            req.data += 1;
            req
        }
        // Build states right-to-left so each one's `next` points at the one
        // built before it; the last name in the slice terminates the chain.
        let mut next: Option<Named<u32>> = None;
        for name in names.iter().rev() {
            let captured_next = next.clone();
            next = Some(Named::from_closure(*name, move |mut req: Request<u32>| {
                req = step(req);
                req.next = captured_next.clone();
                req
            }));
        }
        next.expect("names must be non-empty")
    }

    #[test]
    fn visits_states_in_chain_order_and_counts_invocations() {
        let start = chain_of(&["a", "b", "c"]);
        let request = Request::new(ctx(), 0u32, start);
        let result = run("test", request, RunOptions::new());
        assert!(result.err.is_none());
        assert_eq!(result.data, 3);
    }

    #[test]
    fn empty_run_name_is_a_precondition_violation() {
        let start = Named::from_closure("only", |req| req);
        let request = Request::new(ctx(), 0u32, start);
        let result = run("   ", request, RunOptions::new());
        assert!(result.next.is_none());
        let err = result.err.expect("expected precondition error");
        assert!(err.to_string().contains("precondition"));
    }

    #[test]
    fn missing_next_on_entry_is_a_precondition_violation() {
        let request = Request { ctx: ctx(), data: 0u32, err: None, next: None, seen: Vec::new() };
        let result = run("test", request, RunOptions::new());
        let err = result.err.expect("expected precondition error");
        assert!(err.to_string().contains("precondition"));
    }

    #[test]
    fn preset_err_on_entry_is_a_precondition_violation() {
        let start = Named::from_closure("only", |req| req);
        let mut request = Request::new(ctx(), 0u32, start);
        request.err = Some("preexisting".into());
        let result = run("test", request, RunOptions::new());
        let err = result.err.expect("expected precondition error");
        assert!(err.to_string().contains("precondition"));
        assert!(result.next.is_none());
    }

    #[test]
    fn state_error_terminates_immediately() {
        fn failing(mut req: Request<u32>) -> Request<u32> {
            req.err = Some("boom".into());
            req
        }
        let start = Named::new("failing", failing);
        let request = Request::new(ctx(), 0u32, start);
        let result = run("test", request, RunOptions::new());
        assert!(result.next.is_none());
        assert_eq!(result.err.unwrap().to_string(), "boom");
    }

    #[test]
    fn cycle_detection_reports_arrow_joined_trace_ending_in_repeat() {
        // A -> B -> C -> A, built explicitly so the cycle is unambiguous.
        let a_name = "A";
        let b = Named::from_closure("B", |mut req: Request<u32>| {
            req.next = Some(Named::from_closure("C", |mut req: Request<u32>| {
                req.next = Some(Named::from_closure("A", |req| req));
                req
            }));
            req
        });
        let a = Named::from_closure(a_name, move |mut req: Request<u32>| {
            req.next = Some(b.clone());
            req
        });

        let request = Request::new(ctx(), 0u32, a);
        let options = RunOptions::new().detect_cycles(true);
        let result = run("test", request, options);

        let err = result.err.expect("expected cycle error");
        assert!(err.to_string().contains("A -> B -> C -> A"));
        assert_eq!(result.seen(), &["A", "B", "C", "A"]);
    }

    #[test]
    fn without_cycle_detection_repeated_names_are_not_flagged() {
        let counter = std::sync::Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let counter_clone = counter.clone();
        fn build(counter: std::sync::Arc<std::sync::atomic::AtomicUsize>) -> Named<u32> {
            Named::from_closure("loop", move |mut req: Request<u32>| {
                let n = counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                if n < 2 {
                    req.next = Some(build(counter.clone()));
                }
                req
            })
        }
        let start = build(counter_clone);
        let request = Request::new(ctx(), 0u32, start);
        let result = run("test", request, RunOptions::new());
        assert!(result.err.is_none());
        assert_eq!(counter.load(std::sync::atomic::Ordering::SeqCst), 3);
    }
}
