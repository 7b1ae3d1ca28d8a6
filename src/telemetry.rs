//! Tracing sink abstraction shared by the state machine and retry engine.
//!
//! A concrete `PolicyEvent` enum tied to a `tower::Service` pipeline would
//! work for a single backend, but the state machine and retry engine here
//! need something shallower: an abstract span/event surface any tracing
//! backend can implement, with an explicit `is_recording()` gate so the hot
//! path never allocates a span when nobody is listening. Check
//! `is_recording()`, swallow otherwise.

use std::fmt;
use std::time::Duration;

/// A structured field value attachable to a [`Span`] event.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Duration(Duration),
    Array(Vec<FieldValue>),
}

impl From<bool> for FieldValue {
    fn from(v: bool) -> Self {
        FieldValue::Bool(v)
    }
}

impl From<i64> for FieldValue {
    fn from(v: i64) -> Self {
        FieldValue::Int(v)
    }
}

impl From<f64> for FieldValue {
    fn from(v: f64) -> Self {
        FieldValue::Float(v)
    }
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        FieldValue::Str(v.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(v: String) -> Self {
        FieldValue::Str(v)
    }
}

impl From<Duration> for FieldValue {
    fn from(v: Duration) -> Self {
        FieldValue::Duration(v)
    }
}

/// A machine-readable status for a finished [`Span`], independent of any
/// particular wire protocol's status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusCode {
    Ok,
    Error,
}

/// A single span's recording surface.
///
/// Implementations decide what "recording" means; [`Span::is_recording`]
/// lets callers skip building event payloads entirely when it's false.
pub trait Span: Send {
    /// Whether this span (and therefore its parent context) is actually
    /// being recorded. Callers must check this before doing any work to
    /// build event fields.
    fn is_recording(&self) -> bool;

    /// Attach a named event with structured fields.
    fn event(&mut self, name: &str, fields: &[(&str, FieldValue)]);

    /// Set the terminal status of this span.
    fn status(&mut self, code: StatusCode, message: &str);

    /// Close the span. Sinks that buffer or export spans should flush here.
    fn end(&mut self);
}

/// Factory for spans, analogous to a tracer in most tracing APIs.
///
/// `new_span` follows a one-shot "start span, get back a handle" pattern
/// rather than a stack-based enter/exit guard, since spans here are
/// threaded explicitly through the state machine rather than following task-
/// local context.
pub trait TraceSink: Send + Sync + fmt::Debug {
    /// Start a new span named `name`, nested under whatever the caller
    /// considers "current" (callers track that themselves; this trait has
    /// no ambient context).
    fn new_span(&self, name: &str) -> Box<dyn Span>;

    /// Fast-path check: true if this sink would ever record a span at all.
    /// Implementations may return `false` unconditionally to fully disable
    /// tracing, letting callers skip `new_span` entirely.
    fn is_recording(&self) -> bool {
        true
    }
}

/// A no-op span: `is_recording` always false, every other call does nothing.
#[derive(Debug, Default)]
pub struct NullSpan;

impl Span for NullSpan {
    fn is_recording(&self) -> bool {
        false
    }

    fn event(&mut self, _name: &str, _fields: &[(&str, FieldValue)]) {}

    fn status(&mut self, _code: StatusCode, _message: &str) {}

    fn end(&mut self) {}
}

/// The default [`TraceSink`]: produces only [`NullSpan`]s.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl TraceSink for NullSink {
    fn new_span(&self, _name: &str) -> Box<dyn Span> {
        Box::new(NullSpan)
    }

    fn is_recording(&self) -> bool {
        false
    }
}

/// Adapter bridging [`TraceSink`] onto the ambient `tracing` subscriber,
/// gated behind the `tracing-sink` feature since not every embedder wants a
/// hard dependency on a particular subscriber wiring.
#[cfg(feature = "tracing-sink")]
pub mod tracing_sink {
    use super::{FieldValue, Span, StatusCode, TraceSink};
    use std::fmt;

    /// A [`TraceSink`] that opens real `tracing::Span`s.
    #[derive(Debug, Default, Clone, Copy)]
    pub struct TracingSink;

    impl TraceSink for TracingSink {
        fn new_span(&self, name: &str) -> Box<dyn Span> {
            let span = tracing::info_span!("span", name = %name);
            Box::new(TracingSpan { span, recording: tracing::enabled!(tracing::Level::INFO) })
        }

        fn is_recording(&self) -> bool {
            tracing::enabled!(tracing::Level::INFO)
        }
    }

    struct TracingSpan {
        span: tracing::Span,
        recording: bool,
    }

    impl fmt::Debug for TracingSpan {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.debug_struct("TracingSpan").field("recording", &self.recording).finish()
        }
    }

    impl Span for TracingSpan {
        fn is_recording(&self) -> bool {
            self.recording
        }

        fn event(&mut self, name: &str, fields: &[(&str, FieldValue)]) {
            if !self.recording {
                return;
            }
            let _enter = self.span.enter();
            let rendered: Vec<String> =
                fields.iter().map(|(k, v)| format!("{k}={v:?}")).collect();
            tracing::event!(tracing::Level::INFO, name, fields = %rendered.join(", "));
        }

        fn status(&mut self, code: StatusCode, message: &str) {
            if !self.recording {
                return;
            }
            let _enter = self.span.enter();
            match code {
                StatusCode::Ok => tracing::event!(tracing::Level::INFO, status = "ok", message),
                StatusCode::Error => tracing::event!(tracing::Level::WARN, status = "error", message),
            }
        }

        fn end(&mut self) {}
    }
}
