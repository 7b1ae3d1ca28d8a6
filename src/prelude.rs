//! Convenient re-exports for common `ops` types.
pub use crate::{
    backoff::{Policy, PolicyBuilder, PolicyError, TimeTable, TimeTableEntry},
    clock::{Clock, ManualClock, SystemClock},
    error::{is_cancelled, is_permanent, make_cancelled, make_permanent, BoxError},
    jitter::randomize,
    retry::{
        Deadline, Record, RespTransformer, RespTransformerChain, Retrier, RetrierBuilder,
        RetryError, TransformerChain,
    },
    signal::{Acker, DeliveryMode, SignalError, Signaller, SignallerOptions},
    statemachine::{run, DataSnapshot, Named, Request, RunOptions, StateMachineError},
    telemetry::{NullSink, Span, StatusCode, TraceSink},
};
