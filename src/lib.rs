#![forbid(unsafe_code)]

//! # ops
//!
//! Operational primitives for distributed systems: a jittered backoff retry
//! engine, a functional routing state machine with cycle detection, and a
//! bilateral signaller coupling value delivery with acknowledgement.
//!
//! ## Quick Start
//!
//! ```rust
//! use ops::backoff::Policy;
//! use ops::retry::{Deadline, Retrier};
//! use std::sync::atomic::{AtomicUsize, Ordering};
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! #[derive(Debug, thiserror::Error)]
//! #[error("flaky operation failed")]
//! struct FlakyError;
//!
//! async fn flaky(attempts: Arc<AtomicUsize>) -> Result<&'static str, FlakyError> {
//!     if attempts.fetch_add(1, Ordering::Relaxed) < 2 {
//!         Err(FlakyError)
//!     } else {
//!         Ok("ok")
//!     }
//! }
//!
//! # #[tokio::main]
//! # async fn main() {
//! let policy = Policy::builder().build().expect("valid policy");
//! let retrier: Retrier<FlakyError> = Retrier::new(policy);
//! let ctx = Deadline::new(CancellationToken::new());
//! let attempts = Arc::new(AtomicUsize::new(0));
//!
//! let result = retrier.retry(&ctx, |_ctx, _record| flaky(attempts.clone())).await;
//! assert_eq!(result.unwrap(), "ok");
//! # }
//! ```

pub mod backoff;
pub mod classify;
pub mod clock;
pub mod error;
pub mod jitter;
pub mod retry;
pub mod signal;
pub mod statemachine;
pub mod telemetry;

pub use backoff::{Policy, PolicyBuilder, PolicyError, TimeTable, TimeTableEntry};
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{
    is_cancelled, is_permanent, make_cancelled, make_permanent, BoxError, CancellationMarker,
    CancelledError, PermanentError, PermanentMarker,
};
pub use jitter::{randomize, randomize_with_rng};
pub use retry::{
    Deadline, ErrTransformer, Record, RespTransformer, RespTransformerChain, Retrier,
    RetrierBuilder, RetryError, TransformerChain,
};
pub use signal::{Acker, DeliveryMode, SignalError, Signaller, SignallerOptions};
pub use statemachine::{
    run, BoxedState, DataSnapshot, Named, Request, RunOptions, State, StateMachineError,
};
pub use telemetry::{FieldValue, NullSink, NullSpan, Span, StatusCode, TraceSink};

pub mod prelude;
