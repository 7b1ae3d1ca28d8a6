//! Clock abstraction injected into the retry engine.
//!
//! This is the *only* source of wall time inside [`crate::retry::Retrier`]:
//! production code uses [`SystemClock`], tests use [`ManualClock`], whose
//! [`ManualClock::advance`] fires all due timers synchronously instead of
//! waiting on the real clock. The trait also answers "how long until this
//! deadline" so the retry loop can pre-check a cancellation deadline without
//! sleeping past it.

use futures::future::BoxFuture;
use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::oneshot;

/// Abstraction over wall time and sleeping.
pub trait Clock: Send + Sync + fmt::Debug {
    /// Current instant according to this clock.
    fn now(&self) -> Instant;

    /// Time remaining until `deadline`, zero if already past.
    fn until(&self, deadline: Instant) -> Duration {
        deadline.saturating_duration_since(self.now())
    }

    /// A cancellable one-shot timer that resolves after `duration`.
    fn sleep(&self, duration: Duration) -> BoxFuture<'static, ()>;
}

/// Production clock backed by the system monotonic clock and Tokio's timer
/// wheel.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, duration: Duration) -> BoxFuture<'static, ()> {
        Box::pin(tokio::time::sleep(duration))
    }
}

#[derive(Debug)]
struct ManualClockState {
    now: Instant,
    pending: VecDeque<(Instant, oneshot::Sender<()>)>,
}

/// Test clock whose notion of "now" only moves when [`ManualClock::advance`]
/// is called. Pending [`Clock::sleep`] timers whose deadline has been
/// reached fire synchronously, in deadline order, as part of `advance`.
#[derive(Debug, Clone)]
pub struct ManualClock {
    state: Arc<Mutex<ManualClockState>>,
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl ManualClock {
    /// Create a manual clock starting at the real `Instant::now()`. Only the
    /// deltas matter, so the starting epoch is otherwise arbitrary.
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(ManualClockState {
                now: Instant::now(),
                pending: VecDeque::new(),
            })),
        }
    }

    /// Move the clock forward by `duration`, firing (in order) every pending
    /// timer whose deadline is now at or before the new "now".
    pub fn advance(&self, duration: Duration) {
        let mut state = self.state.lock().expect("ManualClock poisoned");
        state.now += duration;
        let now = state.now;
        let mut fired = Vec::new();
        let due: Vec<_> = {
            let mut tmp = VecDeque::new();
            std::mem::swap(&mut tmp, &mut state.pending);
            let (due, rest): (VecDeque<_>, VecDeque<_>) =
                tmp.into_iter().partition(|(deadline, _)| *deadline <= now);
            state.pending = rest;
            due.into_iter().collect()
        };
        drop(state);
        for (_, tx) in due {
            fired.push(tx);
        }
        for tx in fired {
            let _ = tx.send(());
        }
    }

    /// Number of timers still pending (test introspection).
    pub fn pending_count(&self) -> usize {
        self.state.lock().expect("ManualClock poisoned").pending.len()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.state.lock().expect("ManualClock poisoned").now
    }

    fn sleep(&self, duration: Duration) -> BoxFuture<'static, ()> {
        let (tx, rx) = oneshot::channel();
        let mut state = self.state.lock().expect("ManualClock poisoned");
        let deadline = state.now + duration;
        if duration.is_zero() {
            let _ = tx.send(());
        } else {
            state.pending.push_back((deadline, tx));
        }
        Box::pin(async move {
            let _ = rx.await;
        })
    }
}
