//! Bilateral signaller: couples value delivery with an acknowledgement
//! return path, in fire-and-forget, blocking, or promise-forwarding modes.
//!
//! The internal hand-off buffer is a bounded multi-producer/multi-consumer
//! queue. `tokio::sync::mpsc` only supports a single consumer, so the
//! hand-off buffer uses `async-channel` instead.

use crate::retry::Deadline;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

/// Errors raised by [`Signaller::signal`].
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum SignalError {
    /// The signaller was closed, or closed concurrently with this call.
    #[error("signaller is closed")]
    Closed,
    /// The cancellation handle fired before delivery completed.
    #[error("signal cancelled before delivery")]
    Cancelled,
}

/// One value in flight: the sent payload plus its single-use reply path.
pub struct Acker<S, R> {
    /// The payload sent by the producer.
    pub data: S,
    reply_tx: Option<oneshot::Sender<R>>,
}

impl<S, R> Acker<S, R> {
    /// Acknowledge this signal with `reply`. A no-op if the producer is no
    /// longer waiting (fire-and-forget mode, or the producer cancelled).
    pub fn ack(mut self, reply: R) {
        if let Some(tx) = self.reply_tx.take() {
            let _ = tx.send(reply);
        }
    }
}

/// How a producer wants acknowledgement delivered.
///
/// `Wait` and `Promise` are mutually exclusive by construction: the flags-
/// based API this is modeled on allows requesting both at once (a
/// programmer error it must reject at runtime), but representing them as
/// variants of one enum makes that combination unconstructible instead.
pub enum DeliveryMode<R> {
    /// Enqueue and return immediately with `R::default()`; the reply is
    /// discarded.
    FireAndForget,
    /// Block until acknowledged, or until cancellation fires.
    Wait,
    /// Enqueue and return `R::default()` immediately; the real reply (or
    /// `R::default()` on cancellation) is forwarded to `channel` from a
    /// background task.
    Promise(mpsc::Sender<R>),
}

/// Options controlling a [`Signaller`].
#[derive(Debug, Clone, Copy)]
pub struct SignallerOptions {
    buffer: usize,
}

impl Default for SignallerOptions {
    fn default() -> Self {
        Self { buffer: 1 }
    }
}

impl SignallerOptions {
    /// Start from the default buffer size of 1.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the internal hand-off buffer's capacity.
    pub fn buffer(mut self, capacity: usize) -> Self {
        self.buffer = capacity.max(1);
        self
    }
}

/// Point-to-point value/acknowledgement coupling with multiple producers and
/// consumers. Each value is delivered to exactly one receiver. FIFO is
/// preserved per producer; there is no ordering guarantee across producers.
pub struct Signaller<S, R> {
    tx: async_channel::Sender<Acker<S, R>>,
    rx: async_channel::Receiver<Acker<S, R>>,
    closed: Arc<AtomicBool>,
}

impl<S, R> Clone for Signaller<S, R> {
    fn clone(&self) -> Self {
        Self { tx: self.tx.clone(), rx: self.rx.clone(), closed: self.closed.clone() }
    }
}

impl<S, R> Signaller<S, R>
where
    S: Send + 'static,
    R: Default + Send + 'static,
{
    /// Create a signaller with the given options.
    pub fn new(options: SignallerOptions) -> Self {
        let (tx, rx) = async_channel::bounded(options.buffer);
        Self { tx, rx, closed: Arc::new(AtomicBool::new(false)) }
    }

    /// Send `value`, acknowledged according to `mode`.
    ///
    /// # Panics
    ///
    /// Panics if `mode` is [`DeliveryMode::Promise`] with an already-closed
    /// channel. Passing a dead promise channel is a programmer error, the
    /// same class of mistake a builder would reject with `.expect`.
    pub async fn signal(
        &self,
        ctx: &Deadline,
        value: S,
        mode: DeliveryMode<R>,
    ) -> Result<R, SignalError> {
        match mode {
            DeliveryMode::FireAndForget => {
                let (reply_tx, _reply_rx) = oneshot::channel();
                let acker = Acker { data: value, reply_tx: Some(reply_tx) };
                self.enqueue(ctx, acker).await?;
                Ok(R::default())
            }
            DeliveryMode::Wait => {
                let (reply_tx, reply_rx) = oneshot::channel();
                let acker = Acker { data: value, reply_tx: Some(reply_tx) };
                self.enqueue(ctx, acker).await?;
                tokio::select! {
                    reply = reply_rx => reply.map_err(|_| SignalError::Cancelled),
                    _ = ctx.token().cancelled() => Err(SignalError::Cancelled),
                }
            }
            DeliveryMode::Promise(promise_tx) => {
                if promise_tx.is_closed() {
                    panic!("Signaller::signal: promise channel is closed");
                }
                let (reply_tx, reply_rx) = oneshot::channel();
                let acker = Acker { data: value, reply_tx: Some(reply_tx) };
                self.enqueue(ctx, acker).await?;
                let token = ctx.token().clone();
                tokio::spawn(async move {
                    let value = tokio::select! {
                        reply = reply_rx => reply.unwrap_or_default(),
                        _ = token.cancelled() => R::default(),
                    };
                    let _ = promise_tx.send(value).await;
                });
                Ok(R::default())
            }
        }
    }

    async fn enqueue(&self, ctx: &Deadline, acker: Acker<S, R>) -> Result<(), SignalError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(SignalError::Closed);
        }
        tokio::select! {
            result = self.tx.send(acker) => result.map_err(|_| SignalError::Closed),
            _ = ctx.token().cancelled() => Err(SignalError::Cancelled),
        }
    }

    /// A stream of inbound ackers. Each value is delivered to exactly one
    /// consumer across however many `receive()` streams are live.
    pub fn receive(&self) -> async_channel::Receiver<Acker<S, R>> {
        self.rx.clone()
    }

    /// Close the signaller. Producers still racing `signal` observe
    /// [`SignalError::Closed`]; consumers iterating `receive()` observe
    /// end-of-stream once the buffer drains. Single-use: once closed, a
    /// signaller cannot be reopened.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.tx.close();
    }

    /// Return a reply channel to the pool. This implementation hands out a
    /// fresh `oneshot` pair per send rather than pooling, since `tokio::sync::
    /// oneshot` channels are single-use and can't be reset for reuse, so
    /// `recycle` is always a no-op.
    pub fn recycle(&self, _acker: Acker<S, R>) {}
}
