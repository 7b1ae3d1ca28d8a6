//! The retry engine: drives repeated attempts of a caller-supplied
//! operation according to a [`Policy`], sleeping between attempts with
//! jitter, honoring cancellation, and short-circuiting on permanent errors.
//!
//! Structurally this follows a `RetryPolicy::execute` shape (builder-
//! constructed policy object exposing an `async fn` that drives a
//! caller-supplied `FnMut() -> Fut`), generalized to a richer per-attempt
//! `Record` and cancellation-aware sleep.

use crate::backoff::{Policy, TimeTable};
use crate::clock::{Clock, SystemClock};
use crate::error::is_permanent;
use crate::jitter::randomize;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// A cancellation handle paired with an optional deadline.
///
/// `tokio_util::sync::CancellationToken` carries no notion of a deadline, so
/// this pairs one with an optional [`Instant`] the retry loop can check
/// before committing to a sleep.
#[derive(Debug, Clone)]
pub struct Deadline {
    token: CancellationToken,
    at: Option<Instant>,
}

impl Deadline {
    /// A deadline-less cancellation handle.
    pub fn new(token: CancellationToken) -> Self {
        Self { token, at: None }
    }

    /// A cancellation handle that also carries a deadline.
    pub fn with_deadline(token: CancellationToken, at: Instant) -> Self {
        Self { token, at: Some(at) }
    }

    /// The underlying cancellation token.
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// The configured deadline, if any.
    pub fn deadline(&self) -> Option<Instant> {
        self.at
    }

    /// True if the token has already fired.
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

/// Per-attempt observation handed to the operation callback.
#[derive(Debug)]
pub struct Record<E> {
    /// 1-based counter of the current invocation.
    pub attempt: u64,
    /// The randomized wait taken just before this call (zero on attempt 1).
    pub last_interval: Duration,
    /// Cumulative sleep time across all prior waits.
    pub total_interval: Duration,
    /// The error returned by the previous attempt (`None` on attempt 1).
    pub err: Option<Arc<E>>,
}

// Hand-written rather than derived: `#[derive(Clone)]` would add a spurious
// `E: Clone` bound even though only `Arc<E>` is ever cloned here.
impl<E> Clone for Record<E> {
    fn clone(&self) -> Self {
        Self {
            attempt: self.attempt,
            last_interval: self.last_interval,
            total_interval: self.total_interval,
            err: self.err.clone(),
        }
    }
}

impl<E> Record<E> {
    fn first() -> Self {
        Self { attempt: 1, last_interval: Duration::ZERO, total_interval: Duration::ZERO, err: None }
    }
}

/// A classifier that may leave an error untouched, wrap it, or mark it
/// permanent. Applied once per attempt, in chain order, before
/// classification.
pub type ErrTransformer<E> = Arc<dyn Fn(E) -> E + Send + Sync>;

/// An ordered chain of [`ErrTransformer`]s.
#[derive(Clone)]
pub struct TransformerChain<E> {
    transformers: Vec<ErrTransformer<E>>,
}

impl<E> Default for TransformerChain<E> {
    fn default() -> Self {
        Self { transformers: Vec::new() }
    }
}

impl<E> TransformerChain<E> {
    /// An empty chain (errors pass through unchanged).
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a transformer to the end of the chain.
    pub fn push<F>(mut self, transformer: F) -> Self
    where
        F: Fn(E) -> E + Send + Sync + 'static,
    {
        self.transformers.push(Arc::new(transformer));
        self
    }

    fn apply(&self, err: E) -> E {
        self.transformers.iter().fold(err, |e, t| t(e))
    }
}

/// A response-inspecting classifier: given a successful response and the
/// (absent) error, may synthesize an error, marking it permanent or leaving
/// it retriable, when the response encodes an application-level failure a
/// transport-level status code wouldn't catch (e.g. a `200 OK` body
/// carrying `{"error": "..."}`).
///
/// Unlike [`ErrTransformer`], which only ever sees an error that already
/// happened, a `RespTransformer` runs on the *successful* path, which is why
/// it takes and returns the response alongside the optional error.
pub type RespTransformer<Resp, E> = Arc<dyn Fn(Resp, Option<E>) -> (Resp, Option<E>) + Send + Sync>;

/// An ordered chain of [`RespTransformer`]s. Each inspector may promote a
/// response to an error; once one does and marks it permanent, later
/// inspectors still run but see the already-permanent error. The chain
/// never rewinds: "short-circuits" here means classification, not
/// execution. See [`crate::error::is_permanent`].
#[derive(Clone)]
pub struct RespTransformerChain<Resp, E> {
    transformers: Vec<RespTransformer<Resp, E>>,
}

impl<Resp, E> Default for RespTransformerChain<Resp, E> {
    fn default() -> Self {
        Self { transformers: Vec::new() }
    }
}

impl<Resp, E> RespTransformerChain<Resp, E> {
    /// An empty chain (responses pass through unchanged).
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an inspector to the end of the chain.
    pub fn push<F>(mut self, transformer: F) -> Self
    where
        F: Fn(Resp, Option<E>) -> (Resp, Option<E>) + Send + Sync + 'static,
    {
        self.transformers.push(Arc::new(transformer));
        self
    }

    /// Run every inspector in order over `(resp, err)`.
    pub fn apply(&self, resp: Resp, err: Option<E>) -> (Resp, Option<E>) {
        self.transformers.iter().fold((resp, err), |(r, e), t| t(r, e))
    }
}

/// The engine's sole result kind: the caller's error plus retry-loop flags.
#[derive(Debug)]
pub struct RetryError<E> {
    /// The underlying cause (after transformer classification).
    pub wrapped: E,
    /// The final `Record` observed before giving up.
    pub record: Record<E>,
    /// True if classification marked the cause non-retriable.
    pub permanent: bool,
    /// True if the loop ended because the cancellation token fired or a
    /// deadline would have been missed, as opposed to the op's own error
    /// merely being a cancellation-flavored error.
    pub cancelled: bool,
}

impl<E: std::fmt::Display> std::fmt::Display for RetryError<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.cancelled {
            write!(f, "retry cancelled after {} attempt(s): {}", self.record.attempt, self.wrapped)
        } else if self.permanent {
            write!(f, "permanent error after {} attempt(s): {}", self.record.attempt, self.wrapped)
        } else {
            write!(f, "retry failed after {} attempt(s): {}", self.record.attempt, self.wrapped)
        }
    }
}

impl<E: std::error::Error + 'static> std::error::Error for RetryError<E> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.wrapped)
    }
}

impl<E> RetryError<E> {
    /// Whether classification marked the final cause permanent.
    pub fn is_permanent(&self) -> bool {
        self.permanent
    }

    /// Whether the retry *loop* ended due to cancellation (deadline miss or
    /// token fired), as opposed to the op's own error.
    pub fn is_loop_cancelled(&self) -> bool {
        self.cancelled
    }
}

impl<E: std::error::Error + 'static> RetryError<E> {
    /// Whether the wrapped cause chain itself is a cancellation error (via
    /// [`crate::error::is_cancelled`]), independent of `cancelled`. The two
    /// can disagree: the op may return a cancellation-flavored error on its
    /// last attempt with no loop-level cancellation ever observed.
    pub fn cause_is_cancelled(&self) -> bool {
        crate::error::is_cancelled(&self.wrapped)
    }
}

/// Drives repeated attempts of an operation per a [`Policy`].
pub struct Retrier<E> {
    policy: Policy,
    transformers: TransformerChain<E>,
    clock: Arc<dyn Clock>,
}

impl<E> Retrier<E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    /// Build a retrier with default transformers (none) and the system clock.
    pub fn new(policy: Policy) -> Self {
        Self { policy, transformers: TransformerChain::new(), clock: Arc::new(SystemClock) }
    }

    /// Construct via builder for full control over transformers/clock.
    pub fn builder() -> RetrierBuilder<E> {
        RetrierBuilder::new()
    }

    /// Pure projection of the underlying policy; does not touch the clock.
    pub fn timetable(&self, attempts: i64) -> TimeTable {
        self.policy.timetable(attempts)
    }

    /// Run `op` repeatedly until success, a permanent error, or cancellation.
    pub async fn retry<T, Fut, Op>(&self, ctx: &Deadline, mut op: Op) -> Result<T, RetryError<E>>
    where
        T: Send,
        Fut: Future<Output = Result<T, E>> + Send,
        Op: FnMut(Deadline, Record<E>) -> Fut + Send,
    {
        let mut record = Record::first();
        let mut current_interval = self.policy.initial_interval();

        loop {
            tracing::debug!(attempt = record.attempt, "retry: invoking operation");

            let err = match op(ctx.clone(), record.clone()).await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            let classified = self.transformers.apply(err);

            if is_permanent(&classified) {
                tracing::warn!(attempt = record.attempt, "retry: permanent error, giving up");
                return Err(RetryError { wrapped: classified, record, permanent: true, cancelled: false });
            }

            let next_interval = randomize(current_interval, self.policy.randomization_factor());

            if let Some(deadline) = ctx.at {
                if self.clock.until(deadline) < next_interval {
                    tracing::debug!(attempt = record.attempt, "retry: deadline would be missed, cancelling");
                    return Err(RetryError {
                        wrapped: classified,
                        record,
                        permanent: false,
                        cancelled: true,
                    });
                }
            }

            if ctx.token.is_cancelled() {
                tracing::debug!(attempt = record.attempt, "retry: cancellation token already fired");
                return Err(RetryError { wrapped: classified, record, permanent: false, cancelled: true });
            }

            tokio::select! {
                _ = self.clock.sleep(next_interval) => {}
                _ = ctx.token.cancelled() => {
                    tracing::debug!(attempt = record.attempt, "retry: cancelled mid-sleep");
                    return Err(RetryError {
                        wrapped: classified,
                        record,
                        permanent: false,
                        cancelled: true,
                    });
                }
            }

            record.total_interval += next_interval;
            current_interval = current_interval.mul_f64(self.policy.multiplier()).min(self.policy.max_interval());
            record.attempt += 1;
            record.last_interval = next_interval;
            record.err = Some(Arc::new(classified));
        }
    }
}

/// Builder for [`Retrier`].
pub struct RetrierBuilder<E> {
    policy: Policy,
    transformers: TransformerChain<E>,
    clock: Arc<dyn Clock>,
}

impl<E> Default for RetrierBuilder<E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<E> RetrierBuilder<E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    /// Start from the default [`Policy`] and no transformers.
    pub fn new() -> Self {
        Self { policy: Policy::default(), transformers: TransformerChain::new(), clock: Arc::new(SystemClock) }
    }

    /// Override the policy.
    pub fn policy(mut self, policy: Policy) -> Self {
        self.policy = policy;
        self
    }

    /// Install an error transformer chain.
    pub fn transformers(mut self, chain: TransformerChain<E>) -> Self {
        self.transformers = chain;
        self
    }

    /// Install a custom clock (e.g. [`crate::clock::ManualClock`] in tests).
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Build the retrier.
    pub fn build(self) -> Retrier<E> {
        Retrier { policy: self.policy, transformers: self.transformers, clock: self.clock }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::error::PermanentMarker;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug)]
    enum TestError {
        Transient(String),
        Permanent(String),
    }

    impl std::fmt::Display for TestError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            match self {
                TestError::Transient(msg) => write!(f, "transient: {}", msg),
                TestError::Permanent(msg) => write!(f, "permanent: {}", msg),
            }
        }
    }

    impl std::error::Error for TestError {
        fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
            match self {
                TestError::Permanent(_) => Some(&PERMANENT_MARKER),
                TestError::Transient(_) => None,
            }
        }
    }

    static PERMANENT_MARKER: PermanentMarker = PermanentMarker;

    fn test_policy() -> Policy {
        Policy::builder()
            .initial_interval(Duration::from_millis(10))
            .multiplier(2.0)
            .randomization_factor(0.0)
            .max_interval(Duration::from_secs(1))
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn succeeds_on_first_attempt() {
        let clock = Arc::new(ManualClock::new());
        let retrier: Retrier<TestError> =
            Retrier::builder().policy(test_policy()).clock(clock.clone()).build();
        let ctx = Deadline::new(CancellationToken::new());

        let result = retrier.retry(&ctx, |_ctx, record| async move {
            assert_eq!(record.attempt, 1);
            assert_eq!(record.total_interval, Duration::ZERO);
            Ok::<_, TestError>(42)
        }).await;

        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test]
    async fn short_circuits_on_first_permanent_error() {
        let clock = Arc::new(ManualClock::new());
        let retrier: Retrier<TestError> =
            Retrier::builder().policy(test_policy()).clock(clock.clone()).build();
        let ctx = Deadline::new(CancellationToken::new());
        let attempts = Arc::new(AtomicUsize::new(0));
        let attempts_clone = attempts.clone();

        let result = retrier
            .retry(&ctx, move |_ctx, _record| {
                attempts_clone.fetch_add(1, Ordering::SeqCst);
                async move { Err::<(), _>(TestError::Permanent("boom".into())) }
            })
            .await;

        let err = result.unwrap_err();
        assert!(err.is_permanent());
        assert!(!err.is_loop_cancelled());
        assert_eq!(err.record.attempt, 1);
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retries_transient_then_reports_attempt_two_on_permanent() {
        let clock = Arc::new(ManualClock::new());
        let retrier: Retrier<TestError> =
            Retrier::builder().policy(test_policy()).clock(clock.clone()).build();
        let ctx = Deadline::new(CancellationToken::new());
        let attempts = Arc::new(AtomicUsize::new(0));

        let driver = {
            let clock = clock.clone();
            let attempts = attempts.clone();
            async move {
                retrier
                    .retry(&ctx, move |_ctx, _record| {
                        let attempt = attempts.fetch_add(1, Ordering::SeqCst);
                        async move {
                            if attempt == 0 {
                                Err(TestError::Transient("retry me".into()))
                            } else {
                                Err(TestError::Permanent("boom".into()))
                            }
                        }
                    })
                    .await
            }
        };

        tokio::pin!(driver);
        // Poll once to let the first attempt run and register its sleep timer.
        futures::future::poll_immediate(&mut driver).await;
        clock.advance(Duration::from_millis(10));
        let result = driver.await;

        let err = result.unwrap_err();
        assert!(err.is_permanent());
        assert_eq!(err.record.attempt, 2);
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn token_cancellation_mid_sleep_is_reported_as_loop_cancelled() {
        let clock = Arc::new(ManualClock::new());
        let retrier: Retrier<TestError> =
            Retrier::builder().policy(test_policy()).clock(clock.clone()).build();
        let token = CancellationToken::new();
        let ctx = Deadline::new(token.clone());

        let driver = retrier.retry(&ctx, |_ctx, _record| async move {
            Err::<(), _>(TestError::Transient("always transient".into()))
        });

        tokio::pin!(driver);
        futures::future::poll_immediate(&mut driver).await;
        token.cancel();
        let result = driver.await;

        let err = result.unwrap_err();
        assert!(err.is_loop_cancelled());
        assert!(!err.is_permanent());
    }

    #[tokio::test]
    async fn deadline_closer_than_next_interval_cancels_without_sleeping() {
        let clock = Arc::new(ManualClock::new());
        let retrier: Retrier<TestError> = Retrier::builder()
            .policy(
                Policy::builder()
                    .initial_interval(Duration::from_secs(10))
                    .max_interval(Duration::from_secs(60))
                    .randomization_factor(0.0)
                    .build()
                    .unwrap(),
            )
            .clock(clock.clone())
            .build();
        let deadline_at = clock.now() + Duration::from_millis(5);
        let ctx = Deadline::with_deadline(CancellationToken::new(), deadline_at);

        let result = retrier
            .retry(&ctx, |_ctx, _record| async move { Err::<(), _>(TestError::Transient("transient".into())) })
            .await;

        let err = result.unwrap_err();
        assert!(err.is_loop_cancelled());
        assert_eq!(err.record.attempt, 1);
    }

    #[tokio::test]
    async fn record_attempt_and_total_interval_are_monotonic() {
        let clock = Arc::new(ManualClock::new());
        let retrier: Retrier<TestError> =
            Retrier::builder().policy(test_policy()).clock(clock.clone()).build();
        let ctx = Deadline::new(CancellationToken::new());
        let seen_attempts = Arc::new(std::sync::Mutex::new(Vec::new()));
        let seen_totals = Arc::new(std::sync::Mutex::new(Vec::new()));

        let driver = {
            let seen_attempts = seen_attempts.clone();
            let seen_totals = seen_totals.clone();
            let counter = Arc::new(AtomicUsize::new(0));
            retrier.retry(&ctx, move |_ctx, record| {
                seen_attempts.lock().unwrap().push(record.attempt);
                seen_totals.lock().unwrap().push(record.total_interval);
                let n = counter.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 3 {
                        Err(TestError::Transient("transient".into()))
                    } else {
                        Ok::<_, TestError>(())
                    }
                }
            })
        };

        tokio::pin!(driver);
        for _ in 0..3 {
            futures::future::poll_immediate(&mut driver).await;
            clock.advance(Duration::from_secs(1));
        }
        let result = driver.await;
        assert!(result.is_ok());

        let attempts = seen_attempts.lock().unwrap().clone();
        let totals = seen_totals.lock().unwrap().clone();
        assert_eq!(attempts, vec![1, 2, 3, 4]);
        for pair in totals.windows(2) {
            assert!(pair[1] >= pair[0]);
        }
    }

    #[test]
    fn resp_transformer_chain_can_synthesize_a_permanent_error_from_a_200() {
        #[derive(Debug)]
        struct Resp {
            body: &'static str,
        }

        let chain: RespTransformerChain<Resp, TestError> =
            RespTransformerChain::new().push(|resp, err| {
                if err.is_none() && resp.body == "application-error" {
                    (resp, Some(TestError::Permanent("app-level failure".into())))
                } else {
                    (resp, err)
                }
            });

        let (_, err) = chain.apply(Resp { body: "application-error" }, None);
        assert!(matches!(err, Some(TestError::Permanent(_))));

        let (_, err) = chain.apply(Resp { body: "ok" }, None);
        assert!(err.is_none());
    }

    #[test]
    fn resp_transformer_chain_runs_inspectors_in_order() {
        #[derive(Debug)]
        struct Resp(Vec<&'static str>);

        let chain: RespTransformerChain<Resp, TestError> = RespTransformerChain::new()
            .push(|mut resp: Resp, err| {
                resp.0.push("first");
                (resp, err)
            })
            .push(|mut resp: Resp, err| {
                resp.0.push("second");
                (resp, err)
            });

        let (resp, _) = chain.apply(Resp(Vec::new()), None::<TestError>);
        assert_eq!(resp.0, vec!["first", "second"]);
    }
}
