//! Minimal retry example: a flaky operation that fails twice before
//! succeeding, driven through the default [`Policy`].
use ops::backoff::Policy;
use ops::retry::{Deadline, Retrier};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[derive(Debug, thiserror::Error)]
#[error("simulated transient failure")]
struct FlakyError;

async fn flaky(attempts: Arc<AtomicUsize>) -> Result<&'static str, FlakyError> {
    if attempts.fetch_add(1, Ordering::Relaxed) < 2 {
        Err(FlakyError)
    } else {
        Ok("finally succeeded")
    }
}

#[tokio::main]
async fn main() {
    let policy = Policy::builder().build().expect("valid policy");
    let retrier: Retrier<FlakyError> = Retrier::new(policy);
    let ctx = Deadline::new(CancellationToken::new());
    let attempts = Arc::new(AtomicUsize::new(0));

    match retrier.retry(&ctx, |_ctx, record| {
        println!("attempt {} (last wait: {:?})", record.attempt, record.last_interval);
        flaky(attempts.clone())
    }).await {
        Ok(value) => println!("success: {value}"),
        Err(err) => println!("gave up: {err}"),
    }
}
