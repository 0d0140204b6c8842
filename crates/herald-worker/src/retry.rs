use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;
use tokio::time::{sleep, Instant};
use tracing::debug;

/// Default budget for one retried operation.
pub const DEFAULT_MAX_ELAPSED: Duration = Duration::from_secs(5 * 60);

/// Run `operation` until it succeeds or the next wait would take the total
/// elapsed time past `max_elapsed`, then return its most recent error.
///
/// Waits follow the `backoff` crate's default exponential curve (500 ms
/// initial, ×1.5, ±50 % jitter).
pub async fn retry<T, E, F, Fut>(max_elapsed: Duration, operation: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    retry_if(max_elapsed, |_| true, operation).await
}

/// Like [`retry`], but an error for which `is_transient` returns false is
/// returned immediately.
pub async fn retry_if<T, E, P, F, Fut>(
    max_elapsed: Duration,
    is_transient: P,
    mut operation: F,
) -> Result<T, E>
where
    P: Fn(&E) -> bool,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    let started = Instant::now();
    let mut backoff = ExponentialBackoff {
        max_elapsed_time: Some(max_elapsed),
        ..Default::default()
    };

    let mut attempt = 1u32;
    loop {
        let err = match operation().await {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };
        if !is_transient(&err) {
            return Err(err);
        }

        let wait = match backoff.next_backoff() {
            Some(wait) if started.elapsed() + wait <= max_elapsed => wait,
            _ => {
                debug!(attempt, error = %err, "retry budget exhausted");
                return Err(err);
            }
        };
        debug!(
            attempt,
            error = %err,
            retry_in_ms = wait.as_millis() as u64,
            "operation failed, retrying"
        );
        sleep(wait).await;
        attempt += 1;
    }
}
