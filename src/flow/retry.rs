//! Retry with backoff.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::config::duration_to_millis;
use crate::error::{Error, Result};

/// Maps a zero-based failure count to the delay before the next attempt.
pub type BackoffFn = Arc<dyn Fn(u32) -> Duration + Send + Sync>;

/// Last-chance handler for an unrecovered failure.
///
/// `Ok(Some(v))` substitutes `v` for the failure, `Ok(None)` lets the
/// failure through, and `Err(e)` replaces the failure with `e`.
pub type ErrorFn<T> = Arc<dyn Fn(&Error) -> anyhow::Result<Option<T>> + Send + Sync>;

/// Base delay of the default backoff.
pub const BACKOFF_BASE_MS: u64 = 100;

// == Exponential Backoff ==
/// `2^attempt * 100ms`, saturating.
pub fn exponential_backoff(attempt: u32) -> Duration {
    let factor = 2u64.checked_pow(attempt).unwrap_or(u64::MAX);
    Duration::from_millis(factor.saturating_mul(BACKOFF_BASE_MS))
}

pub fn default_backoff() -> BackoffFn {
    Arc::new(exponential_backoff)
}

// == Retry ==
/// Calls `operation` until it succeeds or `retries` retries were spent.
///
/// The attempt counter starts at 0 and only moves after a failure, so
/// `retries = N` allows N + 1 calls. The delay after failure `k` is
/// `backoff(k)`. The last error is returned unchanged.
pub async fn retry<T, F, Fut>(retries: u32, backoff: &BackoffFn, operation: F) -> Result<T>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0;
    loop {
        match operation().await {
            Ok(value) => {
                if attempt > 0 {
                    debug!(attempt, "Operation succeeded after retry");
                }
                return Ok(value);
            }
            Err(err) if attempt < retries => {
                let delay = backoff(attempt);
                warn!(
                    attempt = attempt + 1,
                    retries,
                    delay_ms = duration_to_millis(delay),
                    error = %err,
                    "Operation failed, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

// == Recover ==
/// Applies an optional error handler to an unrecovered failure.
pub fn recover<T>(err: Error, error_fn: Option<&ErrorFn<T>>) -> Result<T> {
    let Some(error_fn) = error_fn else {
        return Err(err);
    };
    match error_fn(&err) {
        Ok(Some(value)) => {
            debug!(error = %err, "Error handler supplied a fallback value");
            Ok(value)
        }
        Ok(None) => Err(err),
        Err(handler_err) => Err(Error::operation(handler_err)),
    }
}
