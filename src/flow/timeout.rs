//! Timeout racing for a single operation.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::config::duration_to_millis;
use crate::error::{Error, Result};

// == With Timeout ==
/// Races `operation` against `limit`.
///
/// With no limit the operation is awaited in place. With a limit it runs on
/// its own task: a timeout stops the wait and returns `Error::Timeout`, but
/// the operation itself keeps running to completion in the background.
pub async fn with_timeout<T, Fut>(limit: Option<Duration>, operation: Fut) -> Result<T>
where
    T: Send + 'static,
    Fut: Future<Output = Result<T>> + Send + 'static,
{
    let Some(limit) = limit else {
        return operation.await;
    };

    let handle = tokio::spawn(operation);
    match tokio::time::timeout(limit, handle).await {
        Ok(Ok(outcome)) => outcome,
        Ok(Err(join_err)) => Err(Error::Aborted(join_err.to_string())),
        Err(_) => {
            warn!(limit_ms = duration_to_millis(limit), "Operation timed out");
            Err(Error::Timeout { limit })
        }
    }
}
