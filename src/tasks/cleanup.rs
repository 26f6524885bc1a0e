//! TTL Cleanup Task
//!
//! Background task that periodically purges expired cache entries.

use std::hash::Hash;
use std::sync::Weak;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::cache::CacheStore;
use crate::config::duration_to_millis;
use crate::error::{Error, Result};

/// Spawns a task that runs a non-forced `purge_expired` every `interval`.
///
/// The task only holds a weak reference to the store: it stops by itself
/// once the owning cache is dropped, and can be aborted through the
/// returned handle. Fails when called outside a Tokio runtime.
pub fn spawn_cleanup_task<K, V>(
    store: Weak<Mutex<CacheStore<K, V>>>,
    interval: Duration,
) -> Result<JoinHandle<()>>
where
    K: Eq + Hash + Clone + Send + 'static,
    V: Clone + Send + 'static,
{
    if interval.is_zero() {
        return Err(Error::InvalidConfiguration(
            "cleanup interval must be positive".to_string(),
        ));
    }
    let runtime = tokio::runtime::Handle::try_current().map_err(|e| {
        Error::InvalidConfiguration(format!("auto cleanup needs a Tokio runtime: {e}"))
    })?;

    Ok(runtime.spawn(async move {
        info!(
            interval_ms = duration_to_millis(interval),
            "Starting TTL cleanup task"
        );

        let mut ticker = tokio::time::interval(interval);
        // The first tick completes immediately
        ticker.tick().await;

        loop {
            ticker.tick().await;

            let Some(store) = store.upgrade() else {
                debug!("Cache dropped, stopping TTL cleanup task");
                break;
            };
            let removed = store.lock().purge_expired(false);

            if removed > 0 {
                info!(removed, "TTL cleanup: removed expired entries");
            } else {
                debug!("TTL cleanup: no expired entries found");
            }
        }
    }))
}
