//! TTL Cache Module
//!
//! Async cache handle: single-flight cache-aside loading,
//! stale-on-error fallback, protected keys, bulk access and bulk sync.

use std::fmt::Display;
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::FutureExt;
use parking_lot::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::cache::entry::expiry_after;
use crate::cache::options::{
    BulkAsyncGetOptions, BulkSyncFn, BulkValues, ErrorContext, GetOrSetOptions,
};
use crate::cache::{CacheStats, CacheStore, RetrievalResult};
use crate::config::{duration_to_millis, CacheConfig, FlowConfig};
use crate::error::{Error, Result};
use crate::flow::{with_timeout, ExecuteRequest, FlowController, SingleFlight};
use crate::logger::Logger;
use crate::tasks::spawn_cleanup_task;

/// Function identifier suffix used to single-flight bulk syncs.
const BULK_SYNC_FLIGHT: &str = "__bulk_sync__";

// == Cache Shared ==
/// State behind every clone of a `TtlCache`.
struct CacheShared<K, V> {
    config: CacheConfig,
    store: Arc<Mutex<CacheStore<K, V>>>,
    /// One loader run per key at a time
    loads: SingleFlight<K, V>,
    sync_flow: FlowController<()>,
    bulk_sync_fn: Option<BulkSyncFn<K, V>>,
    /// Bulk syncs are no-ops until this instant
    sync_expires_at: Mutex<Option<DateTime<Utc>>>,
    logger: RwLock<Option<Arc<Logger>>>,
    cleanup_task: Mutex<Option<JoinHandle<()>>>,
}

impl<K, V> Drop for CacheShared<K, V> {
    fn drop(&mut self) {
        if let Some(handle) = self.cleanup_task.get_mut().take() {
            handle.abort();
        }
    }
}

// == TTL Cache ==
/// Key-value cache with per-entry expiration.
///
/// Cloning is cheap and every clone shares the same storage.
pub struct TtlCache<K, V> {
    shared: Arc<CacheShared<K, V>>,
}

impl<K, V> Clone for TtlCache<K, V> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone + Display + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    // == Constructor ==
    /// Cache with the given base TTL and every other setting at its default.
    pub fn new(ttl: Duration) -> Self {
        let config = CacheConfig {
            ttl_ms: duration_to_millis(ttl),
            ..CacheConfig::default()
        };
        Self::from_parts(config, None, None)
    }

    pub fn builder() -> TtlCacheBuilder<K, V> {
        TtlCacheBuilder::new()
    }

    /// Validates `config`, starts the cleanup task if one is configured.
    pub fn with_config(config: CacheConfig) -> Result<Self> {
        Self::builder().config(config).build()
    }

    fn from_parts(
        config: CacheConfig,
        logger: Option<Arc<Logger>>,
        bulk_sync_fn: Option<BulkSyncFn<K, V>>,
    ) -> Self {
        let sync_flow = FlowController::from_validated(FlowConfig {
            timeout_ms: config.flow_control_timeout_ms,
            ..FlowConfig::default()
        });
        let sync_flow = match &logger {
            Some(logger) => sync_flow.with_logger(Arc::clone(logger)),
            None => sync_flow,
        };
        Self {
            shared: Arc::new(CacheShared {
                store: Arc::new(Mutex::new(CacheStore::new(config.ttl()))),
                loads: SingleFlight::new(),
                sync_flow,
                bulk_sync_fn,
                sync_expires_at: Mutex::new(None),
                logger: RwLock::new(logger),
                cleanup_task: Mutex::new(None),
                config,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.shared.config.name
    }

    pub fn config(&self) -> &CacheConfig {
        &self.shared.config
    }

    fn logger(&self) -> Option<Arc<Logger>> {
        self.shared.logger.read().clone()
    }

    // == Set ==
    /// Stores `value`, expiring `ttl` (or the base TTL) from now.
    pub fn set(&self, key: K, value: V, ttl: Option<Duration>) {
        self.shared.store.lock().set(key, value, ttl);
    }

    // == Get ==
    /// Returns the value if fresh. A stale entry is evicted when
    /// `remove_on_expire` is set and reported as absent either way.
    pub fn get(&self, key: &K, remove_on_expire: bool) -> Option<V> {
        self.shared.store.lock().get(key, remove_on_expire)
    }

    // == Get Comprehensive ==
    /// Pure hit/expired/miss classification; nothing is evicted or counted.
    pub fn get_comprehensive(&self, key: &K) -> RetrievalResult<V> {
        self.shared.store.lock().classify(key)
    }

    // == Get Or Set ==
    /// Cache-aside read.
    ///
    /// A fresh value is returned without calling `loader` (unless
    /// `skip_cache`). Otherwise the loader runs under the flow control
    /// timeout, at most once per key at a time: concurrent callers for an
    /// equal key share one run. A successful result is cached with
    /// `options.ttl`.
    /// On failure each caller applies its own fallback policy: its
    /// `error_fn` first, then `return_old_on_error` if a value was stored.
    /// A fallback value is re-cached with the error TTL; with no fallback
    /// the load error is returned.
    pub async fn get_or_set<F, Fut>(
        &self,
        key: K,
        loader: F,
        options: GetOrSetOptions<K, V>,
    ) -> Result<V>
    where
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = anyhow::Result<V>> + Send + 'static,
    {
        let prior = self.get_comprehensive(&key);
        self.shared.store.lock().record_lookup(&prior);

        if !options.skip_cache {
            if let RetrievalResult::Hit { value, .. } = &prior {
                debug!(cache = %self.name(), key = %key, "Cache hit");
                return Ok(value.clone());
            }
        }

        let timeout = self.shared.config.flow_control_timeout();
        let outcome = self
            .shared
            .loads
            .run(key.clone(), move || {
                let attempt = loader();
                with_timeout(timeout, async move { attempt.await.map_err(Error::operation) })
            })
            .await;

        match outcome {
            Ok(value) => {
                self.shared.store.lock().stats_mut().record_load();
                debug!(cache = %self.name(), key = %key, "Loaded value");
                self.set(key, value.clone(), options.ttl);
                Ok(value)
            }
            Err(err) => self.fall_back(key, prior, err, options),
        }
    }

    fn fall_back(
        &self,
        key: K,
        prior: RetrievalResult<V>,
        err: Error,
        options: GetOrSetOptions<K, V>,
    ) -> Result<V> {
        self.shared.store.lock().stats_mut().record_load_failure();

        let mut fallback = None;
        if let Some(error_fn) = &options.error_fn {
            let context = ErrorContext {
                key: &key,
                error: &err,
                previous: prior.value(),
                data: options.data.as_ref(),
            };
            fallback = error_fn(&context).map_err(Error::operation)?;
        }
        if fallback.is_none() && options.return_old_on_error {
            fallback = prior.into_value();
        }

        let logger = self.logger();
        let Some(value) = fallback else {
            warn!(cache = %self.name(), key = %key, error = %err, "Load failed without fallback");
            if let Some(logger) = logger {
                logger.spawn_notify("error", format!("{}: load of {key} failed: {err}", self.name()));
            }
            return Err(err);
        };

        let error_ttl = options
            .error_ttl
            .unwrap_or_else(|| self.shared.config.default_error_ttl());
        {
            let mut store = self.shared.store.lock();
            store.set(key.clone(), value.clone(), Some(error_ttl));
            store.stats_mut().record_fallback();
        }
        warn!(
            cache = %self.name(),
            key = %key,
            error = %err,
            error_ttl_ms = duration_to_millis(error_ttl),
            "Load failed, serving fallback value"
        );
        if let Some(logger) = logger {
            logger.spawn_notify("warn", format!("{}: serving fallback for {key}: {err}", self.name()));
        }
        Ok(value)
    }

    // == Protection ==
    pub fn add_protected_keys<I: IntoIterator<Item = K>>(&self, keys: I) -> &Self {
        self.shared.store.lock().add_protected(keys);
        self
    }

    pub fn remove_protected_keys<I: IntoIterator<Item = K>>(&self, keys: I) -> &Self {
        self.shared.store.lock().remove_protected(keys);
        self
    }

    pub fn is_protected(&self, key: &K) -> bool {
        self.shared.store.lock().is_protected(key)
    }

    // == Invalidate ==
    /// Marks a fresh entry as expired without removing it.
    pub fn invalidate(&self, key: &K) -> bool {
        self.shared.store.lock().invalidate(key)
    }

    // == Delete ==
    pub fn delete(&self, key: &K, force: bool) -> bool {
        self.shared.store.lock().delete(key, force)
    }

    // == Clear ==
    pub fn clear(&self, force: bool) -> usize {
        self.shared.store.lock().clear(force)
    }

    // == Purge Expired ==
    pub fn purge_expired(&self, force: bool) -> usize {
        let removed = self.shared.store.lock().purge_expired(force);
        debug!(cache = %self.name(), removed, "Purged expired entries");
        removed
    }

    // == Bulk Get ==
    /// Fresh values for `keys`, or for every stored key when `None`.
    /// Same eviction behavior as `get`.
    pub fn bulk_get(&self, keys: Option<&[K]>) -> BulkValues<K, V> {
        let mut store = self.shared.store.lock();
        let keys = match keys {
            Some(keys) => keys.to_vec(),
            None => store.keys(),
        };
        keys.into_iter()
            .filter_map(|key| store.get(&key, true).map(|value| (key, value)))
            .collect()
    }

    // == Bulk Set ==
    pub fn bulk_set<I>(&self, entries: I, ttl: Option<Duration>)
    where
        I: IntoIterator<Item = (K, V)>,
    {
        let mut store = self.shared.store.lock();
        for (key, value) in entries {
            store.set(key, value, ttl);
        }
    }

    // == Bulk Async Get ==
    /// Optionally runs a bulk sync, then reads like `bulk_get`.
    pub async fn bulk_async_get(
        &self,
        options: BulkAsyncGetOptions<K, V>,
    ) -> Result<BulkValues<K, V>> {
        if options.do_sync {
            self.bulk_sync(options.sync_fn).await?;
        }
        Ok(self.bulk_get(options.keys.as_deref()))
    }

    // == Bulk Sync ==
    /// Replaces the cache contents with the output of the sync function.
    ///
    /// A no-op (returning false) while the previous sync's window is open.
    /// Concurrent syncs share one run. Protected keys survive the
    /// replacement. A failed sync leaves the window closed so the next
    /// request retries.
    pub async fn bulk_sync(&self, sync_fn: Option<BulkSyncFn<K, V>>) -> Result<bool> {
        let sync_fn = sync_fn
            .or_else(|| self.shared.bulk_sync_fn.clone())
            .ok_or_else(|| {
                Error::InvalidConfiguration("no bulk sync function configured".to_string())
            })?;

        if let Some(expires_at) = *self.shared.sync_expires_at.lock() {
            if Utc::now() < expires_at {
                debug!(cache = %self.name(), "Bulk sync window still open, skipping");
                return Ok(false);
            }
        }

        let shared = Arc::clone(&self.shared);
        let function_id = format!("{}:{}", self.name(), BULK_SYNC_FLIGHT);
        let request = ExecuteRequest::new(self.name(), function_id, move || {
            let shared = Arc::clone(&shared);
            let sync_fn = Arc::clone(&sync_fn);
            async move {
                let entries = sync_fn().await?;
                let count = entries.len();
                {
                    let mut store = shared.store.lock();
                    store.clear(false);
                    for (key, value) in entries {
                        store.set(key, value, None);
                    }
                }
                *shared.sync_expires_at.lock() =
                    Some(expiry_after(Utc::now(), shared.config.bulk_sync_ttl()));
                info!(cache = %shared.config.name, entries = count, "Bulk sync completed");
                Ok::<(), anyhow::Error>(())
            }
        });

        self.shared.sync_flow.execute_fn(request).await?;
        Ok(true)
    }

    // == Dispose ==
    /// Stops the cleanup task, force-clears every entry and detaches the
    /// logger. Safe to call more than once.
    pub fn dispose(&self) {
        if let Some(handle) = self.shared.cleanup_task.lock().take() {
            handle.abort();
        }
        let removed = self.shared.store.lock().clear(true);
        *self.shared.sync_expires_at.lock() = None;
        self.shared.logger.write().take();
        self.shared.sync_flow.set_logger(None);
        info!(cache = %self.name(), removed, "Cache disposed");
    }

    // == Introspection ==
    pub fn stats(&self) -> CacheStats {
        self.shared.store.lock().stats()
    }

    pub fn len(&self) -> usize {
        self.shared.store.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.shared.store.lock().is_empty()
    }

    /// Every stored key, fresh or stale.
    pub fn keys(&self) -> Vec<K> {
        self.shared.store.lock().keys()
    }

    /// Whether the background purge task is running.
    pub fn has_cleanup_task(&self) -> bool {
        self.shared
            .cleanup_task
            .lock()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }
}

impl<K, V> std::fmt::Debug for TtlCache<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TtlCache")
            .field("config", &self.shared.config)
            .finish()
    }
}

// == TTL Cache Builder ==
pub struct TtlCacheBuilder<K, V> {
    config: CacheConfig,
    logger: Option<Arc<Logger>>,
    bulk_sync_fn: Option<BulkSyncFn<K, V>>,
}

impl<K, V> TtlCacheBuilder<K, V>
where
    K: Eq + Hash + Clone + Display + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            config: CacheConfig::default(),
            logger: None,
            bulk_sync_fn: None,
        }
    }

    // == Config ==
    /// Replaces every plain setting at once.
    pub fn config(mut self, config: CacheConfig) -> Self {
        self.config = config;
        self
    }

    // == Name ==
    /// Name tagging log lines and the bulk sync flight.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.config.name = name.into();
        self
    }

    // == TTL ==
    /// Base TTL for entries set without one.
    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.config.ttl_ms = duration_to_millis(ttl);
        self
    }

    // == Auto Cleanup Interval ==
    /// Period of the background purge; must be positive.
    pub fn auto_cleanup_interval(mut self, interval: Duration) -> Self {
        self.config.auto_cleanup_interval_ms = Some(duration_to_millis(interval));
        self
    }

    // == Default Error TTL ==
    /// TTL of fallback values cached after a failed load.
    pub fn default_error_ttl(mut self, ttl: Duration) -> Self {
        self.config.default_error_ttl_ms = duration_to_millis(ttl);
        self
    }

    // == Default Bulk Sync TTL ==
    /// Minimum spacing between two bulk syncs.
    pub fn default_bulk_sync_ttl(mut self, ttl: Duration) -> Self {
        self.config.default_bulk_sync_ttl_ms = Some(duration_to_millis(ttl));
        self
    }

    // == Flow Control Timeout ==
    /// Limit on a single loader or bulk sync run.
    pub fn flow_control_timeout(mut self, timeout: Duration) -> Self {
        self.config.flow_control_timeout_ms = Some(duration_to_millis(timeout));
        self
    }

    // == Logger ==
    /// Receives fallback, load failure and sync failure notices.
    pub fn logger(mut self, logger: Arc<Logger>) -> Self {
        self.logger = Some(logger);
        self
    }

    // == Bulk Sync Fn ==
    /// Default source for `bulk_sync` and `bulk_async_get`.
    pub fn bulk_sync_fn<F, Fut>(mut self, sync_fn: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Vec<(K, V)>>> + Send + 'static,
    {
        self.bulk_sync_fn = Some(Arc::new(move || sync_fn().boxed()));
        self
    }

    // == Build ==
    /// Fails with `InvalidConfiguration` on invalid settings, or when a
    /// cleanup interval is set outside a Tokio runtime.
    pub fn build(self) -> Result<TtlCache<K, V>> {
        self.config.validate()?;
        let cleanup_interval = self.config.auto_cleanup_interval();
        let cache = TtlCache::from_parts(self.config, self.logger, self.bulk_sync_fn);

        if let Some(interval) = cleanup_interval {
            let handle = spawn_cleanup_task(Arc::downgrade(&cache.shared.store), interval)?;
            *cache.shared.cleanup_task.lock() = Some(handle);
        }

        info!(
            cache = %cache.name(),
            ttl_ms = cache.shared.config.ttl_ms,
            cleanup_interval_ms = ?cache.shared.config.auto_cleanup_interval_ms,
            "Cache initialized"
        );
        Ok(cache)
    }
}

impl<K, V> Default for TtlCacheBuilder<K, V>
where
    K: Eq + Hash + Clone + Display + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}
