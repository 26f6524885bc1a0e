//! Per-call options for the cache-aside and bulk operations.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use serde_json::Value;

use crate::error::Error;

/// Produces the full replacement contents for a bulk sync.
pub type BulkSyncFn<K, V> =
    Arc<dyn Fn() -> BoxFuture<'static, anyhow::Result<Vec<(K, V)>>> + Send + Sync>;

/// Caller-supplied fallback for a failed load.
///
/// `Ok(Some(v))` answers the call with `v`, `Ok(None)` defers to
/// `return_old_on_error`, and `Err(e)` replaces the load error with `e`.
pub type CacheErrorFn<K, V> =
    Arc<dyn Fn(&ErrorContext<'_, K, V>) -> anyhow::Result<Option<V>> + Send + Sync>;

/// Values of a bulk read, keyed by cache key.
pub type BulkValues<K, V> = HashMap<K, V>;

// == Error Context ==
/// What an error handler gets to see about a failed load.
#[derive(Debug)]
pub struct ErrorContext<'a, K, V> {
    pub key: &'a K,
    pub error: &'a Error,
    /// The value stored before the load started, fresh or stale
    pub previous: Option<&'a V>,
    /// Opaque caller data from `GetOrSetOptions::data`
    pub data: Option<&'a Value>,
}

// == Get Or Set Options ==
pub struct GetOrSetOptions<K, V> {
    /// TTL for a successfully loaded value, None = cache default
    pub ttl: Option<Duration>,
    /// Load even when a fresh value is cached
    pub skip_cache: bool,
    /// Answer a failed load with the previously stored value, if any
    pub return_old_on_error: bool,
    pub error_fn: Option<CacheErrorFn<K, V>>,
    /// TTL for a fallback value, None = cache default error TTL
    pub error_ttl: Option<Duration>,
    pub data: Option<Value>,
}

impl<K, V> GetOrSetOptions<K, V> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    pub fn skip_cache(mut self, skip: bool) -> Self {
        self.skip_cache = skip;
        self
    }

    pub fn return_old_on_error(mut self, enabled: bool) -> Self {
        self.return_old_on_error = enabled;
        self
    }

    pub fn error_fn<F>(mut self, error_fn: F) -> Self
    where
        F: Fn(&ErrorContext<'_, K, V>) -> anyhow::Result<Option<V>> + Send + Sync + 'static,
    {
        self.error_fn = Some(Arc::new(error_fn));
        self
    }

    pub fn error_ttl(mut self, ttl: Duration) -> Self {
        self.error_ttl = Some(ttl);
        self
    }

    pub fn data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }
}

impl<K, V> Default for GetOrSetOptions<K, V> {
    fn default() -> Self {
        Self {
            ttl: None,
            skip_cache: false,
            return_old_on_error: false,
            error_fn: None,
            error_ttl: None,
            data: None,
        }
    }
}

impl<K, V> Clone for GetOrSetOptions<K, V> {
    fn clone(&self) -> Self {
        Self {
            ttl: self.ttl,
            skip_cache: self.skip_cache,
            return_old_on_error: self.return_old_on_error,
            error_fn: self.error_fn.clone(),
            error_ttl: self.error_ttl,
            data: self.data.clone(),
        }
    }
}

// == Bulk Async Get Options ==
pub struct BulkAsyncGetOptions<K, V> {
    /// Keys to read, None = every stored key
    pub keys: Option<Vec<K>>,
    /// Run a bulk sync (subject to its window) before reading
    pub do_sync: bool,
    /// Overrides the cache's configured sync function for this call
    pub sync_fn: Option<BulkSyncFn<K, V>>,
}

impl<K, V> BulkAsyncGetOptions<K, V> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn keys(mut self, keys: Vec<K>) -> Self {
        self.keys = Some(keys);
        self
    }

    pub fn do_sync(mut self, do_sync: bool) -> Self {
        self.do_sync = do_sync;
        self
    }

    pub fn sync_fn(mut self, sync_fn: BulkSyncFn<K, V>) -> Self {
        self.sync_fn = Some(sync_fn);
        self
    }
}

impl<K, V> Default for BulkAsyncGetOptions<K, V> {
    fn default() -> Self {
        Self {
            keys: None,
            do_sync: false,
            sync_fn: None,
        }
    }
}
