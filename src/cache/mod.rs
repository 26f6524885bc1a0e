//! Cache Module
//!
//! Provides in-memory caching with TTL expiration, protected keys,
//! single-flight loading and stale-on-error fallback.

mod entry;
mod options;
mod stats;
mod store;
mod ttl_cache;

#[cfg(test)]
mod property_tests;

// Re-export public types
pub use entry::{expiry_after, CacheEntry, RetrievalResult};
pub use options::{
    BulkAsyncGetOptions, BulkSyncFn, BulkValues, CacheErrorFn, ErrorContext, GetOrSetOptions,
};
pub use stats::CacheStats;
pub use store::CacheStore;
pub use ttl_cache::{TtlCache, TtlCacheBuilder};
