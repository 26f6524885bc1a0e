//! Cacheflow - in-process caching and flow control
//!
//! A TTL cache with single-flight loading and stale-on-error fallback, the
//! flow controller it delegates to (timeout, retry, rate limit,
//! single-flight), a multi-channel logger and a field-mapping serializer.

pub mod cache;
pub mod config;
pub mod error;
pub mod flow;
pub mod logger;
pub mod logging;
pub mod serializer;
pub mod tasks;

pub use cache::{GetOrSetOptions, RetrievalResult, TtlCache};
pub use config::{CacheConfig, FlowConfig};
pub use error::{Error, Result};
pub use flow::FlowController;
pub use logger::Logger;
pub use serializer::{FieldMapping, FieldSerializer};
