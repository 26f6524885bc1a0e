//! Flow Module
//!
//! Execution guards for asynchronous operations: timeout racing, retry with
//! backoff, per-(consumer, function) rate limiting and single-flight
//! deduplication, composed by `FlowController`.

mod controller;
mod rate_limit;
mod retry;
mod single_flight;
mod timeout;

// Re-export public types
pub use controller::{ExecuteRequest, FlowController, RetryRequest};
pub use rate_limit::RateLimiter;
pub use retry::{default_backoff, exponential_backoff, recover, retry, BackoffFn, ErrorFn, BACKOFF_BASE_MS};
pub use single_flight::SingleFlight;
pub use timeout::with_timeout;
