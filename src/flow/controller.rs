//! Flow Controller Module
//!
//! Wraps asynchronous operations with rate limiting, single-flight
//! deduplication, timeouts and retries.

use std::future::Future;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use crate::config::FlowConfig;
use crate::error::{Error, Result};
use crate::flow::rate_limit::RateLimiter;
use crate::flow::retry::{default_backoff, recover, retry, BackoffFn, ErrorFn};
use crate::flow::single_flight::SingleFlight;
use crate::flow::timeout::with_timeout;
use crate::logger::Logger;

// == Retry Request ==
/// Arguments of `FlowController::execute_with_retries`.
pub struct RetryRequest<T, F> {
    pub operation: F,
    /// Retries after the first attempt, None = controller default
    pub retries: Option<u32>,
    pub error_fn: Option<ErrorFn<T>>,
    /// None = `exponential_backoff`
    pub backoff: Option<BackoffFn>,
}

impl<T, F> RetryRequest<T, F> {
    pub fn new(operation: F) -> Self {
        Self {
            operation,
            retries: None,
            error_fn: None,
            backoff: None,
        }
    }

    pub fn retries(mut self, retries: u32) -> Self {
        self.retries = Some(retries);
        self
    }

    pub fn error_fn<E>(mut self, error_fn: E) -> Self
    where
        E: Fn(&Error) -> anyhow::Result<Option<T>> + Send + Sync + 'static,
    {
        self.error_fn = Some(Arc::new(error_fn));
        self
    }

    pub fn backoff<B>(mut self, backoff: B) -> Self
    where
        B: Fn(u32) -> std::time::Duration + Send + Sync + 'static,
    {
        self.backoff = Some(Arc::new(backoff));
        self
    }
}

// == Execute Request ==
/// Arguments of `FlowController::execute_fn`.
pub struct ExecuteRequest<T, F> {
    pub consumer_id: String,
    /// Single-flight key; concurrent calls collapse on this alone
    pub function_id: String,
    pub retry: RetryRequest<T, F>,
}

impl<T, F> ExecuteRequest<T, F> {
    pub fn new(consumer_id: impl Into<String>, function_id: impl Into<String>, operation: F) -> Self {
        Self {
            consumer_id: consumer_id.into(),
            function_id: function_id.into(),
            retry: RetryRequest::new(operation),
        }
    }

    pub fn retries(mut self, retries: u32) -> Self {
        self.retry = self.retry.retries(retries);
        self
    }

    pub fn error_fn<E>(mut self, error_fn: E) -> Self
    where
        E: Fn(&Error) -> anyhow::Result<Option<T>> + Send + Sync + 'static,
    {
        self.retry = self.retry.error_fn(error_fn);
        self
    }

    pub fn backoff<B>(mut self, backoff: B) -> Self
    where
        B: Fn(u32) -> std::time::Duration + Send + Sync + 'static,
    {
        self.retry = self.retry.backoff(backoff);
        self
    }
}

// == Flow Controller ==
/// Composable execution guard for operations producing `T`.
///
/// Single-flight is keyed by function identifier only: two consumers calling
/// the same function concurrently share one execution and one outcome.
pub struct FlowController<T> {
    config: FlowConfig,
    rate_limiter: RateLimiter,
    flights: SingleFlight<String, T>,
    logger: RwLock<Option<Arc<Logger>>>,
}

impl<T> FlowController<T>
where
    T: Clone + Send + Sync + 'static,
{
    // == Constructor ==
    pub fn new(config: FlowConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::from_validated(config))
    }

    pub(crate) fn from_validated(config: FlowConfig) -> Self {
        debug!(
            rate_ms = ?config.rate_ms,
            timeout_ms = ?config.timeout_ms,
            retries = config.retries,
            "Flow controller initialized"
        );
        Self {
            rate_limiter: RateLimiter::new(config.rate()),
            flights: SingleFlight::new(),
            config,
            logger: RwLock::new(None),
        }
    }

    /// Attaches a logger that receives rejection and failure notices.
    pub fn with_logger(mut self, logger: Arc<Logger>) -> Self {
        *self.logger.get_mut() = Some(logger);
        self
    }

    /// Replaces or detaches the logger of a shared controller.
    pub fn set_logger(&self, logger: Option<Arc<Logger>>) {
        *self.logger.write() = logger;
    }

    fn logger(&self) -> Option<Arc<Logger>> {
        self.logger.read().clone()
    }

    pub fn config(&self) -> &FlowConfig {
        &self.config
    }

    /// Number of operations currently in flight.
    pub fn in_flight(&self) -> usize {
        self.flights.in_flight()
    }

    // == Execute With Timeout ==
    /// Runs `operation` raced against the configured timeout.
    pub async fn execute_with_timeout<F, Fut>(&self, operation: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        let attempt = operation();
        with_timeout(self.config.timeout(), async move {
            attempt.await.map_err(Error::operation)
        })
        .await
    }

    // == Execute With Retries ==
    /// Runs `operation` with retry and backoff, then the error handler.
    pub async fn execute_with_retries<F, Fut>(&self, request: RetryRequest<T, F>) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        let retries = request.retries.unwrap_or(self.config.retries);
        let backoff = request.backoff.unwrap_or_else(default_backoff);
        let operation = &request.operation;

        let outcome = retry(retries, &backoff, || {
            let attempt = operation();
            async move { attempt.await.map_err(Error::operation) }
        })
        .await;

        match outcome {
            Ok(value) => Ok(value),
            Err(err) => recover(err, request.error_fn.as_ref()),
        }
    }

    // == Rate Limit ==
    /// Rejects the call if the pair was accepted less than one window ago.
    pub fn rate_limit(&self, consumer_id: &str, function_id: &str) -> Result<()> {
        self.rate_limiter.check(consumer_id, function_id)
    }

    // == Execute Fn ==
    /// Rate limit, then join or start a single-flight run of the
    /// timeout + retry pipeline for `function_id`.
    ///
    /// A rate-limit rejection is returned immediately and never retried.
    /// When the call joins an existing flight its own operation and options
    /// are discarded.
    pub async fn execute_fn<F, Fut>(&self, request: ExecuteRequest<T, F>) -> Result<T>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        let ExecuteRequest {
            consumer_id,
            function_id,
            retry: retry_request,
        } = request;

        if let Err(err) = self.rate_limit(&consumer_id, &function_id) {
            if let Some(logger) = self.logger() {
                logger.spawn_notify("warn", err.to_string());
            }
            return Err(err);
        }

        let timeout = self.config.timeout();
        let retries = retry_request.retries.unwrap_or(self.config.retries);
        let backoff = retry_request.backoff.unwrap_or_else(default_backoff);
        let error_fn = retry_request.error_fn;
        let operation = retry_request.operation;
        let logger = self.logger();
        let flight_id = function_id.clone();

        self.flights
            .run(function_id, move || async move {
                debug!(function_id = %flight_id, consumer_id = %consumer_id, "Starting flow pipeline");
                let outcome = retry(retries, &backoff, || {
                    let attempt = operation();
                    with_timeout(timeout, async move { attempt.await.map_err(Error::operation) })
                })
                .await;

                match outcome {
                    Ok(value) => Ok(value),
                    Err(err) => {
                        if let Some(logger) = &logger {
                            logger.spawn_notify("error", format!("{flight_id} failed: {err}"));
                        }
                        recover(err, error_fn.as_ref())
                    }
                }
            })
            .await
    }
}

impl<T> std::fmt::Debug for FlowController<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlowController")
            .field("config", &self.config)
            .field("has_logger", &self.logger.read().is_some())
            .finish()
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    fn controller(config: FlowConfig) -> FlowController<u32> {
        FlowController::new(config).unwrap()
    }

    #[test]
    fn test_new_rejects_zero_rate() {
        let result = FlowController::<u32>::new(FlowConfig {
            rate_ms: Some(0),
            ..FlowConfig::default()
        });
        assert!(matches!(result, Err(Error::InvalidConfiguration(_))));
    }

    #[tokio::test]
    async fn test_execute_with_timeout_without_limit() {
        let flow = controller(FlowConfig::default());
        let value = flow.execute_with_timeout(|| async { Ok(3) }).await.unwrap();
        assert_eq!(value, 3);
    }

    #[tokio::test]
    async fn test_execute_with_timeout_expires() {
        let flow = controller(FlowConfig {
            timeout_ms: Some(20),
            ..FlowConfig::default()
        });
        let result = flow
            .execute_with_timeout(|| async {
                tokio::time::sleep(Duration::from_millis(300)).await;
                Ok(1)
            })
            .await;
        assert!(result.unwrap_err().is_timeout());
    }

    #[tokio::test]
    async fn test_execute_with_retries_uses_instance_default() {
        let flow = controller(FlowConfig {
            retries: 2,
            ..FlowConfig::default()
        });
        let calls = AtomicU32::new(0);

        let result = flow
            .execute_with_retries(
                RetryRequest::new(|| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async { Err(anyhow::anyhow!("down")) }
                })
                .backoff(|_| Duration::ZERO),
            )
            .await;

        assert_eq!(result.unwrap_err().to_string(), "down");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_execute_with_retries_error_fn_fallback() {
        let flow = controller(FlowConfig::default());

        let value = flow
            .execute_with_retries(
                RetryRequest::new(|| async { Err(anyhow::anyhow!("down")) })
                    .retries(1)
                    .backoff(|_| Duration::ZERO)
                    .error_fn(|_| Ok(Some(42))),
            )
            .await
            .unwrap();
        assert_eq!(value, 42);
    }

    #[tokio::test]
    async fn test_execute_fn_rate_limited_before_running() {
        let flow = Arc::new(controller(FlowConfig {
            rate_ms: Some(10_000),
            ..FlowConfig::default()
        }));
        let calls = Arc::new(AtomicU32::new(0));

        let counter = calls.clone();
        let first = flow
            .execute_fn(ExecuteRequest::new("svc", "load", move || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(1)
                }
            }))
            .await;
        assert_eq!(first.unwrap(), 1);

        let counter = calls.clone();
        let second = flow
            .execute_fn(ExecuteRequest::new("svc", "load", move || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(2)
                }
            }))
            .await;
        let err = second.unwrap_err();
        assert!(err.is_rate_limited());
        assert!(err.to_string().contains("svc#load"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_execute_fn_collapses_across_consumers() {
        let flow = Arc::new(controller(FlowConfig::default()));
        let calls = Arc::new(AtomicU32::new(0));

        let run = |consumer: &'static str| {
            let flow = flow.clone();
            let calls = calls.clone();
            tokio::spawn(async move {
                flow.execute_fn(ExecuteRequest::new(consumer, "report", move || {
                    let calls = calls.clone();
                    async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(40)).await;
                        Ok(10)
                    }
                }))
                .await
            })
        };

        let a = run("alice");
        let b = run("bob");
        assert_eq!(a.await.unwrap().unwrap(), 10);
        assert_eq!(b.await.unwrap().unwrap(), 10);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(flow.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_execute_fn_retries_timeouts() {
        let flow = controller(FlowConfig {
            timeout_ms: Some(20),
            retries: 1,
            ..FlowConfig::default()
        });
        let calls = Arc::new(AtomicU32::new(0));

        let counter = calls.clone();
        let value = flow
            .execute_fn(
                ExecuteRequest::new("svc", "slow-then-fast", move || {
                    let n = counter.fetch_add(1, Ordering::SeqCst);
                    async move {
                        if n == 0 {
                            tokio::time::sleep(Duration::from_millis(200)).await;
                        }
                        Ok(n)
                    }
                })
                .backoff(|_| Duration::ZERO),
            )
            .await
            .unwrap();

        assert_eq!(value, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_execute_fn_error_fn_error_replaces_original() {
        let flow = controller(FlowConfig::default());
        let result = flow
            .execute_fn(
                ExecuteRequest::new("svc", "broken", || async { Err(anyhow::anyhow!("original")) })
                    .error_fn(|_| Err(anyhow::anyhow!("handler blew up"))),
            )
            .await;
        assert_eq!(result.unwrap_err().to_string(), "handler blew up");
    }
}
