//! Error types for the cache and flow controller
//!
//! Provides unified error handling using thiserror.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

// == Error Enum ==
/// Unified error type for the crate.
///
/// `Clone` so that a single settlement can be handed to every caller waiting
/// on the same in-flight operation.
#[derive(Error, Debug, Clone)]
pub enum Error {
    /// Construction or validation failure
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Operation did not settle within the configured limit
    #[error("Operation timed out after {}ms", .limit.as_millis())]
    Timeout { limit: Duration },

    /// Invocation arrived before the rate window elapsed
    #[error("Rate limit exceeded for {consumer_id}#{function_id}")]
    RateLimitExceeded {
        consumer_id: String,
        function_id: String,
    },

    /// Failure raised by a user supplied loader, operation or error handler
    #[error("{0}")]
    Operation(Arc<anyhow::Error>),

    /// Logger dispatch to a channel the logger was not built with
    #[error("Unknown log channel: {0}")]
    UnknownChannel(String),

    /// A log sink failed to deliver a message
    #[error("Sink error: {0}")]
    Sink(String),

    /// A spawned operation panicked or was cancelled
    #[error("Operation aborted: {0}")]
    Aborted(String),
}

impl Error {
    // == Operation ==
    /// Wraps a user-side failure.
    pub fn operation(err: impl Into<anyhow::Error>) -> Self {
        Error::Operation(Arc::new(err.into()))
    }

    /// Returns true for timeouts.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Timeout { .. })
    }

    /// Returns true for rate-limit rejections.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Error::RateLimitExceeded { .. })
    }
}

// == Result Type Alias ==
/// Convenience Result type for the crate.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operation_display_is_transparent() {
        let err = Error::operation(anyhow::anyhow!("loader exploded"));
        assert_eq!(err.to_string(), "loader exploded");
    }

    #[test]
    fn test_rate_limit_message_names_both_ids() {
        let err = Error::RateLimitExceeded {
            consumer_id: "svc".to_string(),
            function_id: "fetch".to_string(),
        };
        assert!(err.to_string().contains("svc#fetch"));
        assert!(err.is_rate_limited());
    }

    #[test]
    fn test_timeout_message() {
        let err = Error::Timeout {
            limit: Duration::from_millis(250),
        };
        assert_eq!(err.to_string(), "Operation timed out after 250ms");
        assert!(err.is_timeout());
    }
}
