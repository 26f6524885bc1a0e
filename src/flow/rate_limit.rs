//! Per-(consumer, function) rate limiting.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::warn;

use crate::error::{Error, Result};

// == Rate Limiter ==
/// Enforces a minimum interval between invocations of one identifier pair.
#[derive(Debug, Default)]
pub struct RateLimiter {
    window: Option<Duration>,
    /// Last accepted invocation per (consumer, function)
    last_invocations: Mutex<HashMap<(String, String), Instant>>,
}

impl RateLimiter {
    /// `None` disables limiting entirely.
    pub fn new(window: Option<Duration>) -> Self {
        Self {
            window,
            last_invocations: Mutex::new(HashMap::new()),
        }
    }

    // == Check ==
    /// Accepts and records an invocation, or rejects it if the pair's last
    /// accepted invocation is less than one window ago.
    pub fn check(&self, consumer_id: &str, function_id: &str) -> Result<()> {
        let Some(window) = self.window else {
            return Ok(());
        };

        let now = Instant::now();
        let mut last_invocations = self.last_invocations.lock();
        let pair = (consumer_id.to_string(), function_id.to_string());

        if let Some(last) = last_invocations.get(&pair) {
            if now.duration_since(*last) < window {
                warn!(consumer_id, function_id, "Rate limit exceeded");
                return Err(Error::RateLimitExceeded {
                    consumer_id: pair.0,
                    function_id: pair.1,
                });
            }
        }

        last_invocations.insert(pair, now);
        Ok(())
    }

}
