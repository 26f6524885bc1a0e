//! Configuration Module
//!
//! Plain-data settings for the cache and the flow controller. Both can be
//! built in code, taken from `Default`, or loaded from JSON.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Default base TTL for cache entries (milliseconds).
pub const DEFAULT_TTL_MS: u64 = 60_000;

/// Default TTL applied to fallback values cached after a failed load (milliseconds).
pub const DEFAULT_ERROR_TTL_MS: u64 = 300_000;

/// Whole milliseconds in `duration`, saturating at `u64::MAX`.
pub fn duration_to_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

// == Cache Config ==
/// Cache configuration parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Name used to key single-flight operations and tag log output
    pub name: String,
    /// Default TTL in milliseconds for entries set without explicit TTL
    pub ttl_ms: u64,
    /// Interval of the background purge task, None = no background purge
    pub auto_cleanup_interval_ms: Option<u64>,
    /// TTL in milliseconds for fallback values cached after a failed load
    pub default_error_ttl_ms: u64,
    /// Minimum spacing between two bulk syncs, None = same as `ttl_ms`
    pub default_bulk_sync_ttl_ms: Option<u64>,
    /// Limit on a single loader run, None = wait indefinitely
    pub flow_control_timeout_ms: Option<u64>,
}

impl CacheConfig {
    /// Parses a JSON document; missing fields take their defaults.
    pub fn from_json_str(raw: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(raw)
            .map_err(|e| Error::InvalidConfiguration(format!("Malformed cache config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects values the cache cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.auto_cleanup_interval_ms == Some(0) {
            return Err(Error::InvalidConfiguration(
                "autoCleanupInterval must be a positive number of milliseconds".to_string(),
            ));
        }
        if self.flow_control_timeout_ms == Some(0) {
            return Err(Error::InvalidConfiguration(
                "flowControlTimeout must be a positive number of milliseconds".to_string(),
            ));
        }
        Ok(())
    }

    pub fn ttl(&self) -> Duration {
        Duration::from_millis(self.ttl_ms)
    }

    pub fn auto_cleanup_interval(&self) -> Option<Duration> {
        self.auto_cleanup_interval_ms.map(Duration::from_millis)
    }

    pub fn default_error_ttl(&self) -> Duration {
        Duration::from_millis(self.default_error_ttl_ms)
    }

    /// Falls back to the base TTL when unset.
    pub fn bulk_sync_ttl(&self) -> Duration {
        Duration::from_millis(self.default_bulk_sync_ttl_ms.unwrap_or(self.ttl_ms))
    }

    pub fn flow_control_timeout(&self) -> Option<Duration> {
        self.flow_control_timeout_ms.map(Duration::from_millis)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            name: "cache".to_string(),
            ttl_ms: DEFAULT_TTL_MS,
            auto_cleanup_interval_ms: None,
            default_error_ttl_ms: DEFAULT_ERROR_TTL_MS,
            default_bulk_sync_ttl_ms: None,
            flow_control_timeout_ms: None,
        }
    }
}

// == Flow Config ==
/// Flow controller configuration parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlowConfig {
    /// Minimum milliseconds between invocations of one (consumer, function) pair
    pub rate_ms: Option<u64>,
    /// Limit on a single attempt, None = no timeout race
    pub timeout_ms: Option<u64>,
    /// Retries after the first attempt when a call does not specify its own
    pub retries: u32,
}

impl FlowConfig {
    /// Parses a JSON document; missing fields take their defaults.
    pub fn from_json_str(raw: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(raw)
            .map_err(|e| Error::InvalidConfiguration(format!("Malformed flow config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.rate_ms == Some(0) {
            return Err(Error::InvalidConfiguration(
                "rate must be a positive number of milliseconds".to_string(),
            ));
        }
        if self.timeout_ms == Some(0) {
            return Err(Error::InvalidConfiguration(
                "timeout must be a positive number of milliseconds".to_string(),
            ));
        }
        Ok(())
    }

    pub fn rate(&self) -> Option<Duration> {
        self.rate_ms.map(Duration::from_millis)
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }
}
