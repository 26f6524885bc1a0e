//! Cache Entry Module
//!
//! Defines individual cache entries and the hit/expired/miss classification
//! of a lookup.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

// == Cache Entry ==
/// A stored value and the instant it stops being fresh.
#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    /// The stored value
    pub value: V,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Expiration timestamp, always `created_at + ttl`
    pub expires_at: DateTime<Utc>,
}

impl<V> CacheEntry<V> {
    // == Constructor ==
    /// Creates an entry expiring `ttl` from now. A zero TTL yields an entry
    /// that is already stale.
    pub fn new(value: V, ttl: Duration) -> Self {
        let now = Utc::now();
        Self {
            value,
            created_at: now,
            expires_at: expiry_after(now, ttl),
        }
    }

    // == Is Expired ==
    /// Checks if the entry has expired.
    ///
    /// Boundary condition: an entry is expired once the current time is
    /// greater than or equal to the expiration time.
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    // == Time To Live ==
    /// Remaining freshness, zero once expired.
    pub fn ttl_remaining(&self) -> Duration {
        (self.expires_at - Utc::now()).to_std().unwrap_or(Duration::ZERO)
    }
}

// == Retrieval Result ==
/// Classification of a lookup. Computed on demand, never stored.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum RetrievalResult<V> {
    Hit {
        value: V,
        expiration_time: DateTime<Utc>,
    },
    Expired {
        value: V,
        expiration_time: DateTime<Utc>,
    },
    Miss,
}

impl<V> RetrievalResult<V> {
    pub fn is_hit(&self) -> bool {
        matches!(self, RetrievalResult::Hit { .. })
    }

    pub fn is_expired(&self) -> bool {
        matches!(self, RetrievalResult::Expired { .. })
    }

    pub fn is_miss(&self) -> bool {
        matches!(self, RetrievalResult::Miss)
    }

    /// The stored value, fresh or stale.
    pub fn value(&self) -> Option<&V> {
        match self {
            RetrievalResult::Hit { value, .. } | RetrievalResult::Expired { value, .. } => {
                Some(value)
            }
            RetrievalResult::Miss => None,
        }
    }

    pub fn into_value(self) -> Option<V> {
        match self {
            RetrievalResult::Hit { value, .. } | RetrievalResult::Expired { value, .. } => {
                Some(value)
            }
            RetrievalResult::Miss => None,
        }
    }
}

// == Utility Functions ==
/// `now + ttl`, clamped to the largest representable timestamp.
pub fn expiry_after(now: DateTime<Utc>, ttl: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(ttl)
        .ok()
        .and_then(|ttl| now.checked_add_signed(ttl))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;

    #[test]
    fn test_entry_creation_with_ttl() {
        let entry = CacheEntry::new("test_value".to_string(), Duration::from_secs(60));

        assert_eq!(entry.value, "test_value");
        assert!(entry.expires_at > entry.created_at);
        assert!(!entry.is_expired());
    }

    #[test]
    fn test_entry_expiration() {
        let entry = CacheEntry::new("test_value", Duration::from_millis(50));

        assert!(!entry.is_expired());
        sleep(Duration::from_millis(70));
        assert!(entry.is_expired());
    }

    #[test]
    fn test_zero_ttl_is_immediately_stale() {
        let entry = CacheEntry::new(1, Duration::ZERO);
        assert_eq!(entry.expires_at, entry.created_at);
        assert!(entry.is_expired());
    }

    #[test]
    fn test_ttl_remaining() {
        let entry = CacheEntry::new(1, Duration::from_secs(10));
        let remaining = entry.ttl_remaining();
        assert!(remaining <= Duration::from_secs(10));
        assert!(remaining >= Duration::from_secs(9));
    }

    #[test]
    fn test_ttl_remaining_expired() {
        let entry = CacheEntry::new(1, Duration::ZERO);
        assert_eq!(entry.ttl_remaining(), Duration::ZERO);
    }

    #[test]
    fn test_expiry_after_saturates() {
        let now = Utc::now();
        assert_eq!(expiry_after(now, Duration::MAX), DateTime::<Utc>::MAX_UTC);
    }

    #[test]
    fn test_retrieval_result_accessors() {
        let now = Utc::now();
        let hit = RetrievalResult::Hit {
            value: 1,
            expiration_time: now,
        };
        let expired = RetrievalResult::Expired {
            value: 2,
            expiration_time: now,
        };
        let miss: RetrievalResult<i32> = RetrievalResult::Miss;

        assert!(hit.is_hit());
        assert_eq!(hit.value(), Some(&1));
        assert!(expired.is_expired());
        assert_eq!(expired.into_value(), Some(2));
        assert!(miss.is_miss());
        assert_eq!(miss.value(), None);
    }

    #[test]
    fn test_retrieval_result_serializes_tagged() {
        let miss: RetrievalResult<i32> = RetrievalResult::Miss;
        assert_eq!(serde_json::to_string(&miss).unwrap(), r#"{"type":"miss"}"#);
    }
}
