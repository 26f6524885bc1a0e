//! Property-Based Tests for Cache Module
//!
//! Uses proptest to check store behavior over arbitrary keys, values and
//! operation sequences.

use proptest::prelude::*;
use std::collections::{HashMap, HashSet};
use std::time::Duration;

use crate::cache::{CacheStore, RetrievalResult};

// == Test Configuration ==
const TEST_DEFAULT_TTL: Duration = Duration::from_secs(300);

fn new_store() -> CacheStore<String, String> {
    CacheStore::new(TEST_DEFAULT_TTL)
}

// == Strategies ==
/// Generates cache keys from a small alphabet so operations collide
fn key_strategy() -> impl Strategy<Value = String> {
    "[a-e]{1,2}"
}

fn value_strategy() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9 ]{1,64}"
}

#[derive(Debug, Clone)]
enum CacheOp {
    Set { key: String, value: String },
    Get { key: String },
    Delete { key: String },
}

fn cache_op_strategy() -> impl Strategy<Value = CacheOp> {
    prop_oneof![
        (key_strategy(), value_strategy()).prop_map(|(key, value)| CacheOp::Set { key, value }),
        key_strategy().prop_map(|key| CacheOp::Get { key }),
        key_strategy().prop_map(|key| CacheOp::Delete { key }),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    // The store agrees with a plain map model for any sequence of
    // set/get/delete on fresh entries, and statistics count every get.
    #[test]
    fn prop_store_matches_map_model(ops in prop::collection::vec(cache_op_strategy(), 1..60)) {
        let mut store = new_store();
        let mut model: HashMap<String, String> = HashMap::new();
        let mut gets: u64 = 0;

        for op in ops {
            match op {
                CacheOp::Set { key, value } => {
                    store.set(key.clone(), value.clone(), None);
                    model.insert(key, value);
                }
                CacheOp::Get { key } => {
                    gets += 1;
                    prop_assert_eq!(store.get(&key, true), model.get(&key).cloned());
                }
                CacheOp::Delete { key } => {
                    let removed = store.delete(&key, false);
                    prop_assert_eq!(removed, model.remove(&key).is_some());
                }
            }
        }

        let stats = store.stats();
        prop_assert_eq!(stats.hits + stats.misses + stats.stale_reads, gets);
        prop_assert_eq!(stats.total_entries, model.len());
    }

    // Protected keys survive non-forced delete, clear and purge, and are
    // removed by the forced variants.
    #[test]
    fn prop_protection_invariant(
        keys in prop::collection::hash_set(key_strategy(), 1..10),
        protect_mask in prop::collection::vec(any::<bool>(), 10),
    ) {
        let mut store = new_store();
        let keys: Vec<String> = keys.into_iter().collect();
        let protected: HashSet<String> = keys
            .iter()
            .zip(protect_mask.iter())
            .filter(|(_, protect)| **protect)
            .map(|(key, _)| key.clone())
            .collect();

        for key in &keys {
            store.set(key.clone(), "v".to_string(), Some(Duration::ZERO));
        }
        store.add_protected(protected.iter().cloned());

        for key in &keys {
            store.delete(key, false);
        }
        store.clear(false);
        store.purge_expired(false);

        let mut remaining: Vec<String> = store.keys();
        remaining.sort();
        let mut expected: Vec<String> = protected.iter().cloned().collect();
        expected.sort();
        prop_assert_eq!(remaining, expected);

        store.purge_expired(true);
        prop_assert!(store.is_empty());
    }

    // Storing V1 then V2 under one key yields V2 and a single entry.
    #[test]
    fn prop_overwrite_semantics(
        key in key_strategy(),
        value1 in value_strategy(),
        value2 in value_strategy()
    ) {
        let mut store = new_store();

        store.set(key.clone(), value1, None);
        store.set(key.clone(), value2.clone(), None);

        prop_assert_eq!(store.get(&key, true), Some(value2));
        prop_assert_eq!(store.len(), 1);
    }

    // A positive TTL classifies as a hit with an expiration `ttl` ahead; a
    // zero TTL classifies as expired straight away.
    #[test]
    fn prop_ttl_classification(
        key in key_strategy(),
        value in value_strategy(),
        ttl_secs in 1u64..100_000,
    ) {
        let mut store = new_store();
        let before = chrono::Utc::now();

        store.set(key.clone(), value.clone(), Some(Duration::from_secs(ttl_secs)));
        match store.classify(&key) {
            RetrievalResult::Hit { value: stored, expiration_time } => {
                prop_assert_eq!(stored, value.clone());
                let ttl = chrono::Duration::seconds(ttl_secs as i64);
                prop_assert!(expiration_time >= before + ttl);
                prop_assert!(expiration_time <= chrono::Utc::now() + ttl);
            }
            other => prop_assert!(false, "expected hit, got {:?}", other),
        }

        store.set(key.clone(), value, Some(Duration::ZERO));
        prop_assert!(store.classify(&key).is_expired());
    }

    // Invalidate never drops an entry, only ages it.
    #[test]
    fn prop_invalidate_keeps_value(key in key_strategy(), value in value_strategy()) {
        let mut store = new_store();
        store.set(key.clone(), value.clone(), None);

        prop_assert!(store.invalidate(&key));
        prop_assert_eq!(store.classify(&key).into_value(), Some(value));
        prop_assert_eq!(store.get(&key, false), None);
        prop_assert_eq!(store.len(), 1);
    }
}
