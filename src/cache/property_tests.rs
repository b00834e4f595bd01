//! Property-Based Tests for Cache Module
//!
//! Uses proptest to verify structural invariants: the capacity bound, LRU
//! ordering, referential integrity across the three indexes, and the
//! sliding-window admission bound.

use proptest::prelude::*;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use crate::cache::{CacheEntry, LruStore, Value};
use crate::clock::ManualClock;
use crate::engine::{CacheEngine, SetOptions};
use crate::config::EngineConfig;
use crate::limiter::SlidingWindowLimiter;

// == Test Configuration ==
const TEST_CAPACITY: usize = 16;

// == Strategies ==
/// Generates keys from a small alphabet so operations collide often.
fn key_strategy() -> impl Strategy<Value = String> {
    "[a-h][0-9]".prop_map(|s| s)
}

fn value_strategy() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..64)
}

fn tags_strategy() -> impl Strategy<Value = Vec<String>> {
    prop::collection::vec("[t-w]".prop_map(String::from), 0..3)
}

/// Generates a sequence of engine operations for testing.
#[derive(Debug, Clone)]
enum CacheOp {
    Set {
        key: String,
        value: Vec<u8>,
        tags: Vec<String>,
        ttl_ms: Option<u64>,
    },
    Get {
        key: String,
    },
    Delete {
        key: String,
    },
    InvalidateTag {
        tag: String,
    },
    Advance {
        ms: u64,
    },
    Sweep,
}

fn cache_op_strategy() -> impl Strategy<Value = CacheOp> {
    prop_oneof![
        (
            key_strategy(),
            value_strategy(),
            tags_strategy(),
            prop::option::of(1u64..500)
        )
            .prop_map(|(key, value, tags, ttl_ms)| CacheOp::Set {
                key,
                value,
                tags,
                ttl_ms
            }),
        key_strategy().prop_map(|key| CacheOp::Get { key }),
        key_strategy().prop_map(|key| CacheOp::Delete { key }),
        "[t-w]".prop_map(|tag| CacheOp::InvalidateTag { tag }),
        (1u64..200).prop_map(|ms| CacheOp::Advance { ms }),
        Just(CacheOp::Sweep),
    ]
}

fn test_engine() -> (Arc<ManualClock>, CacheEngine) {
    let clock = Arc::new(ManualClock::new(0));
    let config = EngineConfig {
        capacity: TEST_CAPACITY,
        shards: 4,
        recompute_limit: 8,
        ..EngineConfig::default()
    };
    let engine = CacheEngine::with_clock(config, clock.clone()).expect("valid test config");
    (clock, engine)
}

fn apply(engine: &CacheEngine, clock: &ManualClock, op: CacheOp) {
    match op {
        CacheOp::Set {
            key,
            value,
            tags,
            ttl_ms,
        } => {
            let _ = engine.set(
                &key,
                value,
                SetOptions {
                    ttl: ttl_ms.map(Duration::from_millis),
                    tags,
                },
            );
        }
        CacheOp::Get { key } => {
            let _ = engine.get(&key);
        }
        CacheOp::Delete { key } => {
            let _ = engine.delete(&key);
        }
        CacheOp::InvalidateTag { tag } => {
            let _ = engine.invalidate_tag(&tag);
        }
        CacheOp::Advance { ms } => clock.advance(ms),
        CacheOp::Sweep => {
            let _ = engine.sweep_now();
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    // **Capacity invariant**: for any sequence of operations, the number of
    // resident entries never exceeds the configured capacity.
    #[test]
    fn prop_capacity_never_exceeded(ops in prop::collection::vec(cache_op_strategy(), 1..80)) {
        let (clock, engine) = test_engine();

        for op in ops {
            apply(&engine, &clock, op);
            prop_assert!(engine.len() <= TEST_CAPACITY, "resident entries exceed capacity");
        }
    }

    // **Tag invalidation completeness**: after invalidating a tag, every
    // key that carried it misses, and untagged keys are unaffected.
    #[test]
    fn prop_tag_invalidation_complete(
        ops in prop::collection::vec(cache_op_strategy(), 0..40),
        tag in "[t-w]",
    ) {
        let (clock, engine) = test_engine();
        for op in ops {
            apply(&engine, &clock, op);
        }

        engine.set("tagged", &b"v"[..], SetOptions { ttl: None, tags: vec![tag.clone()] }).unwrap();
        engine.set("plain", &b"v"[..], SetOptions::default()).unwrap();

        engine.invalidate_tag(&tag);

        prop_assert!(engine.get("tagged").is_none(), "tagged key survived invalidation");
        prop_assert!(engine.get("plain").is_some(), "untagged key was invalidated");
    }

    // **Most-recently-touched survives**: after a Get, one more insert
    // evicts some other key first.
    #[test]
    fn prop_recent_touch_not_first_evicted(extra in 1usize..6) {
        let mut store = LruStore::new(4, 1024).unwrap();
        let entry = |v: &str| CacheEntry::new(Value::from(v.as_bytes()), HashSet::new(), 0, None);

        for i in 0..4 {
            store.insert(format!("k{i}"), entry("v")).unwrap();
        }
        store.get("k0").unwrap();

        let mut evicted = Vec::new();
        for i in 0..extra {
            let outcome = store.insert(format!("new{i}"), entry("v")).unwrap();
            evicted.extend(outcome.evicted.into_iter().map(|(k, _)| k));
        }

        // k0 may only fall out after every older key has
        if let Some(pos) = evicted.iter().position(|k| k == "k0") {
            prop_assert_eq!(pos, 3, "recently touched key evicted too early");
        }
    }

    // **Limiter admission bound**: admitted calls within any single burst
    // never exceed the limit.
    #[test]
    fn prop_limiter_never_over_admits(
        limit in 1u32..8,
        calls in 1usize..40,
    ) {
        let clock = Arc::new(ManualClock::new(0));
        let limiter = SlidingWindowLimiter::new(clock, limit, Duration::from_millis(1_000)).unwrap();

        let admitted = (0..calls).filter(|_| limiter.allow("k")).count();
        prop_assert!(admitted as u32 <= limit.min(calls as u32));
    }

    // **Stats accuracy**: hit and miss counters match the observed get
    // outcomes for any operation sequence.
    #[test]
    fn prop_statistics_accuracy(ops in prop::collection::vec(cache_op_strategy(), 1..60)) {
        let (clock, engine) = test_engine();
        let mut expected_hits: u64 = 0;
        let mut expected_misses: u64 = 0;

        for op in ops {
            if let CacheOp::Get { key } = &op {
                match engine.get(key) {
                    Some(_) => expected_hits += 1,
                    None => expected_misses += 1,
                }
            } else {
                apply(&engine, &clock, op);
            }
        }

        let stats = engine.stats();
        prop_assert_eq!(stats.hits, expected_hits, "hits mismatch");
        prop_assert_eq!(stats.misses, expected_misses, "misses mismatch");
        prop_assert_eq!(stats.total_entries, engine.len(), "total entries mismatch");
    }
}
