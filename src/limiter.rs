//! Sliding Window Limiter Module
//!
//! Bounds the rate of expensive operations per key over a trailing time
//! window. The engine uses it to gate recompute admission on a cache
//! miss, but it is a reusable primitive and works standalone.
//!
//! Two variants:
//! - **Exact** (default): keeps the timestamps of the last `window` of
//!   calls per key. Precise, O(limit) memory per active key.
//! - **Approximate** (opt-in): two fixed buckets per key, previous count
//!   weighted by the overlap fraction of the trailing window. O(1) memory
//!   per key, slightly over- or under-admits near bucket boundaries.

use std::collections::{HashMap, VecDeque};

use parking_lot::Mutex;
use std::time::Duration;

use crate::clock::SharedClock;
use crate::error::{CacheError, Result};

// == Window State ==
#[derive(Debug)]
enum WindowState {
    /// Timestamps of admitted calls, oldest first
    Exact(VecDeque<u64>),
    /// Fixed-bucket approximation: admitted counts for the bucket at
    /// `bucket * window` and the one before it
    Approximate {
        bucket: u64,
        current: u32,
        previous: u32,
    },
}

// == Limiter Mode ==
/// Which accounting variant a limiter uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimiterMode {
    /// Exact timestamp log per key
    Exact,
    /// Two-bucket weighted approximation per key
    Approximate,
}

// == Sliding Window Limiter ==
/// Per-key request-rate limiter over a trailing time window.
#[derive(Debug)]
pub struct SlidingWindowLimiter {
    clock: SharedClock,
    limit: u32,
    window_ms: u64,
    mode: LimiterMode,
    windows: Mutex<HashMap<String, WindowState>>,
}

impl SlidingWindowLimiter {
    // == Constructors ==
    /// Creates an exact limiter admitting at most `limit` calls per key
    /// within any trailing `window`.
    ///
    /// A zero window is a configuration error and fails here, never at
    /// call time. A zero limit is legal and denies every call.
    pub fn new(clock: SharedClock, limit: u32, window: Duration) -> Result<Self> {
        Self::with_mode(clock, limit, window, LimiterMode::Exact)
    }

    /// Creates a limiter using the two-bucket approximation.
    pub fn approximate(clock: SharedClock, limit: u32, window: Duration) -> Result<Self> {
        Self::with_mode(clock, limit, window, LimiterMode::Approximate)
    }

    /// Creates a limiter with an explicit accounting mode.
    pub fn with_mode(
        clock: SharedClock,
        limit: u32,
        window: Duration,
        mode: LimiterMode,
    ) -> Result<Self> {
        if window.is_zero() {
            return Err(CacheError::CapacityMisconfigured(
                "rate limit window must be positive".to_string(),
            ));
        }

        Ok(Self {
            clock,
            limit,
            window_ms: window.as_millis() as u64,
            mode,
            windows: Mutex::new(HashMap::new()),
        })
    }

    // == Allow ==
    /// Returns true and records the call if `key` is under its limit.
    ///
    /// Denied calls are not recorded; only admitted calls consume window
    /// budget.
    pub fn allow(&self, key: &str) -> bool {
        if self.limit == 0 {
            return false;
        }

        let now = self.clock.now_ms();
        let mut windows = self.windows.lock();

        match self.mode {
            LimiterMode::Exact => {
                let state = windows
                    .entry(key.to_string())
                    .or_insert_with(|| WindowState::Exact(VecDeque::new()));
                let WindowState::Exact(log) = state else {
                    return false;
                };

                // prune timestamps that have left the trailing window
                while log.front().is_some_and(|&ts| ts + self.window_ms <= now) {
                    log.pop_front();
                }

                if (log.len() as u32) < self.limit {
                    log.push_back(now);
                    true
                } else {
                    false
                }
            }
            LimiterMode::Approximate => {
                let bucket = now / self.window_ms;
                let state = windows.entry(key.to_string()).or_insert(
                    WindowState::Approximate {
                        bucket,
                        current: 0,
                        previous: 0,
                    },
                );
                let WindowState::Approximate {
                    bucket: tracked,
                    current,
                    previous,
                } = state
                else {
                    return false;
                };

                if bucket == *tracked + 1 {
                    *previous = *current;
                    *current = 0;
                    *tracked = bucket;
                } else if bucket > *tracked {
                    *previous = 0;
                    *current = 0;
                    *tracked = bucket;
                }

                // weight the previous bucket by how much of it the trailing
                // window still covers
                let elapsed = (now % self.window_ms) as f64 / self.window_ms as f64;
                let weighted = *previous as f64 * (1.0 - elapsed) + *current as f64;

                if weighted < self.limit as f64 {
                    *current += 1;
                    true
                } else {
                    false
                }
            }
        }
    }

    // == Purge Stale ==
    /// Drops per-key state with no activity inside the trailing window.
    ///
    /// Called periodically by the engine sweeper so idle keys do not pin
    /// memory forever. Returns the number of keys dropped.
    pub fn purge_stale(&self) -> usize {
        let now = self.clock.now_ms();
        let mut windows = self.windows.lock();
        let before = windows.len();

        windows.retain(|_, state| match state {
            WindowState::Exact(log) => log.back().is_some_and(|&ts| ts + self.window_ms > now),
            WindowState::Approximate { bucket, .. } => {
                // keep while the previous bucket can still overlap the window
                *bucket + 1 >= now / self.window_ms
            }
        });

        before - windows.len()
    }

    /// Number of keys with tracked window state.
    pub fn tracked_keys(&self) -> usize {
        self.windows.lock().len()
    }

    /// The configured per-window admission limit.
    pub fn limit(&self) -> u32 {
        self.limit
    }

    /// The configured trailing window.
    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use std::sync::Arc;

    fn limiter(limit: u32, window_ms: u64) -> (Arc<ManualClock>, SlidingWindowLimiter) {
        let clock = Arc::new(ManualClock::new(0));
        let limiter = SlidingWindowLimiter::new(
            clock.clone(),
            limit,
            Duration::from_millis(window_ms),
        )
        .unwrap();
        (clock, limiter)
    }

    #[test]
    fn test_zero_window_rejected_at_setup() {
        let clock: SharedClock = Arc::new(ManualClock::new(0));
        let result = SlidingWindowLimiter::new(clock, 3, Duration::ZERO);
        assert!(matches!(
            result,
            Err(CacheError::CapacityMisconfigured(_))
        ));
    }

    #[test]
    fn test_zero_limit_always_denies() {
        let (_clock, limiter) = limiter(0, 1_000);
        assert!(!limiter.allow("k"));
        assert!(!limiter.allow("k"));
    }

    #[test]
    fn test_window_scenario() {
        // limit=3, window=1s: 3 calls at t=0 allowed, 4th at t=0.1s denied,
        // 5th at t=1.1s allowed again
        let (clock, limiter) = limiter(3, 1_000);

        assert!(limiter.allow("k"));
        assert!(limiter.allow("k"));
        assert!(limiter.allow("k"));

        clock.advance(100);
        assert!(!limiter.allow("k"));

        clock.advance(1_000);
        assert!(limiter.allow("k"));
    }

    #[test]
    fn test_keys_are_independent() {
        let (_clock, limiter) = limiter(1, 1_000);

        assert!(limiter.allow("a"));
        assert!(limiter.allow("b"));
        assert!(!limiter.allow("a"));
    }

    #[test]
    fn test_denied_calls_consume_no_budget() {
        let (clock, limiter) = limiter(2, 1_000);

        assert!(limiter.allow("k"));
        assert!(limiter.allow("k"));
        for _ in 0..10 {
            assert!(!limiter.allow("k"));
        }

        // both admitted calls age out together; denials left no residue
        clock.advance(1_000);
        assert!(limiter.allow("k"));
        assert!(limiter.allow("k"));
    }

    #[test]
    fn test_purge_stale_drops_idle_keys() {
        let (clock, limiter) = limiter(3, 1_000);

        limiter.allow("idle");
        limiter.allow("busy");
        assert_eq!(limiter.tracked_keys(), 2);

        clock.advance(900);
        limiter.allow("busy");
        clock.advance(200);

        // idle's only call is now 1100ms old, busy's latest is 200ms old
        assert_eq!(limiter.purge_stale(), 1);
        assert_eq!(limiter.tracked_keys(), 1);
    }

    #[test]
    fn test_approximate_mode_smoke() {
        let clock = Arc::new(ManualClock::new(0));
        let limiter = SlidingWindowLimiter::approximate(
            clock.clone(),
            2,
            Duration::from_millis(1_000),
        )
        .unwrap();

        assert!(limiter.allow("k"));
        assert!(limiter.allow("k"));
        assert!(!limiter.allow("k"));

        // a full window later with no overlap weight, budget is back
        clock.set(2_500);
        assert!(limiter.allow("k"));
    }

    #[test]
    fn test_approximate_weighted_carryover() {
        let clock = Arc::new(ManualClock::new(0));
        let limiter = SlidingWindowLimiter::approximate(
            clock.clone(),
            2,
            Duration::from_millis(1_000),
        )
        .unwrap();

        assert!(limiter.allow("k"));
        assert!(limiter.allow("k"));

        // early in the next bucket the previous count is weighted at 0.9,
        // leaving room for one call but not two
        clock.set(1_100);
        assert!(limiter.allow("k"));
        assert!(!limiter.allow("k"));
    }
}
