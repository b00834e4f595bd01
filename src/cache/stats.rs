//! Cache Statistics Module
//!
//! Tracks cache performance metrics including hits, misses, evictions,
//! rate-limit denials, and sweep activity.
//!
//! `MetricsSink` is the pluggable boundary: the engine reports every event
//! through it, `CacheStats` is the built-in atomic-counter sink, and an
//! external sink (Prometheus, StatsD, ...) can be attached alongside
//! without the engine mandating any concrete backend.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::Serialize;

// == Metrics Sink ==
/// Pluggable receiver for engine metrics events.
///
/// All methods default to no-ops so a sink only implements what it cares
/// about. Implementations must be cheap; they are called with shard locks
/// released but on the hot path.
pub trait MetricsSink: Send + Sync {
    /// A `get` served from a live entry.
    fn record_hit(&self) {}
    /// A `get` that found nothing usable.
    fn record_miss(&self) {}
    /// Entries displaced by capacity eviction.
    fn record_evictions(&self, _count: u64) {}
    /// Entries reclaimed by TTL sweep or lazy expiry.
    fn record_expirations(&self, _count: u64) {}
    /// A miss denied a recompute by the sliding-window limiter.
    fn record_rate_limit_denial(&self) {}
    /// One sweeper pass over all shards.
    fn record_sweep(&self, _removed: u64, _elapsed: Duration) {}
}

// == Cache Stats ==
/// Built-in metrics sink backed by atomic counters.
#[derive(Debug, Default)]
pub struct CacheStats {
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    expirations: AtomicU64,
    rate_limit_denials: AtomicU64,
    sweeps: AtomicU64,
    sweep_time_ms: AtomicU64,
}

impl CacheStats {
    // == Constructor ==
    /// Creates stats with all counters at zero.
    pub fn new() -> Self {
        Self::default()
    }

    // == Snapshot ==
    /// Returns a point-in-time copy of all counters.
    pub fn snapshot(&self, total_entries: usize) -> StatsSnapshot {
        StatsSnapshot {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            expirations: self.expirations.load(Ordering::Relaxed),
            rate_limit_denials: self.rate_limit_denials.load(Ordering::Relaxed),
            sweeps: self.sweeps.load(Ordering::Relaxed),
            sweep_time_ms: self.sweep_time_ms.load(Ordering::Relaxed),
            total_entries,
        }
    }
}

impl MetricsSink for CacheStats {
    fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    fn record_evictions(&self, count: u64) {
        self.evictions.fetch_add(count, Ordering::Relaxed);
    }

    fn record_expirations(&self, count: u64) {
        self.expirations.fetch_add(count, Ordering::Relaxed);
    }

    fn record_rate_limit_denial(&self) {
        self.rate_limit_denials.fetch_add(1, Ordering::Relaxed);
    }

    fn record_sweep(&self, _removed: u64, elapsed: Duration) {
        self.sweeps.fetch_add(1, Ordering::Relaxed);
        self.sweep_time_ms
            .fetch_add(elapsed.as_millis() as u64, Ordering::Relaxed);
    }
}

// == Stats Snapshot ==
/// Serializable point-in-time view of the engine counters.
#[derive(Debug, Clone, Default, Serialize)]
pub struct StatsSnapshot {
    /// Number of successful cache retrievals
    pub hits: u64,
    /// Number of failed cache retrievals (absent or expired)
    pub misses: u64,
    /// Number of entries evicted by the LRU policy
    pub evictions: u64,
    /// Number of entries reclaimed after TTL expiry
    pub expirations: u64,
    /// Number of misses denied a recompute by admission control
    pub rate_limit_denials: u64,
    /// Number of completed sweeper passes
    pub sweeps: u64,
    /// Cumulative time spent sweeping, milliseconds
    pub sweep_time_ms: u64,
    /// Current number of resident entries
    pub total_entries: usize,
}

impl StatsSnapshot {
    // == Hit Rate ==
    /// Returns hits / (hits + misses), or 0.0 before any lookups.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}
