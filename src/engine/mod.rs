//! Engine Module
//!
//! The cache façade. Composes the sharded LRU/expiry/tag triple, the
//! single-flight table, and the sliding-window admission limiter.
//!
//! Keys hash to one of N independent shards, each protected by its own
//! mutex, so foreground operations only contend within a shard. The one
//! cross-shard operation, `invalidate_tag`, visits shards one at a time in
//! fixed index order and never holds two shard locks at once.

mod flight;
mod shard;

use std::collections::hash_map::DefaultHasher;
use std::future::Future;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{broadcast, watch};
use tracing::debug;

use crate::cache::{CacheEntry, CacheStats, MetricsSink, StatsSnapshot, Value, MAX_KEY_LENGTH};
use crate::clock::{SharedClock, SystemClock};
use crate::config::EngineConfig;
use crate::error::{CacheError, Result};
use crate::limiter::{LimiterMode, SlidingWindowLimiter};

use flight::{await_flight, FlightState, FlightTable};
use shard::{Shard, ShardRead};

// == Set Options ==
/// Per-write options: TTL and tag membership.
///
/// A `ttl` of `None` means the entry never expires.
#[derive(Debug, Clone, Default)]
pub struct SetOptions {
    pub ttl: Option<Duration>,
    pub tags: Vec<String>,
}

// == Loaded ==
/// What a loader callback produces for an admitted miss.
#[derive(Debug)]
pub struct Loaded {
    pub value: Vec<u8>,
    pub ttl: Option<Duration>,
    pub tags: Vec<String>,
}

// == Cache Event ==
/// Engine lifecycle events, published on a broadcast channel so listeners
/// run outside the shard locks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheEvent {
    /// Entry reclaimed by the TTL sweeper
    Expired(String),
    /// Entry displaced by capacity eviction
    Evicted(String),
    /// Entry removed by tag invalidation
    Invalidated { tag: String, key: String },
}

// == Admission ==
/// Outcome of asking the engine what to do about a miss.
pub enum Admission {
    /// This caller owns the recompute; it must `commit` or `abort` the
    /// token within the configured pending timeout
    Leader(PopulateToken),
    /// Another caller is already recomputing; await its result
    Wait(FlightWait),
    /// Another caller is recomputing but the engine is configured
    /// non-blocking; treat as a plain miss
    Bypass,
    /// Admission control denied a recompute; a stale value is offered
    /// when one is still resident
    Denied { stale: Option<Value> },
}

// == Flight Wait ==
/// Handle for awaiting an in-flight recompute started by another caller.
pub struct FlightWait {
    rx: watch::Receiver<FlightState>,
}

impl FlightWait {
    /// Resolves to the fresh value, or `None` if the leader failed and the
    /// caller should retry independently. Dropping this future removes the
    /// waiter without affecting the in-flight computation.
    pub async fn wait(self) -> Option<Value> {
        await_flight(self.rx).await
    }
}

// == Populate Token ==
/// Leadership token for a single-flight miss.
///
/// Exactly one caller per key holds one at a time. Dropping the token
/// without committing counts as an abort, so a panicking or cancelled
/// leader still releases its waiters with a miss.
pub struct PopulateToken {
    engine: CacheEngine,
    key: String,
    armed: bool,
}

impl PopulateToken {
    /// The key this token grants the recompute for.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Stores the freshly computed value and wakes all waiters with it.
    pub fn commit(mut self, value: impl Into<Value>, opts: SetOptions) -> Result<()> {
        self.armed = false;
        match self.engine.set(&self.key, value, opts) {
            Ok(()) => Ok(()),
            Err(err) => {
                // rejected write still ends the flight; waiters see a miss
                self.engine.inner.flights.finish(&self.key, FlightState::Failed);
                Err(err)
            }
        }
    }

    /// Gives up on the recompute, waking all waiters with a miss.
    pub fn abort(mut self) {
        self.armed = false;
        self.engine
            .inner
            .flights
            .finish(&self.key, FlightState::Failed);
    }
}

impl Drop for PopulateToken {
    fn drop(&mut self) {
        if self.armed {
            self.engine
                .inner
                .flights
                .finish(&self.key, FlightState::Failed);
        }
    }
}

// == Cache Engine ==
/// In-process cache with LRU eviction, TTL expiration, tag invalidation,
/// and sliding-window recompute admission.
///
/// Cheaply cloneable; clones share the same shards, flight table, and
/// counters. Independent engines share nothing.
#[derive(Clone)]
pub struct CacheEngine {
    inner: Arc<EngineInner>,
}

struct EngineInner {
    shards: Vec<Mutex<Shard>>,
    flights: FlightTable,
    limiter: SlidingWindowLimiter,
    clock: SharedClock,
    stats: CacheStats,
    sink: Option<Arc<dyn MetricsSink>>,
    events: broadcast::Sender<CacheEvent>,
    config: EngineConfig,
}

impl CacheEngine {
    // == Constructors ==
    /// Creates an engine with the process clock.
    pub fn new(config: EngineConfig) -> Result<Self> {
        Self::with_clock(config, Arc::new(SystemClock::new()))
    }

    /// Creates an engine with an injected clock (deterministic tests).
    pub fn with_clock(config: EngineConfig, clock: SharedClock) -> Result<Self> {
        Self::with_parts(config, clock, None)
    }

    /// Creates an engine with an injected clock and an external metrics
    /// sink that receives every event alongside the built-in counters.
    pub fn with_parts(
        config: EngineConfig,
        clock: SharedClock,
        sink: Option<Arc<dyn MetricsSink>>,
    ) -> Result<Self> {
        config.validate()?;

        // spread capacity over the shards; the first shards absorb the
        // remainder so the total stays exact
        let base = config.capacity / config.shards;
        let remainder = config.capacity % config.shards;
        let mut shards = Vec::with_capacity(config.shards);
        for i in 0..config.shards {
            let capacity = base + usize::from(i < remainder);
            shards.push(Mutex::new(Shard::new(capacity, config.max_entry_size)?));
        }

        let mode = if config.approximate_limiter {
            LimiterMode::Approximate
        } else {
            LimiterMode::Exact
        };
        let limiter = SlidingWindowLimiter::with_mode(
            clock.clone(),
            config.recompute_limit,
            config.recompute_window,
            mode,
        )?;

        let (events, _) = broadcast::channel(config.event_capacity);

        Ok(Self {
            inner: Arc::new(EngineInner {
                shards,
                flights: FlightTable::new(),
                limiter,
                clock,
                stats: CacheStats::new(),
                sink,
                events,
                config,
            }),
        })
    }

    // == Get ==
    /// Looks up a live value, touching LRU recency on a hit.
    ///
    /// Expired-but-unswept entries count as misses here; they stay
    /// resident for the sweeper and for the rate-limited stale fallback.
    /// Never blocks on I/O or recomputation.
    pub fn get(&self, key: &str) -> Option<Value> {
        let now = self.inner.clock.now_ms();
        let read = self.shard(key).lock().read(key, now);

        match read {
            ShardRead::Hit(value) => {
                self.record(|s| s.record_hit());
                Some(value)
            }
            ShardRead::Stale | ShardRead::Miss => {
                self.record(|s| s.record_miss());
                None
            }
        }
    }

    // == Get Or Load ==
    /// The full read path: hit, or single-flight recompute through
    /// `loader` under sliding-window admission.
    ///
    /// Exactly one caller per key runs the loader; concurrent callers
    /// await its result (or see `NotFound` immediately when
    /// `wait_for_pending` is off). A denied recompute returns the stale
    /// resident value if any, else `RateLimited`. Loader errors propagate
    /// as `Loader` and are never retried internally. The whole call
    /// honors the configured pending timeout; dropping the future
    /// cancels only this caller's wait.
    pub async fn get_or_load<F, Fut>(&self, key: &str, loader: F) -> Result<Value>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<Loaded>>,
    {
        let deadline = tokio::time::Instant::now() + self.inner.config.pending_timeout;
        let mut loader = Some(loader);

        loop {
            if let Some(value) = self.get(key) {
                return Ok(value);
            }

            match self.begin_miss(key) {
                Admission::Leader(token) => {
                    let load = loader.take().expect("loader runs at most once");
                    return match load().await {
                        Ok(loaded) => {
                            let value: Value = loaded.value.into();
                            token.commit(
                                value.clone(),
                                SetOptions {
                                    ttl: loaded.ttl,
                                    tags: loaded.tags,
                                },
                            )?;
                            Ok(value)
                        }
                        Err(err) => {
                            token.abort();
                            Err(CacheError::Loader(err))
                        }
                    };
                }
                Admission::Wait(wait) => {
                    match tokio::time::timeout_at(deadline, wait.wait()).await {
                        Ok(Some(value)) => return Ok(value),
                        // leader failed; retry independently
                        Ok(None) => continue,
                        Err(_) => return Err(CacheError::PendingTimeout(key.to_string())),
                    }
                }
                Admission::Bypass => return Err(CacheError::NotFound(key.to_string())),
                Admission::Denied { stale } => {
                    return stale.ok_or_else(|| CacheError::RateLimited(key.to_string()));
                }
            }
        }
    }

    // == Begin Miss ==
    /// Decides what a caller that just observed a miss should do.
    ///
    /// An existing pending flight wins over admission control: followers
    /// consume no limiter budget. Only a caller about to become leader is
    /// charged against the sliding window.
    pub fn begin_miss(&self, key: &str) -> Admission {
        let now = self.inner.clock.now_ms();
        let stale_after = self.inner.config.pending_timeout.as_millis() as u64;

        if let Some(rx) = self.inner.flights.follow(key, now, stale_after) {
            return self.wait_or_bypass(rx);
        }

        if !self.inner.limiter.allow(key) {
            self.record(|s| s.record_rate_limit_denial());
            let stale = self.shard(key).lock().read_stale(key);
            debug!(key, stale = stale.is_some(), "recompute denied by limiter");
            return Admission::Denied { stale };
        }

        match self.inner.flights.lead(key, now) {
            None => Admission::Leader(PopulateToken {
                engine: self.clone(),
                key: key.to_string(),
                armed: true,
            }),
            // lost the race to another leader
            Some(rx) => self.wait_or_bypass(rx),
        }
    }

    fn wait_or_bypass(&self, rx: watch::Receiver<FlightState>) -> Admission {
        if self.inner.config.wait_for_pending {
            Admission::Wait(FlightWait { rx })
        } else {
            Admission::Bypass
        }
    }

    // == Set ==
    /// Stores a value, updating the LRU store and both indexes atomically
    /// under the shard lock, and resolves any pending flight for the key.
    pub fn set(&self, key: &str, value: impl Into<Value>, opts: SetOptions) -> Result<()> {
        if key.len() > MAX_KEY_LENGTH {
            return Err(CacheError::EntryTooLarge {
                key: key.to_string(),
                size: key.len(),
                max: MAX_KEY_LENGTH,
            });
        }

        let value = value.into();
        let now = self.inner.clock.now_ms();
        let entry = CacheEntry::new(
            value.clone(),
            opts.tags.into_iter().collect(),
            now,
            opts.ttl,
        );

        let evicted = self.shard(key).lock().insert(key, entry)?;

        if !evicted.is_empty() {
            self.record(|s| s.record_evictions(evicted.len() as u64));
            for evicted_key in evicted {
                let _ = self.inner.events.send(CacheEvent::Evicted(evicted_key));
            }
        }

        self.inner
            .flights
            .finish(key, FlightState::Resolved(value));
        Ok(())
    }

    // == Delete ==
    /// Removes a key. Idempotent; deleting an absent key returns false.
    pub fn delete(&self, key: &str) -> bool {
        self.shard(key).lock().remove(key).is_some()
    }

    // == Touch ==
    /// Extends or clears a resident entry's TTL without rewriting it.
    pub fn touch(&self, key: &str, ttl: Option<Duration>) -> bool {
        let now = self.inner.clock.now_ms();
        let expires_at = ttl.map(|d| now + d.as_millis() as u64);
        self.shard(key).lock().touch_expiry(key, expires_at)
    }

    // == Invalidate Tag ==
    /// Synchronously removes every key under `tag`, across all shards.
    ///
    /// Shards are visited one at a time in index order; concurrent writes
    /// may be over-invalidated, never missed. Returns the number of keys
    /// removed.
    pub fn invalidate_tag(&self, tag: &str) -> usize {
        let mut total = 0;

        for shard in &self.inner.shards {
            let removed = shard.lock().invalidate_tag(tag);
            total += removed.len();
            for key in removed {
                let _ = self.inner.events.send(CacheEvent::Invalidated {
                    tag: tag.to_string(),
                    key,
                });
            }
        }

        if total > 0 {
            debug!(tag, removed = total, "tag invalidated");
        }
        total
    }

    // == Allow ==
    /// Direct access to the admission limiter for callers using it as a
    /// standalone rate-limiting primitive.
    pub fn allow(&self, key: &str) -> bool {
        self.inner.limiter.allow(key)
    }

    // == Sweep ==
    /// One sweeper pass: reclaims expired entries shard by shard (bounded
    /// batch per shard) and drops idle limiter state. Returns the number
    /// of entries reclaimed.
    pub fn sweep_now(&self) -> usize {
        let now = self.inner.clock.now_ms();
        let mut total = 0;

        for shard in &self.inner.shards {
            let removed = shard.lock().sweep(now, self.inner.config.sweep_batch);
            total += removed.len();
            for key in removed {
                let _ = self.inner.events.send(CacheEvent::Expired(key));
            }
        }

        if total > 0 {
            self.record(|s| s.record_expirations(total as u64));
        }
        self.inner.limiter.purge_stale();
        total
    }

    // == Introspection ==
    /// Current number of resident entries across all shards.
    pub fn len(&self) -> usize {
        self.inner.shards.iter().map(|s| s.lock().len()).sum()
    }

    /// Returns true if no entry is resident.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Point-in-time counters.
    pub fn stats(&self) -> StatsSnapshot {
        self.inner.stats.snapshot(self.len())
    }

    /// Subscribes to expiry, eviction, and invalidation events.
    pub fn subscribe(&self) -> broadcast::Receiver<CacheEvent> {
        self.inner.events.subscribe()
    }

    /// The engine's configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    // == Internals ==
    fn shard(&self, key: &str) -> &Mutex<Shard> {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        let idx = (hasher.finish() as usize) % self.inner.shards.len();
        &self.inner.shards[idx]
    }

    fn record(&self, f: impl Fn(&dyn MetricsSink)) {
        f(&self.inner.stats);
        if let Some(sink) = &self.inner.sink {
            f(sink.as_ref());
        }
    }

    pub(crate) fn record_sweep_metrics(&self, removed: u64, elapsed: Duration) {
        self.record(|s| s.record_sweep(removed, elapsed));
    }
}
