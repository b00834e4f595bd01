//! Herdcache - an in-process cache engine
//!
//! Provides LRU eviction, TTL expiration, tag-based invalidation, and a
//! sliding-window admission limiter that keeps a hot expired key from
//! stampeding its backing store: concurrent misses on one key collapse
//! into a single recompute.
//!
//! # Quick start
//! ```no_run
//! use herdcache::{CacheEngine, EngineConfig, SetOptions, spawn_sweeper};
//!
//! # async fn demo() -> herdcache::Result<()> {
//! let engine = CacheEngine::new(EngineConfig::default())?;
//! let sweeper = spawn_sweeper(engine.clone());
//!
//! engine.set("user:42", &b"profile"[..], SetOptions {
//!     ttl: Some(std::time::Duration::from_secs(300)),
//!     tags: vec!["users".to_string()],
//! })?;
//! assert!(engine.get("user:42").is_some());
//!
//! engine.invalidate_tag("users");
//! sweeper.abort();
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod clock;
pub mod config;
pub mod engine;
pub mod error;
pub mod limiter;
pub mod tasks;

pub use cache::{CacheStats, MetricsSink, StatsSnapshot, Value};
pub use clock::{Clock, ManualClock, SharedClock, SystemClock};
pub use config::EngineConfig;
pub use engine::{
    Admission, CacheEngine, CacheEvent, FlightWait, Loaded, PopulateToken, SetOptions,
};
pub use error::{CacheError, Result};
pub use limiter::{LimiterMode, SlidingWindowLimiter};
pub use tasks::spawn_sweeper;
