//! Clock Module
//!
//! Injectable monotonic time source. Every internal component reads time
//! through a shared `Clock` handle so tests can drive TTL expiry and
//! rate-limit windows deterministically.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Shared clock handle passed to every time-aware component.
pub type SharedClock = Arc<dyn Clock>;

// == Clock Trait ==
/// Monotonic millisecond time source.
///
/// The origin is arbitrary; only differences between readings are
/// meaningful. Implementations must never go backwards.
pub trait Clock: Send + Sync + std::fmt::Debug {
    /// Current time in milliseconds since the clock's origin.
    fn now_ms(&self) -> u64;
}

// == System Clock ==
/// Process clock backed by `Instant`, anchored at construction.
#[derive(Debug)]
pub struct SystemClock {
    start: Instant,
}

impl SystemClock {
    /// Creates a clock anchored at the current instant.
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }
}

// == Manual Clock ==
/// Manually advanced clock for deterministic tests.
///
/// Time only moves when `advance` or `set` is called.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicU64,
}

impl ManualClock {
    /// Creates a manual clock starting at `start_ms`.
    pub fn new(start_ms: u64) -> Self {
        Self {
            now: AtomicU64::new(start_ms),
        }
    }

    /// Moves the clock forward by `ms` milliseconds.
    pub fn advance(&self, ms: u64) {
        self.now.fetch_add(ms, Ordering::SeqCst);
    }

    /// Sets the clock to an absolute reading.
    pub fn set(&self, ms: u64) {
        self.now.store(ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}
