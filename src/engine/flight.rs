//! Single-Flight Module
//!
//! Tracks in-flight recomputations per key so that N concurrent misses on
//! the same key perform exactly one expensive load.
//!
//! Each pending key holds a `tokio::sync::watch` channel. The leader owns
//! the sender side through the engine; followers subscribe and await the
//! terminal state. Flight entries are allocated lazily on the first miss
//! and removed as soon as the flight resolves or fails, so an idle engine
//! carries no per-key waiter state. A leader that overruns the configured
//! timeout is force-failed by the next caller to look at the key.

use std::collections::HashMap;

use parking_lot::Mutex;
use tokio::sync::watch;

use crate::cache::Value;

// == Flight State ==
/// Per-key miss state: Pending until the leader commits or aborts.
#[derive(Debug, Clone, Default)]
pub(crate) enum FlightState {
    #[default]
    Pending,
    Resolved(Value),
    Failed,
}

// == Flight ==
#[derive(Debug)]
struct Flight {
    tx: watch::Sender<FlightState>,
    started_at_ms: u64,
}

// == Flight Table ==
/// Registry of keys currently in the Pending state.
#[derive(Debug, Default)]
pub(crate) struct FlightTable {
    flights: Mutex<HashMap<String, Flight>>,
}

impl FlightTable {
    pub fn new() -> Self {
        Self::default()
    }

    // == Follow ==
    /// Subscribes to an existing flight for `key`, if one is pending.
    ///
    /// A flight older than `stale_after_ms` means its leader missed the
    /// commit deadline; it is force-failed and cleared so the caller can
    /// take leadership instead.
    pub fn follow(
        &self,
        key: &str,
        now_ms: u64,
        stale_after_ms: u64,
    ) -> Option<watch::Receiver<FlightState>> {
        let mut flights = self.flights.lock();
        let flight = flights.get(key)?;

        if now_ms.saturating_sub(flight.started_at_ms) >= stale_after_ms {
            let _ = flight.tx.send(FlightState::Failed);
            flights.remove(key);
            return None;
        }

        Some(flight.tx.subscribe())
    }

    // == Lead ==
    /// Attempts to open a new flight for `key`.
    ///
    /// Returns `None` on success (the caller is now the leader) or the
    /// receiver of a flight that won the race.
    pub fn lead(&self, key: &str, now_ms: u64) -> Option<watch::Receiver<FlightState>> {
        let mut flights = self.flights.lock();

        if let Some(flight) = flights.get(key) {
            return Some(flight.tx.subscribe());
        }

        let (tx, _rx) = watch::channel(FlightState::Pending);
        flights.insert(
            key.to_string(),
            Flight {
                tx,
                started_at_ms: now_ms,
            },
        );
        None
    }

    // == Finish ==
    /// Closes the flight for `key` with a terminal state, waking all
    /// followers. Finishing an absent key is a no-op.
    pub fn finish(&self, key: &str, state: FlightState) {
        debug_assert!(!matches!(state, FlightState::Pending));
        if let Some(flight) = self.flights.lock().remove(key) {
            let _ = flight.tx.send(state);
        }
    }

    /// Whether `key` currently has a pending flight.
    #[allow(dead_code)]
    pub fn is_pending(&self, key: &str) -> bool {
        self.flights.lock().contains_key(key)
    }
}

// == Await Flight ==
/// Waits for a flight's terminal state.
///
/// Returns the fresh value on `Resolved` or `None` on `Failed`, in which
/// case the caller retries independently. Dropping the future simply
/// drops the receiver; remaining waiters and the leader are unaffected.
pub(crate) async fn await_flight(mut rx: watch::Receiver<FlightState>) -> Option<Value> {
    loop {
        match rx.borrow_and_update().clone() {
            FlightState::Resolved(value) => return Some(value),
            FlightState::Failed => return None,
            FlightState::Pending => {}
        }

        if rx.changed().await.is_err() {
            // sender dropped; whatever was last sent is final
            return match rx.borrow().clone() {
                FlightState::Resolved(value) => Some(value),
                _ => None,
            };
        }
    }
}
