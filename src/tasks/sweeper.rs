//! TTL Sweeper Task
//!
//! Background task that periodically reclaims expired cache entries.

use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::engine::CacheEngine;

/// Spawns a background task that sweeps expired entries on a fixed tick.
///
/// Each pass visits every shard with a bounded reclaim batch (see
/// `EngineConfig::sweep_batch`), so foreground gets and sets are never
/// blocked for longer than one batch. Reclaimed keys are published as
/// `CacheEvent::Expired` on the engine's event channel.
///
/// # Returns
/// A JoinHandle for the spawned task; abort it during shutdown.
///
/// # Example
/// ```ignore
/// let engine = CacheEngine::new(EngineConfig::default())?;
/// let sweeper = spawn_sweeper(engine.clone());
/// // Later, during shutdown:
/// sweeper.abort();
/// ```
pub fn spawn_sweeper(engine: CacheEngine) -> JoinHandle<()> {
    let period = engine.config().sweep_interval;

    tokio::spawn(async move {
        info!(interval_ms = period.as_millis() as u64, "starting TTL sweeper");
        let mut ticker = tokio::time::interval(period);
        // the first tick fires immediately; skip straight to the cadence
        ticker.tick().await;

        loop {
            ticker.tick().await;

            let started = tokio::time::Instant::now();
            let removed = engine.sweep_now();
            engine.record_sweep_metrics(removed as u64, started.elapsed());

            if removed > 0 {
                info!(removed, "sweeper reclaimed expired entries");
            } else {
                debug!("sweeper found no expired entries");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::engine::SetOptions;
    use std::time::Duration;

    fn engine(sweep_interval: Duration) -> CacheEngine {
        let config = EngineConfig {
            capacity: 16,
            shards: 2,
            sweep_interval,
            ..EngineConfig::default()
        };
        CacheEngine::new(config).unwrap()
    }

    #[tokio::test]
    async fn test_sweeper_removes_expired_entries() {
        let engine = engine(Duration::from_millis(50));

        engine
            .set(
                "expire_soon",
                &b"v"[..],
                SetOptions {
                    ttl: Some(Duration::from_millis(20)),
                    tags: vec![],
                },
            )
            .unwrap();

        let handle = spawn_sweeper(engine.clone());
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert!(engine.is_empty(), "expired entry should have been swept");
        assert!(engine.stats().sweeps > 0);
        handle.abort();
    }

    #[tokio::test]
    async fn test_sweeper_preserves_valid_entries() {
        let engine = engine(Duration::from_millis(50));

        engine
            .set(
                "long_lived",
                &b"v"[..],
                SetOptions {
                    ttl: Some(Duration::from_secs(3600)),
                    tags: vec![],
                },
            )
            .unwrap();
        engine
            .set("immortal", &b"v"[..], SetOptions::default())
            .unwrap();

        let handle = spawn_sweeper(engine.clone());
        tokio::time::sleep(Duration::from_millis(150)).await;

        assert_eq!(engine.len(), 2, "valid entries must survive sweeps");
        handle.abort();
    }

    #[tokio::test]
    async fn test_sweeper_can_be_aborted() {
        let engine = engine(Duration::from_millis(50));

        let handle = spawn_sweeper(engine);
        handle.abort();

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(handle.is_finished(), "task should be finished after abort");
    }
}
