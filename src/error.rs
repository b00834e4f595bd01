//! Error types for the cache engine
//!
//! Provides unified error handling using thiserror.
//!
//! Per-key errors (`NotFound`, `RateLimited`, `PendingTimeout`) are always
//! returned to the immediate caller so it can decide between a stale
//! fallback and a direct recompute. Configuration errors are fatal at
//! construction time.

use thiserror::Error;

// == Cache Error Enum ==
/// Unified error type for the cache engine.
#[derive(Error, Debug)]
pub enum CacheError {
    /// Key not found in cache (expected, non-fatal)
    #[error("Key not found: {0}")]
    NotFound(String),

    /// Entry rejected because it exceeds the configured size budget
    #[error("Entry too large for key '{key}': {size} bytes exceeds budget of {max}")]
    EntryTooLarge {
        key: String,
        size: usize,
        max: usize,
    },

    /// Miss denied by sliding-window admission control
    #[error("Recompute rate limited for key: {0}")]
    RateLimited(String),

    /// Single-flight wait exceeded its deadline
    #[error("Timed out waiting for in-flight load of key: {0}")]
    PendingTimeout(String),

    /// Invalid engine configuration, detected at construction
    #[error("Engine misconfigured: {0}")]
    CapacityMisconfigured(String),

    /// Loader callback failed during an admitted miss
    #[error("Loader failed: {0}")]
    Loader(#[source] anyhow::Error),
}

// == Result Type Alias ==
/// Convenience Result type for the cache engine.
pub type Result<T> = std::result::Result<T, CacheError>;
