//! Background Tasks Module
//!
//! Contains background tasks that run periodically while an engine is live.
//!
//! # Tasks
//! - TTL Sweeper: reclaims expired cache entries at the configured interval

mod sweeper;

pub use sweeper::spawn_sweeper;
