//! Background Tasks Module
//!
//! Contains background tasks owned by cache instances.
//!
//! # Tasks
//! - TTL Cleanup: Purges expired cache entries at a configured interval

mod cleanup;

pub use cleanup::spawn_cleanup_task;
