//! Notification sync engine: orchestrates fetch, polling, realtime pushes and
//! optimistic mutations over a single notification cache.

mod config;
mod error;
mod optimistic;
mod sync_engine;

pub use config::{EngineConfig, DEFAULT_REALTIME_DELAY, MIN_POLL_INTERVAL};
pub use error::SyncError;
pub use sync_engine::SyncEngine;
