//! Notification Sync Library
//!
//! Client-side synchronization of a user's notifications: a locally cached,
//! ordered notification set kept consistent across the REST query API and the
//! realtime WebSocket channel, with optimistic mark-read and delete.

pub mod cache;
pub mod config;
pub mod engine;
pub mod notifications;
pub mod query;
pub mod realtime;

// Re-export commonly used types for convenience
pub use cache::{NotificationCache, OffFilterPushPolicy};
pub use engine::{EngineConfig, SyncEngine, SyncError};
pub use notifications::{Notification, NotificationFilters, NotificationPage, NotificationType};
pub use query::{HttpQueryClient, QueryClient};
pub use realtime::{ConnectionState, RealtimeChannel, RealtimeEvent, SharedChannel, WebSocketChannel};
