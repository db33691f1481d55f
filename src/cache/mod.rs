//! Notification cache owned by the sync engine.

mod notification_cache;

pub use notification_cache::{NotificationCache, OffFilterPushPolicy, PushOutcome};
