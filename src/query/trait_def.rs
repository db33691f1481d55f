//! QueryClient trait definition.
//!
//! Abstracts the pull side of notification sync so the engine can run
//! against the HTTP API or an in-memory fake.

use anyhow::Result;
use async_trait::async_trait;

use crate::notifications::{NotificationFilters, NotificationPage};

/// Request/response access to the authoritative notification set.
///
/// Implementations hold no cache state; the engine only sees return values.
#[async_trait]
pub trait QueryClient: Send + Sync {
    /// List the notifications selected by `filters`, with aggregate counters.
    async fn list(&self, filters: &NotificationFilters) -> Result<NotificationPage>;

    /// Mark a single notification as read.
    async fn mark_as_read(&self, id: &str) -> Result<()>;

    /// Mark every notification of the user as read.
    async fn mark_all_as_read(&self) -> Result<()>;

    /// Delete a notification.
    async fn delete(&self, id: &str) -> Result<()>;
}
