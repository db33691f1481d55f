//! Notification data models

use serde::{Deserialize, Serialize};

/// Notification type tag.
///
/// Unknown tags sent by a newer server deserialize as `Other` instead of
/// failing the whole page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationType {
    DownloadCompleted,
    DownloadFailed,
    NewRelease,
    SystemAnnouncement,
    #[serde(other)]
    Other,
}

impl NotificationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationType::DownloadCompleted => "download_completed",
            NotificationType::DownloadFailed => "download_failed",
            NotificationType::NewRelease => "new_release",
            NotificationType::SystemAnnouncement => "system_announcement",
            NotificationType::Other => "other",
        }
    }
}

impl std::fmt::Display for NotificationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Display data carried by a notification. The sync engine never looks inside.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationPayload {
    pub title: String,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub data: serde_json::Value,
}

/// A user notification, as returned by the list endpoint and pushed over the
/// realtime channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: String,
    pub notification_type: NotificationType,
    #[serde(default)]
    pub read: bool,
    pub read_at: Option<i64>,
    pub created_at: i64,
    #[serde(flatten)]
    pub payload: NotificationPayload,
}

impl Notification {
    pub fn is_unread(&self) -> bool {
        !self.read
    }

    /// Marks the notification read, keeping an existing `read_at`.
    /// Returns true if it was unread before.
    pub fn mark_read(&mut self, now: i64) -> bool {
        if self.read {
            return false;
        }
        self.read = true;
        self.read_at = Some(now);
        true
    }
}

/// Subset of the authoritative notification set a cache represents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationFilters {
    pub skip: usize,
    pub limit: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub read: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notification_type: Option<NotificationType>,
}

pub const DEFAULT_PAGE_LIMIT: usize = 100;

impl Default for NotificationFilters {
    fn default() -> Self {
        Self {
            skip: 0,
            limit: DEFAULT_PAGE_LIMIT,
            read: None,
            notification_type: None,
        }
    }
}

impl NotificationFilters {
    pub fn unread_only() -> Self {
        Self {
            read: Some(false),
            ..Self::default()
        }
    }

    pub fn with_type(mut self, notification_type: NotificationType) -> Self {
        self.notification_type = Some(notification_type);
        self
    }

    /// Whether `item` satisfies the `read` and `notification_type` constraints.
    /// Pagination is not a membership constraint.
    pub fn matches(&self, item: &Notification) -> bool {
        if let Some(read) = self.read {
            if item.read != read {
                return false;
            }
        }
        if let Some(notification_type) = self.notification_type {
            if item.notification_type != notification_type {
                return false;
            }
        }
        true
    }

    pub fn pagination(&self) -> Pagination {
        Pagination {
            skip: self.skip,
            limit: self.limit,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    pub skip: usize,
    pub limit: usize,
}

/// Reply of the list query.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct NotificationPage {
    pub notifications: Vec<Notification>,
    pub total: usize,
    pub unread_count: usize,
}
