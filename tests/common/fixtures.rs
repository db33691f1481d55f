//! Notification fixtures

use notification_sync::notifications::{Notification, NotificationPayload, NotificationType};

/// A download-completed notification.
pub fn notification(id: &str, read: bool) -> Notification {
    typed_notification(id, NotificationType::DownloadCompleted, read)
}

pub fn typed_notification(id: &str, notification_type: NotificationType, read: bool) -> Notification {
    Notification {
        id: id.to_string(),
        notification_type,
        read,
        read_at: if read { Some(1700000500) } else { None },
        created_at: 1700000000,
        payload: NotificationPayload {
            title: "Album Ready".to_string(),
            body: Some(format!("Notification {}", id)),
            data: serde_json::json!({ "album_id": format!("album-{}", id) }),
        },
    }
}

/// Five notifications, most recent first; `n1` and `n3` are unread.
pub fn five_with_two_unread() -> Vec<Notification> {
    vec![
        notification("n1", false),
        notification("n2", true),
        notification("n3", false),
        notification("n4", true),
        notification("n5", true),
    ]
}
