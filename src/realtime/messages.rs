//! WebSocket message types.
//!
//! The server wraps every message in a `{"type": ..., "payload": ...}`
//! envelope. Only the message types the notification sync cares about are
//! decoded; everything else is skipped by the channel.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use super::events::RealtimeEvent;
use crate::notifications::Notification;

/// Server -> Client message envelope.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerMessage {
    /// Message type identifier (e.g., "connected", "sync", "error")
    #[serde(rename = "type")]
    pub msg_type: String,
    /// Feature-specific payload (JSON value)
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl ServerMessage {
    /// Create a new server message with the given type and payload.
    pub fn new(msg_type: impl Into<String>, payload: impl Serialize) -> Self {
        Self {
            msg_type: msg_type.into(),
            payload: serde_json::to_value(payload).unwrap_or(serde_json::Value::Null),
        }
    }

    /// Translate the envelope into a realtime event.
    ///
    /// Returns `Ok(None)` for message types that carry nothing for the
    /// notification cache, and `Err` for a recognized type with a malformed
    /// payload.
    pub fn into_event(self) -> Result<Option<RealtimeEvent>> {
        match self.msg_type.as_str() {
            msg_types::SYNC => {
                let message: sync::SyncEventMessage = serde_json::from_value(self.payload)
                    .context("Malformed sync message payload")?;
                message.event.into_notification().map(|n| n.map(RealtimeEvent::Notification))
            }
            msg_types::ERROR => {
                let error: system::Error = serde_json::from_value(self.payload)
                    .context("Malformed error message payload")?;
                Ok(Some(RealtimeEvent::Error(format!(
                    "{}: {}",
                    error.code, error.message
                ))))
            }
            _ => Ok(None),
        }
    }
}

/// System-level messages (not feature-specific).
pub mod system {
    use serde::{Deserialize, Serialize};

    /// Sent by the server immediately after connection is established.
    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
    pub struct Connected {
        pub device_id: usize,
        pub server_version: String,
    }

    /// Error message (server -> client).
    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
    pub struct Error {
        pub code: String,
        pub message: String,
    }

    impl Error {
        pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
            Self {
                code: code.into(),
                message: message.into(),
            }
        }
    }
}

/// Reserved message type constants.
pub mod msg_types {
    /// Sent by server on successful connection.
    pub const CONNECTED: &str = "connected";
    /// Server error response.
    pub const ERROR: &str = "error";
    /// Sync event notification (server -> client).
    pub const SYNC: &str = "sync";
}

/// Sync-related message payloads.
pub mod sync {
    use anyhow::{Context, Result};
    use serde::{Deserialize, Serialize};

    use crate::notifications::Notification;

    /// Sync event type carrying a newly created notification.
    pub const NOTIFICATION_CREATED: &str = "notification_created";

    /// Payload for sync event messages.
    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
    pub struct SyncEventMessage {
        pub event: StoredEvent,
    }

    /// An entry of the user's event log, as broadcast by the server.
    ///
    /// The event body stays untyped: the log carries many event kinds
    /// (likes, playlists, downloads) that are irrelevant here.
    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
    pub struct StoredEvent {
        pub seq: i64,
        #[serde(rename = "type")]
        pub event_type: String,
        #[serde(default)]
        pub payload: serde_json::Value,
        pub server_timestamp: i64,
    }

    #[derive(Debug, Deserialize)]
    struct NotificationCreatedPayload {
        notification: Notification,
    }

    impl StoredEvent {
        pub fn notification_created(seq: i64, notification: &Notification, server_timestamp: i64) -> Self {
            Self {
                seq,
                event_type: NOTIFICATION_CREATED.to_string(),
                payload: serde_json::json!({ "notification": notification }),
                server_timestamp,
            }
        }

        /// The notification carried by a `notification_created` event.
        pub fn into_notification(self) -> Result<Option<Notification>> {
            if self.event_type != NOTIFICATION_CREATED {
                return Ok(None);
            }
            let payload: NotificationCreatedPayload = serde_json::from_value(self.payload)
                .with_context(|| format!("Malformed notification_created event {}", self.seq))?;
            Ok(Some(payload.notification))
        }
    }
}

/// Decode a text frame into a realtime event.
pub fn decode_frame(text: &str) -> Result<Option<RealtimeEvent>> {
    let message: ServerMessage =
        serde_json::from_str(text).context("Frame is not a server message envelope")?;
    message.into_event()
}

/// Build the `sync` frame a server sends for a new notification.
pub fn notification_frame(seq: i64, notification: &Notification, server_timestamp: i64) -> ServerMessage {
    ServerMessage::new(
        msg_types::SYNC,
        sync::SyncEventMessage {
            event: sync::StoredEvent::notification_created(seq, notification, server_timestamp),
        },
    )
}
