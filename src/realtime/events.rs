//! Realtime channel contract.
//!
//! Push delivery is a typed event stream: `connect` hands back a receiver and
//! the engine consumes it like any other channel, so tests can feed synthetic
//! events without a transport.

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::notifications::Notification;

/// Capacity of the per-connection event stream.
pub const EVENT_BUFFER: usize = 64;

/// Events delivered by a realtime channel.
#[derive(Debug, Clone, PartialEq)]
pub enum RealtimeEvent {
    /// A notification pushed by the server. Same shape as a list item.
    Notification(Notification),
    /// The transport is up.
    Connected,
    /// The transport closed. The stream may end right after this.
    Disconnected,
    /// The transport or the server reported an error. The channel stays
    /// open; reconnecting is the channel's business.
    Error(String),
}

/// Server-initiated delivery path.
#[async_trait]
pub trait RealtimeChannel: Send + Sync {
    /// Open the channel and subscribe to its events.
    async fn connect(&self) -> Result<mpsc::Receiver<RealtimeEvent>>;

    /// Close the channel. Safe to call when not connected.
    async fn disconnect(&self);
}

/// Diagnostic connectivity of the engine's realtime path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "disconnected"),
            ConnectionState::Connecting => write!(f, "connecting"),
            ConnectionState::Connected => write!(f, "connected"),
        }
    }
}
