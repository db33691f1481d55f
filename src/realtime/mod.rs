//! Push side of notification sync.

mod events;
pub mod messages;
mod shared;
mod websocket;

pub use events::{ConnectionState, RealtimeChannel, RealtimeEvent, EVENT_BUFFER};
pub use shared::{SharedChannel, SharedChannelHandle};
pub use websocket::WebSocketChannel;
