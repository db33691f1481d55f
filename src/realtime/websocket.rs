//! WebSocket implementation of the realtime channel.

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::StreamExt;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{header::COOKIE, HeaderValue};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::events::{RealtimeChannel, RealtimeEvent, EVENT_BUFFER};
use super::messages::decode_frame;
use crate::query::SESSION_COOKIE;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Realtime channel over the server's `/v1/ws` endpoint.
///
/// One connection at a time: connecting again closes the previous socket.
pub struct WebSocketChannel {
    ws_url: String,
    session_token: Option<String>,
    connection: Mutex<Option<CancellationToken>>,
}

impl WebSocketChannel {
    /// Create a channel for the server at `base_url` (http or https).
    pub fn new(base_url: &str, session_token: Option<String>) -> Self {
        Self {
            ws_url: ws_url_for(base_url),
            session_token,
            connection: Mutex::new(None),
        }
    }

    pub fn ws_url(&self) -> &str {
        &self.ws_url
    }

    fn build_request(
        &self,
    ) -> Result<tokio_tungstenite::tungstenite::handshake::client::Request> {
        let mut request = self
            .ws_url
            .as_str()
            .into_client_request()
            .with_context(|| format!("Invalid WebSocket URL: {}", self.ws_url))?;

        if let Some(token) = &self.session_token {
            let cookie = HeaderValue::from_str(&format!("{}={}", SESSION_COOKIE, token))
                .context("Session token is not a valid header value")?;
            request.headers_mut().insert(COOKIE, cookie);
        }

        Ok(request)
    }
}

/// Map an HTTP base URL to the WebSocket endpoint.
fn ws_url_for(base_url: &str) -> String {
    let base_url = base_url.trim_end_matches('/');
    let ws_base = if let Some(rest) = base_url.strip_prefix("https://") {
        format!("wss://{}", rest)
    } else if let Some(rest) = base_url.strip_prefix("http://") {
        format!("ws://{}", rest)
    } else {
        base_url.to_string()
    };
    format!("{}/v1/ws", ws_base)
}

#[async_trait]
impl RealtimeChannel for WebSocketChannel {
    async fn connect(&self) -> Result<mpsc::Receiver<RealtimeEvent>> {
        let request = self.build_request()?;
        let (stream, _) = connect_async(request)
            .await
            .with_context(|| format!("Failed to connect to {}", self.ws_url))?;
        info!("WebSocket connected to {}", self.ws_url);

        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let token = CancellationToken::new();
        if let Some(previous) = self.connection.lock().await.replace(token.clone()) {
            previous.cancel();
        }

        // Fresh channel, there is room for the first event.
        let _ = tx.try_send(RealtimeEvent::Connected);
        tokio::spawn(read_loop(stream, tx, token));

        Ok(rx)
    }

    async fn disconnect(&self) {
        if let Some(token) = self.connection.lock().await.take() {
            debug!("Closing WebSocket connection to {}", self.ws_url);
            token.cancel();
        }
    }
}

/// Forward decoded frames until the socket closes or the connection is
/// cancelled. Always ends the stream with `Disconnected`.
async fn read_loop(
    mut stream: WsStream,
    events: mpsc::Sender<RealtimeEvent>,
    token: CancellationToken,
) {
    loop {
        let frame = tokio::select! {
            _ = token.cancelled() => {
                let _ = stream.close(None).await;
                break;
            }
            frame = stream.next() => frame,
        };

        match frame {
            Some(Ok(Message::Text(text))) => match decode_frame(text.as_str()) {
                Ok(Some(event)) => {
                    if events.send(event).await.is_err() {
                        debug!("Realtime subscriber dropped, closing WebSocket");
                        let _ = stream.close(None).await;
                        return;
                    }
                }
                Ok(None) => debug!("Ignoring realtime frame: {}", text.as_str()),
                Err(e) => warn!("Skipping malformed realtime frame: {:#}", e),
            },
            Some(Ok(Message::Close(frame))) => {
                debug!("WebSocket closed by server: {:?}", frame);
                break;
            }
            // Pings are answered by tungstenite while reading.
            Some(Ok(_)) => {}
            Some(Err(e)) => {
                warn!("WebSocket read failed: {}", e);
                let _ = events.send(RealtimeEvent::Error(e.to_string())).await;
                break;
            }
            None => break,
        }
    }

    let _ = events.send(RealtimeEvent::Disconnected).await;
}
