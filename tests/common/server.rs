//! Test notification server
//!
//! Serves the notification REST endpoints and the `/v1/ws` realtime endpoint
//! from an in-memory notification set. Each test gets an isolated server.

use super::constants::*;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, Query, State};
use axum::http::{header::COOKIE, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use notification_sync::notifications::{Notification, NotificationFilters, NotificationPage};
use notification_sync::realtime::messages::{msg_types, notification_frame, system, ServerMessage};
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;
use tokio::sync::{broadcast, oneshot};

/// Frame queued for every connected WebSocket. `None` closes the socket.
type Frame = Option<String>;

struct ServerState {
    notifications: Mutex<Vec<Notification>>,
    fail_requests: AtomicBool,
    frames: broadcast::Sender<Frame>,
    next_seq: AtomicI64,
}

/// Test server instance backed by an in-memory notification set
///
/// When dropped, the server gracefully shuts down.
pub struct TestServer {
    /// Base URL for making requests (e.g., "http://127.0.0.1:12345")
    pub base_url: String,

    state: Arc<ServerState>,
    _shutdown_tx: Option<oneshot::Sender<()>>,
}

impl TestServer {
    /// Spawns a new test server on a random port, serving `notifications`
    /// (most recent first).
    ///
    /// # Panics
    ///
    /// Panics if the port cannot be bound.
    pub async fn spawn(notifications: Vec<Notification>) -> Self {
        let (frames, _) = broadcast::channel(64);
        let state = Arc::new(ServerState {
            notifications: Mutex::new(notifications),
            fail_requests: AtomicBool::new(false),
            frames,
            next_seq: AtomicI64::new(1),
        });

        let app = Router::new()
            .route("/v1/user/notifications", get(list_notifications))
            .route("/v1/user/notifications/read_all", post(mark_all_read))
            .route("/v1/user/notifications/{id}/read", post(mark_read))
            .route("/v1/user/notifications/{id}", delete(delete_notification))
            .route("/v1/ws", get(ws_handler))
            .with_state(state.clone());

        // Bind to random port
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind to random port");
        let port = listener
            .local_addr()
            .expect("Failed to get local address")
            .port();

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    shutdown_rx.await.ok();
                })
                .await
                .expect("Server failed");
        });

        Self {
            base_url: format!("http://127.0.0.1:{}", port),
            state,
            _shutdown_tx: Some(shutdown_tx),
        }
    }

    /// Make every REST request fail with 500 until reset.
    pub fn fail_requests(&self, fail: bool) {
        self.state.fail_requests.store(fail, Ordering::SeqCst);
    }

    pub fn stored(&self) -> Vec<Notification> {
        self.state.notifications.lock().unwrap().clone()
    }

    /// Store `notification` and push it to every connected WebSocket.
    pub fn push_notification(&self, notification: Notification) {
        self.state
            .notifications
            .lock()
            .unwrap()
            .insert(0, notification.clone());
        let seq = self.state.next_seq.fetch_add(1, Ordering::SeqCst);
        let frame = notification_frame(seq, &notification, 1700001000 + seq);
        self.send_frame(serde_json::to_string(&frame).unwrap());
    }

    /// Push a server error message to every connected WebSocket.
    pub fn push_error(&self, code: &str, message: &str) {
        let frame = ServerMessage::new(msg_types::ERROR, system::Error::new(code, message));
        self.send_frame(serde_json::to_string(&frame).unwrap());
    }

    /// Push a raw text frame to every connected WebSocket.
    pub fn send_frame(&self, text: String) {
        let _ = self.state.frames.send(Some(text));
    }

    /// Close every connected WebSocket from the server side.
    pub fn close_websockets(&self) {
        let _ = self.state.frames.send(None);
    }

    /// Number of WebSocket connections currently open.
    pub fn ws_subscribers(&self) -> usize {
        self.state.frames.receiver_count()
    }
}

fn is_authenticated(headers: &HeaderMap) -> bool {
    let expected = format!("session_token={}", TEST_SESSION_TOKEN);
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .any(|cookie| cookie.trim() == expected)
}

/// Auth and failure-injection checks shared by the REST handlers.
fn precheck(state: &ServerState, headers: &HeaderMap) -> Result<(), Response> {
    if !is_authenticated(headers) {
        return Err(StatusCode::UNAUTHORIZED.into_response());
    }
    if state.fail_requests.load(Ordering::SeqCst) {
        return Err((StatusCode::INTERNAL_SERVER_ERROR, "Injected failure").into_response());
    }
    Ok(())
}

async fn list_notifications(
    State(state): State<Arc<ServerState>>,
    headers: HeaderMap,
    Query(filters): Query<NotificationFilters>,
) -> Response {
    if let Err(response) = precheck(&state, &headers) {
        return response;
    }
    let stored = state.notifications.lock().unwrap();
    let matching: Vec<&Notification> = stored.iter().filter(|n| filters.matches(n)).collect();
    let page = NotificationPage {
        total: matching.len(),
        unread_count: matching.iter().filter(|n| !n.read).count(),
        notifications: matching
            .into_iter()
            .skip(filters.skip)
            .take(filters.limit)
            .cloned()
            .collect(),
    };
    Json(page).into_response()
}

async fn mark_read(
    State(state): State<Arc<ServerState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Response {
    if let Err(response) = precheck(&state, &headers) {
        return response;
    }
    if id == FAILING_NOTIFICATION_ID {
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }
    let mut stored = state.notifications.lock().unwrap();
    match stored.iter_mut().find(|n| n.id == id) {
        Some(item) => {
            item.mark_read(1700002000);
            StatusCode::OK.into_response()
        }
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn mark_all_read(State(state): State<Arc<ServerState>>, headers: HeaderMap) -> Response {
    if let Err(response) = precheck(&state, &headers) {
        return response;
    }
    for item in state.notifications.lock().unwrap().iter_mut() {
        item.mark_read(1700002000);
    }
    StatusCode::OK.into_response()
}

async fn delete_notification(
    State(state): State<Arc<ServerState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Response {
    if let Err(response) = precheck(&state, &headers) {
        return response;
    }
    if id == FAILING_NOTIFICATION_ID {
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }
    let mut stored = state.notifications.lock().unwrap();
    let before = stored.len();
    stored.retain(|n| n.id != id);
    if stored.len() == before {
        return StatusCode::NOT_FOUND.into_response();
    }
    StatusCode::NO_CONTENT.into_response()
}

async fn ws_handler(
    State(state): State<Arc<ServerState>>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    if !is_authenticated(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    // Subscribe before the upgrade so nothing pushed after the handshake is missed.
    let frames = state.frames.subscribe();
    ws.on_upgrade(move |socket| serve_socket(socket, frames))
}

async fn serve_socket(mut socket: WebSocket, mut frames: broadcast::Receiver<Frame>) {
    let connected = ServerMessage::new(
        msg_types::CONNECTED,
        system::Connected {
            device_id: 1,
            server_version: "test".to_string(),
        },
    );
    let hello = serde_json::to_string(&connected).unwrap();
    if socket.send(Message::Text(hello.into())).await.is_err() {
        return;
    }

    loop {
        tokio::select! {
            frame = frames.recv() => match frame {
                Ok(Some(text)) => {
                    if socket.send(Message::Text(text.into())).await.is_err() {
                        return;
                    }
                }
                Ok(None) | Err(_) => {
                    let _ = socket.send(Message::Close(None)).await;
                    return;
                }
            },
            incoming = socket.recv() => match incoming {
                Some(Ok(Message::Close(_))) | None | Some(Err(_)) => return,
                Some(Ok(_)) => {}
            },
        }
    }
}
