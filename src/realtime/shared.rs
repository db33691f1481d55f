//! Reference-counted realtime connection shared by several consumers.
//!
//! Each consumer gets its own [`SharedChannelHandle`], which implements
//! [`RealtimeChannel`]. The first handle to connect opens the inner channel;
//! the last one to disconnect closes it. Events are fanned out to every
//! connected handle. When the inner stream ends on its own, every handle sees
//! `Disconnected` and the next connect opens the inner channel again.

use anyhow::Result;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::events::{RealtimeChannel, RealtimeEvent, EVENT_BUFFER};

struct SharedState {
    subscribers: usize,
    /// Bumped every time the inner channel is opened. Subscriptions of an
    /// older generation belong to a transport that is already gone.
    generation: u64,
    fanout: Option<broadcast::Sender<RealtimeEvent>>,
    pump: Option<JoinHandle<()>>,
}

/// A realtime connection shared by several engines.
pub struct SharedChannel {
    inner: Arc<dyn RealtimeChannel>,
    state: Arc<Mutex<SharedState>>,
    connected: Arc<AtomicBool>,
}

impl SharedChannel {
    pub fn new(inner: Arc<dyn RealtimeChannel>) -> Arc<Self> {
        Arc::new(Self {
            inner,
            state: Arc::new(Mutex::new(SharedState {
                subscribers: 0,
                generation: 0,
                fanout: None,
                pump: None,
            })),
            connected: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Create a handle for one consumer.
    pub fn handle(self: &Arc<Self>) -> SharedChannelHandle {
        SharedChannelHandle {
            shared: Arc::clone(self),
            subscription: Mutex::new(None),
        }
    }

    /// Number of handles currently connected.
    pub async fn subscriber_count(&self) -> usize {
        self.state.lock().await.subscribers
    }

    async fn subscribe(&self) -> Result<(broadcast::Receiver<RealtimeEvent>, u64)> {
        let mut guard = self.state.lock().await;
        let state = &mut *guard;

        if let Some(fanout) = &state.fanout {
            state.subscribers += 1;
            debug!("Joined shared realtime channel ({} subscribers)", state.subscribers);
            return Ok((fanout.subscribe(), state.generation));
        }

        let mut events = self.inner.connect().await?;
        let (fanout, receiver) = broadcast::channel(EVENT_BUFFER);
        state.generation += 1;
        let generation = state.generation;

        let pump_fanout = fanout.clone();
        let pump_state = Arc::clone(&self.state);
        let connected = Arc::clone(&self.connected);
        let pump = tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                match event {
                    RealtimeEvent::Connected => connected.store(true, Ordering::SeqCst),
                    RealtimeEvent::Disconnected => connected.store(false, Ordering::SeqCst),
                    _ => {}
                }
                // No receivers only means every handle is between connects.
                let _ = pump_fanout.send(event);
            }
            connected.store(false, Ordering::SeqCst);

            // Retire this transport so subscribers see the broadcast close.
            let mut state = pump_state.lock().await;
            if state.generation == generation {
                state.fanout = None;
                state.pump = None;
                state.subscribers = 0;
            }
            drop(state);
            info!("Shared realtime channel ended");
        });

        state.fanout = Some(fanout);
        state.pump = Some(pump);
        state.subscribers = 1;
        info!("Opened shared realtime channel");
        Ok((receiver, generation))
    }

    async fn unsubscribe(&self, generation: u64) {
        let mut state = self.state.lock().await;
        if state.generation != generation || state.fanout.is_none() {
            debug!("Left retired shared realtime channel");
            return;
        }

        state.subscribers = state.subscribers.saturating_sub(1);
        if state.subscribers > 0 {
            debug!("Left shared realtime channel ({} subscribers)", state.subscribers);
            return;
        }

        state.fanout = None;
        if let Some(pump) = state.pump.take() {
            pump.abort();
        }
        self.connected.store(false, Ordering::SeqCst);
        drop(state);

        self.inner.disconnect().await;
        info!("Closed shared realtime channel");
    }
}

struct Subscription {
    token: CancellationToken,
    generation: u64,
}

/// One consumer's view of a [`SharedChannel`].
pub struct SharedChannelHandle {
    shared: Arc<SharedChannel>,
    subscription: Mutex<Option<Subscription>>,
}

#[async_trait]
impl RealtimeChannel for SharedChannelHandle {
    async fn connect(&self) -> Result<mpsc::Receiver<RealtimeEvent>> {
        let mut subscription = self.subscription.lock().await;
        if let Some(previous) = subscription.take() {
            previous.token.cancel();
            self.shared.unsubscribe(previous.generation).await;
        }

        let (mut fanout, generation) = self.shared.subscribe().await?;
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let token = CancellationToken::new();

        // A late joiner missed the Connected event of the shared transport.
        if self.shared.connected.load(Ordering::SeqCst) {
            let _ = tx.try_send(RealtimeEvent::Connected);
        }

        let forward_token = token.clone();
        tokio::spawn(async move {
            loop {
                let event = tokio::select! {
                    _ = forward_token.cancelled() => break,
                    event = fanout.recv() => event,
                };
                match event {
                    Ok(event) => {
                        if tx.send(event).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        warn!("Realtime subscriber lagged, {} events dropped", missed);
                        let message = format!("{} realtime events dropped", missed);
                        if tx.send(RealtimeEvent::Error(message)).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        let _ = tx.send(RealtimeEvent::Disconnected).await;
                        break;
                    }
                }
            }
        });

        *subscription = Some(Subscription { token, generation });
        Ok(rx)
    }

    async fn disconnect(&self) {
        if let Some(previous) = self.subscription.lock().await.take() {
            previous.token.cancel();
            self.shared.unsubscribe(previous.generation).await;
        }
    }
}
