//! Notification sync engine.
//!
//! Keeps a [`NotificationCache`] coherent across the pull path (fetch and
//! mutations through a [`QueryClient`]) and the push path (a
//! [`RealtimeChannel`] event stream). The engine is the only writer of the
//! cache; readers observe it through a `watch` channel.

use chrono::Utc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use super::config::EngineConfig;
use super::error::SyncError;
use super::optimistic::{Optimistic, Settlement};
use crate::cache::NotificationCache;
use crate::notifications::{Notification, NotificationFilters, Pagination};
use crate::query::QueryClient;
use crate::realtime::{ConnectionState, RealtimeChannel, RealtimeEvent};

/// State shared between the engine handle and its background tasks.
struct EngineInner {
    config: EngineConfig,
    query: Arc<dyn QueryClient>,
    channel: Arc<dyn RealtimeChannel>,
    state: watch::Sender<NotificationCache>,
    connection: watch::Sender<ConnectionState>,
    /// Sequence number of the last issued fetch.
    issued_fetch_seq: AtomicU64,
    /// Sequence number of the newest fetch reply applied to the cache.
    applied_fetch_seq: AtomicU64,
    /// Fetches currently awaiting their reply. Only touched under the state lock.
    in_flight: AtomicUsize,
    shutdown: CancellationToken,
}

/// Client-side notification synchronization engine.
///
/// Must be started inside a tokio runtime. Dropping the engine cancels its
/// timers; call [`SyncEngine::shutdown`] to also wait for the background
/// tasks and disconnect the realtime channel deterministically.
pub struct SyncEngine {
    inner: Arc<EngineInner>,
    tasks: TaskTracker,
}

impl SyncEngine {
    /// Create the engine and arm its timers: the (optionally delayed) initial
    /// fetch, the delayed realtime connection, and polling.
    pub fn start(
        config: EngineConfig,
        query: Arc<dyn QueryClient>,
        channel: Arc<dyn RealtimeChannel>,
    ) -> Self {
        let mut cache = NotificationCache::new(config.initial_filters.clone());
        cache.set_loading(config.auto_fetch);
        let (state, _) = watch::channel(cache);
        let (connection, _) = watch::channel(ConnectionState::Disconnected);

        let inner = Arc::new(EngineInner {
            config,
            query,
            channel,
            state,
            connection,
            issued_fetch_seq: AtomicU64::new(0),
            applied_fetch_seq: AtomicU64::new(0),
            in_flight: AtomicUsize::new(0),
            shutdown: CancellationToken::new(),
        });

        let tasks = TaskTracker::new();

        if inner.config.auto_fetch {
            tasks.spawn(Arc::clone(&inner).run_initial_fetch());
        }
        if inner.config.enable_realtime {
            tasks.spawn(Arc::clone(&inner).run_realtime());
        }
        if let Some(period) = inner.config.effective_poll_interval() {
            tasks.spawn(Arc::clone(&inner).run_polling(period));
        }

        info!(
            "Notification sync engine started (auto_fetch: {}, realtime: {}, polling: {:?})",
            inner.config.auto_fetch,
            inner.config.enable_realtime,
            inner.config.effective_poll_interval()
        );

        Self { inner, tasks }
    }

    // =========================================================================
    // State
    // =========================================================================

    /// Observe every change of the cached state.
    pub fn subscribe(&self) -> watch::Receiver<NotificationCache> {
        self.inner.state.subscribe()
    }

    /// Observe connectivity changes of the realtime path.
    pub fn subscribe_connection(&self) -> watch::Receiver<ConnectionState> {
        self.inner.connection.subscribe()
    }

    /// A copy of the current state.
    pub fn snapshot(&self) -> NotificationCache {
        self.inner.state.borrow().clone()
    }

    pub fn notifications(&self) -> Vec<Notification> {
        self.inner.state.borrow().notifications().to_vec()
    }

    pub fn total(&self) -> usize {
        self.inner.state.borrow().total()
    }

    pub fn unread_count(&self) -> usize {
        self.inner.state.borrow().unread_count()
    }

    pub fn loading(&self) -> bool {
        self.inner.state.borrow().loading()
    }

    pub fn error(&self) -> Option<String> {
        self.inner.state.borrow().error().map(str::to_string)
    }

    pub fn filters(&self) -> NotificationFilters {
        self.inner.state.borrow().filters().clone()
    }

    pub fn pagination(&self) -> Pagination {
        self.inner.state.borrow().pagination()
    }

    pub fn connection_state(&self) -> ConnectionState {
        *self.inner.connection.borrow()
    }

    pub fn is_shut_down(&self) -> bool {
        self.inner.shutdown.is_cancelled()
    }

    // =========================================================================
    // Operations
    // =========================================================================

    /// Fetch with `filters`, or with the active filters when `None`, and
    /// replace the cache with the reply.
    pub async fn fetch(&self, filters: Option<NotificationFilters>) -> Result<(), SyncError> {
        self.inner.fetch(filters).await
    }

    /// Re-fetch with the active filters.
    pub async fn refresh(&self) -> Result<(), SyncError> {
        self.inner.fetch(None).await
    }

    pub async fn mark_as_read(&self, id: &str) -> Result<(), SyncError> {
        self.inner.mark_as_read(id).await
    }

    pub async fn mark_all_as_read(&self) -> Result<(), SyncError> {
        self.inner.mark_all_as_read().await
    }

    pub async fn delete(&self, id: &str) -> Result<(), SyncError> {
        self.inner.delete(id).await
    }

    pub fn clear_error(&self) {
        self.inner.state.send_if_modified(|cache| cache.clear_error());
    }

    /// Cancel every timer, wait for the background tasks to stop, and
    /// disconnect the realtime channel. Idempotent.
    pub async fn shutdown(&self) {
        if self.inner.shutdown.is_cancelled() {
            return;
        }
        info!("Shutting down notification sync engine");
        self.inner.shutdown.cancel();
        self.tasks.close();
        self.tasks.wait().await;

        self.inner.channel.disconnect().await;
        self.inner.connection.send_replace(ConnectionState::Disconnected);
        debug!("Notification sync engine stopped");
    }
}

impl Drop for SyncEngine {
    fn drop(&mut self) {
        if self.inner.shutdown.is_cancelled() {
            return;
        }
        self.inner.shutdown.cancel();
        self.tasks.close();

        // Can't await here; hand the disconnect to the runtime if there is one.
        if let Ok(runtime) = tokio::runtime::Handle::try_current() {
            let channel = Arc::clone(&self.inner.channel);
            runtime.spawn(async move { channel.disconnect().await });
        }
    }
}

/// Marks a fetch in flight for as long as it lives, keeping `loading` true
/// while at least one fetch is pending.
struct LoadingGuard<'a> {
    inner: &'a EngineInner,
}

impl<'a> LoadingGuard<'a> {
    fn new(inner: &'a EngineInner) -> Self {
        inner.state.send_if_modified(|cache| {
            inner.in_flight.fetch_add(1, Ordering::SeqCst);
            if cache.loading() {
                return false;
            }
            cache.set_loading(true);
            true
        });
        Self { inner }
    }
}

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        let inner = self.inner;
        inner.state.send_if_modified(|cache| {
            let remaining = inner.in_flight.fetch_sub(1, Ordering::SeqCst) - 1;
            if remaining > 0 || !cache.loading() {
                return false;
            }
            cache.set_loading(false);
            true
        });
    }
}

impl EngineInner {
    fn ensure_active(&self) -> Result<(), SyncError> {
        if self.shutdown.is_cancelled() {
            return Err(SyncError::Disposed);
        }
        Ok(())
    }

    async fn fetch(&self, filters: Option<NotificationFilters>) -> Result<(), SyncError> {
        self.ensure_active()?;

        let filters = filters.unwrap_or_else(|| self.state.borrow().filters().clone());
        let seq = self.issued_fetch_seq.fetch_add(1, Ordering::SeqCst) + 1;
        let _loading = LoadingGuard::new(self);

        debug!("Fetching notifications (seq {}): {:?}", seq, filters);
        let result = self.query.list(&filters).await;

        if self.shutdown.is_cancelled() {
            debug!("Dropping reply of fetch {}, engine shut down", seq);
            return Err(SyncError::Disposed);
        }

        match result {
            Ok(page) => {
                let (count, total, unread) =
                    (page.notifications.len(), page.total, page.unread_count);
                let applied = self.state.send_if_modified(|cache| {
                    if seq < self.applied_fetch_seq.load(Ordering::SeqCst) {
                        return false;
                    }
                    self.applied_fetch_seq.store(seq, Ordering::SeqCst);
                    cache.replace(page, filters);
                    true
                });
                if applied {
                    debug!(
                        "Applied fetch {}: {} notifications, total {}, unread {}",
                        seq, count, total, unread
                    );
                } else {
                    debug!("Discarded stale reply of fetch {}", seq);
                }
                Ok(())
            }
            Err(e) => {
                warn!("Failed to fetch notifications: {:#}", e);
                let message = format!("Failed to fetch notifications: {:#}", e);
                self.state.send_if_modified(|cache| {
                    if seq < self.applied_fetch_seq.load(Ordering::SeqCst) {
                        return false;
                    }
                    cache.set_error(message);
                    true
                });
                Err(SyncError::Fetch(e))
            }
        }
    }

    async fn mark_as_read(&self, id: &str) -> Result<(), SyncError> {
        self.ensure_active()?;
        let now = Utc::now().timestamp();
        let op = Optimistic::apply(
            &self.state,
            format!("mark notification {} as read", id),
            |cache| cache.mark_read(id, now),
        );
        let result = self.query.mark_as_read(id).await;
        self.settle(op, result).await
    }

    async fn mark_all_as_read(&self) -> Result<(), SyncError> {
        self.ensure_active()?;
        let now = Utc::now().timestamp();
        let op = Optimistic::apply(
            &self.state,
            "mark all notifications as read".to_string(),
            |cache| {
                let had_unread = cache.unread_count() > 0;
                cache.mark_all_read(now) > 0 || had_unread
            },
        );
        let result = self.query.mark_all_as_read().await;
        self.settle(op, result).await
    }

    async fn delete(&self, id: &str) -> Result<(), SyncError> {
        self.ensure_active()?;
        let op = Optimistic::apply(&self.state, format!("delete notification {}", id), |cache| {
            cache.remove(id).is_some()
        });
        let result = self.query.delete(id).await;
        self.settle(op, result).await
    }

    /// Confirm or compensate an optimistic mutation.
    ///
    /// On failure the cache is re-fetched first and the mutation error is
    /// recorded afterwards, so it is still visible once the fetch settles.
    async fn settle(&self, op: Optimistic, result: anyhow::Result<()>) -> Result<(), SyncError> {
        let error = match Optimistic::settlement(result) {
            Settlement::Confirm => {
                debug!("Confirmed: {}", op.description());
                return Ok(());
            }
            Settlement::Compensate(error) => error,
        };

        self.ensure_active()?;
        warn!(
            "Failed to {} (patched: {}), reconciling: {:#}",
            op.description(),
            op.patched(),
            error
        );

        if let Err(e) = self.fetch(None).await {
            warn!("Reconciliation fetch failed: {}", e);
        }

        if !self.shutdown.is_cancelled() {
            let message = format!("Failed to {}: {:#}", op.description(), error);
            self.state.send_modify(|cache| cache.set_error(message));
        }

        Err(SyncError::Mutation {
            operation: op.into_description(),
            source: error,
        })
    }

    fn handle_event(&self, event: RealtimeEvent) {
        if self.shutdown.is_cancelled() {
            return;
        }
        match event {
            RealtimeEvent::Notification(item) => {
                let id = item.id.clone();
                let policy = self.config.off_filter_push_policy;
                let mut outcome = None;
                self.state.send_if_modified(|cache| {
                    let result = cache.insert_pushed(item, policy);
                    outcome = Some(result);
                    result.inserted || result.replaced || result.counted
                });
                debug!("Merged pushed notification {}: {:?}", id, outcome);
            }
            RealtimeEvent::Connected => {
                info!("Realtime channel connected");
                self.connection.send_replace(ConnectionState::Connected);
            }
            RealtimeEvent::Disconnected => {
                info!("Realtime channel disconnected");
                self.connection.send_replace(ConnectionState::Disconnected);
            }
            RealtimeEvent::Error(message) => {
                warn!("Realtime channel error: {}", message);
                self.state
                    .send_modify(|cache| cache.set_error(format!("Realtime error: {}", message)));
            }
        }
    }

    /// Sleep for `duration` unless shut down first. Returns false when shut down.
    async fn sleep_or_cancel(&self, duration: Duration) -> bool {
        tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => false,
            _ = tokio::time::sleep(duration) => true,
        }
    }

    async fn run_initial_fetch(self: Arc<Self>) {
        let delay = self.config.fetch_delay;
        if !delay.is_zero() && !self.sleep_or_cancel(delay).await {
            return;
        }
        tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => {}
            result = self.fetch(None) => {
                if let Err(e) = result {
                    debug!("Initial fetch did not complete: {}", e);
                }
            }
        }
    }

    async fn run_realtime(self: Arc<Self>) {
        if !self.sleep_or_cancel(self.config.realtime_delay).await {
            return;
        }

        info!("Connecting realtime channel");
        self.connection.send_replace(ConnectionState::Connecting);
        let connected = tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => return,
            connected = self.channel.connect() => connected,
        };

        let events = match connected {
            Ok(events) => events,
            Err(e) => {
                warn!("Failed to connect realtime channel: {:#}", e);
                self.connection.send_replace(ConnectionState::Disconnected);
                self.state.send_modify(|cache| {
                    cache.set_error(format!("Realtime connection failed: {:#}", e))
                });
                return;
            }
        };

        self.pump_events(events).await;
    }

    async fn pump_events(&self, mut events: mpsc::Receiver<RealtimeEvent>) {
        loop {
            let event = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => return,
                event = events.recv() => event,
            };
            match event {
                Some(event) => self.handle_event(event),
                None => {
                    debug!("Realtime event stream ended");
                    self.connection.send_replace(ConnectionState::Disconnected);
                    return;
                }
            }
        }
    }

    async fn run_polling(self: Arc<Self>, period: Duration) {
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => return,
                _ = ticker.tick() => {}
            }
            debug!("Polling notifications");
            tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => return,
                result = self.fetch(None) => {
                    if let Err(e) = result {
                        debug!("Poll fetch did not complete: {}", e);
                    }
                }
            }
        }
    }
}
