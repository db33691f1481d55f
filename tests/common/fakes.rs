//! In-memory collaborators for driving the sync engine in tests.

use anyhow::{bail, Result};
use async_trait::async_trait;
use notification_sync::notifications::{Notification, NotificationFilters, NotificationPage};
use notification_sync::query::QueryClient;
use notification_sync::realtime::{RealtimeChannel, RealtimeEvent};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::mpsc;

/// Authoritative notification source with scriptable failures and latency.
#[derive(Default)]
pub struct FakeQueryClient {
    notifications: Mutex<Vec<Notification>>,
    list_delays: Mutex<VecDeque<Duration>>,
    mutation_delay: Mutex<Duration>,
    fail_list: AtomicBool,
    fail_mutations: AtomicBool,
    list_calls: AtomicUsize,
    mutation_calls: AtomicUsize,
    last_filters: Mutex<Option<NotificationFilters>>,
}

impl FakeQueryClient {
    pub fn with_notifications(notifications: Vec<Notification>) -> Self {
        let client = Self::default();
        client.set_notifications(notifications);
        client
    }

    /// Replace the authoritative set, most recent first.
    pub fn set_notifications(&self, notifications: Vec<Notification>) {
        *self.notifications.lock().unwrap() = notifications;
    }

    /// Add a notification to the authoritative set without pushing it.
    pub fn prepend(&self, notification: Notification) {
        self.notifications.lock().unwrap().insert(0, notification);
    }

    pub fn stored(&self) -> Vec<Notification> {
        self.notifications.lock().unwrap().clone()
    }

    /// Latency of the next list calls, in call order.
    pub fn queue_list_delays(&self, delays: impl IntoIterator<Item = Duration>) {
        self.list_delays.lock().unwrap().extend(delays);
    }

    pub fn set_mutation_delay(&self, delay: Duration) {
        *self.mutation_delay.lock().unwrap() = delay;
    }

    pub fn fail_list(&self, fail: bool) {
        self.fail_list.store(fail, Ordering::SeqCst);
    }

    pub fn fail_mutations(&self, fail: bool) {
        self.fail_mutations.store(fail, Ordering::SeqCst);
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn mutation_calls(&self) -> usize {
        self.mutation_calls.load(Ordering::SeqCst)
    }

    pub fn last_filters(&self) -> Option<NotificationFilters> {
        self.last_filters.lock().unwrap().clone()
    }

    fn page(&self, filters: &NotificationFilters) -> NotificationPage {
        let stored = self.notifications.lock().unwrap();
        let matching: Vec<&Notification> = stored.iter().filter(|n| filters.matches(n)).collect();
        NotificationPage {
            total: matching.len(),
            unread_count: matching.iter().filter(|n| !n.read).count(),
            notifications: matching
                .into_iter()
                .skip(filters.skip)
                .take(filters.limit)
                .cloned()
                .collect(),
        }
    }

    async fn begin_mutation(&self) -> Result<()> {
        self.mutation_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.mutation_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if self.fail_mutations.load(Ordering::SeqCst) {
            bail!("status 503 Service Unavailable");
        }
        Ok(())
    }
}

#[async_trait]
impl QueryClient for FakeQueryClient {
    async fn list(&self, filters: &NotificationFilters) -> Result<NotificationPage> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_filters.lock().unwrap() = Some(filters.clone());

        let delay = self.list_delays.lock().unwrap().pop_front();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_list.load(Ordering::SeqCst) {
            bail!("connection refused");
        }
        Ok(self.page(filters))
    }

    async fn mark_as_read(&self, id: &str) -> Result<()> {
        self.begin_mutation().await?;
        let mut stored = self.notifications.lock().unwrap();
        match stored.iter_mut().find(|n| n.id == id) {
            Some(item) => {
                item.mark_read(1800000000);
                Ok(())
            }
            None => bail!("status 404 Not Found"),
        }
    }

    async fn mark_all_as_read(&self) -> Result<()> {
        self.begin_mutation().await?;
        for item in self.notifications.lock().unwrap().iter_mut() {
            item.mark_read(1800000000);
        }
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<()> {
        self.begin_mutation().await?;
        let mut stored = self.notifications.lock().unwrap();
        let before = stored.len();
        stored.retain(|n| n.id != id);
        if stored.len() == before {
            bail!("status 404 Not Found");
        }
        Ok(())
    }
}

/// Realtime channel fed by the test.
#[derive(Default)]
pub struct FakeChannel {
    sender: Mutex<Option<mpsc::Sender<RealtimeEvent>>>,
    connect_delay: Mutex<Duration>,
    fail_connect: AtomicBool,
    connects: AtomicUsize,
    disconnects: AtomicUsize,
}

impl FakeChannel {
    pub fn set_connect_delay(&self, delay: Duration) {
        *self.connect_delay.lock().unwrap() = delay;
    }

    pub fn fail_connect(&self, fail: bool) {
        self.fail_connect.store(fail, Ordering::SeqCst);
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn disconnects(&self) -> usize {
        self.disconnects.load(Ordering::SeqCst)
    }

    pub fn is_connected(&self) -> bool {
        self.sender.lock().unwrap().is_some()
    }

    /// Deliver an event to the connected engine.
    pub async fn push(&self, event: RealtimeEvent) {
        let sender = self
            .sender
            .lock()
            .unwrap()
            .clone()
            .expect("Channel is not connected");
        sender.send(event).await.expect("Engine dropped the event stream");
    }

    pub async fn push_notification(&self, notification: Notification) {
        self.push(RealtimeEvent::Notification(notification)).await;
    }

    /// Close the event stream as a transport drop would.
    pub fn close_stream(&self) {
        self.sender.lock().unwrap().take();
    }
}

#[async_trait]
impl RealtimeChannel for FakeChannel {
    async fn connect(&self) -> Result<mpsc::Receiver<RealtimeEvent>> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        let delay = *self.connect_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if self.fail_connect.load(Ordering::SeqCst) {
            bail!("handshake rejected");
        }

        let (tx, rx) = mpsc::channel(16);
        tx.try_send(RealtimeEvent::Connected)?;
        *self.sender.lock().unwrap() = Some(tx);
        Ok(rx)
    }

    async fn disconnect(&self) {
        self.disconnects.fetch_add(1, Ordering::SeqCst);
        self.sender.lock().unwrap().take();
    }
}
