use std::time::Duration;

use crate::cache::OffFilterPushPolicy;
use crate::notifications::NotificationFilters;

/// Delay before the realtime channel is connected, so it does not compete
/// with the initial fetch.
pub const DEFAULT_REALTIME_DELAY: Duration = Duration::from_millis(5000);

/// Floor for the poll interval, so a tiny configured value cannot turn
/// polling into a busy loop.
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Runtime configuration of a [`SyncEngine`](super::SyncEngine).
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Filter context of the first fetch.
    pub initial_filters: NotificationFilters,
    /// Fixed polling interval. `None` (or zero) disables polling.
    pub poll_interval: Option<Duration>,
    /// Fetch automatically after `fetch_delay`.
    pub auto_fetch: bool,
    pub fetch_delay: Duration,
    /// Connect the realtime channel after `realtime_delay`.
    pub enable_realtime: bool,
    pub realtime_delay: Duration,
    pub off_filter_push_policy: OffFilterPushPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            initial_filters: NotificationFilters::default(),
            poll_interval: None,
            auto_fetch: true,
            fetch_delay: Duration::ZERO,
            enable_realtime: true,
            realtime_delay: DEFAULT_REALTIME_DELAY,
            off_filter_push_policy: OffFilterPushPolicy::default(),
        }
    }
}

impl EngineConfig {
    pub fn with_filters(mut self, filters: NotificationFilters) -> Self {
        self.initial_filters = filters;
        self
    }

    /// The poll interval actually used, if polling is enabled.
    pub fn effective_poll_interval(&self) -> Option<Duration> {
        self.poll_interval
            .filter(|interval| !interval.is_zero())
            .map(|interval| interval.max(MIN_POLL_INTERVAL))
    }
}
