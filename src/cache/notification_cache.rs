//! In-memory notification cache and its merge rules.
//!
//! The cache holds the ordered notification list (most recent first) plus the
//! aggregate counters reported by the last fetch. A fetch replaces everything
//! wholesale; optimistic mutations and realtime pushes only apply provisional
//! patches on top, which the next fetch overwrites.

use crate::notifications::{Notification, NotificationFilters, NotificationPage, Pagination};

/// What to do with the aggregate counters when a pushed notification does not
/// satisfy the active filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OffFilterPushPolicy {
    /// An unread off-filter push still bumps `total` and `unread_count`,
    /// even though the item is not added to the visible list.
    #[default]
    CountInAggregates,
    /// Off-filter pushes leave the counters untouched.
    Ignore,
}

/// Result of merging a pushed notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PushOutcome {
    /// The item is now at the head of the visible list.
    pub inserted: bool,
    /// The item replaced a cached entry with the same id.
    pub replaced: bool,
    /// `total` and `unread_count` were incremented.
    pub counted: bool,
}

/// Aggregate notification state.
#[derive(Debug, Clone, PartialEq)]
pub struct NotificationCache {
    notifications: Vec<Notification>,
    total: usize,
    unread_count: usize,
    filters: NotificationFilters,
    loading: bool,
    error: Option<String>,
}

impl NotificationCache {
    /// Empty cache for the given filter context.
    pub fn new(filters: NotificationFilters) -> Self {
        Self {
            notifications: Vec::new(),
            total: 0,
            unread_count: 0,
            filters,
            loading: false,
            error: None,
        }
    }

    pub fn notifications(&self) -> &[Notification] {
        &self.notifications
    }

    pub fn get(&self, id: &str) -> Option<&Notification> {
        self.notifications.iter().find(|n| n.id == id)
    }

    pub fn total(&self) -> usize {
        self.total
    }

    pub fn unread_count(&self) -> usize {
        self.unread_count
    }

    pub fn filters(&self) -> &NotificationFilters {
        &self.filters
    }

    pub fn pagination(&self) -> Pagination {
        self.filters.pagination()
    }

    pub fn loading(&self) -> bool {
        self.loading
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn set_loading(&mut self, loading: bool) {
        self.loading = loading;
    }

    pub fn set_error(&mut self, message: impl Into<String>) {
        self.error = Some(message.into());
    }

    /// Clears the error. Returns false if there was none.
    pub fn clear_error(&mut self) -> bool {
        self.error.take().is_some()
    }

    /// Authoritative replace with a fetch reply.
    ///
    /// Duplicate ids in the reply keep their first occurrence.
    pub fn replace(&mut self, page: NotificationPage, filters: NotificationFilters) {
        let mut notifications: Vec<Notification> = Vec::with_capacity(page.notifications.len());
        for item in page.notifications {
            if !notifications.iter().any(|n| n.id == item.id) {
                notifications.push(item);
            }
        }
        self.notifications = notifications;
        self.total = page.total;
        self.unread_count = page.unread_count;
        self.filters = filters;
        self.error = None;
    }

    /// Optimistically marks one notification read.
    ///
    /// Returns true if a cached unread item flipped to read, in which case
    /// `unread_count` dropped by one (floored at zero).
    pub fn mark_read(&mut self, id: &str, now: i64) -> bool {
        let Some(item) = self.notifications.iter_mut().find(|n| n.id == id) else {
            return false;
        };
        if !item.mark_read(now) {
            return false;
        }
        self.unread_count = self.unread_count.saturating_sub(1);
        true
    }

    /// Optimistically marks every cached notification read and zeroes the
    /// unread counter. Returns how many cached items flipped.
    pub fn mark_all_read(&mut self, now: i64) -> usize {
        let flipped = self
            .notifications
            .iter_mut()
            .map(|n| n.mark_read(now))
            .filter(|flipped| *flipped)
            .count();
        self.unread_count = 0;
        flipped
    }

    /// Optimistically removes a notification, adjusting the counters.
    pub fn remove(&mut self, id: &str) -> Option<Notification> {
        let index = self.notifications.iter().position(|n| n.id == id)?;
        let removed = self.notifications.remove(index);
        self.total = self.total.saturating_sub(1);
        if removed.is_unread() {
            self.unread_count = self.unread_count.saturating_sub(1);
        }
        Some(removed)
    }

    /// Merges a pushed notification.
    ///
    /// Items matching the active filter go to the head of the list; an item
    /// already cached under the same id is replaced and moved to the head.
    /// An unread item not cached before bumps `total` and `unread_count`,
    /// visible or not, unless `policy` says to ignore off-filter pushes.
    pub fn insert_pushed(&mut self, item: Notification, policy: OffFilterPushPolicy) -> PushOutcome {
        let visible = self.filters.matches(&item);
        let existing = self.notifications.iter().position(|n| n.id == item.id);

        let counted = existing.is_none()
            && item.is_unread()
            && (visible || policy == OffFilterPushPolicy::CountInAggregates);

        if let Some(index) = existing {
            let previous = self.notifications.remove(index);
            if previous.is_unread() && !item.is_unread() {
                self.unread_count = self.unread_count.saturating_sub(1);
            } else if !previous.is_unread() && item.is_unread() {
                self.unread_count += 1;
            }
        }

        if counted {
            self.total += 1;
            self.unread_count += 1;
        }

        if visible {
            self.notifications.insert(0, item);
        } else if existing.is_some() {
            // The update moved the item out of the active filter.
            self.total = self.total.saturating_sub(1);
        }

        PushOutcome {
            inserted: visible,
            replaced: existing.is_some(),
            counted,
        }
    }
}

impl Default for NotificationCache {
    fn default() -> Self {
        Self::new(NotificationFilters::default())
    }
}
