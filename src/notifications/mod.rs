//! User notifications module

mod models;

pub use models::{
    Notification, NotificationFilters, NotificationPage, NotificationPayload, NotificationType,
    Pagination, DEFAULT_PAGE_LIMIT,
};
