use thiserror::Error;

/// Errors returned by the sync engine's operations.
///
/// Every error is also recorded in the engine state; none of them leaves
/// the engine unusable, except `Disposed`.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Failed to fetch notifications: {0:#}")]
    Fetch(#[source] anyhow::Error),

    /// The remote mutation failed. The optimistic patch has already been
    /// discarded by a reconciliation fetch when this is returned.
    #[error("Failed to {operation}: {source:#}")]
    Mutation {
        operation: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Sync engine has been shut down")]
    Disposed,
}
