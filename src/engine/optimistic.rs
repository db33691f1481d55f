//! Two-phase optimistic mutations.
//!
//! Phase one patches the cache before the remote call is issued. Phase two
//! either confirms (nothing to do, the cache already shows the intent) or
//! compensates by re-fetching the authoritative state. Compensation is always
//! a full re-fetch, never a per-field undo.

use tokio::sync::watch;

use crate::cache::NotificationCache;

/// A mutation tentatively applied to the cache, awaiting its remote outcome.
#[must_use = "an optimistic mutation must be settled"]
#[derive(Debug)]
pub(crate) struct Optimistic {
    description: String,
    patched: bool,
}

/// How an optimistic mutation must be settled.
#[derive(Debug)]
pub(crate) enum Settlement {
    Confirm,
    Compensate(anyhow::Error),
}

impl Optimistic {
    /// Apply `patch` to the cache. `patch` returns whether it changed anything.
    pub(crate) fn apply(
        state: &watch::Sender<NotificationCache>,
        description: String,
        patch: impl FnOnce(&mut NotificationCache) -> bool,
    ) -> Self {
        let patched = state.send_if_modified(patch);
        Self {
            description,
            patched,
        }
    }

    pub(crate) fn description(&self) -> &str {
        &self.description
    }

    /// Whether the cache was actually changed by the tentative apply.
    pub(crate) fn patched(&self) -> bool {
        self.patched
    }

    pub(crate) fn into_description(self) -> String {
        self.description
    }

    pub(crate) fn settlement(result: anyhow::Result<()>) -> Settlement {
        match result {
            Ok(()) => Settlement::Confirm,
            Err(e) => Settlement::Compensate(e),
        }
    }
}
