use crate::error::state::StateError;

use common::ErrorLocation;

use tokio::sync::watch;

/// Handle returned by [`SharedState::subscribe`](super::SharedState::subscribe).
///
/// Each listener starts out caught up with the revision current at subscribe
/// time; only later commits wake it.
pub struct ChangeListener {
    revision_rx: watch::Receiver<u64>,
}

impl ChangeListener {
    pub(super) fn new(revision_rx: watch::Receiver<u64>) -> Self {
        Self { revision_rx }
    }

    /// Wait for the next commit and return the newest revision.
    ///
    /// Commits that land while nobody is waiting collapse into one wake-up.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::Actor`] once every handle to the shared state is gone.
    pub async fn changed(&mut self) -> Result<u64, StateError> {
        self.revision_rx
            .changed()
            .await
            .map_err(|e| StateError::Actor {
                message: format!("Shared state dropped: {e}"),
                location: ErrorLocation::caller(),
            })?;

        Ok(*self.revision_rx.borrow_and_update())
    }

    /// Revision this listener has seen most recently.
    pub fn seen_revision(&self) -> u64 {
        *self.revision_rx.borrow()
    }
}
