//! Shared application state with serialized commits and change notification.
//!
//! # Architecture
//!
//! Uses the actor pattern for writes:
//! - [`SharedState::apply`] sends the candidate to a dedicated commit task via
//!   an mpsc channel and waits for the verdict on a oneshot reply
//! - The commit task validates, swaps the value under the write lock, then
//!   bumps the revision carried by a `watch` channel
//! - Reads clone out of `Arc<RwLock<S>>`, so callers always hold an
//!   independent copy of a fully committed value
//!
//! The `watch` revision is the change signal. It is level-triggered: a slow
//! listener that misses several commits wakes once and re-reads the newest
//! snapshot.

mod listener;
mod shared;

pub use listener::ChangeListener;
pub use shared::SharedState;

use crate::error::state::StateError;

use std::fmt::Debug;

use serde::Serialize;
use serde::de::DeserializeOwned;

/// A state type that can be mirrored to dashboard clients.
///
/// Implementors must decode only from a complete document (no
/// `#[serde(default)]` fallbacks on required fields) so that a partial client
/// payload is rejected instead of silently filled in.
pub trait SyncState: Debug + Clone + Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Check invariants that the type system cannot express.
    fn validate(&self) -> Result<(), StateError>;
}

/// Decode a client payload into a complete candidate state.
///
/// The payload is decoded into a fresh value, never over the current state.
/// Validation is left to [`SharedState::apply`].
pub fn decode_candidate<S: SyncState>(payload: &[u8]) -> Result<S, StateError> {
    Ok(serde_json::from_slice(payload)?)
}
