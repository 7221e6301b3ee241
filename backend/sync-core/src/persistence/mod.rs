//! Durable recording of applied states.
//!
//! The hub calls [`PersistenceSink::record`] synchronously after a client
//! replacement commits. Memory is already updated by then, so a failing sink
//! leaves the in-memory state ahead of storage until the next successful record.

mod json_file;

pub use json_file::JsonFileSink;

use crate::error::persistence::PersistenceError;

/// Host-provided durable store for applied states.
pub trait PersistenceSink<S>: Send + Sync {
    fn record(&self, state: &S) -> Result<(), PersistenceError>;
}

/// Sink that keeps nothing. Useful when the host persists by other means.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl<S> PersistenceSink<S> for NullSink {
    fn record(&self, _state: &S) -> Result<(), PersistenceError> {
        Ok(())
    }
}
