use crate::error::config::ConfigError;
use crate::error::persistence::PersistenceError;
use crate::error::state::StateError;

use common::ErrorLocation;

use std::io::Error as IoError;
use std::panic::Location;

use thiserror::Error as ThisError;

/// Hub and per-session failures.
///
/// Every variant is local to the session (or the bind) that produced it; the
/// accept loop keeps serving other connections.
#[derive(Debug, ThisError)]
pub enum SyncError {
    #[error("Handshake Error: {message} {location}")]
    Handshake {
        message: String,
        location: ErrorLocation,
    },

    #[error("Send Error: {message} {location}")]
    Send {
        message: String,
        location: ErrorLocation,
    },

    #[error("Read Error: {message} {location}")]
    Read {
        message: String,
        location: ErrorLocation,
    },

    #[error("Encode Error: {message} {location}")]
    Encode {
        message: String,
        location: ErrorLocation,
    },

    #[error("IO Error: {message} {location}")]
    Io {
        message: String,
        location: ErrorLocation,
    },

    #[error("Session Transition Error: {message} {location}")]
    Transition {
        message: String,
        location: ErrorLocation,
    },

    #[error(transparent)]
    State(#[from] StateError),

    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl SyncError {
    /// Read and write failures on the socket.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            SyncError::Handshake { .. } | SyncError::Send { .. } | SyncError::Read { .. }
        )
    }
}

impl From<IoError> for SyncError {
    #[track_caller]
    fn from(error: IoError) -> Self {
        SyncError::Io {
            message: error.to_string(),
            location: ErrorLocation::from(Location::caller()),
        }
    }
}
