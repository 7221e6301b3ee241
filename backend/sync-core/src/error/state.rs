use common::ErrorLocation;

use thiserror::Error as ThisError;

/// Failures raised by [`SharedState`](crate::state::SharedState).
///
/// None of these leave the shared state modified.
#[derive(Debug, ThisError)]
pub enum StateError {
    /// Payload is not a complete JSON document of the expected shape.
    #[error("Decode Error: {message} {location}")]
    Decode {
        message: String,
        location: ErrorLocation,
    },

    /// Well-formed document whose values break a state invariant.
    #[error("Validation Error: {message} {location}")]
    Validation {
        message: String,
        location: ErrorLocation,
    },

    /// The commit actor stopped or dropped the reply.
    #[error("State Actor Error: {message} {location}")]
    Actor {
        message: String,
        location: ErrorLocation,
    },
}

impl StateError {
    /// Shorthand used by [`SyncState::validate`](crate::state::SyncState::validate) impls.
    #[track_caller]
    pub fn validation(message: impl Into<String>) -> Self {
        StateError::Validation {
            message: message.into(),
            location: ErrorLocation::caller(),
        }
    }
}

impl From<serde_json::Error> for StateError {
    #[track_caller]
    fn from(error: serde_json::Error) -> Self {
        StateError::Decode {
            message: error.to_string(),
            location: ErrorLocation::caller(),
        }
    }
}
