use std::path::PathBuf;

use common::ErrorLocation;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("State Read Error: {path}: {source} {location}")]
    Read {
        location: ErrorLocation,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("State Parse Error: {path}: {reason} {location}")]
    Parse {
        location: ErrorLocation,
        path: PathBuf,
        reason: String,
    },

    #[error("State Write Error: {path}: {source} {location}")]
    Write {
        location: ErrorLocation,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("State Serialization Error: {reason} {location}")]
    Serialize {
        location: ErrorLocation,
        reason: String,
    },

    #[error("Persisted State Invalid: {path}: {reason} {location}")]
    Invalid {
        location: ErrorLocation,
        path: PathBuf,
        reason: String,
    },

    #[error("State Record Aborted: {reason} {location}")]
    Aborted {
        location: ErrorLocation,
        reason: String,
    },
}
