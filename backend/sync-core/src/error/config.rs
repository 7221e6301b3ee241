use common::ErrorLocation;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Config Validation Error: {reason} {location}")]
    Validation {
        location: ErrorLocation,
        reason: String,
    },

    #[error("Config Environment Error: {name}: {reason} {location}")]
    Environment {
        location: ErrorLocation,
        name: String,
        reason: String,
    },

    #[error("Config Directory Not Found Error: {reason} {location}")]
    DirectoryNotFound {
        location: ErrorLocation,
        reason: String,
    },
}
