use common::ErrorLocation;

use sync_core::error::{ConfigError, CoreError};

use thiserror::Error;

/// Errors that can stop the dashboard host.
#[derive(Debug, Error)]
pub enum DashboardError {
    /// Error from this app (directories, logger, signals)
    #[error("Dashboard Error: {message} {location}")]
    Dashboard {
        message: String,
        location: ErrorLocation,
    },

    /// Error from sync-core (state, persistence, hub)
    #[error(transparent)]
    Core(#[from] CoreError),
}

impl From<ConfigError> for DashboardError {
    fn from(error: ConfigError) -> Self {
        DashboardError::Core(CoreError::Config(error))
    }
}
