use crate::error::config::ConfigError;
use crate::{DEFAULT_HOST, DEFAULT_PORT, DEFAULT_WS_PATH};

use common::ErrorLocation;

use std::panic::Location;
use std::time::Duration;

/// Where and how the hub listens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HubConfig {
    pub host: String,
    /// `0` binds an ephemeral port; read it back from
    /// [`SyncHubHandle::local_addr`](crate::hub::SyncHubHandle::local_addr).
    pub port: u16,
    /// Request path upgraded to WebSocket; anything else gets a 404.
    pub path: String,
    /// End sessions whose client sends nothing for this long. `None` waits forever.
    pub idle_timeout: Option<Duration>,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            path: DEFAULT_WS_PATH.to_string(),
            idle_timeout: None,
        }
    }
}

impl HubConfig {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] for an empty host, a path without a
    /// leading `/`, or a zero idle timeout.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.host.trim().is_empty() {
            return Err(ConfigError::Validation {
                location: ErrorLocation::from(Location::caller()),
                reason: "host cannot be empty".to_string(),
            });
        }

        if !self.path.starts_with('/') {
            return Err(ConfigError::Validation {
                location: ErrorLocation::from(Location::caller()),
                reason: format!("websocket path must start with '/': {}", self.path),
            });
        }

        if self.idle_timeout == Some(Duration::ZERO) {
            return Err(ConfigError::Validation {
                location: ErrorLocation::from(Location::caller()),
                reason: "idle timeout must be greater than zero".to_string(),
            });
        }

        Ok(())
    }
}
