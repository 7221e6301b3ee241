//! Host settings read from the environment.
//!
//! A `.env` file in the working directory (or any parent) is loaded first.
//! Flag parsing is left to whatever launches the host.

use common::ErrorLocation;

use sync_core::error::ConfigError;
use sync_core::hub::HubConfig;
use sync_core::model::ServerSettings;

use std::panic::Location;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use log::LevelFilter;

pub const STATE_DIR_ENV: &str = "DASHBOARD_STATE_DIR";
pub const LOG_DIR_ENV: &str = "DASHBOARD_LOG_DIR";
pub const LOG_LEVEL_ENV: &str = "DASHBOARD_LOG_LEVEL";
pub const IDLE_TIMEOUT_ENV: &str = "DASHBOARD_IDLE_TIMEOUT";

/// Directory created under the platform config dir when no state dir is given.
const APP_DIR_NAME: &str = "realize";

/// Default log level for debug builds.
#[cfg(debug_assertions)]
const DEFAULT_LOG_LEVEL: LevelFilter = LevelFilter::Debug;

/// Default log level for release builds.
#[cfg(not(debug_assertions))]
const DEFAULT_LOG_LEVEL: LevelFilter = LevelFilter::Info;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// Where `state.json` lives.
    pub state_dir: PathBuf,
    pub log_dir: PathBuf,
    pub log_level: LevelFilter,
    /// Hardening option for stalled clients; off unless configured.
    pub idle_timeout: Option<Duration>,
    /// The `.env` file that was loaded, if any.
    pub env_file: Option<PathBuf>,
}

impl Settings {
    /// Load `.env`, then read settings from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if a variable is malformed or no default state
    /// directory exists on this platform.
    pub fn from_env() -> Result<Self, ConfigError> {
        let env_file = dotenvy::dotenv().ok();

        let mut settings = Self::from_lookup(|name| std::env::var(name).ok())?;
        settings.env_file = env_file;
        Ok(settings)
    }

    /// Build settings from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        let state_dir = match read(STATE_DIR_ENV) {
            Some(dir) => PathBuf::from(dir),
            None => default_state_dir()?,
        };

        let log_dir = read(LOG_DIR_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| state_dir.clone());

        let log_level = match read(LOG_LEVEL_ENV) {
            Some(raw) => parse_log_level(&raw)?,
            None => DEFAULT_LOG_LEVEL,
        };

        let idle_timeout = read(IDLE_TIMEOUT_ENV)
            .map(|raw| parse_idle_timeout(&raw))
            .transpose()?;

        Ok(Self {
            state_dir,
            log_dir,
            log_level,
            idle_timeout,
            env_file: None,
        })
    }

    /// Hub configuration for the mirrored server settings.
    pub fn hub_config(&self, server: &ServerSettings) -> HubConfig {
        HubConfig {
            idle_timeout: self.idle_timeout,
            ..HubConfig::from(server)
        }
    }
}

fn default_state_dir() -> Result<PathBuf, ConfigError> {
    dirs::config_dir()
        .map(|dir| dir.join(APP_DIR_NAME))
        .ok_or_else(|| ConfigError::DirectoryNotFound {
            location: ErrorLocation::from(Location::caller()),
            reason: format!("no platform config directory; set {STATE_DIR_ENV}"),
        })
}

fn parse_log_level(raw: &str) -> Result<LevelFilter, ConfigError> {
    LevelFilter::from_str(raw.trim()).map_err(|e| ConfigError::Environment {
        location: ErrorLocation::from(Location::caller()),
        name: LOG_LEVEL_ENV.to_string(),
        reason: format!("{raw:?}: {e}"),
    })
}

fn parse_idle_timeout(raw: &str) -> Result<Duration, ConfigError> {
    let timeout =
        humantime::parse_duration(raw.trim()).map_err(|e| ConfigError::Environment {
            location: ErrorLocation::from(Location::caller()),
            name: IDLE_TIMEOUT_ENV.to_string(),
            reason: format!("{raw:?}: {e}"),
        })?;

    if timeout.is_zero() {
        return Err(ConfigError::Environment {
            location: ErrorLocation::from(Location::caller()),
            name: IDLE_TIMEOUT_ENV.to_string(),
            reason: "must be greater than zero".to_string(),
        });
    }

    Ok(timeout)
}
