//! The state mirrored by the dashboard host.
//!
//! Every struct here denies unknown fields and has no per-field serde
//! defaults: a client replacement must spell out the whole document.

use crate::error::state::StateError;
use crate::hub::HubConfig;
use crate::state::SyncState;
use crate::{DEFAULT_HOST, DEFAULT_PORT};

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

// ============================================
// STATE STRUCTS
// ============================================

/// Web panel server settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerSettings {
    /// Whether the web panel is being served.
    pub status: bool,
    /// Whether the host should open a browser on start.
    pub open: bool,
    pub port: u16,
    pub host: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            status: false,
            open: false,
            port: DEFAULT_PORT,
            host: DEFAULT_HOST.to_string(),
        }
    }
}

/// Paths and filters a project's file watcher uses.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Watcher {
    pub paths: Vec<String>,
    pub extensions: Vec<String>,
    pub ignore: Vec<String>,
}

/// A monitored project and the commands the host runs for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Project {
    pub name: String,
    pub path: String,
    pub fmt: bool,
    pub test: bool,
    pub generate: bool,
    pub build: bool,
    pub run: bool,
    pub args: Vec<String>,
    pub watcher: Watcher,
}

impl Project {
    pub fn new(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            fmt: true,
            test: false,
            generate: false,
            build: false,
            run: true,
            args: Vec::new(),
            watcher: Watcher {
                paths: vec!["/".to_string()],
                extensions: vec!["go".to_string()],
                ignore: vec!["vendor".to_string()],
            },
        }
    }
}

/// Everything the dashboard shows and may replace.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DashboardState {
    pub server: ServerSettings,
    pub projects: Vec<Project>,
}

// ============================================
// VALIDATION
// ============================================

impl ServerSettings {
    fn validate(&self) -> Result<(), StateError> {
        if self.port == 0 {
            return Err(StateError::validation("server.port must be non-zero"));
        }

        if self.host.trim().is_empty() {
            return Err(StateError::validation("server.host cannot be empty"));
        }

        Ok(())
    }
}

impl Project {
    fn validate(&self) -> Result<(), StateError> {
        if self.name.trim().is_empty() {
            return Err(StateError::validation("project name cannot be empty"));
        }

        if self.path.trim().is_empty() {
            return Err(StateError::validation(format!(
                "project {} has an empty path",
                self.name
            )));
        }

        if let Some(ext) = self
            .watcher
            .extensions
            .iter()
            .find(|ext| ext.trim().is_empty())
        {
            return Err(StateError::validation(format!(
                "project {} has an invalid watcher extension: {ext:?}",
                self.name
            )));
        }

        Ok(())
    }
}

impl SyncState for DashboardState {
    fn validate(&self) -> Result<(), StateError> {
        self.server.validate()?;

        let mut names = HashSet::with_capacity(self.projects.len());
        for project in &self.projects {
            project.validate()?;

            if !names.insert(project.name.as_str()) {
                return Err(StateError::validation(format!(
                    "duplicate project name: {}",
                    project.name
                )));
            }
        }

        Ok(())
    }
}

impl From<&ServerSettings> for HubConfig {
    fn from(server: &ServerSettings) -> Self {
        Self {
            host: server.host.clone(),
            port: server.port,
            ..HubConfig::default()
        }
    }
}
