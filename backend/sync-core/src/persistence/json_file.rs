use crate::error::persistence::PersistenceError;
use crate::persistence::PersistenceSink;
use crate::state::SyncState;

use common::ErrorLocation;

use std::io::Write;
use std::panic::Location;
use std::path::{Path, PathBuf};

use log::{info, warn};
use tempfile::NamedTempFile;

const STATE_FILE_NAME: &str = "state.json";

/// Stores the state as pretty JSON in `{dir}/state.json`.
#[derive(Debug, Clone)]
pub struct JsonFileSink {
    dir: PathBuf,
}

impl JsonFileSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Full path of the state file.
    pub fn path(&self) -> PathBuf {
        self.dir.join(STATE_FILE_NAME)
    }

    /// Load the persisted state.
    ///
    /// # Returns
    ///
    /// Returns `S::default()` if the file does not exist yet.
    ///
    /// # Errors
    ///
    /// Returns [`PersistenceError`] if the file exists but cannot be read,
    /// parsed, or fails validation.
    pub fn load<S: SyncState + Default>(&self) -> Result<S, PersistenceError> {
        let state_path = self.path();

        if !state_path.exists() {
            info!(
                "State file not found at {}, using defaults",
                state_path.display()
            );
            return Ok(S::default());
        }

        let contents =
            std::fs::read_to_string(&state_path).map_err(|e| PersistenceError::Read {
                location: ErrorLocation::from(Location::caller()),
                path: state_path.clone(),
                source: e,
            })?;

        let state: S = serde_json::from_str(&contents).map_err(|e| {
            warn!("Failed to parse state file {}: {}", state_path.display(), e);
            PersistenceError::Parse {
                location: ErrorLocation::from(Location::caller()),
                path: state_path.clone(),
                reason: e.to_string(),
            }
        })?;

        state.validate().map_err(|e| PersistenceError::Invalid {
            location: ErrorLocation::from(Location::caller()),
            path: state_path.clone(),
            reason: e.to_string(),
        })?;

        info!("State loaded from {}", state_path.display());
        Ok(state)
    }

    fn write_atomic(&self, json: &str) -> Result<(), PersistenceError> {
        ensure_dir(&self.dir)?;

        let state_path = self.path();

        // Unique per write: concurrent records must not share a temp file.
        let mut temp = NamedTempFile::new_in(&self.dir).map_err(|e| PersistenceError::Write {
            location: ErrorLocation::from(Location::caller()),
            path: self.dir.clone(),
            source: e,
        })?;

        temp.write_all(json.as_bytes())
            .and_then(|()| temp.as_file().sync_all())
            .map_err(|e| PersistenceError::Write {
                location: ErrorLocation::from(Location::caller()),
                path: temp.path().to_path_buf(),
                source: e,
            })?;

        // Rename is atomic on POSIX; readers never see a half-written file.
        temp.persist(&state_path)
            .map_err(|e| PersistenceError::Write {
                location: ErrorLocation::from(Location::caller()),
                path: state_path.clone(),
                source: e.error,
            })?;

        Ok(())
    }
}

impl<S: SyncState> PersistenceSink<S> for JsonFileSink {
    fn record(&self, state: &S) -> Result<(), PersistenceError> {
        let json =
            serde_json::to_string_pretty(state).map_err(|e| PersistenceError::Serialize {
                location: ErrorLocation::from(Location::caller()),
                reason: e.to_string(),
            })?;

        self.write_atomic(&json)?;

        info!("State recorded to {}", self.path().display());
        Ok(())
    }
}

fn ensure_dir(dir: &Path) -> Result<(), PersistenceError> {
    std::fs::create_dir_all(dir).map_err(|e| PersistenceError::Write {
        location: ErrorLocation::from(Location::caller()),
        path: dir.to_path_buf(),
        source: e,
    })
}
