pub mod config;
pub mod persistence;
pub mod state;
pub mod sync;

pub use config::ConfigError;
pub use persistence::PersistenceError;
pub use state::StateError;
pub use sync::SyncError;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Sync(#[from] SyncError),

    #[error(transparent)]
    State(#[from] StateError),

    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}
