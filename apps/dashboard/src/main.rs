use dashboard::error::DashboardError;
use dashboard::logger::initialize as LoggerInitialize;
use dashboard::settings::Settings;

use sync_core::error::CoreError;
use sync_core::hub::start_sync_hub;
use sync_core::model::DashboardState;
use sync_core::persistence::{JsonFileSink, PersistenceSink};
use sync_core::state::SharedState;

use common::ErrorLocation;

use std::fs::create_dir_all;
use std::panic::Location;
use std::sync::Arc;

use log::info;

#[tokio::main]
async fn main() -> Result<(), DashboardError> {
    let settings = Settings::from_env()?;

    // Ensure log directory exists
    create_dir_all(&settings.log_dir).map_err(|e| DashboardError::Dashboard {
        message: format!(
            "Failed to create log directory {}: {e}",
            settings.log_dir.display()
        ),
        location: ErrorLocation::from(Location::caller()),
    })?;

    // Initialize logger FIRST
    LoggerInitialize(&settings.log_dir, settings.log_level)?;

    info!("Dashboard host starting");
    if let Some(env_file) = &settings.env_file {
        info!("Environment loaded from {}", env_file.display());
    }
    info!("State directory: {}", settings.state_dir.display());

    let sink = JsonFileSink::new(&settings.state_dir);
    let initial: DashboardState = sink.load().map_err(CoreError::from)?;
    let hub_config = settings.hub_config(&initial.server);

    let state = SharedState::new(initial).map_err(CoreError::from)?;
    let sink: Arc<dyn PersistenceSink<DashboardState>> = Arc::new(sink);

    let handle = start_sync_hub(hub_config, state.clone(), sink)
        .await
        .map_err(CoreError::from)?;

    info!("Dashboard available at http://{}", handle.local_addr());

    // The panel is up; every viewer should see it.
    state
        .modify(|dashboard| dashboard.server.status = true)
        .await
        .map_err(CoreError::from)?;

    tokio::signal::ctrl_c()
        .await
        .map_err(|e| DashboardError::Dashboard {
            message: format!("Failed to listen for shutdown signal: {e}"),
            location: ErrorLocation::from(Location::caller()),
        })?;

    info!("Shutdown requested");
    handle.shutdown().await;
    info!("Dashboard host stopped");

    Ok(())
}
