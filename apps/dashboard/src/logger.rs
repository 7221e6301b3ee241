//! Logging for the dashboard host.
//!
//! Coloured stdout plus a plain `dashboard.log` file. The WebSocket stack logs
//! every frame at debug level, so it is capped at info regardless of the
//! configured level.

use crate::error::DashboardError;

use common::ErrorLocation;

use std::fmt::Arguments;
use std::io::stdout;
use std::panic::Location;
use std::path::Path;
use std::sync::Once;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::SystemTime;

use fern::colors::Color::{Blue, Green, Magenta, Red, Yellow};
use fern::colors::ColoredLevelConfig;
use fern::{Dispatch, FormatCallback};
use humantime::format_rfc3339;
use log::{LevelFilter, Record, info, warn};

/// Thread-safe initialization guard.
static INIT_LOGGER_ONCE: Once = Once::new();

/// Tracks if logger initialization was already attempted.
static LOGGER_ALREADY_CALLED: AtomicBool = AtomicBool::new(false);

pub const LOG_FILE_NAME: &str = "dashboard.log";

/// Crates whose debug output drowns out the hub's own messages.
const NOISY_TARGETS: [&str; 2] = ["tungstenite", "tokio_tungstenite"];

/// Initialize the global logger.
///
/// Safe to call more than once: later calls log a warning and return `Ok`.
///
/// # Errors
///
/// Returns an error if the log file cannot be created or a logger is already
/// installed by someone else.
pub fn initialize(log_dir: &Path, level: LevelFilter) -> Result<(), DashboardError> {
    if LOGGER_ALREADY_CALLED.swap(true, Ordering::SeqCst) {
        warn!("Logger already initialized");
        return Ok(());
    }

    let mut result = Ok(());

    INIT_LOGGER_ONCE.call_once(|| {
        result = build_dispatch(log_dir, level).and_then(|dispatch| {
            dispatch.apply().map_err(|e| DashboardError::Dashboard {
                message: format!("Failed to initialize logger: {e}"),
                location: ErrorLocation::from(Location::caller()),
            })
        });
        if result.is_ok() {
            info!("Logger initialized with level: {level:?}");
        }
    });

    result
}

/// Build the stdout + file dispatch without installing it.
pub(crate) fn build_dispatch(log_dir: &Path, level: LevelFilter) -> Result<Dispatch, DashboardError> {
    let log_file = fern::log_file(log_dir.join(LOG_FILE_NAME)).map_err(|e| {
        DashboardError::Dashboard {
            message: format!("Failed to create log file in {}: {e}", log_dir.display()),
            location: ErrorLocation::from(Location::caller()),
        }
    })?;

    let colors = ColoredLevelConfig::new()
        .debug(Blue)
        .info(Green)
        .warn(Yellow)
        .error(Red)
        .trace(Magenta);

    let stdout_dispatch = Dispatch::new()
        .format(move |out, message, record| {
            write_line(out, colors.color(record.level()), message, record)
        })
        .chain(stdout());

    let file_dispatch = Dispatch::new()
        .format(|out, message, record| write_line(out, record.level(), message, record))
        .chain(log_file);

    let mut base = Dispatch::new().level(level);
    for target in NOISY_TARGETS {
        base = base.level_for(target, level.min(LevelFilter::Info));
    }

    Ok(base.chain(stdout_dispatch).chain(file_dispatch))
}

fn write_line(
    out: FormatCallback<'_>,
    level: impl std::fmt::Display,
    message: &Arguments<'_>,
    record: &Record<'_>,
) {
    out.finish(format_args!(
        "[{date} - {level}] {message} [{target}]",
        date = format_rfc3339(SystemTime::now()),
        target = record.target(),
    ))
}
