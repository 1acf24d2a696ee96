//! Logging setup for the executables
//!
//! Records are written both to stdout and to the session's log file, each prefixed with the
//! number of seconds since the session started and a short level tag:
//!
//! ```text
//! [  0.001234 INF] Logging initialised
//! [  1.502311 DBG] mpc_lib::rollout::state: Rollout finished: COVERED after 1489 steps
//! ```
//!
//! Debug and trace records also carry their target module. The horizon optimiser logs every
//! iteration at trace level, so it has its own level separate from the rest of the crate.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External imports
use colored::{ColoredString, Colorize};
use log::{info, Level, Record};
use thiserror::Error;

// Internal imports
use crate::session::{self, Session};

// Re-exports
pub use log::LevelFilter;

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Target prefix of the horizon optimiser's records.
const SOLVER_TARGET: &str = "mpc_lib::mpc";

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum LoggerInitError {
    #[error("The minimum log level must be at least INFO, got {0}")]
    InvalidMinLogLevel(LevelFilter),

    #[error("Could not open the log file: {0}")]
    LogFileInitError(std::io::Error),

    #[error("Could not install the logger: {0}")]
    FernInitError(log::SetLoggerError),
}

// ---------------------------------------------------------------------------
// PUBLIC FUNCTIONS
// ---------------------------------------------------------------------------

/// Install the global logger, writing to stdout and `session.log_file_path`.
///
/// `min_level` must let `INFO` records through. Only one logger can be installed per process, a
/// second call fails with `FernInitError`.
pub fn logger_init(
    min_level: LevelFilter,
    solver_level: LevelFilter,
    session: &Session,
) -> Result<(), LoggerInitError> {
    if min_level < Level::Info {
        return Err(LoggerInitError::InvalidMinLogLevel(min_level));
    }

    let log_file = fern::log_file(&session.log_file_path)
        .map_err(LoggerInitError::LogFileInitError)?;

    fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!("{}{}", prefix(record), message))
        })
        .level(min_level)
        .level_for(SOLVER_TARGET, solver_level)
        .chain(std::io::stdout())
        .chain(log_file)
        .apply()
        .map_err(LoggerInitError::FernInitError)?;

    info!("Logging initialised");
    info!("    Session epoch: {}", session::get_epoch());
    info!("    Log level: {} (solver: {})", min_level, solver_level);
    info!("    Log file path: {:?}", session.log_file_path);

    Ok(())
}

// ---------------------------------------------------------------------------
// PRIVATE FUNCTIONS
// ---------------------------------------------------------------------------

/// Timestamp and level tag, plus the target for anything more verbose than info.
fn prefix(record: &Record) -> String {
    let stamp = format!(
        "[{:10.6} {}] ",
        session::get_elapsed_seconds(),
        level_tag(record.level())
    );

    if record.level() > Level::Info {
        format!("{}{}: ", stamp, record.target())
    }
    else {
        stamp
    }
}

fn level_tag(level: Level) -> ColoredString {
    match level {
        Level::Trace => "TRC".dimmed().italic(),
        Level::Debug => "DBG".dimmed(),
        Level::Info => "INF".normal(),
        Level::Warn => "WRN".yellow(),
        Level::Error => "ERR".red().bold(),
    }
}
