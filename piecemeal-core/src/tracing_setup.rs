//! Log output for the `piecemeal` binary.
//!
//! The console shows piecemeal's own events at the level picked on the
//! command line and keeps other crates at `warn`. A per-run file receives
//! everything at `debug`, plus every piece state transition at `trace`, so a
//! run can be replayed piece by piece afterwards.

use std::fs::{File, create_dir_all};
use std::path::{Path, PathBuf};

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, fmt};

use crate::PiecemealError;

/// Name of the per-run log file inside the logs directory.
pub const LOG_FILE_NAME: &str = "piecemeal-last-run.log";

/// Directory used when the caller does not pick one.
pub const DEFAULT_LOGS_DIR: &str = "logs";

/// Targets that log at the console level; everything else is held at `warn`.
const PIECEMEAL_TARGETS: [&str; 2] = ["piecemeal_core", "piecemeal"];

/// File filter: state transitions in full, the rest at debug.
const FILE_DIRECTIVES: &str = "debug,piecemeal_core::pieces=trace";

/// Installs the console and file layers as the global subscriber.
///
/// The log file is truncated on every run. `RUST_LOG`, when set, replaces the
/// console filter but never the file filter. Returns the path of the file.
///
/// # Errors
///
/// - `PiecemealError::Io` - If the logs directory or log file cannot be created
/// - `PiecemealError::Configuration` - If a global subscriber is already installed
pub fn init_tracing(
    console_level: Level,
    logs_dir: Option<&Path>,
) -> Result<PathBuf, PiecemealError> {
    let logs_dir = logs_dir.unwrap_or_else(|| Path::new(DEFAULT_LOGS_DIR));
    create_dir_all(logs_dir)?;
    let log_file_path = logs_dir.join(LOG_FILE_NAME);
    let log_file = File::create(&log_file_path)?;

    let console_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(console_directives(console_level)));
    let console_layer = fmt::layer()
        .with_target(true)
        .with_filter(console_filter);

    let file_layer = fmt::layer()
        .with_thread_names(true)
        .with_file(true)
        .with_line_number(true)
        .with_ansi(false)
        .with_writer(log_file)
        .with_filter(EnvFilter::new(FILE_DIRECTIVES));

    tracing_subscriber::registry()
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| PiecemealError::Configuration {
            reason: format!("tracing already initialized: {e}"),
        })?;

    tracing::debug!("Logging to {}", log_file_path.display());
    Ok(log_file_path)
}

/// Filter directives for the console at `level`.
pub fn console_directives(level: Level) -> String {
    let level = level.as_str().to_ascii_lowercase();
    let mut directives = String::from("warn");
    for target in PIECEMEAL_TARGETS {
        directives.push_str(&format!(",{target}={level}"));
    }
    directives
}

/// Console verbosity accepted by `--log-level`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum CliLogLevel {
    Error,
    Warn,
    Info,
    /// Adds list construction, slicing and cancelled waits
    Debug,
    /// Adds every piece state transition and listener dispatch
    Trace,
}

impl CliLogLevel {
    /// ```
    /// use piecemeal_core::tracing_setup::CliLogLevel;
    ///
    /// assert_eq!(CliLogLevel::Debug.as_tracing_level(), tracing::Level::DEBUG);
    /// ```
    pub fn as_tracing_level(self) -> Level {
        match self {
            CliLogLevel::Error => Level::ERROR,
            CliLogLevel::Warn => Level::WARN,
            CliLogLevel::Info => Level::INFO,
            CliLogLevel::Debug => Level::DEBUG,
            CliLogLevel::Trace => Level::TRACE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_console_directives_raise_only_piecemeal_targets() {
        assert_eq!(
            console_directives(Level::DEBUG),
            "warn,piecemeal_core=debug,piecemeal=debug"
        );
        assert_eq!(
            console_directives(CliLogLevel::Error.as_tracing_level()),
            "warn,piecemeal_core=error,piecemeal=error"
        );
    }

    #[test]
    fn test_filters_parse() {
        for level in [Level::ERROR, Level::INFO, Level::TRACE] {
            assert!(EnvFilter::try_new(console_directives(level)).is_ok());
        }
        assert!(EnvFilter::try_new(FILE_DIRECTIVES).is_ok());
    }

    #[test]
    fn test_init_writes_log_file_into_requested_dir() {
        let dir = std::env::temp_dir().join(format!("piecemeal-logs-{}", std::process::id()));

        // Another test in this process may already own the global subscriber;
        // the file is created before installation either way.
        let result = init_tracing(Level::WARN, Some(&dir));
        let log_file = dir.join(LOG_FILE_NAME);
        assert!(log_file.exists());
        if let Ok(path) = result {
            assert_eq!(path, log_file);
        }

        let _ = std::fs::remove_dir_all(&dir);
    }
}
