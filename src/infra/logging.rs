use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

const LOG_ENV: &str = "SESSIONLINE_LOG";
const DEFAULT_DIRECTIVE: &str = "info";

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("home directory not found")]
    HomeDirNotFound,

    #[error("failed to create log dir {path}: {source}")]
    CreateDir { path: String, source: io::Error },

    #[error("failed to install log subscriber: {0}")]
    Install(String),
}

pub enum LogTarget {
    /// The terminal belongs to the TUI, so it logs to a rolling file.
    File(PathBuf),
    Stderr,
}

pub fn resolve_log_dir() -> Result<PathBuf, LoggingError> {
    if let Some(dir) = dirs::state_dir() {
        return Ok(dir.join("sessionline").join("logs"));
    }
    let Some(home) = dirs::home_dir() else {
        return Err(LoggingError::HomeDirNotFound);
    };
    Ok(home.join(".sessionline").join("logs"))
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVE))
}

/// Installs the global subscriber. Keep the returned guard alive until exit so buffered
/// file output is flushed.
pub fn init_logging(target: LogTarget) -> Result<Option<WorkerGuard>, LoggingError> {
    match target {
        LogTarget::File(dir) => {
            create_log_dir(&dir)?;
            let appender = tracing_appender::rolling::daily(&dir, "sessionline.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::fmt()
                .with_env_filter(env_filter())
                .with_ansi(false)
                .with_writer(writer)
                .try_init()
                .map_err(|error| LoggingError::Install(error.to_string()))?;
            Ok(Some(guard))
        }
        LogTarget::Stderr => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter())
                .with_writer(io::stderr)
                .try_init()
                .map_err(|error| LoggingError::Install(error.to_string()))?;
            Ok(None)
        }
    }
}

fn create_log_dir(dir: &Path) -> Result<(), LoggingError> {
    fs::create_dir_all(dir).map_err(|error| LoggingError::CreateDir {
        path: dir.display().to_string(),
        source: error,
    })
}
