use std::{
    fs::{self, File},
    io,
    path::{Path, PathBuf},
    sync::Arc,
};

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

const LOG_FILE: &str = "main.log";

/// Installs the global subscriber: human-readable lines on stderr plus a
/// plain-text copy in a fresh per-run directory under `log_dir`.
///
/// Returns the path of the log file.
pub fn init_logging(log_dir: &Path, filter: &str) -> Result<PathBuf, LoggingError> {
    let run_dir = create_run_dir(log_dir, Utc::now())?;
    let log_path = run_dir.join(LOG_FILE);
    let file = File::create(&log_path)?;

    tracing_subscriber::registry()
        .with(EnvFilter::try_new(filter)?)
        .with(fmt::layer().with_target(false).with_writer(io::stderr))
        .with(
            fmt::layer()
                .with_target(false)
                .with_ansi(false)
                .with_writer(Arc::new(file)),
        )
        .try_init()?;

    Ok(log_path)
}

/// Creates `log-<timestamp>` under `base`. Several runs within the same second
/// get a numeric suffix rather than sharing a directory.
pub fn create_run_dir(base: &Path, started_at: DateTime<Utc>) -> Result<PathBuf, LoggingError> {
    fs::create_dir_all(base)?;
    let stem = format!("log-{}", started_at.format("%Y-%m-%dT%H-%M-%SZ"));

    let mut candidate = base.join(&stem);
    let mut attempt = 1;
    loop {
        match fs::create_dir(&candidate) {
            Ok(()) => return Ok(candidate),
            Err(err) if err.kind() == io::ErrorKind::AlreadyExists => {
                attempt += 1;
                candidate = base.join(format!("{stem}-{attempt}"));
            }
            Err(err) => return Err(err.into()),
        }
    }
}

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("I/O error while preparing the log directory: {0}")]
    Io(#[from] io::Error),
    #[error("invalid log filter: {0}")]
    Filter(#[from] tracing_subscriber::filter::ParseError),
    #[error("a global logger is already installed: {0}")]
    AlreadyInstalled(#[from] tracing_subscriber::util::TryInitError),
}
