//! # Logger Module
//!
//! Logging is built from `tracing-subscriber` layers:
//! - an `EnvFilter` honouring `RUST_LOG`, falling back to the configured level
//! - a fmt layer in Text (compact) or Json format
//!
//! Output goes to stdout or to a file in the user directory that rolls over
//! daily, `~/.chdbops/cli.YYYY-MM-DD.log`. Files older than a week are removed
//! at startup.
//!
//! ## Environment Variables
//!
//! - `RUST_LOG`: module-level filtering (e.g. `RUST_LOG=clickhouse_dbops=debug`)
//! - `CHDBOPS_LOGGER__LEVEL`: DEBUG, INFO, WARN or ERROR
//! - `CHDBOPS_LOGGER__STDOUT`: log to stdout instead of the file (default: `false`)
//! - `CHDBOPS_LOGGER__FORMAT`: Text or Json (default: Text)

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use serde::Deserialize;
use tracing::warn;
use tracing_appender::rolling::{InitError, RollingFileAppender, Rotation};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};
use tracing_subscriber::EnvFilter;

use super::settings::user_directory;

const LOG_FILE_PREFIX: &str = "cli";
const LOG_FILE_SUFFIX: &str = "log";
const LOG_RETENTION: Duration = Duration::from_secs(7 * 24 * 60 * 60);

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
pub enum LoggerLevel {
    #[serde(alias = "DEBUG", alias = "debug")]
    Debug,
    #[serde(alias = "INFO", alias = "info")]
    Info,
    #[serde(alias = "WARN", alias = "warn")]
    Warn,
    #[serde(alias = "ERROR", alias = "error")]
    Error,
}

impl LoggerLevel {
    pub fn to_tracing_level(&self) -> LevelFilter {
        match self {
            LoggerLevel::Debug => LevelFilter::DEBUG,
            LoggerLevel::Info => LevelFilter::INFO,
            LoggerLevel::Warn => LevelFilter::WARN,
            LoggerLevel::Error => LevelFilter::ERROR,
        }
    }
}

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
pub enum LogFormat {
    #[serde(alias = "JSON", alias = "json")]
    Json,
    #[serde(alias = "TEXT", alias = "text")]
    Text,
}

#[derive(Deserialize, Debug, Clone)]
pub struct LoggerSettings {
    #[serde(default = "default_log_level")]
    pub level: LoggerLevel,
    #[serde(default = "default_log_stdout")]
    pub stdout: bool,
    #[serde(default = "default_log_format")]
    pub format: LogFormat,
}

fn default_log_level() -> LoggerLevel {
    LoggerLevel::Info
}

fn default_log_stdout() -> bool {
    false
}

fn default_log_format() -> LogFormat {
    LogFormat::Text
}

impl Default for LoggerSettings {
    fn default() -> Self {
        LoggerSettings {
            level: default_log_level(),
            stdout: default_log_stdout(),
            format: default_log_format(),
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum LoggerError {
    #[error("failed to open log file in {path:?}: {source}")]
    LogFile { path: PathBuf, source: InitError },
    #[error("failed to install the log subscriber: {0}")]
    Init(#[from] TryInitError),
}

/// Daily rolling `cli.YYYY-MM-DD.log` files in `dir`.
pub fn file_appender(dir: &Path) -> Result<RollingFileAppender, LoggerError> {
    RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(LOG_FILE_PREFIX)
        .filename_suffix(LOG_FILE_SUFFIX)
        .build(dir)
        .map_err(|source| LoggerError::LogFile {
            path: dir.to_path_buf(),
            source,
        })
}

// Failures here are only logged; housekeeping never stops the CLI.
fn clean_old_logs() {
    let Some(cut_off) = SystemTime::now().checked_sub(LOG_RETENTION) else {
        return;
    };

    let Ok(dir) = user_directory().read_dir() else {
        warn!("failed to read directory");
        return;
    };

    for entry in dir.flatten() {
        if entry.path().extension().is_some_and(|ext| ext == "log") {
            match entry.metadata().and_then(|md| md.modified()) {
                Ok(t) if t < cut_off => {
                    let _ = std::fs::remove_file(entry.path());
                }
                Ok(_) => {}
                Err(e) => warn!(
                    "Failed to read modification time for {:?}. {}",
                    entry.path(),
                    e
                ),
            }
        }
    }
}

pub fn setup_logging(settings: &LoggerSettings) -> Result<(), LoggerError> {
    if settings.stdout {
        return install(settings, std::io::stdout);
    }

    install(settings, file_appender(&user_directory())?)?;
    clean_old_logs();
    Ok(())
}

fn install<W>(settings: &LoggerSettings, writer: W) -> Result<(), LoggerError>
where
    W: for<'a> MakeWriter<'a> + Send + Sync + 'static,
{
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(settings.level.to_tracing_level().to_string()));

    let format_layer = tracing_subscriber::fmt::layer()
        .with_writer(writer)
        .with_target(true)
        .with_level(true);

    let registry = tracing_subscriber::registry().with(env_filter);
    if settings.format == LogFormat::Json {
        registry.with(format_layer.json()).try_init()?;
    } else {
        registry.with(format_layer.compact()).try_init()?;
    }

    Ok(())
}
