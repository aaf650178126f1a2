//! # Settings
//!
//! Layered configuration for the CLI, read with the `config` crate:
//!
//! 1. `~/.chdbops/config.toml` (or the file passed with `--config`), optional
//! 2. `CHDBOPS_` environment variables, `__` separating nested keys,
//!    e.g. `CHDBOPS_CLICKHOUSE__HOST=ch.internal`
//! 3. serde defaults for anything left unset

use std::path::{Path, PathBuf};
use std::time::Duration;

use config::{Config, ConfigError, Environment, File, FileFormat};
use serde::Deserialize;

use super::logger::LoggerSettings;
use clickhouse_dbops::infrastructure::olap::clickhouse::config::ClickHouseConfig;
use clickhouse_dbops::infrastructure::olap::clickhouse::dbops::RetryPolicy;

const USER_DIRECTORY: &str = ".chdbops";
const CONFIG_FILE: &str = "config.toml";
const ENVIRONMENT_VARIABLE_PREFIX: &str = "CHDBOPS";

fn default_create_timeout_secs() -> u64 {
    30
}

fn default_read_timeout_secs() -> u64 {
    5
}

/// How long writes wait to become visible and how long reads keep looking.
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct RetrySettings {
    #[serde(default = "default_create_timeout_secs")]
    pub create_timeout_secs: u64,
    #[serde(default = "default_read_timeout_secs")]
    pub read_timeout_secs: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            create_timeout_secs: default_create_timeout_secs(),
            read_timeout_secs: default_read_timeout_secs(),
        }
    }
}

impl RetrySettings {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            create_timeout: Duration::from_secs(self.create_timeout_secs),
            read_timeout: Duration::from_secs(self.read_timeout_secs),
        }
    }
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct Settings {
    #[serde(default)]
    pub clickhouse: ClickHouseConfig,
    #[serde(default)]
    pub logger: LoggerSettings,
    #[serde(default)]
    pub retry: RetrySettings,
}

pub fn user_directory() -> PathBuf {
    let mut dir = home::home_dir().unwrap_or_else(|| PathBuf::from("."));
    dir.push(USER_DIRECTORY);
    dir
}

pub fn config_path() -> PathBuf {
    user_directory().join(CONFIG_FILE)
}

/// Reads the settings from `path`, or from the default location when `None`.
/// A missing file is not an error; an unreadable or malformed one is.
pub fn read_settings(path: Option<&Path>) -> Result<Settings, ConfigError> {
    let default_path = config_path();
    let path = path.unwrap_or(default_path.as_path());

    Config::builder()
        .add_source(
            File::from(path)
                .format(FileFormat::Toml)
                .required(false),
        )
        .add_source(
            Environment::with_prefix(ENVIRONMENT_VARIABLE_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        )
        .build()?
        .try_deserialize()
}
