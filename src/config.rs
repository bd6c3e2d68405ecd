//! Config loading and environment overrides.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_CONFIG_FILE: &str = "tether.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Coordinator address, e.g. `ws://127.0.0.1:8765`.
    pub server_addr: String,
    /// Name this endpoint registers under.
    pub service_name: String,
    /// Root directory of the content-addressable store.
    pub store_dir: PathBuf,
    pub logging: LoggingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_addr: "ws://127.0.0.1:8765".to_string(),
            service_name: "tether".to_string(),
            store_dir: PathBuf::from("files"),
            logging: LoggingConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub stdout: bool,
    pub stdout_format: LogFormat,
    pub file: FileLoggingConfig,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            stdout: true,
            stdout_format: LogFormat::Compact,
            file: FileLoggingConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Pretty,
    Compact,
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct FileLoggingConfig {
    pub enabled: bool,
    /// Defaults to `logs` in the working directory when unset.
    pub dir: Option<PathBuf>,
    pub format: Option<LogFormat>,
}

/// Loads from an explicit path (must exist), or from `tether.toml` in the
/// working directory when present, falling back to defaults. Environment
/// overrides apply last.
pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
    let mut config = match path {
        Some(path) => read_file(path)?,
        None => {
            let default_path = Path::new(DEFAULT_CONFIG_FILE);
            if default_path.exists() {
                read_file(default_path)?
            } else {
                Config::default()
            }
        }
    };
    apply_env_overrides(&mut config);
    Ok(config)
}

fn read_file(path: &Path) -> Result<Config, ConfigError> {
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&contents).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

pub fn apply_env_overrides(config: &mut Config) {
    apply_overrides(
        config,
        std::env::var("TETHER_SERVER").ok(),
        std::env::var("TETHER_SERVICE_NAME").ok(),
        std::env::var("TETHER_STORE_DIR").ok(),
    );
}

fn apply_overrides(
    config: &mut Config,
    server: Option<String>,
    service_name: Option<String>,
    store_dir: Option<String>,
) {
    if let Some(server) = server {
        config.server_addr = server;
    }
    if let Some(service_name) = service_name {
        config.service_name = service_name;
    }
    if let Some(store_dir) = store_dir {
        config.store_dir = PathBuf::from(store_dir);
    }
}
