//! Application configuration, stored as TOML.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn, Level};

use crate::kitchen::KitchenConfig;
use crate::mqtt::MqttConfig;

const CONFIG_DIR: &str = ".config/table-orders";
const CONFIG_FILE: &str = "config.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("failed to serialize configuration: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("invalid broker url {url:?}: {reason}")]
    InvalidBrokerUrl { url: String, reason: String },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// One of trace, debug, info, warn, error
    pub log_level: String,
    pub mqtt: MqttConfig,
    pub kitchen: KitchenConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            log_level: "info".to_string(),
            mqtt: MqttConfig::default(),
            kitchen: KitchenConfig::default(),
        }
    }
}

impl AppConfig {
    /// `$HOME/.config/table-orders/config.toml`
    pub fn default_path() -> PathBuf {
        let mut path = get_home_dir();
        path.push(CONFIG_DIR);
        path.push(CONFIG_FILE);
        path
    }

    /// Loads the configuration at `path`, writing the defaults there first if
    /// the file does not exist yet.
    pub async fn load_or_create(path: &Path) -> Result<Self, ConfigError> {
        let exists = tokio::fs::try_exists(path)
            .await
            .map_err(|source| ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })?;

        if !exists {
            info!("Creating default configuration at {}", path.display());
            let config = AppConfig::default();
            config.save(path).await?;
            return Ok(config);
        }

        let content =
            tokio::fs::read_to_string(path)
                .await
                .map_err(|source| ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                })?;
        let config: AppConfig = toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    pub async fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let write_err = |source: std::io::Error| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(write_err)?;
        }
        let content = toml::to_string_pretty(self)?;
        tokio::fs::write(path, content).await.map_err(write_err)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.level()?;
        self.mqtt.validate()?;
        self.kitchen.validate()?;
        Ok(())
    }

    pub fn level(&self) -> Result<Level, ConfigError> {
        Level::from_str(&self.log_level)
            .map_err(|_| ConfigError::Invalid(format!("unknown log level {:?}", self.log_level)))
    }
}

fn get_home_dir() -> PathBuf {
    dirs::home_dir().unwrap_or_else(|| {
        warn!("Could not determine home directory, using current directory");
        PathBuf::from(".")
    })
}
