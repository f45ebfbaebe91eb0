use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

pub const CONFIG_VERSION: u64 = 1;

pub const DEFAULT_API_BASE: &str = "http://127.0.0.1:7432/api/v1";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config JSON: {0}")]
    Json(#[from] serde_json::Error),
}

fn default_api_base() -> String {
    DEFAULT_API_BASE.to_string()
}

fn default_request_timeout_secs() -> u64 {
    10
}

fn default_browser_command() -> String {
    if cfg!(target_os = "macos") {
        "open".into()
    } else if cfg!(target_os = "windows") {
        "explorer".into()
    } else {
        "xdg-open".into()
    }
}

fn default_version() -> u64 {
    CONFIG_VERSION
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(default)]
pub struct LaterConfig {
    #[serde(default = "default_version")]
    pub version: u64,
    /// Base URL of the later daemon's API, without a trailing slash.
    pub api_base: String,
    pub request_timeout_secs: u64,
    /// Command used to open a scheduled link.
    pub browser_command: String,
    pub debug_logging: bool,
}

impl Default for LaterConfig {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            api_base: default_api_base(),
            request_timeout_secs: default_request_timeout_secs(),
            browser_command: default_browser_command(),
            debug_logging: false,
        }
    }
}

impl LaterConfig {
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("~/.config"))
            .join("later")
            .join("config.json")
    }

    /// Read the config file. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(source) => {
                return Err(ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };
        let config: Self = serde_json::from_str(&content)?;
        if config.version != CONFIG_VERSION {
            log::warn!(
                "Config {} has version {}, expected {}",
                path.display(),
                config.version,
                CONFIG_VERSION
            );
        }
        Ok(config)
    }

    /// Like `load`, but a broken file is logged and replaced by the defaults.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                log::error!("Failed to load config, using defaults: {}", e);
                Self::default()
            }
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| ConfigError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, format!("{}\n", json)).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }
}
