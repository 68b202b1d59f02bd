//! Configuration management with layered hierarchy

use miette::Diagnostic;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Default Prism Central port
pub const DEFAULT_PORT: u16 = 9440;

/// Default HTTP timeout in seconds
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Environment variable overriding the global config file location
pub const CONFIG_FILE_ENV: &str = "CALM_DSL_CONFIG_FILE_LOCATION";

/// Environment variable overriding the cache database location
pub const DB_LOCATION_ENV: &str = "CALM_DSL_DB_LOCATION";

/// Errors raised while resolving configuration
#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    #[error("Could not determine a per-user {0} directory")]
    #[diagnostic(
        code(calm::config::no_home),
        help("Set CALM_DSL_CONFIG_FILE_LOCATION and CALM_DSL_DB_LOCATION explicitly")
    )]
    NoUserDirectory(&'static str),

    #[error("Invalid configuration in {}: {message}", .path.display())]
    #[diagnostic(code(calm::config::invalid))]
    Invalid { path: PathBuf, message: String },
}

/// Calm DSL configuration with layered hierarchy
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Prism Central host or IP
    pub pc_ip: Option<String>,

    /// Prism Central port
    pub pc_port: Option<u16>,

    /// API username
    pub username: Option<String>,

    /// API password
    pub password: Option<String>,

    /// Verify the server TLS certificate
    pub verify_tls: Option<bool>,

    /// HTTP request timeout
    pub timeout_secs: Option<u64>,

    /// Cache database file
    pub db_location: Option<PathBuf>,
}

impl Config {
    /// Load configuration from all sources, merging in priority order
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = Config::default();

        // 1. Built-in defaults (applied by the accessors)

        // 2. Global user config file
        let path = Self::global_config_path()?;
        if let Some(file_config) = Self::load_file(&path)? {
            config.merge(file_config);
        }

        // 3. Environment variables
        config.merge(Self::from_env());

        Ok(config)
    }

    /// Read one config file; a missing file is not an error
    pub fn load_file(path: &Path) -> Result<Option<Self>, ConfigError> {
        if !path.exists() {
            return Ok(None);
        }

        let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::Invalid {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

        if contents.trim().is_empty() {
            return Ok(None);
        }

        serde_yml::from_str::<Config>(&contents)
            .map(Some)
            .map_err(|e| ConfigError::Invalid {
                path: path.to_path_buf(),
                message: e.to_string(),
            })
    }

    /// Values taken from CALM_DSL_* environment variables
    fn from_env() -> Self {
        let var = |name: &str| std::env::var(name).ok().filter(|v| !v.is_empty());

        Config {
            pc_ip: var("CALM_DSL_PC_IP"),
            pc_port: var("CALM_DSL_PC_PORT").and_then(|p| p.parse().ok()),
            username: var("CALM_DSL_PC_USERNAME"),
            password: var("CALM_DSL_PC_PASSWORD"),
            verify_tls: None,
            timeout_secs: None,
            db_location: var(DB_LOCATION_ENV).map(PathBuf::from),
        }
    }

    /// Get the path to the global config file
    pub fn global_config_path() -> Result<PathBuf, ConfigError> {
        if let Ok(path) = std::env::var(CONFIG_FILE_ENV) {
            if !path.is_empty() {
                return Ok(PathBuf::from(path));
            }
        }

        directories::ProjectDirs::from("", "", "calm")
            .map(|dirs| dirs.config_dir().join("config.yaml"))
            .ok_or(ConfigError::NoUserDirectory("config"))
    }

    /// Merge another config into this one (other takes precedence)
    pub fn merge(&mut self, other: Config) {
        if other.pc_ip.is_some() {
            self.pc_ip = other.pc_ip;
        }
        if other.pc_port.is_some() {
            self.pc_port = other.pc_port;
        }
        if other.username.is_some() {
            self.username = other.username;
        }
        if other.password.is_some() {
            self.password = other.password;
        }
        if other.verify_tls.is_some() {
            self.verify_tls = other.verify_tls;
        }
        if other.timeout_secs.is_some() {
            self.timeout_secs = other.timeout_secs;
        }
        if other.db_location.is_some() {
            self.db_location = other.db_location;
        }
    }

    pub fn port(&self) -> u16 {
        self.pc_port.unwrap_or(DEFAULT_PORT)
    }

    pub fn verify_tls(&self) -> bool {
        self.verify_tls.unwrap_or(false)
    }

    pub fn timeout_secs(&self) -> u64 {
        self.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS)
    }

    /// Location of the cache database file
    pub fn db_path(&self) -> Result<PathBuf, ConfigError> {
        if let Some(ref path) = self.db_location {
            return Ok(path.clone());
        }

        directories::ProjectDirs::from("", "", "calm")
            .map(|dirs| dirs.data_dir().join("dsl.db"))
            .ok_or(ConfigError::NoUserDirectory("data"))
    }
}
