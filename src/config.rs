//! Configuration file support for the annotation store.
//!
//! Settings are stored as versioned JSON. Missing fields take their defaults,
//! so older files keep loading as sections are added.

use std::path::{Path, PathBuf};

use annostore_sandbox::SandboxLayout;
use serde::{Deserialize, Serialize};

use crate::import::UnknownTypesStrategy;
use crate::ops::MergeStrategy;

/// Log level setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Show only errors
    Error,
    /// Show errors and warnings
    Warn,
    /// Show errors, warnings, and info messages
    #[default]
    Info,
    /// Show debug-level logging
    Debug,
    /// Show all log messages including trace
    Trace,
}

impl LogLevel {
    /// Convert to log crate's LevelFilter.
    pub fn to_level_filter(&self) -> log::LevelFilter {
        match self {
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
        }
    }
}

/// Current configuration file format version.
/// Increment this when making breaking changes to the config format.
pub const CONFIG_VERSION: u32 = 1;

/// Store-wide settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Version of the configuration file format
    pub version: u32,

    /// Log verbosity level
    #[serde(default)]
    pub log_level: LogLevel,

    /// Per-user label file name
    #[serde(default = "default_label_file_name")]
    pub label_file_name: String,

    /// Strategy used when an import request names none
    #[serde(default)]
    pub default_unknown_types_strategy: UnknownTypesStrategy,

    /// Strategy used when a merge request names none
    #[serde(default)]
    pub default_merge_strategy: MergeStrategy,

    #[serde(default)]
    pub sandbox: SandboxConfig,
}

fn default_label_file_name() -> String {
    "labels.yaml".to_string()
}

/// Sandbox section of the config.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SandboxConfig {
    /// Backup directory, relative to the sandbox root
    #[serde(default = "default_backup_dir_name")]
    pub backup_dir_name: String,

    #[serde(default = "default_user_id_len")]
    pub user_id_len: usize,

    #[serde(default = "default_repo_id_len")]
    pub repo_id_len: usize,

    /// Versions a migration may start from; empty accepts any
    #[serde(default = "default_supported_versions")]
    pub supported_versions: Vec<String>,
}

fn default_backup_dir_name() -> String {
    "backup".to_string()
}

fn default_user_id_len() -> usize {
    4
}

fn default_repo_id_len() -> usize {
    6
}

fn default_supported_versions() -> Vec<String> {
    vec![annostore_sandbox::DEFAULT_SANDBOX_VERSION.to_string()]
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            backup_dir_name: default_backup_dir_name(),
            user_id_len: default_user_id_len(),
            repo_id_len: default_repo_id_len(),
            supported_versions: default_supported_versions(),
        }
    }
}

impl StoreConfig {
    /// Create a new configuration with default values.
    pub fn new() -> Self {
        Self {
            version: CONFIG_VERSION,
            log_level: LogLevel::default(),
            label_file_name: default_label_file_name(),
            default_unknown_types_strategy: UnknownTypesStrategy::default(),
            default_merge_strategy: MergeStrategy::default(),
            sandbox: SandboxConfig::default(),
        }
    }

    /// Serialize the configuration to JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Deserialize configuration from JSON.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;

        // Validate version compatibility
        if config.version > CONFIG_VERSION {
            return Err(ConfigError::VersionTooNew {
                file_version: config.version,
                supported_version: CONFIG_VERSION,
            });
        }

        Ok(config)
    }

    /// Layout handed to the sandbox migrator.
    pub fn sandbox_layout(&self) -> SandboxLayout {
        SandboxLayout {
            label_file_name: self.label_file_name.clone(),
            backup_dir_name: self.sandbox.backup_dir_name.clone(),
            user_id_len: self.sandbox.user_id_len,
            repo_id_len: self.sandbox.repo_id_len,
        }
    }

    /// Get the default filename for the config file.
    pub fn default_filename() -> &'static str {
        "annostore.json"
    }

    /// Get the default config file path.
    pub fn default_path() -> Option<PathBuf> {
        // Try to use XDG config directory, fall back to home directory
        if let Some(config_dir) = dirs::config_dir() {
            Some(config_dir.join("annostore").join(Self::default_filename()))
        } else {
            dirs::home_dir().map(|home_dir| {
                home_dir
                    .join(".config")
                    .join("annostore")
                    .join(Self::default_filename())
            })
        }
    }

    /// Load configuration from `path`.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path)?;
        let config = Self::from_json(&json)?;
        log::info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Try to load configuration from the default path.
    /// Returns None if the file doesn't exist or can't be read.
    pub fn load_from_default_path() -> Option<Self> {
        let path = Self::default_path()?;
        if !path.exists() {
            log::debug!("No config file found at {:?}", path);
            return None;
        }

        match Self::load(&path) {
            Ok(config) => Some(config),
            Err(e) => {
                log::warn!("Failed to load config file {:?}: {}", path, e);
                None
            }
        }
    }

    /// Save configuration to `path`, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let json = self.to_json()?;
        std::fs::write(path, json)?;
        log::info!("Saved configuration to {:?}", path);
        Ok(())
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// JSON parsing error
    #[error("Failed to parse configuration: {0}")]
    ParseError(#[from] serde_json::Error),

    /// Configuration version is newer than supported
    #[error(
        "Configuration file version {file_version} is newer than supported version {supported_version}"
    )]
    VersionTooNew {
        file_version: u32,
        supported_version: u32,
    },

    /// I/O error when reading/writing config
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}
