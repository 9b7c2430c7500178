use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::ConfigError;

/// Environment variable overriding `store.database_path`.
pub const DATABASE_ENV: &str = "CALBRIDGE_DATABASE";

/// Configuration validation errors
#[derive(Debug, Clone)]
pub struct ConfigValidationError {
    pub field: String,
    pub message: String,
}

impl std::fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Result of config validation
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub errors: Vec<ConfigValidationError>,
    pub warnings: Vec<ConfigValidationError>,
}

impl ValidationResult {
    /// Returns true if there are no errors (warnings are OK)
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn add_error(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.errors.push(ConfigValidationError {
            field: field.into(),
            message: message.into(),
        });
    }

    pub fn add_warning(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.warnings.push(ConfigValidationError {
            field: field.into(),
            message: message.into(),
        });
    }

    /// Get a message summarizing all errors
    pub fn error_summary(&self) -> String {
        self.errors
            .iter()
            .map(|e| e.to_string())
            .collect::<Vec<_>>()
            .join("; ")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Application configuration directory
    pub config_dir: PathBuf,

    /// Calendar store settings
    #[serde(default)]
    pub store: StoreConfig,

    /// Answers given when a permission prompt would be shown
    #[serde(default)]
    pub permissions: PermissionsConfig,

    /// Logging settings
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// SQLite database file; `<config_dir>/calendar.db` when unset
    #[serde(default)]
    pub database_path: Option<PathBuf>,

    /// Create a local calendar and reminder list when the store is empty
    #[serde(default = "default_seed_defaults")]
    pub seed_defaults: bool,
}

fn default_seed_defaults() -> bool {
    true
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database_path: None,
            seed_defaults: default_seed_defaults(),
        }
    }
}

/// How an undetermined permission prompt is answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PromptResponse {
    #[default]
    Grant,
    Deny,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PermissionsConfig {
    #[serde(default)]
    pub calendar: PromptResponse,

    #[serde(default)]
    pub reminders: PromptResponse,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default `tracing` filter, overridden by `RUST_LOG`
    #[serde(default = "default_log_filter")]
    pub filter: String,
}

fn default_log_filter() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        let config_dir = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("calbridge");

        Self {
            config_dir,
            store: StoreConfig::default(),
            permissions: PermissionsConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from the default location, creating it if missing
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;
        Self::load_from(&config_path)
    }

    /// Load configuration from `path`, writing defaults there if it doesn't exist
    ///
    /// `CALBRIDGE_DATABASE` applies to the loaded value only and is never
    /// written back to the file.
    pub fn load_from(path: &Path) -> Result<Self> {
        Self::load_with_override(path, std::env::var_os(DATABASE_ENV).map(PathBuf::from))
    }

    fn load_with_override(path: &Path, database_override: Option<PathBuf>) -> Result<Self> {
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(path).context("Failed to read config file")?;
            toml::from_str::<Config>(&contents)
                .map_err(|e| ConfigError::ParseError(e.to_string()))?
        } else {
            let mut config = Self::default();
            if let Some(parent) = path.parent() {
                config.config_dir = parent.to_path_buf();
            }
            config.save_to(path)?;
            config
        };

        if let Some(database_path) = database_override {
            config.store.database_path = Some(database_path);
        }

        Ok(config)
    }

    /// Load configuration and validate it
    ///
    /// Returns the config along with any validation warnings; the caller logs
    /// them once tracing is up. Fails with `ConfigError::Invalid` on errors.
    pub fn load_validated() -> Result<(Self, ValidationResult)> {
        let config = Self::load()?;
        let validation = config.validate();

        if !validation.is_valid() {
            return Err(ConfigError::Invalid(validation.error_summary()).into());
        }

        Ok((config, validation))
    }

    /// Validate the configuration
    pub fn validate(&self) -> ValidationResult {
        let mut result = ValidationResult::default();

        let db_path = self.database_path();
        if db_path.as_os_str().is_empty() {
            result.add_error("store.database_path", "Database path cannot be empty");
        } else if db_path.is_dir() {
            result.add_error(
                "store.database_path",
                format!("Path is a directory: {}", db_path.display()),
            );
        } else if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                result.add_warning(
                    "store.database_path",
                    format!("Directory will be created: {}", parent.display()),
                );
            }
        }

        if tracing_filter_is_blank(&self.logging.filter) {
            result.add_warning("logging.filter", "Empty log filter, falling back to info");
        }

        if self.permissions.calendar == PromptResponse::Deny {
            result.add_warning(
                "permissions.calendar",
                "Calendar prompts are answered with deny; event operations will fail",
            );
        }

        result
    }

    /// Effective database path
    pub fn database_path(&self) -> PathBuf {
        self.store
            .database_path
            .clone()
            .unwrap_or_else(|| self.config_dir.join("calendar.db"))
    }

    fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;

        std::fs::write(path, contents).context("Failed to write config file")?;

        Ok(())
    }

    /// Get the path to the configuration file
    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Failed to get config directory")?
            .join("calbridge");

        Ok(config_dir.join("config.toml"))
    }
}

fn tracing_filter_is_blank(filter: &str) -> bool {
    filter.trim().is_empty()
}
