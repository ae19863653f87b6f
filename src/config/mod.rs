//! Application configuration.
//!
//! Aggregates configuration from all modules into a single Config struct
//! that can be loaded from YAML files or environment variables.

mod auth;
mod limits;
mod server;
mod storage;

pub use auth::{AuthConfig, SeedUser, DEV_DELETE_PASSCODE, DEV_JWT_SECRET};
pub use limits::{LimitsConfig, DEFAULT_MAX_PAGE_SIZE, DEFAULT_PAGE_SIZE};
pub use server::ServerConfig;
pub use storage::StorageConfig;

use serde::Deserialize;
use tracing::warn;

/// Default configuration file name.
pub const DEFAULT_CONFIG_FILE: &str = "clientdesk.yaml";
/// Environment variable for configuration file path.
pub const CONFIG_ENV_VAR: &str = "CLIENTDESK_CONFIG";
/// Prefix for configuration environment variables.
pub const CONFIG_ENV_PREFIX: &str = "CLIENTDESK";
/// Environment variable for logging configuration.
pub const LOG_ENV_VAR: &str = "CLIENTDESK_LOG";

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] ::config::ConfigError),

    #[error("Missing required setting in production: {0}")]
    MissingSecret(&'static str),

    #[error("Invalid setting {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Deployment environment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Production,
}

impl Environment {
    pub fn is_production(self) -> bool {
        self == Environment::Production
    }
}

/// Main application configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Deployment environment; production disables secret fallbacks.
    pub environment: Environment,
    /// HTTP server configuration.
    pub server: ServerConfig,
    /// Database configuration.
    pub storage: StorageConfig,
    /// Tokens, passcode and seeded users.
    pub auth: AuthConfig,
    /// Paging limits.
    pub limits: LimitsConfig,
}

impl Config {
    /// Load configuration from file and environment.
    ///
    /// Configuration sources (in order of priority, later overrides earlier):
    /// 1. `clientdesk.yaml` in current directory (if exists)
    /// 2. File specified by `path` argument (if provided)
    /// 3. File specified by `CONFIG_ENV_VAR` environment variable (if set)
    /// 4. Environment variables with `CONFIG_ENV_PREFIX` prefix
    pub fn load(path: Option<&str>) -> Result<Self, ConfigError> {
        use ::config::{Config as ConfigLib, Environment as EnvSource, File, FileFormat};

        let mut builder = ConfigLib::builder()
            .add_source(File::new(DEFAULT_CONFIG_FILE, FileFormat::Yaml).required(false));

        if let Some(config_path) = path {
            builder = builder.add_source(File::new(config_path, FileFormat::Yaml).required(true));
        }

        if let Ok(config_path) = std::env::var(CONFIG_ENV_VAR) {
            builder = builder.add_source(File::new(&config_path, FileFormat::Yaml).required(true));
        }

        let config = builder
            .add_source(
                EnvSource::with_prefix(CONFIG_ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: Config = config.try_deserialize()?;
        config.validate()
    }

    /// Check cross-section rules and apply development fallbacks.
    ///
    /// In production, `auth.jwt_secret` and `auth.delete_passcode` must be
    /// set explicitly. In development, missing secrets and an empty user
    /// list are replaced by well-known values and a warning is logged.
    pub fn validate(mut self) -> Result<Self, ConfigError> {
        if self.limits.default_page_size == 0 || self.limits.max_page_size == 0 {
            return Err(ConfigError::Invalid {
                field: "limits",
                reason: "page sizes must be at least 1".to_string(),
            });
        }
        if self.limits.default_page_size > self.limits.max_page_size {
            return Err(ConfigError::Invalid {
                field: "limits.default_page_size",
                reason: format!("exceeds max_page_size {}", self.limits.max_page_size),
            });
        }

        let blank = |v: &Option<String>| v.as_deref().is_none_or(|s| s.trim().is_empty());

        if self.environment.is_production() {
            if blank(&self.auth.jwt_secret) {
                return Err(ConfigError::MissingSecret("auth.jwt_secret"));
            }
            if blank(&self.auth.delete_passcode) {
                return Err(ConfigError::MissingSecret("auth.delete_passcode"));
            }
            return Ok(self);
        }

        if blank(&self.auth.jwt_secret) {
            warn!("auth.jwt_secret not set, using development secret");
            self.auth.jwt_secret = Some(DEV_JWT_SECRET.to_string());
        }
        if blank(&self.auth.delete_passcode) {
            warn!("auth.delete_passcode not set, using development passcode");
            self.auth.delete_passcode = Some(DEV_DELETE_PASSCODE.to_string());
        }
        Ok(self)
    }

    /// Create config for testing.
    pub fn for_test() -> Self {
        let mut config = Self::default();
        config.storage.path = ":memory:".to_string();
        config.auth.jwt_secret = Some("test-secret".to_string());
        config.auth.delete_passcode = Some("letmein".to_string());
        config
    }
}
