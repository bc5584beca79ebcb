//! Configuration management
//!
//! Loads configuration from:
//! 1. Default values
//! 2. Configuration file (config/default.toml, config/local.toml)
//! 3. Environment variables (override)

use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub federation: FederationConfig,
    pub logging: LoggingConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0")
    pub host: String,
    /// Port number (e.g., 8080)
    pub port: u16,
    /// Public domain (e.g., "social.example.com")
    pub domain: String,
    /// Protocol ("http" or "https")
    pub protocol: String,
}

impl ServerConfig {
    /// Get the base URL for the instance
    ///
    /// # Returns
    /// Full URL like "https://social.example.com"
    pub fn base_url(&self) -> String {
        format!("{}://{}", self.protocol, self.domain)
    }
}

/// Database configuration (SQLite only)
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Path to SQLite database file
    pub path: PathBuf,
}

/// Inbox and actor-resolution settings
#[derive(Debug, Clone, Deserialize)]
pub struct FederationConfig {
    /// User-Agent sent when fetching remote actor documents
    pub user_agent: String,
    /// Timeout for remote actor fetches, in seconds
    pub fetch_timeout_secs: u64,
    /// Maximum allowed distance between a signed `date` and now.
    ///
    /// 0 disables the freshness check.
    pub max_clock_skew_secs: u64,
    /// Maximum accepted inbox body size
    pub max_body_bytes: usize,
    /// Reject activities whose `actor` differs from the signing key's owner
    #[serde(default)]
    pub require_actor_match: bool,
    /// Return raw internal error text in 5xx bodies
    #[serde(default)]
    pub expose_internal_errors: bool,
    /// Allow actor fetches to loopback/private hosts (development only)
    #[serde(default)]
    pub allow_private_hosts: bool,
}

impl FederationConfig {
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    pub fn max_clock_skew(&self) -> Option<Duration> {
        (self.max_clock_skew_secs > 0).then(|| Duration::from_secs(self.max_clock_skew_secs))
    }
}

impl Default for FederationConfig {
    fn default() -> Self {
        Self {
            user_agent: "apinbox/0.1.0".to_string(),
            fetch_timeout_secs: 10,
            max_clock_skew_secs: 300,
            max_body_bytes: 1024 * 1024,
            require_actor_match: false,
            expose_internal_errors: false,
            allow_private_hosts: false,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    pub level: String,
    /// Log format: "pretty" or "json"
    pub format: String,
}

impl AppConfig {
    /// Load configuration from file and environment
    ///
    /// # Loading Order
    /// 1. Default values
    /// 2. config/default.toml (if exists)
    /// 3. config/local.toml (if exists)
    /// 4. Environment variables (APINBOX__*)
    ///
    /// # Errors
    /// Returns error if configuration is invalid
    pub fn load() -> Result<Self, crate::error::AppError> {
        use config::{Config, Environment, File};

        let config = Config::builder()
            // Start with default values
            .set_default("server.host", "127.0.0.1")?
            .set_default("server.port", 8080)?
            .set_default("server.domain", "localhost")?
            .set_default("server.protocol", "http")?
            .set_default("database.path", "data/apinbox.db")?
            .set_default("federation.user_agent", "apinbox/0.1.0")?
            .set_default("federation.fetch_timeout_secs", 10)?
            .set_default("federation.max_clock_skew_secs", 300)?
            .set_default("federation.max_body_bytes", 1024 * 1024)?
            .set_default("federation.require_actor_match", false)?
            .set_default("federation.expose_internal_errors", false)?
            .set_default("federation.allow_private_hosts", false)?
            .set_default("logging.level", "info")?
            .set_default("logging.format", "pretty")?
            // Load from config/default.toml if it exists
            .add_source(File::with_name("config/default").required(false))
            // Load from config/local.toml if it exists (overrides default)
            .add_source(File::with_name("config/local").required(false))
            // Load from environment variables (APINBOX__*)
            .add_source(
                Environment::with_prefix("APINBOX")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| crate::error::AppError::Config(e.to_string()))?;

        let app_config: Self = config
            .try_deserialize()
            .map_err(|e| crate::error::AppError::Config(e.to_string()))?;
        app_config.validate()?;
        Ok(app_config)
    }

    fn validate(&self) -> Result<(), crate::error::AppError> {
        if !matches!(self.server.protocol.as_str(), "http" | "https") {
            return Err(crate::error::AppError::Config(format!(
                "server.protocol must be http or https, got {}",
                self.server.protocol
            )));
        }

        if self.federation.fetch_timeout_secs == 0 {
            return Err(crate::error::AppError::Config(
                "federation.fetch_timeout_secs must be greater than 0".to_string(),
            ));
        }

        if self.federation.max_body_bytes == 0 {
            return Err(crate::error::AppError::Config(
                "federation.max_body_bytes must be greater than 0".to_string(),
            ));
        }

        if !matches!(
            self.logging.level.as_str(),
            "trace" | "debug" | "info" | "warn" | "error"
        ) {
            return Err(crate::error::AppError::Config(format!(
                "logging.level must be one of trace, debug, info, warn, error; got {}",
                self.logging.level
            )));
        }

        if !matches!(self.logging.format.as_str(), "pretty" | "json") {
            return Err(crate::error::AppError::Config(format!(
                "logging.format must be pretty or json, got {}",
                self.logging.format
            )));
        }

        if self.federation.allow_private_hosts {
            tracing::warn!("Actor fetches to private and loopback hosts are allowed");
        }
        if self.federation.expose_internal_errors {
            tracing::warn!("Internal error details will be returned to remote callers");
        }

        Ok(())
    }
}
