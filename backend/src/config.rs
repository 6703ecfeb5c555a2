//! Configuration management for the Storefront Books back-end
//!
//! Supports hierarchical configuration loading:
//! 1. Default values in code
//! 2. Configuration files (development.toml, production.toml)
//! 3. Environment variable overrides with POS_ prefix

use config::{ConfigError, Environment, File};
use serde::Deserialize;

/// Main application configuration
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// Current environment (development, production)
    pub environment: String,

    /// Server configuration
    pub server: ServerConfig,

    /// Database configuration
    pub database: DatabaseConfig,

    /// Serial counter cache configuration
    pub serials: SerialsConfig,

    /// JWT authentication configuration
    pub jwt: JwtConfig,

    /// Tax-authority reporting configuration
    pub reporting: ReportingConfig,

    /// Notification bus configuration
    #[serde(default)]
    pub notifications: NotificationsConfig,

    /// Accounting engine configuration
    pub accounting: AccountingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    /// Server port
    pub port: u16,

    /// Server host
    pub host: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL
    pub url: String,

    /// Maximum number of connections in the pool
    pub max_connections: u32,

    /// Minimum number of connections in the pool
    pub min_connections: u32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SerialsConfig {
    /// Redis connection URL for the serial counters
    pub redis_url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct JwtConfig {
    /// Secret key for verifying bearer tokens
    pub secret: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ReportingConfig {
    /// Whether finalized sales are reported to the tax authority
    pub enabled: bool,

    /// Tax-authority API endpoint
    pub endpoint: String,

    /// Tax-authority API key
    pub api_key: String,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct NotificationsConfig {
    /// Notification bus endpoint; unset disables emission
    pub endpoint: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AccountingConfig {
    /// Retries for transient database failures during posting
    pub retry_attempts: u32,

    /// Base backoff between retries, doubled per attempt
    pub retry_backoff_ms: u64,
}

impl Config {
    /// Load configuration from files and environment variables
    pub fn load() -> Result<Self, ConfigError> {
        let environment = std::env::var("POS_ENVIRONMENT").unwrap_or_else(|_| "development".into());

        let config = config::Config::builder()
            // Start with default values
            .set_default("environment", environment.clone())?
            .set_default("server.port", 3000)?
            .set_default("server.host", "0.0.0.0")?
            .set_default("database.max_connections", 10)?
            .set_default("database.min_connections", 2)?
            .set_default("serials.redis_url", "redis://127.0.0.1:6379")?
            .set_default("reporting.enabled", false)?
            .set_default("reporting.endpoint", "")?
            .set_default("reporting.api_key", "")?
            .set_default("accounting.retry_attempts", 3)?
            .set_default("accounting.retry_backoff_ms", 50)?
            // Load environment-specific config file
            .add_source(File::with_name(&format!("config/{}", environment)).required(false))
            // Override with environment variables (POS_ prefix)
            .add_source(
                Environment::with_prefix("POS")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 3000,
            host: "0.0.0.0".to_string(),
        }
    }
}
