//! Configuration management.
//!
//! Values come from `ATLAS__*` environment variables, optionally layered over
//! a config file. Nested keys use `__` as separator, for example
//! `ATLAS__AGGREGATION__MAX_CONCURRENT_LOADS=32`.

use std::time::Duration;

use serde::Deserialize;

use crate::aggregation::AggregationConfig;
use crate::error::{AtlasError, Result};
use crate::telemetry::TelemetryConfig;

/// Main application configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Database configuration
    pub database: DatabaseConfig,

    /// Aggregation engine configuration
    #[serde(default)]
    pub aggregation: AggregationConfig,

    /// Logging and metrics configuration
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// HTTP server host
    #[serde(default = "default_host")]
    pub host: String,

    /// HTTP server port
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL
    pub url: String,

    /// Maximum number of connections
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Minimum number of connections
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,

    /// How long to wait for a pooled connection
    #[serde(default = "default_acquire_timeout", with = "humantime_serde")]
    pub acquire_timeout: Duration,
}

impl DatabaseConfig {
    /// Database settings for a URL with pool defaults.
    pub fn with_url(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            max_connections: default_max_connections(),
            min_connections: default_min_connections(),
            acquire_timeout: default_acquire_timeout(),
        }
    }
}

// Default value functions
fn default_host() -> String { "0.0.0.0".to_string() }
fn default_port() -> u16 { 8080 }
fn default_max_connections() -> u32 { 20 }
fn default_min_connections() -> u32 { 2 }
fn default_acquire_timeout() -> Duration { Duration::from_secs(5) }

impl Config {
    /// Load configuration from the environment.
    pub fn load() -> Result<Self> {
        let config = config::Config::builder()
            .add_source(config::Environment::with_prefix("ATLAS").separator("__"))
            .build()?;

        let cfg: Config = config.try_deserialize()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load from a specific file path, with environment overrides on top.
    pub fn from_file(path: &str) -> Result<Self> {
        let config = config::Config::builder()
            .add_source(config::File::with_name(path))
            .add_source(config::Environment::with_prefix("ATLAS").separator("__"))
            .build()?;

        let cfg: Config = config.try_deserialize()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Fallback used when no configuration source is present.
    pub fn from_database_url(url: impl Into<String>) -> Self {
        Self {
            server: ServerConfig::default(),
            database: DatabaseConfig::with_url(url),
            aggregation: AggregationConfig::default(),
            telemetry: TelemetryConfig::default(),
        }
    }

    fn validate(&self) -> Result<()> {
        if self.database.min_connections > self.database.max_connections {
            return Err(AtlasError::configuration(format!(
                "database.min_connections ({}) exceeds database.max_connections ({})",
                self.database.min_connections, self.database.max_connections
            )));
        }
        self.aggregation.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_from_file_applies_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[database]
url = "postgres://atlas@localhost/atlas"

[aggregation]
max_concurrent_loads = 4
request_timeout = "2s"
"#
        )
        .unwrap();

        let path = file.path().to_str().unwrap().to_string();
        let cfg = Config::from_file(&path).unwrap();

        assert_eq!(cfg.server.port, 8080);
        assert_eq!(cfg.database.max_connections, 20);
        assert_eq!(cfg.database.acquire_timeout, Duration::from_secs(5));
        assert_eq!(cfg.aggregation.max_concurrent_loads, 4);
        assert_eq!(cfg.aggregation.request_timeout, Some(Duration::from_secs(2)));
    }

    #[test]
    fn test_from_file_rejects_inverted_pool_bounds() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[database]
url = "postgres://atlas@localhost/atlas"
max_connections = 2
min_connections = 8
"#
        )
        .unwrap();

        let path = file.path().to_str().unwrap().to_string();
        let err = Config::from_file(&path).unwrap_err();
        assert_eq!(err.code(), crate::error::ErrorCode::ConfigurationError);
    }

    #[test]
    fn test_from_file_reports_missing_file() {
        let err = Config::from_file("/nonexistent/atlas-config").unwrap_err();
        assert_eq!(err.code(), crate::error::ErrorCode::MissingConfiguration);
    }

    #[test]
    fn test_fallback_config() {
        let cfg = Config::from_database_url("postgres://localhost/atlas");
        assert_eq!(cfg.database.url, "postgres://localhost/atlas");
        assert_eq!(cfg.server.host, "0.0.0.0");
    }
}
