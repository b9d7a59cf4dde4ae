//! # Configuration Settings
//!
//! Defines the configuration structure for the standalone host shim.

use crate::backend::lease::LeaseSettings;
use crate::errors::{Error, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use validator::Validate;

/// Prefix shared by every environment variable the shim reads
pub const ENV_PREFIX: &str = "PACKET_SECRETS_";

fn env_var(name: &str) -> Option<String> {
    std::env::var(format!("{}{}", ENV_PREFIX, name)).ok()
}

fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    match env_var(name) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| Error::config(format!("Invalid {}{} '{}': {}", ENV_PREFIX, name, raw, e))),
        None => Ok(default),
    }
}

fn env_bool(name: &str, default: bool) -> bool {
    env_var(name).map(|s| s.to_lowercase() == "true" || s == "1").unwrap_or(default)
}

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate, Default)]
pub struct AppConfig {
    /// HTTP server configuration
    #[validate(nested)]
    pub server: ServerConfig,

    /// Host lease bounds
    #[validate(nested)]
    pub lease: LeaseConfig,

    /// Observability configuration
    #[validate(nested)]
    pub observability: ObservabilityConfig,
}

impl AppConfig {
    /// Load configuration from `PACKET_SECRETS_*` environment variables.
    pub fn from_env() -> Result<Self> {
        let config = Self {
            server: ServerConfig::from_env()?,
            lease: LeaseConfig::from_env()?,
            observability: ObservabilityConfig::from_env()?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Validate the entire configuration
    pub fn validate(&self) -> Result<()> {
        Validate::validate(self).map_err(|e| Error::config(Error::from(e).to_string()))?;

        self.validate_custom()
    }

    fn validate_custom(&self) -> Result<()> {
        if self.lease.default_ttl_seconds > self.lease.max_ttl_seconds {
            return Err(Error::config(format!(
                "Default lease TTL ({}s) cannot exceed maximum lease TTL ({}s)",
                self.lease.default_ttl_seconds, self.lease.max_ttl_seconds
            )));
        }

        if self.observability.enable_metrics
            && self.observability.metrics_port != 0
            && self.observability.metrics_port == self.server.port
        {
            return Err(Error::config("Server and metrics ports cannot be the same"));
        }

        Ok(())
    }
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ServerConfig {
    #[validate(length(min = 1, message = "Host cannot be empty"))]
    pub host: String,

    #[validate(range(min = 1, message = "Port must be greater than 0"))]
    pub port: u16,

    /// Upper bound for one request, provider retries included
    #[validate(range(min = 1, max = 3600, message = "Request timeout must be between 1 and 3600 seconds"))]
    pub request_timeout_seconds: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { host: "127.0.0.1".to_string(), port: 8200, request_timeout_seconds: 300 }
    }
}

impl ServerConfig {
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        Ok(Self {
            host: env_var("HOST").unwrap_or(defaults.host),
            port: env_parse("PORT", defaults.port)?,
            request_timeout_seconds: env_parse(
                "REQUEST_TIMEOUT",
                defaults.request_timeout_seconds,
            )?,
        })
    }

    /// Get the server bind address
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Get request timeout as Duration
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }
}

/// System-wide lease bounds applied to every role
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct LeaseConfig {
    #[validate(range(min = 1, message = "Default lease TTL must be at least 1 second"))]
    pub default_ttl_seconds: u64,

    #[validate(range(min = 1, message = "Maximum lease TTL must be at least 1 second"))]
    pub max_ttl_seconds: u64,
}

impl Default for LeaseConfig {
    fn default() -> Self {
        Self { default_ttl_seconds: 3600, max_ttl_seconds: 86_400 }
    }
}

impl LeaseConfig {
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        Ok(Self {
            default_ttl_seconds: env_parse("DEFAULT_LEASE_TTL", defaults.default_ttl_seconds)?,
            max_ttl_seconds: env_parse("MAX_LEASE_TTL", defaults.max_ttl_seconds)?,
        })
    }

    pub fn to_settings(&self) -> Result<LeaseSettings> {
        LeaseSettings::new(
            Duration::from_secs(self.default_ttl_seconds),
            Duration::from_secs(self.max_ttl_seconds),
        )
    }
}

/// Observability configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ObservabilityConfig {
    /// Log level or `EnvFilter` directive
    #[validate(length(min = 1, message = "Log level cannot be empty"))]
    pub log_level: String,

    /// Enable JSON structured logging
    pub json_logging: bool,

    /// Enable metrics collection
    pub enable_metrics: bool,

    /// Metrics server port (0 = disabled)
    pub metrics_port: u16,

    #[validate(length(min = 1, message = "Service name cannot be empty"))]
    pub service_name: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logging: false,
            enable_metrics: false,
            metrics_port: 9090,
            service_name: crate::APP_NAME.to_string(),
        }
    }
}

impl ObservabilityConfig {
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        Ok(Self {
            log_level: env_var("LOG_LEVEL").unwrap_or(defaults.log_level),
            json_logging: env_bool("JSON_LOGGING", defaults.json_logging),
            enable_metrics: env_bool("ENABLE_METRICS", defaults.enable_metrics),
            metrics_port: env_parse("METRICS_PORT", defaults.metrics_port)?,
            service_name: env_var("SERVICE_NAME").unwrap_or(defaults.service_name),
        })
    }

    /// Get metrics bind address (None if disabled)
    pub fn metrics_bind_address(&self) -> Option<String> {
        if self.metrics_port == 0 {
            None
        } else {
            Some(format!("0.0.0.0:{}", self.metrics_port))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_validation() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.server.bind_address(), "127.0.0.1:8200");
        assert_eq!(config.lease.to_settings().unwrap(), LeaseSettings::default());
    }

    #[test]
    fn test_default_ttl_above_max_is_rejected() {
        let config = AppConfig {
            lease: LeaseConfig { default_ttl_seconds: 7200, max_ttl_seconds: 3600 },
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
    }

    #[test]
    fn test_validator_rules() {
        let config = AppConfig {
            server: ServerConfig { host: String::new(), ..Default::default() },
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = AppConfig {
            lease: LeaseConfig { default_ttl_seconds: 0, max_ttl_seconds: 3600 },
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_metrics_port_conflict() {
        let config = AppConfig {
            server: ServerConfig { port: 9090, ..Default::default() },
            observability: ObservabilityConfig { enable_metrics: true, ..Default::default() },
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_metrics_bind_address() {
        let config = ObservabilityConfig { metrics_port: 0, ..Default::default() };
        assert!(config.metrics_bind_address().is_none());

        let config = ObservabilityConfig { metrics_port: 9100, ..Default::default() };
        assert_eq!(config.metrics_bind_address().as_deref(), Some("0.0.0.0:9100"));
    }
}
