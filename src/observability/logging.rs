//! # Structured Logging
//!
//! Subscriber setup and span macros built on the tracing ecosystem.

use crate::config::{AppConfig, ObservabilityConfig};
use crate::errors::{Error, Result};
use tracing_subscriber::{fmt, EnvFilter};

/// Create a tracing span for one backend operation.
///
/// ```rust,ignore
/// let span = backend_span!("issue", role = %role_name);
/// ```
#[macro_export]
macro_rules! backend_span {
    ($operation:expr) => {
        tracing::info_span!(
            "backend_operation",
            operation = %$operation,
            operation_id = %uuid::Uuid::new_v4()
        )
    };
    ($operation:expr, $($field:tt)*) => {
        tracing::info_span!(
            "backend_operation",
            operation = %$operation,
            operation_id = %uuid::Uuid::new_v4(),
            $($field)*
        )
    };
}

/// Install the global fmt subscriber.
///
/// `RUST_LOG` wins over the configured level when set.
pub fn init_logging(config: &ObservabilityConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .map_err(|e| Error::config(format!("Invalid log level '{}': {}", config.log_level, e)))?;

    let builder = fmt().with_env_filter(filter).with_target(true);
    let installed = if config.json_logging {
        builder.json().with_current_span(true).try_init()
    } else {
        builder.try_init()
    };

    installed.map_err(|e| Error::config(format!("Failed to install log subscriber: {}", e)))
}

/// Log configuration at startup
pub fn log_config_info(config: &AppConfig) {
    tracing::info!(
        server_address = %config.server.bind_address(),
        default_lease_ttl_secs = config.lease.default_ttl_seconds,
        max_lease_ttl_secs = config.lease.max_ttl_seconds,
        metrics_enabled = %config.observability.enable_metrics,
        json_logging = %config.observability.json_logging,
        "Packet secrets backend configuration"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_macros_compile() {
        let _span = backend_span!("issue");
        let _span = backend_span!("issue", role = "readonly");
    }

    #[test]
    fn test_log_config_info() {
        log_config_info(&AppConfig::default());
    }
}
