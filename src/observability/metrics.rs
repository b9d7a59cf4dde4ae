//! # Metrics Collection
//!
//! Prometheus counters for credential lifecycle events. The `metrics` macros
//! are no-ops until [`init_metrics`] installs the exporter, so recording is
//! always safe.

use crate::config::ObservabilityConfig;
use crate::errors::{Error, Result};
use ::tracing::{info, warn};
use metrics::{counter, describe_counter};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;

pub const CLIENT_BUILDS_TOTAL: &str = "packet_secrets_client_builds_total";
pub const INVALIDATIONS_TOTAL: &str = "packet_secrets_invalidations_total";
pub const CREDENTIALS_ISSUED_TOTAL: &str = "packet_secrets_credentials_issued_total";
pub const CREDENTIALS_REVOKED_TOTAL: &str = "packet_secrets_credentials_revoked_total";
pub const RENEWALS_TOTAL: &str = "packet_secrets_renewals_total";

/// Record a provider client build
pub fn record_client_build() {
    counter!(CLIENT_BUILDS_TOTAL).increment(1);
}

/// Record a client cache invalidation
pub fn record_invalidation() {
    counter!(INVALIDATIONS_TOTAL).increment(1);
}

/// Record a successful issuance for `role`
pub fn record_credential_issued(role: &str) {
    let labels = [("role", role.to_string())];
    counter!(CREDENTIALS_ISSUED_TOTAL, &labels).increment(1);
}

/// Record a revocation attempt; `outcome` is `revoked`, `already_gone` or an error kind
pub fn record_credential_revoked(outcome: &str) {
    let labels = [("outcome", outcome.to_string())];
    counter!(CREDENTIALS_REVOKED_TOTAL, &labels).increment(1);
}

/// Record a renewal attempt; `outcome` is `renewed` or an error kind
pub fn record_renewal(outcome: &str) {
    let labels = [("outcome", outcome.to_string())];
    counter!(RENEWALS_TOTAL, &labels).increment(1);
}

fn register_metrics() {
    describe_counter!(CLIENT_BUILDS_TOTAL, "Provider clients built from stored configuration");
    describe_counter!(INVALIDATIONS_TOTAL, "Provider client cache invalidations");
    describe_counter!(CREDENTIALS_ISSUED_TOTAL, "API keys minted, by role");
    describe_counter!(CREDENTIALS_REVOKED_TOTAL, "API key revocations, by outcome");
    describe_counter!(RENEWALS_TOTAL, "Lease renewals, by outcome");
}

/// Install the Prometheus exporter if metrics are enabled.
pub async fn init_metrics(config: &ObservabilityConfig) -> Result<()> {
    if !config.enable_metrics {
        return Ok(());
    }

    let metrics_addr = match config.metrics_bind_address() {
        Some(addr) => addr,
        None => {
            warn!("Metrics disabled: no bind address configured");
            return Ok(());
        }
    };

    let socket_addr: SocketAddr = metrics_addr.parse().map_err(|e| {
        Error::config(format!("Invalid metrics bind address '{}': {}", metrics_addr, e))
    })?;

    PrometheusBuilder::new()
        .with_http_listener(socket_addr)
        .add_global_label("service", &config.service_name)
        .install()
        .map_err(|e| Error::config(format!("Failed to initialize metrics exporter: {}", e)))?;

    register_metrics();

    info!(
        metrics_addr = %metrics_addr,
        service_name = %config.service_name,
        "Metrics collection initialized"
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_without_exporter_is_noop() {
        record_client_build();
        record_invalidation();
        record_credential_issued("readonly");
        record_credential_revoked("already_gone");
        record_renewal("not_renewable");
    }

    #[tokio::test]
    async fn test_init_metrics_disabled() {
        let config = ObservabilityConfig { enable_metrics: false, ..Default::default() };
        assert!(init_metrics(&config).await.is_ok());
    }

    #[tokio::test]
    async fn test_init_metrics_no_port() {
        let config = ObservabilityConfig { enable_metrics: true, metrics_port: 0, ..Default::default() };
        assert!(init_metrics(&config).await.is_ok());
    }
}
