//! # Configuration Management
//!
//! Environment-driven configuration for the standalone host shim. Values are
//! read from `PACKET_SECRETS_*` variables (a `.env` file is loaded first by the
//! binary) and validated before anything starts.

pub mod settings;

pub use settings::{AppConfig, LeaseConfig, ObservabilityConfig, ServerConfig, ENV_PREFIX};
