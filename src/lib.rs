//! # Packet Secrets
//!
//! A dynamic secrets backend for Packet (Equinix Metal). It stores a
//! long-lived root API token, mints short-lived scoped API keys for operator
//! defined roles, and deletes them again when the host controller revokes
//! their lease.
//!
//! ## Architecture
//!
//! ```text
//! host controller / HTTP shim → Backend → ConfigStore / RoleStore
//!                                  ↓
//!                 CredentialIssuer / SecretLifecycleHandler
//!                                  ↓
//!                     ClientCache → PacketClient → Packet API
//! ```
//!
//! The provider client is built lazily from the stored configuration, shared
//! by every request, and dropped whenever the configuration changes.
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use packet_secrets::backend::{Backend, LeaseSettings, Operation, Request, RequestContext};
//! use packet_secrets::storage::InMemoryStorage;
//!
//! # async fn run() -> packet_secrets::Result<()> {
//! let backend = Backend::with_packet_client(Arc::new(InMemoryStorage::new()), LeaseSettings::default());
//! let ctx = RequestContext::new();
//!
//! backend
//!     .handle_request(&ctx, Request::new(Operation::Update, "config")
//!         .with_data(serde_json::json!({"api_token": "root-token"})))
//!     .await?;
//! backend.handle_request(&ctx, Request::new(Operation::Update, "roles/readonly")).await?;
//! let creds = backend.handle_request(&ctx, Request::new(Operation::Read, "creds/readonly")).await?;
//! # let _ = creds;
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod backend;
pub mod cli;
pub mod config;
pub mod errors;
pub mod observability;
pub mod provider;
pub mod secrets;
pub mod storage;

pub use backend::Backend;
pub use errors::{Error, ErrorKind, Result};

/// Application version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name from Cargo.toml
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
