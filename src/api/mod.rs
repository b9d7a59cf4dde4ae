//! # HTTP Host Shim
//!
//! Exposes the backend over Vault-style paths under `/v1/packet` so it can be
//! driven without an embedding host controller.

pub mod error;
pub mod handlers;
pub mod routes;
pub mod server;

pub use error::ApiError;
pub use routes::{build_router, ApiState, MOUNT_PATH};
pub use server::start_api_server;
