use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::info;

use crate::{backend::Backend, config::ServerConfig, errors::Error};

use super::routes::{build_router, ApiState, MOUNT_PATH};

/// Serve `backend` until `shutdown` resolves.
pub async fn start_api_server<F>(
    config: &ServerConfig,
    backend: Arc<Backend>,
    shutdown: F,
) -> crate::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr: SocketAddr = config
        .bind_address()
        .parse()
        .map_err(|e| Error::config(format!("Invalid API address: {}", e)))?;

    let router = build_router(ApiState::new(backend, config.request_timeout()));

    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| Error::config(format!("Failed to bind API server: {}", e)))?;

    info!(address = %addr, mount = MOUNT_PATH, "Starting HTTP API server");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| Error::internal(format!("API server error: {}", e)))?;

    info!("API server shutdown completed");
    Ok(())
}
