use std::sync::Arc;
use std::time::Duration;

use axum::{
    routing::{get, put},
    Router,
};
use tower_http::trace::TraceLayer;

use crate::backend::{Backend, RequestContext};

use super::handlers::{
    delete_config_handler, delete_role_handler, health_handler, help_handler,
    invalidate_handler, issue_creds_handler, list_roles_handler, read_config_handler,
    read_creds_handler, read_role_handler, renew_lease_handler, revoke_lease_handler,
    write_config_handler, write_role_handler,
};

/// Mount point of the backend
pub const MOUNT_PATH: &str = "/v1/packet";

#[derive(Clone)]
pub struct ApiState {
    pub backend: Arc<Backend>,
    pub request_timeout: Duration,
}

impl ApiState {
    pub fn new(backend: Arc<Backend>, request_timeout: Duration) -> Self {
        Self { backend, request_timeout }
    }

    /// Context for one HTTP request, bounded by the configured timeout.
    pub fn request_context(&self) -> RequestContext {
        RequestContext::new().with_timeout(self.request_timeout)
    }
}

pub fn build_router(state: ApiState) -> Router {
    let backend_routes = Router::new()
        .route("/", get(help_handler))
        .route(
            "/config",
            get(read_config_handler)
                .post(write_config_handler)
                .put(write_config_handler)
                .delete(delete_config_handler),
        )
        .route("/roles", get(list_roles_handler))
        .route(
            "/roles/{name}",
            get(read_role_handler)
                .post(write_role_handler)
                .put(write_role_handler)
                .delete(delete_role_handler),
        )
        .route("/creds/{name}", get(read_creds_handler).post(issue_creds_handler))
        .route("/leases/renew", put(renew_lease_handler))
        .route("/leases/revoke", put(revoke_lease_handler))
        .route("/invalidate", axum::routing::post(invalidate_handler));

    Router::new()
        .route("/health", get(health_handler))
        .nest(MOUNT_PATH, backend_routes)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
