use axum::{http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;

use crate::errors::{Error, ErrorKind};

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    error: &'static str,
    message: String,
}

impl ApiError {
    pub fn bad_request<S: Into<String>>(message: S) -> Self {
        Self { status: StatusCode::BAD_REQUEST, error: "bad_request", message: message.into() }
    }

    pub fn status_code(&self) -> StatusCode {
        self.status
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        (self.status, Json(ErrorBody { error: self.error, message: self.message })).into_response()
    }
}

fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::NotConfigured
        | ErrorKind::InvalidRequest
        | ErrorKind::InvalidLease
        | ErrorKind::UnsupportedPath => StatusCode::BAD_REQUEST,
        ErrorKind::RoleNotFound | ErrorKind::CredentialNotFound => StatusCode::NOT_FOUND,
        ErrorKind::NotRenewable => StatusCode::CONFLICT,
        ErrorKind::ProviderAuth | ErrorKind::ProviderRejected => StatusCode::BAD_GATEWAY,
        ErrorKind::ProviderUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        ErrorKind::DeadlineExceeded => StatusCode::GATEWAY_TIMEOUT,
        ErrorKind::Cancelled
        | ErrorKind::Storage
        | ErrorKind::Serialization
        | ErrorKind::Config
        | ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        let kind = err.kind();
        let status = status_for(kind);
        if status.is_server_error() {
            tracing::error!(error = %err, kind = %kind, "Request failed");
        }
        Self { status, error: kind.as_str(), message: err.to_string() }
    }
}
