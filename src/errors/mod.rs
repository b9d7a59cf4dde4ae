//! # Error Handling
//!
//! Error taxonomy for the Packet secrets backend. Every failure that leaves the
//! backend carries a classified [`ErrorKind`] so the host controller can decide
//! whether to retry, surface to the operator, or give up.

use std::fmt;

/// Custom result type for backend operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the Packet secrets backend
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// No configuration has been written yet
    #[error("Backend is not configured: write the config endpoint first")]
    NotConfigured,

    /// The named role does not exist
    #[error("Role not found: {name}")]
    RoleNotFound { name: String },

    /// Provider unreachable, throttling, or 5xx after the retry policy gave up
    #[error("Provider unavailable: {message}")]
    ProviderUnavailable { message: String },

    /// Root token was rejected by the provider
    #[error("Provider authentication failed: {message}")]
    ProviderAuth { message: String },

    /// Provider refused the request for a non-transient reason
    #[error("Provider rejected request (status: {status}): {message}")]
    ProviderRejected { status: u16, message: String },

    /// The credential does not exist on the provider
    #[error("Credential not found: {id}")]
    CredentialNotFound { id: String },

    /// The lease cannot be extended
    #[error("Lease is not renewable: {reason}")]
    NotRenewable { reason: String },

    /// Lease metadata handed back by the host is unusable
    #[error("Invalid lease metadata: {reason}")]
    InvalidLease { reason: String },

    /// Request payload failed validation
    #[error("Invalid request: {message}")]
    InvalidRequest { message: String },

    /// No handler for the path/operation pair
    #[error("Unsupported path: {path}")]
    UnsupportedPath { path: String },

    /// Host storage failed
    #[error("Storage error: {message}")]
    Storage { message: String },

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The request context was cancelled
    #[error("Request cancelled")]
    Cancelled,

    /// The request context deadline elapsed
    #[error("Request deadline exceeded")]
    DeadlineExceeded,

    /// Host shim configuration errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Internal errors
    #[error("Internal error: {message}")]
    Internal { message: String },
}

/// Stable classification of an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NotConfigured,
    RoleNotFound,
    ProviderUnavailable,
    ProviderAuth,
    ProviderRejected,
    CredentialNotFound,
    NotRenewable,
    InvalidLease,
    InvalidRequest,
    UnsupportedPath,
    Storage,
    Serialization,
    Cancelled,
    DeadlineExceeded,
    Config,
    Internal,
}

impl ErrorKind {
    /// Snake-case label used in logs, metrics and HTTP error bodies.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotConfigured => "not_configured",
            Self::RoleNotFound => "role_not_found",
            Self::ProviderUnavailable => "provider_unavailable",
            Self::ProviderAuth => "provider_auth",
            Self::ProviderRejected => "provider_rejected",
            Self::CredentialNotFound => "credential_not_found",
            Self::NotRenewable => "not_renewable",
            Self::InvalidLease => "invalid_lease",
            Self::InvalidRequest => "invalid_request",
            Self::UnsupportedPath => "unsupported_path",
            Self::Storage => "storage",
            Self::Serialization => "serialization",
            Self::Cancelled => "cancelled",
            Self::DeadlineExceeded => "deadline_exceeded",
            Self::Config => "config",
            Self::Internal => "internal",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl Error {
    /// Create a role not found error
    pub fn role_not_found<S: Into<String>>(name: S) -> Self {
        Self::RoleNotFound { name: name.into() }
    }

    /// Create a provider unavailable error
    pub fn provider_unavailable<S: Into<String>>(message: S) -> Self {
        Self::ProviderUnavailable { message: message.into() }
    }

    /// Create a provider authentication error
    pub fn provider_auth<S: Into<String>>(message: S) -> Self {
        Self::ProviderAuth { message: message.into() }
    }

    /// Create a provider rejection error
    pub fn provider_rejected<S: Into<String>>(status: u16, message: S) -> Self {
        Self::ProviderRejected { status, message: message.into() }
    }

    /// Create a credential not found error
    pub fn credential_not_found<S: Into<String>>(id: S) -> Self {
        Self::CredentialNotFound { id: id.into() }
    }

    /// Create a not renewable error
    pub fn not_renewable<S: Into<String>>(reason: S) -> Self {
        Self::NotRenewable { reason: reason.into() }
    }

    /// Create an invalid lease error
    pub fn invalid_lease<S: Into<String>>(reason: S) -> Self {
        Self::InvalidLease { reason: reason.into() }
    }

    /// Create an invalid request error
    pub fn invalid_request<S: Into<String>>(message: S) -> Self {
        Self::InvalidRequest { message: message.into() }
    }

    /// Create an unsupported path error
    pub fn unsupported_path<S: Into<String>>(path: S) -> Self {
        Self::UnsupportedPath { path: path.into() }
    }

    /// Create a storage error
    pub fn storage<S: Into<String>>(message: S) -> Self {
        Self::Storage { message: message.into() }
    }

    /// Create a configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config { message: message.into() }
    }

    /// Create an internal error
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal { message: message.into() }
    }

    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotConfigured => ErrorKind::NotConfigured,
            Self::RoleNotFound { .. } => ErrorKind::RoleNotFound,
            Self::ProviderUnavailable { .. } => ErrorKind::ProviderUnavailable,
            Self::ProviderAuth { .. } => ErrorKind::ProviderAuth,
            Self::ProviderRejected { .. } => ErrorKind::ProviderRejected,
            Self::CredentialNotFound { .. } => ErrorKind::CredentialNotFound,
            Self::NotRenewable { .. } => ErrorKind::NotRenewable,
            Self::InvalidLease { .. } => ErrorKind::InvalidLease,
            Self::InvalidRequest { .. } => ErrorKind::InvalidRequest,
            Self::UnsupportedPath { .. } => ErrorKind::UnsupportedPath,
            Self::Storage { .. } => ErrorKind::Storage,
            Self::Serialization(_) => ErrorKind::Serialization,
            Self::Cancelled => ErrorKind::Cancelled,
            Self::DeadlineExceeded => ErrorKind::DeadlineExceeded,
            Self::Config { .. } => ErrorKind::Config,
            Self::Internal { .. } => ErrorKind::Internal,
        }
    }

    /// Whether the host controller may retry the same call later.
    ///
    /// Only conditions that can clear up without operator action qualify.
    /// `NotRenewable` is deliberately excluded so renewal is not retried.
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            Self::ProviderUnavailable { .. }
                | Self::Storage { .. }
                | Self::Cancelled
                | Self::DeadlineExceeded
        )
    }
}

impl From<validator::ValidationErrors> for Error {
    fn from(errors: validator::ValidationErrors) -> Self {
        let message = errors
            .field_errors()
            .iter()
            .map(|(field, field_errors)| {
                let error_messages: Vec<String> = field_errors
                    .iter()
                    .map(|e| {
                        e.message.as_ref().map_or("Invalid value".to_string(), |m| m.to_string())
                    })
                    .collect();
                format!("{}: {}", field, error_messages.join(", "))
            })
            .collect::<Vec<_>>()
            .join("; ");

        Self::invalid_request(format!("Validation failed: {}", message))
    }
}
