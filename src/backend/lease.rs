//! Lease metadata handed to the host controller and TTL resolution.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use std::time::Duration;

use super::role_store::Role;
use crate::errors::{Error, Result};
use crate::provider::{validate_identifier, ApiKeyScope};

/// Tag stored in every lease this backend issues
pub const SECRET_TYPE: &str = "packet";

/// Host-wide lease bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LeaseSettings {
    pub default_ttl: Duration,
    pub max_ttl: Duration,
}

impl Default for LeaseSettings {
    fn default() -> Self {
        Self { default_ttl: Duration::from_secs(3600), max_ttl: Duration::from_secs(86_400) }
    }
}

impl LeaseSettings {
    pub fn new(default_ttl: Duration, max_ttl: Duration) -> Result<Self> {
        if default_ttl.is_zero() || max_ttl.is_zero() {
            return Err(Error::config("Lease TTLs must be greater than zero"));
        }
        if default_ttl > max_ttl {
            return Err(Error::config(format!(
                "Default lease TTL ({}s) exceeds maximum ({}s)",
                default_ttl.as_secs(),
                max_ttl.as_secs()
            )));
        }
        Ok(Self { default_ttl, max_ttl })
    }

    /// `(default, max)` TTL for a role, falling back to the system values and
    /// never exceeding the system maximum.
    pub fn role_bounds(&self, role: &Role) -> (Duration, Duration) {
        let default = if role.ttl.is_zero() { self.default_ttl } else { role.ttl };
        let max = if role.max_ttl.is_zero() { self.max_ttl } else { role.max_ttl.min(self.max_ttl) };
        (default, max)
    }

    /// Effective issuance TTL: the request (or role default) capped at the role maximum.
    pub fn resolve_ttl(&self, role: &Role, requested: Option<Duration>) -> Duration {
        let (default, max) = self.role_bounds(role);
        let wanted = requested.filter(|ttl| !ttl.is_zero()).unwrap_or(default);
        wanted.min(max)
    }
}

/// Opaque data the backend needs to find the credential again.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InternalData {
    pub secret_type: String,
    pub api_key_id: String,
    pub role: String,
    pub scope: ApiKeyScope,
}

impl InternalData {
    pub fn new(api_key_id: impl Into<String>, role: impl Into<String>, scope: ApiKeyScope) -> Self {
        Self {
            secret_type: SECRET_TYPE.to_string(),
            api_key_id: api_key_id.into(),
            role: role.into(),
            scope,
        }
    }

    pub fn to_map(&self) -> Result<Map<String, Value>> {
        match serde_json::to_value(self)? {
            Value::Object(map) => Ok(map),
            _ => Err(Error::internal("Lease internal data did not serialize to an object")),
        }
    }

    /// Decode and check the internal data of a lease returned by the host.
    pub fn from_map(internal: &Map<String, Value>) -> Result<Self> {
        let data: Self = serde_json::from_value(Value::Object(internal.clone()))
            .map_err(|e| Error::invalid_lease(format!("malformed internal data: {}", e)))?;

        if data.secret_type != SECRET_TYPE {
            return Err(Error::invalid_lease(format!(
                "unexpected secret type '{}'",
                data.secret_type
            )));
        }
        validate_identifier("api_key_id", &data.api_key_id).map_err(Error::invalid_lease)?;
        data.scope.validate().map_err(Error::invalid_lease)?;
        Ok(data)
    }
}

/// Lease contract returned with every issued credential.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeaseMetadata {
    #[serde(with = "duration_secs")]
    pub ttl: Duration,
    #[serde(with = "duration_secs")]
    pub max_ttl: Duration,
    pub renewable: bool,
    pub issue_time: DateTime<Utc>,
    #[serde(default)]
    pub internal: Map<String, Value>,
}

impl LeaseMetadata {
    /// Time left before the lease hits its hard maximum, zero once passed.
    pub fn remaining(&self, now: DateTime<Utc>) -> Duration {
        let max = chrono::Duration::from_std(self.max_ttl).unwrap_or(chrono::Duration::MAX);
        let expires = self.issue_time.checked_add_signed(max).unwrap_or(DateTime::<Utc>::MAX_UTC);
        (expires - now).to_std().unwrap_or(Duration::ZERO)
    }
}

/// Serialize a `Duration` as whole seconds.
pub mod duration_secs {
    use super::*;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(deserializer)?))
    }
}
