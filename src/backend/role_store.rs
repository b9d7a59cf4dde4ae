//! Named role definitions under `role/<name>`.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use super::lease::duration_secs;
use crate::errors::{Error, Result};
use crate::provider::ApiKeyScope;
use crate::storage::{Storage, StorageEntry};

/// Storage prefix of role records
pub const ROLE_PREFIX: &str = "role/";

const MAX_ROLE_NAME_LEN: usize = 128;

/// Template constraining the scope and lifetime of issued keys.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    pub name: String,
    pub scope: ApiKeyScope,
    #[serde(default = "default_read_only")]
    pub read_only: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Zero means the system default
    #[serde(with = "duration_secs", default)]
    pub ttl: Duration,
    /// Zero means the system maximum
    #[serde(with = "duration_secs", default)]
    pub max_ttl: Duration,
}

fn default_read_only() -> bool {
    true
}

impl Role {
    /// Build a role from a write request for `name`.
    pub fn from_request(name: &str, data: &Map<String, Value>) -> Result<Self> {
        validate_role_name(name)?;

        let scope = match data.get("type").and_then(Value::as_str).unwrap_or("user") {
            "user" => ApiKeyScope::User,
            "project" => match data.get("project_id").and_then(Value::as_str).map(str::trim) {
                Some(project_id) if !project_id.is_empty() => {
                    ApiKeyScope::Project { project_id: project_id.to_string() }
                }
                _ => return Err(Error::invalid_request("project_id is required for project roles")),
            },
            other => {
                return Err(Error::invalid_request(format!(
                    "type must be 'user' or 'project', got '{}'",
                    other
                )))
            }
        };

        let read_only = match data.get("read_only") {
            None | Some(Value::Null) => true,
            Some(Value::Bool(b)) => *b,
            Some(_) => return Err(Error::invalid_request("read_only must be a boolean")),
        };

        let description = match data.get("description") {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) if s.is_empty() => None,
            Some(Value::String(s)) => Some(s.clone()),
            Some(_) => return Err(Error::invalid_request("description must be a string")),
        };

        let role = Self {
            name: name.to_string(),
            scope,
            read_only,
            description,
            ttl: duration_field(data, "ttl")?,
            max_ttl: duration_field(data, "max_ttl")?,
        };
        role.validate()?;
        Ok(role)
    }

    pub fn validate(&self) -> Result<()> {
        validate_role_name(&self.name)?;
        self.scope.validate().map_err(Error::invalid_request)?;
        if !self.ttl.is_zero() && !self.max_ttl.is_zero() && self.max_ttl < self.ttl {
            return Err(Error::invalid_request(format!(
                "max_ttl ({}s) must not be less than ttl ({}s)",
                self.max_ttl.as_secs(),
                self.ttl.as_secs()
            )));
        }
        Ok(())
    }

    pub fn to_response(&self) -> Value {
        let mut body = json!({
            "name": self.name,
            "type": self.scope.as_str(),
            "read_only": self.read_only,
            "description": self.description,
            "ttl": self.ttl.as_secs(),
            "max_ttl": self.max_ttl.as_secs(),
        });
        if let ApiKeyScope::Project { project_id } = &self.scope {
            body["project_id"] = Value::String(project_id.clone());
        }
        body
    }

    fn storage_key(name: &str) -> String {
        format!("{}{}", ROLE_PREFIX, name)
    }
}

pub fn validate_role_name(name: &str) -> Result<()> {
    if name.is_empty() || name.len() > MAX_ROLE_NAME_LEN {
        return Err(Error::invalid_request(format!(
            "role name must be 1 to {} characters",
            MAX_ROLE_NAME_LEN
        )));
    }
    if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-') {
        return Err(Error::invalid_request(format!(
            "role name '{}' may only contain letters, digits, '_' and '-'",
            name
        )));
    }
    Ok(())
}

fn duration_field(data: &Map<String, Value>, field: &str) -> Result<Duration> {
    match data.get(field) {
        None | Some(Value::Null) => Ok(Duration::ZERO),
        Some(value) => parse_duration(value)
            .map_err(|e| Error::invalid_request(format!("{}: {}", field, e))),
    }
}

/// Accept whole seconds (number or numeric string) or unit strings such as
/// `90s`, `15m`, `1h` and `1h30m`.
pub fn parse_duration(value: &Value) -> std::result::Result<Duration, String> {
    match value {
        Value::Number(n) => n
            .as_u64()
            .map(Duration::from_secs)
            .ok_or_else(|| format!("'{}' is not a non-negative whole number of seconds", n)),
        Value::String(s) => parse_duration_str(s.trim()),
        other => Err(format!("unsupported duration value {}", other)),
    }
}

fn parse_duration_str(input: &str) -> std::result::Result<Duration, String> {
    if input.is_empty() {
        return Ok(Duration::ZERO);
    }
    if let Ok(secs) = input.parse::<u64>() {
        return Ok(Duration::from_secs(secs));
    }

    let mut total: u64 = 0;
    let mut digits = String::new();
    for c in input.chars() {
        if c.is_ascii_digit() {
            digits.push(c);
            continue;
        }
        let multiplier = match c {
            's' => 1,
            'm' => 60,
            'h' => 3600,
            'd' => 86_400,
            _ => return Err(format!("invalid duration '{}'", input)),
        };
        let amount: u64 = digits.parse().map_err(|_| format!("invalid duration '{}'", input))?;
        total = amount
            .checked_mul(multiplier)
            .and_then(|secs| total.checked_add(secs))
            .ok_or_else(|| format!("duration '{}' is too large", input))?;
        digits.clear();
    }

    if !digits.is_empty() {
        return Err(format!("invalid duration '{}': missing unit", input));
    }
    Ok(Duration::from_secs(total))
}

#[derive(Debug, Clone)]
pub struct RoleStore {
    storage: Arc<dyn Storage>,
}

impl RoleStore {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    pub async fn read(&self, name: &str) -> Result<Option<Role>> {
        match self.storage.get(&Role::storage_key(name)).await? {
            Some(entry) => Ok(Some(entry.decode_json()?)),
            None => Ok(None),
        }
    }

    /// Fetch a role that must exist.
    pub async fn get(&self, name: &str) -> Result<Role> {
        self.read(name).await?.ok_or_else(|| Error::role_not_found(name))
    }

    /// Create or fully replace a role.
    pub async fn write(&self, role: &Role) -> Result<()> {
        role.validate()?;
        self.storage.put(StorageEntry::from_json(Role::storage_key(&role.name), role)?).await?;
        info!(role = %role.name, scope = %role.scope, ttl_secs = role.ttl.as_secs(), "Role written");
        Ok(())
    }

    pub async fn delete(&self, name: &str) -> Result<()> {
        self.storage.delete(&Role::storage_key(name)).await?;
        info!(role = %name, "Role deleted");
        Ok(())
    }

    /// Sorted role names.
    pub async fn list(&self) -> Result<Vec<String>> {
        let mut names = self.storage.list(ROLE_PREFIX).await?;
        names.sort();
        Ok(names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::InMemoryStorage;

    fn as_map(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration(&json!(90)).unwrap(), Duration::from_secs(90));
        assert_eq!(parse_duration(&json!("90")).unwrap(), Duration::from_secs(90));
        assert_eq!(parse_duration(&json!("90s")).unwrap(), Duration::from_secs(90));
        assert_eq!(parse_duration(&json!("15m")).unwrap(), Duration::from_secs(900));
        assert_eq!(parse_duration(&json!("1h30m")).unwrap(), Duration::from_secs(5400));
        assert!(parse_duration(&json!("10x")).is_err());
        assert!(parse_duration(&json!("1h30")).is_err());
        assert!(parse_duration(&json!(-5)).is_err());
        assert!(parse_duration(&json!(true)).is_err());
    }

    #[test]
    fn test_role_name_validation() {
        assert!(validate_role_name("read-only_1").is_ok());
        assert!(validate_role_name("").is_err());
        assert!(validate_role_name("has space").is_err());
        assert!(validate_role_name("a/b").is_err());
        assert!(validate_role_name(&"x".repeat(129)).is_err());
    }

    #[test]
    fn test_from_request_defaults() {
        let role = Role::from_request("readonly", &Map::new()).unwrap();
        assert_eq!(role.scope, ApiKeyScope::User);
        assert!(role.read_only);
        assert_eq!(role.ttl, Duration::ZERO);
        assert_eq!(role.max_ttl, Duration::ZERO);
    }

    #[test]
    fn test_from_request_project_scope() {
        let role = Role::from_request(
            "deployer",
            &as_map(json!({"type": "project", "project_id": "p-1", "read_only": false, "ttl": "15m", "max_ttl": 3600})),
        )
        .unwrap();

        assert_eq!(role.scope, ApiKeyScope::Project { project_id: "p-1".to_string() });
        assert!(!role.read_only);
        assert_eq!(role.ttl, Duration::from_secs(900));

        let response = role.to_response();
        assert_eq!(response["type"], "project");
        assert_eq!(response["project_id"], "p-1");
        assert_eq!(response["max_ttl"], 3600);
    }

    #[test]
    fn test_from_request_rejects_invalid() {
        let err = Role::from_request("r", &as_map(json!({"type": "project"}))).unwrap_err();
        assert!(matches!(err, Error::InvalidRequest { .. }));

        let err = Role::from_request("r", &as_map(json!({"type": "org"}))).unwrap_err();
        assert!(matches!(err, Error::InvalidRequest { .. }));

        for project_id in ["../user", "p-1/../../user", "p 1", "p%2F1"] {
            let data = as_map(json!({"type": "project", "project_id": project_id}));
            let err = Role::from_request("r", &data).unwrap_err();
            assert!(matches!(err, Error::InvalidRequest { .. }), "accepted {:?}", project_id);
        }

        let err = Role::from_request("r", &as_map(json!({"ttl": "2h", "max_ttl": "1h"}))).unwrap_err();
        assert!(matches!(err, Error::InvalidRequest { .. }));
    }

    #[tokio::test]
    async fn test_store_crud() {
        let store = RoleStore::new(Arc::new(InMemoryStorage::new()));

        assert!(matches!(store.get("missing").await, Err(Error::RoleNotFound { .. })));

        let b = Role::from_request("b-role", &Map::new()).unwrap();
        let a = Role::from_request("a-role", &as_map(json!({"ttl": 60}))).unwrap();
        store.write(&b).await.unwrap();
        store.write(&a).await.unwrap();

        assert_eq!(store.list().await.unwrap(), vec!["a-role", "b-role"]);
        assert_eq!(store.get("a-role").await.unwrap(), a);

        store.delete("a-role").await.unwrap();
        store.delete("a-role").await.unwrap();
        assert!(store.read("a-role").await.unwrap().is_none());
        assert_eq!(store.list().await.unwrap(), vec!["b-role"]);
    }
}
