//! Packet (Equinix Metal) API client.
//!
//! Authenticates every request with the root token via `X-Auth-Token` and
//! sends it through the bounded [`RetryPolicy`].

use async_trait::async_trait;
use reqwest::header::{ACCEPT, USER_AGENT};
use reqwest::{Method, Response, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use url::Url;

use super::retry::RetryPolicy;
use super::{validate_identifier, ApiKey, ApiKeyScope, CreateApiKeyRequest, ProviderApi};
use crate::backend::context::RequestContext;
use crate::errors::{Error, Result};
use crate::secrets::SecretString;

/// Public Packet API endpoint
pub const DEFAULT_API_URL: &str = "https://api.packet.net";

const AUTH_HEADER: &str = "X-Auth-Token";

/// Per-attempt HTTP timeout; the retry policy bounds the total.
const ATTEMPT_TIMEOUT: Duration = Duration::from_secs(30);

/// Page size requested when listing keys
const LIST_PAGE_SIZE: u32 = 100;

/// Upper bound on pages walked by a single lookup
const MAX_LIST_PAGES: u32 = 50;

#[derive(Debug, Serialize)]
struct CreateApiKeyBody<'a> {
    description: &'a str,
    read_only: bool,
}

#[derive(Debug, Deserialize)]
struct ApiKeyList {
    #[serde(default)]
    api_keys: Vec<ApiKey>,
    #[serde(default)]
    meta: Option<PageMeta>,
}

#[derive(Debug, Deserialize)]
struct PageMeta {
    /// Link to the following page, null on the last one
    #[serde(default)]
    next: Option<Value>,
}

impl ApiKeyList {
    fn has_next_page(&self) -> bool {
        self.meta.as_ref().is_some_and(|meta| meta.next.is_some())
    }
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    errors: Vec<String>,
    #[serde(default)]
    error: Option<String>,
}

pub struct PacketClient {
    http: reqwest::Client,
    base_url: Url,
    token: SecretString,
    user_agent: String,
    retry_policy: RetryPolicy,
}

impl std::fmt::Debug for PacketClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PacketClient")
            .field("base_url", &self.base_url)
            .field("token", &self.token)
            .field("user_agent", &self.user_agent)
            .field("retry_policy", &self.retry_policy)
            .finish()
    }
}

impl PacketClient {
    /// Build a client for `api_url` (default [`DEFAULT_API_URL`]).
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if the URL is not http(s) or the HTTP client
    ///   cannot be constructed
    pub fn new(
        token: SecretString,
        api_url: Option<&str>,
        user_agent: Option<&str>,
    ) -> Result<Self> {
        let raw_url = api_url.unwrap_or(DEFAULT_API_URL);
        let parsed = Url::parse(raw_url)
            .map_err(|e| Error::config(format!("Invalid provider API URL '{}': {}", raw_url, e)))?;
        if parsed.scheme() != "http" && parsed.scheme() != "https" {
            return Err(Error::config(format!(
                "Provider API URL must be http or https, got '{}'",
                parsed.scheme()
            )));
        }

        let http = reqwest::Client::builder()
            .timeout(ATTEMPT_TIMEOUT)
            .build()
            .map_err(|e| Error::config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base_url: parsed,
            token,
            user_agent: user_agent
                .map(str::to_string)
                .unwrap_or_else(|| format!("{}/{}", crate::APP_NAME, crate::VERSION)),
            retry_policy: RetryPolicy::default(),
        })
    }

    /// Override the retry policy.
    pub fn with_retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry_policy
    }

    /// Resolve `segments` under the base URL. Each segment must be a plain
    /// identifier, so ids can never reach another endpoint.
    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        for segment in segments {
            validate_identifier("path segment", segment).map_err(Error::invalid_request)?;
        }

        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| Error::config(format!("Provider API URL '{}' cannot be a base", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn request(&self, method: Method, url: &Url) -> reqwest::RequestBuilder {
        self.http
            .request(method, url.clone())
            .header(AUTH_HEADER, self.token.expose_secret())
            .header(ACCEPT, "application/json")
            .header(USER_AGENT, &self.user_agent)
    }

    /// Pass successful responses through and map failures onto the error
    /// taxonomy. `resource` names the object for not-found errors.
    async fn check_status(response: Response, resource: &str) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let message = error_message(&body, status);

        Err(match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Error::provider_auth(message),
            StatusCode::NOT_FOUND => Error::credential_not_found(resource),
            s if super::retry::is_retryable_status(s) => {
                Error::provider_unavailable(format!("status {}: {}", s.as_u16(), message))
            }
            s => Error::provider_rejected(s.as_u16(), message),
        })
    }
}

fn error_message(body: &str, status: StatusCode) -> String {
    match serde_json::from_str::<ErrorBody>(body) {
        Ok(parsed) if !parsed.errors.is_empty() => parsed.errors.join("; "),
        Ok(ErrorBody { error: Some(error), .. }) => error,
        _ => status.canonical_reason().unwrap_or("unexpected response").to_string(),
    }
}

#[async_trait]
impl ProviderApi for PacketClient {
    async fn create_api_key(
        &self,
        ctx: &RequestContext,
        request: &CreateApiKeyRequest,
    ) -> Result<ApiKey> {
        request.scope.validate().map_err(Error::invalid_request)?;
        let url = self.endpoint(&request.scope.collection_segments())?;
        let body =
            CreateApiKeyBody { description: &request.description, read_only: request.read_only };

        debug!(scope = %request.scope, read_only = request.read_only, "Creating Packet API key");

        let response = self
            .retry_policy
            .execute_non_idempotent(ctx, "create_api_key", || {
                self.request(Method::POST, &url).json(&body)
            })
            .await?;
        let response = Self::check_status(response, url.path()).await?;

        let key: ApiKey = ctx
            .run(async {
                response.json::<ApiKey>().await.map_err(|e| {
                    error!(error = %e, "Failed to decode Packet API key response");
                    Error::internal(format!("Invalid API key response: {}", e))
                })
            })
            .await?;

        info!(api_key_id = %key.id, scope = %request.scope, "Created Packet API key");
        Ok(key)
    }

    async fn delete_api_key(&self, ctx: &RequestContext, id: &str) -> Result<()> {
        let url = self.endpoint(&["api-keys", id])?;

        let response = self
            .retry_policy
            .execute(ctx, "delete_api_key", || self.request(Method::DELETE, &url))
            .await?;
        Self::check_status(response, id).await?;

        info!(api_key_id = %id, "Deleted Packet API key");
        Ok(())
    }

    async fn lookup_api_key(
        &self,
        ctx: &RequestContext,
        scope: &ApiKeyScope,
        id: &str,
    ) -> Result<Option<ApiKey>> {
        scope.validate().map_err(Error::invalid_request)?;
        let collection = self.endpoint(&scope.collection_segments())?;

        for page in 1..=MAX_LIST_PAGES {
            let mut url = collection.clone();
            url.query_pairs_mut()
                .append_pair("page", &page.to_string())
                .append_pair("per_page", &LIST_PAGE_SIZE.to_string());

            let response = self
                .retry_policy
                .execute(ctx, "lookup_api_key", || self.request(Method::GET, &url))
                .await?;
            let response = match Self::check_status(response, id).await {
                Ok(response) => response,
                // The scope itself (e.g. the project) is gone
                Err(Error::CredentialNotFound { .. }) => return Ok(None),
                Err(e) => return Err(e),
            };

            let list: ApiKeyList = ctx
                .run(async {
                    response
                        .json::<ApiKeyList>()
                        .await
                        .map_err(|e| Error::internal(format!("Invalid API key list response: {}", e)))
                })
                .await?;

            let has_next = list.has_next_page();
            if let Some(key) = list.api_keys.into_iter().find(|key| key.id == id) {
                return Ok(Some(key));
            }
            if !has_next {
                return Ok(None);
            }
            debug!(api_key_id = %id, page, "API key not on this page, fetching next");
        }

        warn!(api_key_id = %id, pages = MAX_LIST_PAGES, "Stopped API key lookup at page limit");
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_rejects_bad_urls() {
        let err = PacketClient::new(SecretString::new("t"), Some("not a url"), None).unwrap_err();
        assert!(matches!(err, Error::Config { .. }));

        let err =
            PacketClient::new(SecretString::new("t"), Some("ftp://api.packet.net"), None).unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
    }

    #[test]
    fn test_new_defaults() {
        let client = PacketClient::new(SecretString::new("t"), None, None).unwrap();
        assert_eq!(client.base_url().as_str(), "https://api.packet.net/");
        assert_eq!(client.retry_policy(), &RetryPolicy::default());
    }

    #[test]
    fn test_endpoint_keeps_ids_inside_one_segment() {
        let client =
            PacketClient::new(SecretString::new("t"), Some("http://127.0.0.1:9/v1/"), None).unwrap();

        let url = client.endpoint(&["projects", "p-1", "api-keys"]).unwrap();
        assert_eq!(url.as_str(), "http://127.0.0.1:9/v1/projects/p-1/api-keys");

        for id in ["../projects/victim", "..", "a/b", "a%2Fb", "k?x=1"] {
            let err = client.endpoint(&["api-keys", id]).unwrap_err();
            assert!(matches!(err, Error::InvalidRequest { .. }), "accepted {:?}", id);
        }
    }

    #[test]
    fn test_page_meta() {
        let list: ApiKeyList =
            serde_json::from_str(r#"{"api_keys":[],"meta":{"next":{"href":"/user/api-keys?page=2"}}}"#)
                .unwrap();
        assert!(list.has_next_page());

        let list: ApiKeyList = serde_json::from_str(r#"{"api_keys":[],"meta":{"next":null}}"#).unwrap();
        assert!(!list.has_next_page());

        let list: ApiKeyList = serde_json::from_str(r#"{"api_keys":[]}"#).unwrap();
        assert!(!list.has_next_page());
    }

    #[test]
    fn test_debug_redacts_token() {
        let client = PacketClient::new(SecretString::new("root-token"), None, None).unwrap();
        let output = format!("{:?}", client);
        assert!(!output.contains("root-token"));
        assert!(output.contains("REDACTED"));
    }

    #[test]
    fn test_error_message_extraction() {
        assert_eq!(
            error_message(r#"{"errors":["Project not found","extra"]}"#, StatusCode::NOT_FOUND),
            "Project not found; extra"
        );
        assert_eq!(error_message(r#"{"error":"bad token"}"#, StatusCode::UNAUTHORIZED), "bad token");
        assert_eq!(error_message("<html>", StatusCode::BAD_GATEWAY), "Bad Gateway");
    }
}
