//! Bounded retry policy for provider HTTP calls.
//!
//! Transient failures (connection errors, timeouts, throttling, 5xx) are
//! absorbed here; everything else is handed straight back to the caller for
//! classification. Each attempt and each backoff races the request context.

use reqwest::{RequestBuilder, Response, StatusCode};
use std::time::Duration;
use tracing::{debug, warn};

use crate::backend::context::RequestContext;
use crate::errors::{Error, Result};

/// Minimum wait between attempts
pub const DEFAULT_RETRY_WAIT_MIN: Duration = Duration::from_secs(1);
/// Maximum wait between attempts
pub const DEFAULT_RETRY_WAIT_MAX: Duration = Duration::from_secs(30);
/// Retries after the first attempt
pub const DEFAULT_RETRY_MAX: u32 = 10;

/// Exponential backoff configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Backoff before the first retry
    pub wait_min: Duration,
    /// Cap for exponential growth and for `Retry-After`
    pub wait_max: Duration,
    /// Number of retries after the initial attempt
    pub max_retries: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            wait_min: DEFAULT_RETRY_WAIT_MIN,
            wait_max: DEFAULT_RETRY_WAIT_MAX,
            max_retries: DEFAULT_RETRY_MAX,
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn no_retries() -> Self {
        Self { max_retries: 0, ..Self::default() }
    }

    /// Backoff before retry number `attempt` (0-indexed).
    ///
    /// `wait_min * 2^attempt`, capped at `wait_max`. A server supplied
    /// `Retry-After` wins when present, still capped at `wait_max`.
    pub fn backoff_for_attempt(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        if let Some(retry_after) = retry_after {
            return retry_after.min(self.wait_max);
        }

        let multiplier = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
        self.wait_min.checked_mul(multiplier).unwrap_or(self.wait_max).min(self.wait_max)
    }

    /// Send the request built by `build`, retrying transient failures.
    ///
    /// On exhaustion the last response is returned as-is so the caller can
    /// classify its status; exhausted transport errors become
    /// [`Error::ProviderUnavailable`].
    pub async fn execute<F>(
        &self,
        ctx: &RequestContext,
        operation: &str,
        build: F,
    ) -> Result<Response>
    where
        F: Fn() -> RequestBuilder,
    {
        self.send_with_retries(ctx, operation, true, build).await
    }

    /// Like [`execute`](Self::execute) for requests that create something.
    ///
    /// Only failures where the provider cannot have acted are retried: a
    /// refused connection or a 429. A 5xx or a dropped connection may follow
    /// a successful create, so it is handed back after the first attempt.
    pub async fn execute_non_idempotent<F>(
        &self,
        ctx: &RequestContext,
        operation: &str,
        build: F,
    ) -> Result<Response>
    where
        F: Fn() -> RequestBuilder,
    {
        self.send_with_retries(ctx, operation, false, build).await
    }

    async fn send_with_retries<F>(
        &self,
        ctx: &RequestContext,
        operation: &str,
        idempotent: bool,
        build: F,
    ) -> Result<Response>
    where
        F: Fn() -> RequestBuilder,
    {
        let mut attempt: u32 = 0;

        loop {
            let outcome = ctx.run(async { Ok(build().send().await) }).await?;

            let (retry_after, reason) = match outcome {
                Ok(response) => {
                    let status = response.status();
                    if !should_retry_status(status, idempotent) || attempt >= self.max_retries {
                        return Ok(response);
                    }
                    (parse_retry_after(&response), format!("status {}", status.as_u16()))
                }
                Err(e) if e.is_builder() => {
                    return Err(Error::internal(format!("Invalid {} request: {}", operation, e)));
                }
                Err(e) => {
                    if !idempotent && !e.is_connect() {
                        return Err(Error::provider_unavailable(format!(
                            "{} outcome unknown, not retried: {}",
                            operation, e
                        )));
                    }
                    if attempt >= self.max_retries {
                        return Err(Error::provider_unavailable(format!(
                            "{} failed after {} attempts: {}",
                            operation,
                            attempt + 1,
                            e
                        )));
                    }
                    (None, e.to_string())
                }
            };

            let backoff = self.backoff_for_attempt(attempt, retry_after);
            warn!(
                operation = %operation,
                attempt = attempt + 1,
                max_retries = self.max_retries,
                backoff_ms = backoff.as_millis() as u64,
                reason = %reason,
                "Transient provider failure, retrying after backoff"
            );
            ctx.sleep(backoff).await?;
            attempt += 1;
            debug!(operation = %operation, attempt = attempt + 1, "Retrying provider request");
        }
    }
}

/// Whether a response with `status` warrants another attempt. Requests that
/// are not idempotent are only retried when throttled.
pub fn should_retry_status(status: StatusCode, idempotent: bool) -> bool {
    if idempotent {
        is_retryable_status(status)
    } else {
        status == StatusCode::TOO_MANY_REQUESTS
    }
}

/// Throttling and server-side failures are worth another attempt.
/// 501 means the endpoint will never work.
pub fn is_retryable_status(status: StatusCode) -> bool {
    status == StatusCode::REQUEST_TIMEOUT
        || status == StatusCode::TOO_MANY_REQUESTS
        || (status.is_server_error() && status != StatusCode::NOT_IMPLEMENTED)
}

fn parse_retry_after(response: &Response) -> Option<Duration> {
    let status = response.status();
    if status != StatusCode::TOO_MANY_REQUESTS && status != StatusCode::SERVICE_UNAVAILABLE {
        return None;
    }

    response
        .headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}
