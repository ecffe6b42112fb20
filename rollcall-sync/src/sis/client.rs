//! Resilient SIS API client
//!
//! Wraps every outbound call with the retry policy:
//! - status >= 400 is a failure
//! - 429 and 5xx are retried; everything else is returned immediately
//! - `Retry-After: n` (non-negative integer) waits n backoff units, otherwise
//!   the exponential backoff (1 unit, doubling after every retry) applies
//! - once the budget is spent the last HTTP status is returned unchanged
//!
//! Backoff waits race a [`CancellationToken`] so a run-level shutdown
//! interrupts them.

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, RETRY_AFTER};
use reqwest::Method;
use rollcall_common::config::{RetrySettings, Settings};
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

const USER_AGENT: &str = concat!("rollcall/", env!("CARGO_PKG_VERSION"));

/// SIS client errors
#[derive(Debug, Error)]
pub enum SisError {
    /// Non-retryable HTTP status
    #[error("HTTP {status} from {url}")]
    Status { status: u16, url: String, body: String },

    /// Retryable status persisted through every attempt
    #[error("HTTP {status} from {url} after {attempts} attempts")]
    RetryExhausted {
        status: u16,
        url: String,
        attempts: u32,
        body: String,
    },

    /// Connection, timeout or body read failure
    #[error("Network error: {0}")]
    Network(String),

    /// Non-empty body that is not JSON
    #[error("Invalid JSON from {url}: {message}")]
    Decode { url: String, message: String },

    /// Client could not be built or the request is malformed
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Shutdown requested while the request or its backoff was pending
    #[error("Request cancelled")]
    Cancelled,
}

impl SisError {
    /// HTTP status of the last response, if the failure came from one
    pub fn status(&self) -> Option<u16> {
        match self {
            SisError::Status { status, .. } | SisError::RetryExhausted { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, SisError::Status { status: 404, .. })
    }
}

/// Retry budget and backoff unit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt (3 means 4 attempts total)
    pub max_retries: u32,
    /// Initial backoff, and the unit for `Retry-After`
    pub backoff_unit: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetrySettings::default().into()
    }
}

impl From<RetrySettings> for RetryPolicy {
    fn from(settings: RetrySettings) -> Self {
        Self {
            max_retries: settings.max_retries,
            backoff_unit: settings.backoff_unit,
        }
    }
}

impl RetryPolicy {
    /// Delay requested by a `Retry-After` header, if it is a non-negative integer
    pub fn retry_after_delay(&self, header: Option<&str>) -> Option<Duration> {
        let units: u32 = header?.trim().parse().ok()?;
        self.backoff_unit.checked_mul(units)
    }

    /// Exponential backoff before retry number `retry` (1-based): 1, 2, 4... units
    pub fn backoff_delay(&self, retry: u32) -> Duration {
        let factor = 1u32.checked_shl(retry.saturating_sub(1)).unwrap_or(u32::MAX);
        self.backoff_unit.saturating_mul(factor)
    }

    pub fn is_retryable(status: u16) -> bool {
        status == 429 || (500..600).contains(&status)
    }
}

/// HTTP client for the upstream SIS
pub struct SisClient {
    http_client: reqwest::Client,
    base_url: String,
    retry: RetryPolicy,
    cancel: CancellationToken,
}

impl SisClient {
    /// Build a client from validated settings
    pub fn from_settings(settings: &Settings, cancel: CancellationToken) -> Result<Self, SisError> {
        Self::new(
            &settings.sis_base_url,
            &settings.auth_header,
            &settings.sis_token,
            settings.request_timeout,
            settings.retry.into(),
            cancel,
        )
    }

    pub fn new(
        base_url: &str,
        auth_header: &str,
        token: &str,
        timeout: Duration,
        retry: RetryPolicy,
        cancel: CancellationToken,
    ) -> Result<Self, SisError> {
        let header_name = HeaderName::from_bytes(auth_header.as_bytes())
            .map_err(|e| SisError::InvalidRequest(format!("auth header name: {}", e)))?;
        let mut header_value = HeaderValue::from_str(token)
            .map_err(|e| SisError::InvalidRequest(format!("auth token: {}", e)))?;
        header_value.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert(header_name, header_value);

        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .default_headers(headers)
            .build()
            .map_err(|e| SisError::InvalidRequest(e.to_string()))?;

        Ok(Self {
            http_client,
            base_url: base_url.trim_end_matches('/').to_string(),
            retry,
            cancel,
        })
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    /// GET with query parameters
    pub async fn get(&self, path: &str, query: &[(&str, String)]) -> Result<Option<Value>, SisError> {
        self.request(Method::GET, path, query, None).await
    }

    /// Send a request with retry
    ///
    /// Returns `Ok(None)` for a successful response with an empty body.
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<&Value>,
    ) -> Result<Option<Value>, SisError> {
        let url = format!("{}{}", self.base_url, path);
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;

            let mut builder = self.http_client.request(method.clone(), &url).query(query);
            if let Some(body) = body {
                builder = builder.json(body);
            }

            tracing::debug!(%method, url = %url, attempt, "Sending SIS request");

            let response = tokio::select! {
                _ = self.cancel.cancelled() => return Err(SisError::Cancelled),
                sent = builder.send() => sent.map_err(|e| SisError::Network(e.to_string()))?,
            };

            let status = response.status().as_u16();

            if status < 400 {
                let bytes = response
                    .bytes()
                    .await
                    .map_err(|e| SisError::Network(e.to_string()))?;
                if bytes.is_empty() {
                    return Ok(None);
                }
                return serde_json::from_slice(&bytes)
                    .map(Some)
                    .map_err(|e| SisError::Decode {
                        url: url.clone(),
                        message: e.to_string(),
                    });
            }

            let retry_after = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .map(str::to_owned);
            let error_text = response.text().await.unwrap_or_default();

            if !RetryPolicy::is_retryable(status) {
                tracing::debug!(status, url = %url, "SIS request failed (not retryable)");
                return Err(SisError::Status {
                    status,
                    url,
                    body: error_text,
                });
            }

            if attempt > self.retry.max_retries {
                tracing::error!(status, url = %url, attempts = attempt, "SIS retry budget exhausted");
                return Err(SisError::RetryExhausted {
                    status,
                    url,
                    attempts: attempt,
                    body: error_text,
                });
            }

            let delay = self
                .retry
                .retry_after_delay(retry_after.as_deref())
                .unwrap_or_else(|| self.retry.backoff_delay(attempt));

            tracing::warn!(
                status,
                url = %url,
                attempt,
                delay_ms = delay.as_millis() as u64,
                "SIS request failed, will retry after backoff"
            );

            tokio::select! {
                _ = self.cancel.cancelled() => return Err(SisError::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }
}
