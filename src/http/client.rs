//! HTTP client with retry and rate limiting
//!
//! Every REST connector talks to its vendor through one [`HttpClient`].
//! Transient failures are retried with capped exponential backoff and 429
//! responses honor `Retry-After`. A 401 on token auth drops the cached
//! token and repeats the request once.

use super::rate_limit::{RateLimiter, RateLimiterConfig};
use crate::auth::{AuthConfig, Authenticator};
use crate::error::{Error, Result};
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, warn};

const USER_AGENT: &str = concat!("metadata-connectors/", env!("CARGO_PKG_VERSION"));

/// Retry budget and backoff bounds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    /// Delay before the retry following failed attempt `attempt` (zero-based)
    pub fn delay(&self, attempt: u32) -> Duration {
        self.initial_backoff
            .saturating_mul(2u32.saturating_pow(attempt))
            .min(self.max_backoff)
    }
}

/// Configuration for the HTTP client
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    /// Prefix for every request path
    pub base_url: String,
    pub timeout: Duration,
    pub retry: RetryPolicy,
    pub rate_limit: Option<RateLimiterConfig>,
}

impl HttpClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            timeout: Duration::from_secs(30),
            retry: RetryPolicy::default(),
            rate_limit: Some(RateLimiterConfig::default()),
        }
    }

    /// Use the source's rate limit when it configures one
    #[must_use]
    pub fn rate_limit(mut self, rate_limit: Option<RateLimiterConfig>) -> Self {
        if rate_limit.is_some() {
            self.rate_limit = rate_limit;
        }
        self
    }

    #[must_use]
    pub fn without_rate_limit(mut self) -> Self {
        self.rate_limit = None;
        self
    }

    #[must_use]
    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

/// Query parameters for a single request
#[derive(Debug, Clone, Default)]
pub struct RequestConfig {
    /// Query parameters, in order
    pub query: Vec<(String, String)>,
}

impl RequestConfig {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn query(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.query.push((key.into(), value.to_string()));
        self
    }

    /// Replace or add a query parameter
    pub fn set_query(&mut self, key: &str, value: impl ToString) {
        self.query.retain(|(k, _)| k != key);
        self.query.push((key.to_string(), value.to_string()));
    }
}

/// HTTP client with retry and rate limiting
pub struct HttpClient {
    client: Client,
    config: HttpClientConfig,
    authenticator: Option<Authenticator>,
    rate_limiter: Option<RateLimiter>,
}

impl HttpClient {
    pub fn new(config: HttpClientConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .user_agent(USER_AGENT)
            .build()?;
        let rate_limiter = config.rate_limit.as_ref().map(RateLimiter::new);

        Ok(Self {
            client,
            config,
            authenticator: None,
            rate_limiter,
        })
    }

    /// Client that authenticates every request
    pub fn with_auth(config: HttpClientConfig, auth: AuthConfig) -> Result<Self> {
        let mut client = Self::new(config)?;
        client.authenticator = Some(Authenticator::new(auth, client.client.clone()));
        Ok(client)
    }

    /// GET `path` under the base URL and decode the JSON body
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str, request: RequestConfig) -> Result<T> {
        let response = self.send(path, &request).await?;
        let bytes = response.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    async fn send(&self, path: &str, request: &RequestConfig) -> Result<Response> {
        let url = self.build_url(path);
        let retry = self.config.retry;
        let mut attempt = 0;
        let mut relogged = false;

        loop {
            if let Some(limiter) = &self.rate_limiter {
                limiter.wait().await;
            }

            let mut req = self.client.get(&url);
            if !request.query.is_empty() {
                req = req.query(&request.query);
            }
            if let Some(auth) = &self.authenticator {
                req = auth.apply(req).await?;
            }

            let (error, retry_after) = match req.send().await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        debug!(url = %url, status = status.as_u16(), "Request succeeded");
                        return Ok(response);
                    }

                    if status == StatusCode::UNAUTHORIZED && !relogged {
                        if let Some(auth) = self.authenticator.as_ref().filter(|a| a.refreshable()) {
                            debug!(url = %url, "Got 401, fetching a fresh token");
                            auth.invalidate().await;
                            relogged = true;
                            continue;
                        }
                    }

                    let retry_after = parse_retry_after(&response);
                    let error = if status == StatusCode::TOO_MANY_REQUESTS {
                        Error::RateLimited {
                            retry_after_seconds: retry_after.map_or(0, |d| d.as_secs()),
                        }
                    } else {
                        let body = response.text().await.unwrap_or_default();
                        Error::http_status(status.as_u16(), body)
                    };
                    (error, retry_after)
                }
                Err(e) if e.is_timeout() => {
                    let timeout_ms = u64::try_from(self.config.timeout.as_millis()).unwrap_or(u64::MAX);
                    (Error::Timeout { timeout_ms }, None)
                }
                Err(e) => (Error::Http(e), None),
            };

            if !error.is_retryable() || attempt >= retry.max_retries {
                return Err(error);
            }

            let delay = retry_after.unwrap_or_else(|| retry.delay(attempt));
            attempt += 1;
            warn!(
                url = %url,
                attempt,
                max_retries = retry.max_retries,
                ?delay,
                error = %error,
                "Retrying request"
            );
            tokio::time::sleep(delay).await;
        }
    }

    pub(crate) fn build_url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.config.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

impl std::fmt::Debug for HttpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpClient")
            .field("config", &self.config)
            .field("has_authenticator", &self.authenticator.is_some())
            .field("has_rate_limiter", &self.rate_limiter.is_some())
            .finish_non_exhaustive()
    }
}

/// `Retry-After` in seconds, if the server sent one
fn parse_retry_after(response: &Response) -> Option<Duration> {
    response
        .headers()
        .get("retry-after")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().parse().ok())
        .map(Duration::from_secs)
}
