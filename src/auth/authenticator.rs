//! Applies credentials to outgoing requests
//!
//! Session and service-account tokens are fetched on first use and cached
//! until they expire or the [`HttpClient`](crate::http::HttpClient) sees a 401.

use super::types::{AuthConfig, CachedToken, ServiceAccountGrant, SessionLogin};
use crate::error::{Error, Result};
use chrono::Utc;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use reqwest::{Client, RequestBuilder, Response};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::debug;

const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";

/// Assertions are valid for the maximum Google accepts
const ASSERTION_LIFETIME_SECONDS: i64 = 3600;

/// Authenticator for one connector's requests
#[derive(Debug)]
pub struct Authenticator {
    config: AuthConfig,
    token: RwLock<Option<CachedToken>>,
    /// Used for login and token exchange requests
    client: Client,
}

impl Authenticator {
    pub fn new(config: AuthConfig, client: Client) -> Self {
        Self {
            config,
            token: RwLock::new(None),
            client,
        }
    }

    /// Apply authentication to a request builder
    pub async fn apply(&self, req: RequestBuilder) -> Result<RequestBuilder> {
        match &self.config {
            AuthConfig::Basic { username, password } => {
                Ok(req.basic_auth(username, Some(password)))
            }
            AuthConfig::Session(login) => {
                let token = self.token().await?;
                Ok(req.header(login.header.as_str(), token))
            }
            AuthConfig::ServiceAccount(_) => Ok(req.bearer_auth(self.token().await?)),
        }
    }

    /// Drop the cached token so the next request fetches a new one
    pub async fn invalidate(&self) {
        *self.token.write().await = None;
    }

    pub fn refreshable(&self) -> bool {
        self.config.refreshable()
    }

    async fn token(&self) -> Result<String> {
        {
            let cached = self.token.read().await;
            if let Some(token) = cached.as_ref().filter(|t| !t.is_expired()) {
                return Ok(token.token.clone());
            }
        }

        let mut cached = self.token.write().await;

        // Another request may have logged in while we waited for the write lock
        if let Some(token) = cached.as_ref().filter(|t| !t.is_expired()) {
            return Ok(token.token.clone());
        }

        let fresh = match &self.config {
            AuthConfig::Session(login) => login.open(&self.client).await?,
            AuthConfig::ServiceAccount(grant) => grant.exchange(&self.client).await?,
            AuthConfig::Basic { .. } => return Err(Error::auth("Basic auth has no token to fetch")),
        };
        let token = fresh.token.clone();
        *cached = Some(fresh);
        Ok(token)
    }
}

impl SessionLogin {
    async fn open(&self, client: &Client) -> Result<CachedToken> {
        debug!(url = %self.login_url, "Opening session");
        let response = client.post(&self.login_url).json(&self.credentials).send().await?;
        if !response.status().is_success() {
            return Err(rejected(response, "Login").await);
        }

        let body: Value = response.json().await?;
        let token = extract_path(&body, &self.token_path).ok_or_else(|| {
            Error::auth(format!("Login response has no token at '{}'", self.token_path))
        })?;
        Ok(CachedToken::new(token, self.lifetime_seconds))
    }
}

impl ServiceAccountGrant {
    fn assertion(&self) -> Result<String> {
        let now = Utc::now().timestamp();
        let claims = AssertionClaims {
            iss: &self.client_email,
            scope: &self.scope,
            aud: &self.token_url,
            iat: now,
            exp: now + ASSERTION_LIFETIME_SECONDS,
        };

        let mut header = Header::new(Algorithm::RS256);
        header.kid.clone_from(&self.key_id);

        let key = EncodingKey::from_rsa_pem(self.private_key.as_bytes()).map_err(|e| {
            Error::JwtGeneration {
                message: format!("Invalid private key: {e}"),
            }
        })?;
        encode(&header, &claims, &key).map_err(|e| Error::JwtGeneration {
            message: format!("Failed to encode JWT: {e}"),
        })
    }

    async fn exchange(&self, client: &Client) -> Result<CachedToken> {
        let assertion = self.assertion()?;
        debug!(url = %self.token_url, account = %self.client_email, "Exchanging service account assertion");
        let form = [("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())];
        let response = client.post(&self.token_url).form(&form).send().await?;
        if !response.status().is_success() {
            return Err(rejected(response, "Token exchange").await);
        }

        let granted: TokenResponse = response.json().await?;
        Ok(CachedToken::new(granted.access_token, granted.expires_in))
    }
}

async fn rejected(response: Response, what: &str) -> Error {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    Error::auth(format!("{what} failed with status {status}: {body}"))
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
}

#[derive(Debug, Serialize)]
struct AssertionClaims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

/// Read a scalar from JSON by dotted path (`id`, `$.data.token`)
pub fn extract_path(value: &Value, path: &str) -> Option<String> {
    let path = path.strip_prefix("$.").unwrap_or(path);

    let mut current = value;
    for part in path.split('.') {
        current = current.as_object()?.get(part)?;
    }

    match current {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}
