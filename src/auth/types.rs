//! Auth configuration types
//!
//! Each connector builds one of these from its source config after
//! environment substitution.

use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Default Google OAuth token endpoint
pub const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";

/// How a connector authenticates against its vendor API
#[derive(Debug, Clone)]
pub enum AuthConfig {
    /// HTTP Basic credentials on every request
    Basic { username: String, password: String },

    /// Log in once and send the session token in a header
    Session(SessionLogin),

    /// Signed assertion exchanged for a bearer token (JWT-bearer grant)
    ServiceAccount(ServiceAccountGrant),
}

/// Login endpoint returning a session token
#[derive(Debug, Clone)]
pub struct SessionLogin {
    pub login_url: String,
    /// JSON body posted to the login endpoint
    pub credentials: HashMap<String, String>,
    /// Dotted path of the token in the login response
    pub token_path: String,
    /// Header carrying the token on later requests
    pub header: String,
    /// Sessions without a lifetime are kept until the server answers 401
    pub lifetime_seconds: Option<i64>,
}

/// RS256 service-account assertion and the endpoint that accepts it
#[derive(Debug, Clone)]
pub struct ServiceAccountGrant {
    pub client_email: String,
    /// PEM-encoded RSA key
    pub private_key: String,
    pub key_id: Option<String>,
    /// Space-separated OAuth scopes
    pub scope: String,
    /// Token endpoint; also the assertion audience
    pub token_url: String,
}

impl AuthConfig {
    /// Service-account grant for a Google key file
    pub fn google_service_account(key: &ServiceAccountKey, scopes: &[&str]) -> Self {
        AuthConfig::ServiceAccount(ServiceAccountGrant {
            client_email: key.client_email.clone(),
            private_key: key.private_key.clone(),
            key_id: key.private_key_id.clone(),
            scope: scopes.join(" "),
            token_url: key
                .token_uri
                .clone()
                .unwrap_or_else(|| GOOGLE_TOKEN_URL.to_string()),
        })
    }

    /// Whether requests carry a fetched token that a 401 should invalidate
    pub fn refreshable(&self) -> bool {
        !matches!(self, AuthConfig::Basic { .. })
    }
}

/// Google service account key file (the fields we need)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceAccountKey {
    pub client_email: String,
    pub private_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub private_key_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_uri: Option<String>,
}

impl ServiceAccountKey {
    /// Parse a key from its JSON text
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| Error::invalid_value("credentials", format!("invalid service account key: {e}")))
    }
}

/// Cached token with expiration
#[derive(Debug, Clone)]
pub(crate) struct CachedToken {
    pub token: String,
    pub expires_at: Option<DateTime<Utc>>,
}

impl CachedToken {
    /// Token kept until the server rejects it, or for `seconds` when given
    pub fn new(token: String, seconds: Option<i64>) -> Self {
        Self {
            token,
            expires_at: seconds.map(|s| Utc::now() + chrono::Duration::seconds(s)),
        }
    }

    /// Expired, or expiring within 30 seconds
    pub fn is_expired(&self) -> bool {
        self.expires_at
            .is_some_and(|expires_at| Utc::now() + chrono::Duration::seconds(30) >= expires_at)
    }
}
