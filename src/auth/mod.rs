//! Authentication module
//!
//! Supports Basic credentials, session login (token in a header) and
//! service-account assertions exchanged for bearer tokens. Fetched tokens
//! are cached until they expire.

mod authenticator;
mod types;

pub use authenticator::{extract_path, Authenticator};
pub use types::{AuthConfig, ServiceAccountGrant, ServiceAccountKey, SessionLogin, GOOGLE_TOKEN_URL};
