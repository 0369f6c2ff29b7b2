//! The per-request bearer credential.

use chrono::{DateTime, Utc};
use std::fmt;

/// Environment variable carrying the bearer token into the tool process.
pub const AUTH_TOKEN_ENV: &str = "TODOCLAW_AUTH_TOKEN";

/// Environment variable carrying the upstream base address into the tool process.
pub const API_BASE_URL_ENV: &str = "TODOCLAW_API_BASE_URL";

/// Opaque bearer token plus the base address of the service that accepts it.
///
/// Lives for one chat request. It is not `Serialize`, and its `Debug` output
/// never shows the token.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    token: String,
    base_url: String,
    expires_at: Option<DateTime<Utc>>,
}

impl Credential {
    pub fn new(token: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            base_url: base_url.into(),
            expires_at: None,
        }
    }

    /// Attach the expiry reported by the issuer. Informational only: the
    /// upstream service is the one that rejects expired tokens.
    pub fn with_expiry(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }

    /// The environment entries injected into a tool process at spawn.
    pub fn env_pairs(&self) -> [(&'static str, &str); 2] {
        [(AUTH_TOKEN_ENV, self.token.as_str()), (API_BASE_URL_ENV, self.base_url.as_str())]
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("token", &"***")
            .field("base_url", &self.base_url)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}
