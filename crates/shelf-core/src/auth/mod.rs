//! OAuth credentials for cloud-drive providers.
//!
//! `TokenManager` keeps one provider's token fresh: a token within the
//! refresh buffer of expiry is exchanged through a `TokenRefresher`, with at
//! most one exchange in flight per manager.

mod manager;
mod oauth;

use std::fmt;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::util::unix_timestamp_now;

pub use manager::TokenManager;
pub use oauth::OAuthRefreshClient;

/// Seconds before expiry at which a token is refreshed.
pub const REFRESH_BUFFER_SECS: i64 = 5 * 60;

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OAuthToken {
    pub access_token: String,
    pub refresh_token: String,
    /// Unix seconds
    pub expires_at: i64,
}

impl OAuthToken {
    /// A credential that only holds a refresh token; the first use refreshes it.
    #[must_use]
    pub fn from_refresh_token(refresh_token: impl Into<String>) -> Self {
        Self {
            access_token: String::new(),
            refresh_token: refresh_token.into(),
            expires_at: 0,
        }
    }

    /// Whether the token expires within the refresh buffer of `now`.
    #[must_use]
    pub fn needs_refresh_at(&self, now: i64) -> bool {
        self.access_token.is_empty() || self.expires_at <= now + REFRESH_BUFFER_SECS
    }

    #[must_use]
    pub fn needs_refresh(&self) -> bool {
        self.needs_refresh_at(unix_timestamp_now())
    }
}

impl fmt::Debug for OAuthToken {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("OAuthToken")
            .field("access_token", &"[REDACTED]")
            .field("refresh_token", &"[REDACTED]")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Token lifecycle failures.
///
/// `Clone` so one failed refresh can be handed to every caller waiting on it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("No valid credential; sign in again")]
    NotAuthenticated,
    #[error("Invalid auth configuration: {0}")]
    InvalidConfiguration(String),
    #[error("HTTP request failed: {0}")]
    Http(String),
    #[error("Auth API error: {0}")]
    Api(String),
    #[error("Credential storage error: {0}")]
    Persistence(String),
}

impl From<reqwest::Error> for AuthError {
    fn from(error: reqwest::Error) -> Self {
        Self::Http(error.to_string())
    }
}

pub type AuthResult<T> = Result<T, AuthError>;

/// Exchanges a refresh token for a new access token.
#[async_trait::async_trait]
pub trait TokenRefresher: Send + Sync {
    async fn refresh(&self, refresh_token: &str) -> AuthResult<OAuthToken>;
}

/// Durable home for a provider credential (keychain, secure settings).
pub trait CredentialStore: Send + Sync {
    fn load(&self) -> AuthResult<Option<OAuthToken>>;
    fn save(&self, token: &OAuthToken) -> AuthResult<()>;
    fn clear(&self) -> AuthResult<()>;
}

/// Process-lifetime credential store.
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    token: Mutex<Option<OAuthToken>>,
}

impl MemoryCredentialStore {
    #[must_use]
    pub fn new(token: Option<OAuthToken>) -> Self {
        Self {
            token: Mutex::new(token),
        }
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn load(&self) -> AuthResult<Option<OAuthToken>> {
        self.token
            .lock()
            .map(|token| token.clone())
            .map_err(|_| AuthError::Persistence("credential lock poisoned".to_string()))
    }

    fn save(&self, token: &OAuthToken) -> AuthResult<()> {
        let mut slot = self
            .token
            .lock()
            .map_err(|_| AuthError::Persistence("credential lock poisoned".to_string()))?;
        *slot = Some(token.clone());
        Ok(())
    }

    fn clear(&self) -> AuthResult<()> {
        let mut slot = self
            .token
            .lock()
            .map_err(|_| AuthError::Persistence("credential lock poisoned".to_string()))?;
        *slot = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_inside_buffer_needs_refresh() {
        let now = 1_700_000_000;
        let token = OAuthToken {
            access_token: "a".to_string(),
            refresh_token: "r".to_string(),
            expires_at: now + REFRESH_BUFFER_SECS - 1,
        };
        assert!(token.needs_refresh_at(now));

        let fresh = OAuthToken {
            expires_at: now + REFRESH_BUFFER_SECS + 60,
            ..token
        };
        assert!(!fresh.needs_refresh_at(now));
    }

    #[test]
    fn refresh_only_token_always_needs_refresh() {
        assert!(OAuthToken::from_refresh_token("r").needs_refresh_at(0));
    }

    #[test]
    fn token_debug_redacts_secrets() {
        let token = OAuthToken {
            access_token: "secret-access-token".to_string(),
            refresh_token: "secret-refresh-token".to_string(),
            expires_at: 1_700_000_000,
        };
        let rendered = format!("{token:?}");
        assert!(!rendered.contains("secret-access-token"));
        assert!(!rendered.contains("secret-refresh-token"));
        assert!(rendered.contains("[REDACTED]"));
    }

    #[test]
    fn memory_store_roundtrip() {
        let store = MemoryCredentialStore::default();
        assert_eq!(store.load().unwrap(), None);

        let token = OAuthToken::from_refresh_token("r");
        store.save(&token).unwrap();
        assert_eq!(store.load().unwrap(), Some(token));

        store.clear().unwrap();
        assert_eq!(store.load().unwrap(), None);
    }
}
