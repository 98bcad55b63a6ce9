//! Session authentication seam.
//!
//! Session issuance is external; the orchestrator only needs to map a
//! bearer token to a user id, failing fast before any external call when
//! the token is unknown.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use thiserror::Error;

/// The presented session token is missing, unknown, or expired.
#[derive(Debug, Error)]
#[error("session token rejected")]
pub struct AuthError;

/// Maps a session token to an authenticated user id.
#[async_trait]
pub trait SessionAuth: Send + Sync {
    /// Authenticate a session token, returning the caller's user id.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError`] when the token is not a live session.
    async fn authenticate(&self, session_token: &str) -> Result<String, AuthError>;
}

/// Token table for tests and single-tenant deployments.
#[derive(Default)]
pub struct StaticTokenAuth {
    tokens: RwLock<HashMap<String, String>>,
}

impl StaticTokenAuth {
    /// Create an empty token table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `token` as a live session for `user_id`.
    pub fn grant(&self, token: impl Into<String>, user_id: impl Into<String>) {
        if let Ok(mut tokens) = self.tokens.write() {
            tokens.insert(token.into(), user_id.into());
        }
    }
}

#[async_trait]
impl SessionAuth for StaticTokenAuth {
    async fn authenticate(&self, session_token: &str) -> Result<String, AuthError> {
        if session_token.is_empty() {
            return Err(AuthError);
        }
        self.tokens
            .read()
            .ok()
            .and_then(|tokens| tokens.get(session_token).cloned())
            .ok_or(AuthError)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn known_token_resolves_user() {
        let auth = StaticTokenAuth::new();
        auth.grant("tok-1", "user-1");

        assert_eq!(auth.authenticate("tok-1").await.unwrap(), "user-1");
        assert!(auth.authenticate("tok-2").await.is_err());
        assert!(auth.authenticate("").await.is_err());
    }
}
