// Licensed under the MIT License.

//! Obtains an OAuth2 bearer token via the client-credentials grant against the
//! manager's token endpoint (`/auth/realms/<realm>/protocol/openid-connect/token`),
//! used by the gateway client to authenticate before opening the channel.

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TokenError {
    #[error("token endpoint rejected credentials")]
    AuthFailed,
    #[error("token endpoint request failed: {0}")]
    Transport(String),
}

/// Issues bearer tokens for a gateway's credentials.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// # Errors
    /// Returns [`TokenError::AuthFailed`] if the token endpoint rejects the
    /// credentials, or [`TokenError::Transport`] on any lower-level I/O failure.
    async fn fetch_token(
        &self,
        token_endpoint: &str,
        client_id: &str,
        client_secret: &str,
    ) -> Result<String, TokenError>;
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

/// An [`TokenProvider`] backed by a real HTTP client-credentials grant.
#[derive(Clone, Default)]
pub struct HttpTokenProvider {
    http: reqwest::Client,
}

impl HttpTokenProvider {
    #[must_use]
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl TokenProvider for HttpTokenProvider {
    async fn fetch_token(
        &self,
        token_endpoint: &str,
        client_id: &str,
        client_secret: &str,
    ) -> Result<String, TokenError> {
        let params = [
            ("grant_type", "client_credentials"),
            ("client_id", client_id),
            ("client_secret", client_secret),
        ];
        let response = self
            .http
            .post(token_endpoint)
            .form(&params)
            .send()
            .await
            .map_err(|err| TokenError::Transport(err.to_string()))?;
        if response.status() == reqwest::StatusCode::UNAUTHORIZED
            || response.status() == reqwest::StatusCode::FORBIDDEN
        {
            return Err(TokenError::AuthFailed);
        }
        let response = response
            .error_for_status()
            .map_err(|err| TokenError::Transport(err.to_string()))?;
        let body: TokenResponse = response
            .json()
            .await
            .map_err(|err| TokenError::Transport(err.to_string()))?;
        Ok(body.access_token)
    }
}

/// A [`TokenProvider`] that always returns a fixed token, for tests and example
/// binaries that do not need a real identity provider in the loop.
pub struct StaticTokenProvider {
    token: Option<String>,
}

impl StaticTokenProvider {
    #[must_use]
    pub fn accepting(token: impl Into<String>) -> Self {
        Self {
            token: Some(token.into()),
        }
    }

    #[must_use]
    pub fn rejecting() -> Self {
        Self { token: None }
    }
}

#[async_trait]
impl TokenProvider for StaticTokenProvider {
    async fn fetch_token(
        &self,
        _token_endpoint: &str,
        _client_id: &str,
        _client_secret: &str,
    ) -> Result<String, TokenError> {
        self.token.clone().ok_or(TokenError::AuthFailed)
    }
}
