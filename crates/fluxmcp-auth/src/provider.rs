//! The token-validation contract.

use async_trait::async_trait;
use std::collections::HashMap;
use thiserror::Error;

/// Failures while consulting an authorization server.
#[derive(Debug, Clone, Error)]
pub enum AuthError {
    /// The authorization server could not be reached.
    #[error("authorization server unreachable: {0}")]
    Unreachable(String),
    /// The authorization server answered with something unusable.
    #[error("invalid introspection response: {0}")]
    InvalidResponse(String),
}

/// What a provider learned about a token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenValidation {
    /// The token is active.
    pub valid: bool,
    /// The client the token was issued to.
    pub client_id: Option<String>,
    /// Granted scopes.
    pub scopes: Vec<String>,
}

impl TokenValidation {
    /// The canonical rejection.
    pub fn invalid() -> Self {
        Self {
            valid: false,
            client_id: None,
            scopes: Vec::new(),
        }
    }

    /// An accepted token for `client_id` with `scopes`.
    pub fn valid(client_id: impl Into<String>, scopes: Vec<String>) -> Self {
        Self {
            valid: true,
            client_id: Some(client_id.into()),
            scopes,
        }
    }

    /// Whether every scope in `required` was granted.
    pub fn has_scopes(&self, required: &[&str]) -> bool {
        required
            .iter()
            .all(|needed| self.scopes.iter().any(|granted| granted == needed))
    }
}

/// Validates bearer tokens.
#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// Validate `token`. An inactive or unknown token is an `Ok` carrying
    /// [`TokenValidation::invalid`]; `Err` means validation itself failed.
    async fn validate_token(&self, token: &str) -> Result<TokenValidation, AuthError>;
}

/// Fixed token table, for tests and development setups.
#[derive(Debug, Default)]
pub struct StaticTokenProvider {
    tokens: HashMap<String, TokenValidation>,
}

impl StaticTokenProvider {
    /// Empty table; every token is rejected.
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept `token` as `client_id` with `scopes`.
    pub fn with_token(
        mut self,
        token: impl Into<String>,
        client_id: impl Into<String>,
        scopes: &[&str],
    ) -> Self {
        self.tokens.insert(
            token.into(),
            TokenValidation::valid(client_id, scopes.iter().map(ToString::to_string).collect()),
        );
        self
    }
}

#[async_trait]
impl AuthProvider for StaticTokenProvider {
    async fn validate_token(&self, token: &str) -> Result<TokenValidation, AuthError> {
        Ok(self
            .tokens
            .get(token)
            .cloned()
            .unwrap_or_else(TokenValidation::invalid))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn static_provider_accepts_known_tokens() {
        let provider = StaticTokenProvider::new().with_token("tok", "cli", &["tools:execute"]);
        let validation = provider.validate_token("tok").await.unwrap();
        assert!(validation.valid);
        assert_eq!(validation.client_id.as_deref(), Some("cli"));
        assert!(validation.has_scopes(&["tools:execute"]));
        assert!(!validation.has_scopes(&["tools:execute", "resources:read"]));
    }

    #[tokio::test]
    async fn static_provider_rejects_unknown_tokens() {
        let provider = StaticTokenProvider::new();
        let validation = provider.validate_token("nope").await.unwrap();
        assert_eq!(validation, TokenValidation::invalid());
    }
}
