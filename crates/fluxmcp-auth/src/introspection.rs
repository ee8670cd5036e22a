//! OAuth 2.0 token introspection (RFC 7662).
//!
//! Posts the token to the authorization server's introspection endpoint
//! with client credentials and maps the response onto
//! [`TokenValidation`]. Opaque tokens and revocation both work because the
//! authorization server is the source of truth on every call; put a
//! [`crate::ValidationCache`] in front when that round trip is too hot.

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::Deserialize;
use tracing::debug;

use crate::provider::{AuthError, AuthProvider, TokenValidation};

/// Introspection response per RFC 7662 §2.2; only the fields the runtime
/// consumes.
#[derive(Debug, Clone, Deserialize)]
struct IntrospectionResponse {
    active: bool,
    #[serde(default)]
    scope: Option<String>,
    #[serde(default)]
    client_id: Option<String>,
    #[serde(default)]
    exp: Option<u64>,
}

/// RFC 7662 introspection client.
pub struct IntrospectionProvider {
    endpoint: String,
    client_id: String,
    client_secret: Option<String>,
    http: reqwest::Client,
}

// Token material must never reach logs.
impl std::fmt::Debug for IntrospectionProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IntrospectionProvider")
            .field("endpoint", &self.endpoint)
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .finish()
    }
}

impl IntrospectionProvider {
    /// Client posting to `endpoint` with the given credentials.
    pub fn new(
        endpoint: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: Option<String>,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            client_id: client_id.into(),
            client_secret,
            http: reqwest::Client::new(),
        }
    }

    fn basic_credentials(&self) -> String {
        let raw = format!(
            "{}:{}",
            self.client_id,
            self.client_secret.as_deref().unwrap_or("")
        );
        format!("Basic {}", BASE64.encode(raw))
    }
}

#[async_trait]
impl AuthProvider for IntrospectionProvider {
    async fn validate_token(&self, token: &str) -> Result<TokenValidation, AuthError> {
        let response = self
            .http
            .post(&self.endpoint)
            .header(reqwest::header::AUTHORIZATION, self.basic_credentials())
            .form(&[("token", token), ("token_type_hint", "access_token")])
            .send()
            .await
            .map_err(|e| AuthError::Unreachable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AuthError::InvalidResponse(format!(
                "introspection endpoint answered {status}"
            )));
        }

        let parsed: IntrospectionResponse = response
            .json()
            .await
            .map_err(|e| AuthError::InvalidResponse(e.to_string()))?;

        if !parsed.active {
            debug!("introspection: token inactive");
            return Ok(TokenValidation::invalid());
        }
        // An expired `exp` with active=true is a confused server; treat
        // the timestamp as authoritative.
        if let Some(exp) = parsed.exp {
            let now = chrono::Utc::now().timestamp();
            if now >= 0 && (now as u64) >= exp {
                debug!("introspection: token expired by exp claim");
                return Ok(TokenValidation::invalid());
            }
        }

        Ok(TokenValidation {
            valid: true,
            client_id: parsed.client_id,
            scopes: parsed
                .scope
                .unwrap_or_default()
                .split_whitespace()
                .map(ToString::to_string)
                .collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn debug_redacts_secret() {
        let provider = IntrospectionProvider::new(
            "https://auth.example/introspect",
            "cli",
            Some("shh".into()),
        );
        let debug = format!("{provider:?}");
        assert!(debug.contains("[REDACTED]"));
        assert!(!debug.contains("shh"));
    }

    #[test]
    fn basic_credentials_encode_id_and_secret() {
        let provider =
            IntrospectionProvider::new("https://auth.example", "id", Some("secret".into()));
        assert_eq!(
            provider.basic_credentials(),
            format!("Basic {}", BASE64.encode("id:secret"))
        );
    }

    #[test]
    fn response_scope_splits_on_whitespace() {
        let parsed: IntrospectionResponse = serde_json::from_value(serde_json::json!({
            "active": true,
            "scope": "tools:execute resources:read",
            "client_id": "cli",
        }))
        .unwrap();
        assert!(parsed.active);
        let scopes: Vec<&str> = parsed
            .scope
            .as_deref()
            .unwrap()
            .split_whitespace()
            .collect();
        assert_eq!(scopes, vec!["tools:execute", "resources:read"]);
    }
}
