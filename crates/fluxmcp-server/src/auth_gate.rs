//! The auth gate: bearer validation and scope enforcement ahead of
//! dispatch.
//!
//! Two enforcement points share this type. The engine consults
//! [`AuthGate::check`] before dispatching any inbound request, on every
//! transport. The streamable HTTP server additionally mounts the gate as
//! its [`HttpAuthGate`] so denials short-circuit at the HTTP layer with
//! 401/403 and a `WWW-Authenticate` challenge.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

use fluxmcp_auth::{AuthProvider, is_public_method, required_scopes};
use fluxmcp_protocol::{ErrorCode, McpError};
use fluxmcp_transport::AuthInfo;
use fluxmcp_transport::streamable::{AuthDenied, HttpAuthGate};

/// Validates tokens and enforces the scope table.
pub struct AuthGate {
    provider: Arc<dyn AuthProvider>,
    /// Appended to challenges as `resource_metadata="…"` when set.
    resource_metadata: Option<String>,
}

impl AuthGate {
    /// Gate backed by `provider`. Wrap the provider in a
    /// [`fluxmcp_auth::ValidationCache`] to keep introspection off the hot
    /// path.
    pub fn new(provider: Arc<dyn AuthProvider>) -> Self {
        Self {
            provider,
            resource_metadata: None,
        }
    }

    /// Advertise a protected-resource metadata URL in challenges.
    pub fn with_resource_metadata(mut self, url: impl Into<String>) -> Self {
        self.resource_metadata = Some(url.into());
        self
    }

    fn challenge(&self, error: &str) -> String {
        let mut value = format!("Bearer error={error:?}");
        if let Some(metadata) = &self.resource_metadata {
            value.push_str(&format!(", resource_metadata={metadata:?}"));
        }
        value
    }

    /// Authorize one method. Public methods always pass; everything else
    /// needs a valid token carrying the method's required scopes.
    ///
    /// On success the returned [`AuthInfo`] carries the validated client
    /// id and granted scopes.
    pub async fn check(&self, method: &str, auth: &AuthInfo) -> Result<AuthInfo, McpError> {
        if is_public_method(method) {
            return Ok(auth.clone());
        }

        let Some(token) = auth.bearer_token.as_deref() else {
            return Err(McpError::new(
                ErrorCode::Unauthorized,
                format!("method {method} requires a bearer token"),
            ));
        };

        let validation = self
            .provider
            .validate_token(token)
            .await
            .map_err(|e| McpError::new(ErrorCode::Unauthorized, e.to_string()))?;

        if !validation.valid {
            debug!(method, "rejected invalid token");
            return Err(McpError::new(
                ErrorCode::Unauthorized,
                "token is invalid or expired",
            ));
        }

        let needed = required_scopes(method);
        if !validation.has_scopes(needed) {
            debug!(method, ?needed, "rejected for missing scopes");
            return Err(McpError::new(
                ErrorCode::InsufficientScope,
                format!("method {method} requires scopes {needed:?}"),
            ));
        }

        Ok(AuthInfo {
            bearer_token: auth.bearer_token.clone(),
            client_id: validation.client_id,
            scopes: validation.scopes,
        })
    }
}

impl std::fmt::Debug for AuthGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthGate")
            .field("resource_metadata", &self.resource_metadata)
            .finish()
    }
}

#[async_trait]
impl HttpAuthGate for AuthGate {
    async fn authorize(&self, methods: &[&str], auth: &AuthInfo) -> Result<AuthInfo, AuthDenied> {
        let mut enriched = auth.clone();
        for method in methods {
            match self.check(method, auth).await {
                Ok(info) => enriched = info,
                Err(e) if e.code == ErrorCode::InsufficientScope => {
                    return Err(AuthDenied {
                        status: 403,
                        challenge: self.challenge("insufficient_scope"),
                        message: e.message,
                    });
                }
                Err(e) => {
                    return Err(AuthDenied {
                        status: 401,
                        challenge: self.challenge("invalid_token"),
                        message: e.message,
                    });
                }
            }
        }
        Ok(enriched)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fluxmcp_auth::StaticTokenProvider;
    use pretty_assertions::assert_eq;

    fn gate() -> AuthGate {
        let provider = StaticTokenProvider::new()
            .with_token("exec", "cli-1", &["tools:execute", "tools:read"])
            .with_token("read-only", "cli-2", &["tools:read"]);
        AuthGate::new(Arc::new(provider))
    }

    #[tokio::test]
    async fn public_methods_bypass_the_gate() {
        let gate = gate();
        let anonymous = AuthInfo::default();
        for method in ["initialize", "notifications/initialized", "ping"] {
            assert!(gate.check(method, &anonymous).await.is_ok());
        }
    }

    #[tokio::test]
    async fn missing_token_is_unauthorized() {
        let err = gate()
            .check("tools/call", &AuthInfo::default())
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::Unauthorized);
    }

    #[tokio::test]
    async fn invalid_token_is_unauthorized() {
        let err = gate()
            .check("tools/call", &AuthInfo::bearer("bogus"))
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::Unauthorized);
    }

    #[tokio::test]
    async fn insufficient_scope_is_distinct() {
        let err = gate()
            .check("tools/call", &AuthInfo::bearer("read-only"))
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::InsufficientScope);
    }

    #[tokio::test]
    async fn valid_token_enriches_auth_info() {
        let info = gate()
            .check("tools/call", &AuthInfo::bearer("exec"))
            .await
            .unwrap();
        assert_eq!(info.client_id.as_deref(), Some("cli-1"));
        assert!(info.scopes.contains(&"tools:execute".to_string()));
    }

    #[tokio::test]
    async fn http_gate_maps_to_status_and_challenge() {
        let gate = gate().with_resource_metadata("https://srv/.well-known/oauth");
        let denied = gate
            .authorize(&["tools/call"], &AuthInfo::default())
            .await
            .unwrap_err();
        assert_eq!(denied.status, 401);
        assert!(denied.challenge.contains("invalid_token"));
        assert!(denied.challenge.contains("resource_metadata"));

        let denied = gate
            .authorize(&["tools/call"], &AuthInfo::bearer("read-only"))
            .await
            .unwrap_err();
        assert_eq!(denied.status, 403);
        assert!(denied.challenge.contains("insufficient_scope"));
    }
}
