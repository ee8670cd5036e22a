//! Per-send options and authenticated-peer metadata.

use fluxmcp_protocol::RequestId;
use std::sync::Arc;

/// Invoked by a transport when it observes a new resumption token (the SSE
/// last-event-id) for the request this send belongs to.
pub type ResumptionTokenCallback = Arc<dyn Fn(String) + Send + Sync>;

/// Options attached to one [`crate::Transport::send`] call.
#[derive(Clone, Default)]
pub struct SendOptions {
    /// For server replies: the inbound request this message answers. The
    /// streamable HTTP server uses it to pick the SSE stream; stdio
    /// ignores it.
    pub related_request_id: Option<RequestId>,

    /// For client resumption: re-attach to the stream that was delivering
    /// this request's reply instead of re-POSTing it.
    pub resumption_token: Option<String>,

    /// Observe resumption tokens as the transport mints or receives them.
    pub on_resumption_token: Option<ResumptionTokenCallback>,
}

impl SendOptions {
    /// Options relating this send to an inbound request.
    pub fn related_to(id: RequestId) -> Self {
        Self {
            related_request_id: Some(id),
            ..Default::default()
        }
    }
}

impl std::fmt::Debug for SendOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SendOptions")
            .field("related_request_id", &self.related_request_id)
            .field("resumption_token", &self.resumption_token)
            .field(
                "on_resumption_token",
                &self.on_resumption_token.as_ref().map(|_| "<callback>"),
            )
            .finish()
    }
}

/// What the transport learned about the peer's identity, delivered
/// alongside each inbound message. Only the HTTP transport populates this;
/// stdio peers are implicitly trusted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthInfo {
    /// The bearer token presented in the `Authorization` header, verbatim.
    pub bearer_token: Option<String>,
    /// Client id, once an auth provider has validated the token.
    pub client_id: Option<String>,
    /// Granted scopes, once validated.
    pub scopes: Vec<String>,
}

impl AuthInfo {
    /// Metadata for a request that presented a bearer token.
    pub fn bearer(token: impl Into<String>) -> Self {
        Self {
            bearer_token: Some(token.into()),
            ..Default::default()
        }
    }
}
