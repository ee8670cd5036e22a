//! Streamable HTTP transport.
//!
//! Three HTTP methods multiplexed on one path (default `/mcp`):
//!
//! - `POST` submits one message or a batch; bodies carrying requests are
//!   answered over a per-POST SSE stream (or one buffered JSON body in
//!   JSON mode), bodies carrying only notifications or responses get an
//!   empty `202 Accepted`.
//! - `GET` opens the standalone SSE stream for server-initiated messages,
//!   optionally resuming from `Last-Event-Id`.
//! - `DELETE` terminates the session.
//!
//! Sessions are tracked by the opaque `Mcp-Session-Id` header minted on
//! `initialize`. Outbound SSE events pass through an [`EventStore`] so a
//! client reconnecting with `Last-Event-Id` can be replayed everything it
//! missed.

pub mod client;
pub mod events;
pub mod server;
pub mod session;
pub mod sse;

pub use client::{AuthRefresh, ReconnectPolicy, StreamableHttpClient, StreamableHttpClientConfig};
pub use events::{EventId, EventStore, InMemoryEventStore, StoredEvent};
pub use server::{AuthDenied, HttpAuthGate, StreamableHttpServer, StreamableHttpServerConfig};
pub use session::SessionId;

/// The session header, both directions.
pub const SESSION_ID_HEADER: &str = "Mcp-Session-Id";
/// The resumption header, request direction only.
pub const LAST_EVENT_ID_HEADER: &str = "Last-Event-Id";
/// Default endpoint path.
pub const DEFAULT_PATH: &str = "/mcp";
