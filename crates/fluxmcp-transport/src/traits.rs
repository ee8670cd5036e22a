//! The transport contract.

use async_trait::async_trait;
use fluxmcp_protocol::JsonRpcMessage;

use crate::callbacks::TransportCallbacks;
use crate::error::TransportResult;
use crate::message::SendOptions;

/// A bidirectional, message-oriented channel between two MCP peers.
///
/// Lifecycle: construct, install callbacks (constructor-specific, always
/// before `start`), `start`, exchange messages, `stop`. After `stop` the
/// transport refuses sends and has invoked `on_close` exactly once;
/// stopping again is a no-op.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Install the callback block events are delivered through. Must be
    /// called before `start`; calling later replaces callbacks for
    /// subsequent starts only.
    fn set_callbacks(&self, callbacks: TransportCallbacks);

    /// Begin accepting or establishing connections and delivering inbound
    /// messages to the installed callbacks.
    async fn start(&self) -> TransportResult<()>;

    /// Refuse new sends, cancel outstanding work, close underlying
    /// resources, and emit `on_close` once.
    async fn stop(&self) -> TransportResult<()>;

    /// Enqueue a message for transmission. May return before bytes hit the
    /// wire; asynchronous failures surface through `on_error`.
    async fn send(&self, message: JsonRpcMessage, options: SendOptions) -> TransportResult<()>;

    /// Whether the transport currently has a live connection.
    fn is_connected(&self) -> bool;

    /// The opaque session id, for transports that have one.
    fn session_id(&self) -> Option<String> {
        None
    }
}
