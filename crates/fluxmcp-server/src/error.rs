//! Server error type.

use fluxmcp_protocol::McpError;
use fluxmcp_transport::TransportError;
use thiserror::Error;

/// Result alias for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

/// Failures surfaced by the server engine and registries.
#[derive(Debug, Clone, Error)]
pub enum ServerError {
    /// A registry was mutated while the server was running.
    #[error("registry is frozen while the server is running")]
    RegistryFrozen,

    /// A registration collided with an existing name or URI.
    #[error("duplicate registration: {0}")]
    DuplicateRegistration(String),

    /// A protocol-level failure; carries the wire error.
    #[error("protocol error: {0}")]
    Protocol(#[from] McpError),

    /// The transport failed underneath the engine.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// The engine was used outside its lifecycle.
    #[error("invalid lifecycle state: {0}")]
    Lifecycle(String),
}
