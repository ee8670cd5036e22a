//! # fluxmcp-protocol
//!
//! Protocol core for the Model Context Protocol (MCP): the JSON-RPC 2.0
//! message model, the MCP error taxonomy, protocol version negotiation,
//! capability types, the full set of MCP domain types, and a JSON Schema
//! subset validator used to check tool-call arguments.
//!
//! This crate is transport-agnostic. Everything here is plain data plus
//! pure functions; the engine crates (`fluxmcp-server`, `fluxmcp-client`)
//! wire these types to transports.

pub mod error;
pub mod jsonrpc;
pub mod methods;
pub mod schema;
pub mod types;
pub mod version;

pub use error::{ErrorCode, McpError, McpResult};
pub use jsonrpc::{
    JsonRpcError, JsonRpcMessage, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse,
    JsonRpcVersion, ResponseId,
};
pub use types::RequestId;
pub use version::{LATEST_VERSION, SUPPORTED_VERSIONS, negotiate_version};

/// Hard upper bound on a single serialized message, in bytes.
///
/// Transports reject frames above this size before handing them to the
/// engine.
pub const MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;
