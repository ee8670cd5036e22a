//! MCP error taxonomy.
//!
//! [`McpError`] is the one error value that crosses every public boundary
//! in the workspace. It carries an [`ErrorCode`] (the JSON-RPC wire code),
//! a message, and optional structured data, and converts losslessly to and
//! from the wire-level [`JsonRpcError`] object. Engines convert whatever
//! internal failures they hit into an `McpError` at the dispatcher
//! boundary; nothing below that boundary panics across it.

use serde_json::Value;
use thiserror::Error;

use crate::jsonrpc::JsonRpcError;

/// Result alias used across the workspace.
pub type McpResult<T> = Result<T, McpError>;

/// Wire error codes: the five JSON-RPC 2.0 standard codes plus the MCP
/// implementation-defined range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// `-32700`: the frame was not valid JSON (or not valid UTF-8).
    ParseError,
    /// `-32600`: valid JSON that is not a well-formed JSON-RPC value, or a
    /// request that violates the session lifecycle.
    InvalidRequest,
    /// `-32601`: no handler registered for the method.
    MethodNotFound,
    /// `-32602`: parameters failed validation.
    InvalidParams,
    /// `-32603`: a handler failed; details in `data`.
    InternalError,
    /// `-32000`: the session ended while the request was pending.
    ConnectionClosed,
    /// `-32001`: the per-request deadline elapsed.
    RequestTimeout,
    /// `-32002`: a notification was malformed or arrived out of protocol.
    InvalidNotification,
    /// `-32800`: the request was cancelled; never an answer on the wire,
    /// only a local resolution of a waiter.
    Cancelled,
    /// `-32003`: missing or invalid bearer token.
    Unauthorized,
    /// `-32004`: valid token without the scopes the method requires.
    InsufficientScope,
    /// Anything else a peer may send in the application range.
    Other(i32),
}

impl ErrorCode {
    /// The numeric wire code.
    pub const fn code(self) -> i32 {
        match self {
            Self::ParseError => -32700,
            Self::InvalidRequest => -32600,
            Self::MethodNotFound => -32601,
            Self::InvalidParams => -32602,
            Self::InternalError => -32603,
            Self::ConnectionClosed => -32000,
            Self::RequestTimeout => -32001,
            Self::InvalidNotification => -32002,
            Self::Unauthorized => -32003,
            Self::InsufficientScope => -32004,
            Self::Cancelled => -32800,
            Self::Other(code) => code,
        }
    }

    /// Canonical message for the code.
    pub const fn message(self) -> &'static str {
        match self {
            Self::ParseError => "Parse error",
            Self::InvalidRequest => "Invalid Request",
            Self::MethodNotFound => "Method not found",
            Self::InvalidParams => "Invalid params",
            Self::InternalError => "Internal error",
            Self::ConnectionClosed => "Connection closed",
            Self::RequestTimeout => "Request timed out",
            Self::InvalidNotification => "Invalid notification",
            Self::Unauthorized => "Unauthorized",
            Self::InsufficientScope => "Insufficient scope",
            Self::Cancelled => "Request cancelled",
            Self::Other(_) => "Application error",
        }
    }
}

impl From<i32> for ErrorCode {
    fn from(code: i32) -> Self {
        match code {
            -32700 => Self::ParseError,
            -32600 => Self::InvalidRequest,
            -32601 => Self::MethodNotFound,
            -32602 => Self::InvalidParams,
            -32603 => Self::InternalError,
            -32000 => Self::ConnectionClosed,
            -32001 => Self::RequestTimeout,
            -32002 => Self::InvalidNotification,
            -32003 => Self::Unauthorized,
            -32004 => Self::InsufficientScope,
            -32800 => Self::Cancelled,
            other => Self::Other(other),
        }
    }
}

/// The error value used throughout the workspace.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{} ({}): {message}", self.code.message(), self.code.code())]
pub struct McpError {
    /// Wire code.
    pub code: ErrorCode,
    /// Human-readable detail.
    pub message: String,
    /// Structured detail carried in the wire error's `data` field.
    pub data: Option<Value>,
}

impl McpError {
    /// Create an error with the given code and message.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    /// Attach structured data.
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    /// `-32700` for an unparseable frame.
    pub fn parse(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ParseError, message)
    }

    /// `-32600` for a malformed or out-of-lifecycle request.
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidRequest, message)
    }

    /// `-32601` for an unknown method.
    pub fn method_not_found(method: &str) -> Self {
        Self::new(ErrorCode::MethodNotFound, format!("method not found: {method}"))
    }

    /// `-32602` for invalid parameters.
    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidParams, message)
    }

    /// `-32603` for a handler failure.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }

    /// `-32000` for a session that ended under a pending request.
    pub fn connection_closed() -> Self {
        Self::new(ErrorCode::ConnectionClosed, "session closed while request was pending")
    }

    /// `-32001` for an elapsed deadline.
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::RequestTimeout, message)
    }

    /// `-32800` for a cancelled request.
    pub fn cancelled(reason: Option<&str>) -> Self {
        Self::new(
            ErrorCode::Cancelled,
            reason.unwrap_or("request cancelled").to_string(),
        )
    }

    /// True when this error means the whole session is gone, not just one
    /// request.
    pub fn is_terminal(&self) -> bool {
        matches!(self.code, ErrorCode::ConnectionClosed)
    }
}

impl From<McpError> for JsonRpcError {
    fn from(err: McpError) -> Self {
        Self {
            code: err.code.code(),
            message: err.message,
            data: err.data,
        }
    }
}

impl From<JsonRpcError> for McpError {
    fn from(err: JsonRpcError) -> Self {
        Self {
            code: ErrorCode::from(err.code),
            message: err.message,
            data: err.data,
        }
    }
}

impl From<serde_json::Error> for McpError {
    fn from(err: serde_json::Error) -> Self {
        Self::internal(format!("serialization failed: {err}"))
    }
}
