//! JSON-RPC 2.0 message model.
//!
//! Every MCP wire value is exactly one of four shapes: a [`JsonRpcRequest`]
//! (carries an id, expects exactly one reply), a [`JsonRpcResponse`]
//! (terminates a request with a result or an error), a
//! [`JsonRpcNotification`] (no id, no reply), or a batch of those. The
//! decode path additionally distinguishes three failure classes so callers
//! can answer with the right error code: bytes that are not UTF-8, text
//! that is not JSON, and JSON that is not a well-formed JSON-RPC value.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::fmt;

use crate::types::RequestId;

/// The only protocol version this crate speaks.
pub const JSONRPC_VERSION: &str = "2.0";

/// Zero-sized guard that serializes as `"2.0"` and refuses anything else
/// on deserialization. Having it in every message struct makes a missing
/// or wrong `jsonrpc` field a shape error rather than a silent pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JsonRpcVersion;

impl Serialize for JsonRpcVersion {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(JSONRPC_VERSION)
    }
}

impl<'de> Deserialize<'de> for JsonRpcVersion {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let version = String::deserialize(deserializer)?;
        if version == JSONRPC_VERSION {
            Ok(JsonRpcVersion)
        } else {
            Err(serde::de::Error::custom(format!(
                "unsupported jsonrpc version {version:?}, expected \"{JSONRPC_VERSION}\""
            )))
        }
    }
}

/// A request: expects exactly one matching response or error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    /// Always `"2.0"`.
    pub jsonrpc: JsonRpcVersion,
    /// Request identifier, unique among in-flight requests of a session.
    pub id: RequestId,
    /// Method name, e.g. `tools/call`.
    pub method: String,
    /// Method parameters.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcRequest {
    /// Create a request.
    pub fn new(id: impl Into<RequestId>, method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JsonRpcVersion,
            id: id.into(),
            method: method.into(),
            params,
        }
    }
}

/// A notification: fire-and-forget, never answered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcNotification {
    /// Always `"2.0"`.
    pub jsonrpc: JsonRpcVersion,
    /// Method name, e.g. `notifications/progress`.
    pub method: String,
    /// Notification parameters.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcNotification {
    /// Create a notification.
    pub fn new(method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JsonRpcVersion,
            method: method.into(),
            params,
        }
    }
}

/// The error object carried by an error response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcError {
    /// Numeric error code, see [`crate::error::ErrorCode`].
    pub code: i32,
    /// Human-readable summary.
    pub message: String,
    /// Structured detail, e.g. schema violations or supported versions.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// Response id. `None` is legal only when the failing message could not be
/// parsed and therefore has no recoverable id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResponseId(pub Option<RequestId>);

impl ResponseId {
    /// Id for a response correlated with a request.
    pub fn of(id: RequestId) -> Self {
        Self(Some(id))
    }

    /// The null id used for parse-error responses.
    pub fn null() -> Self {
        Self(None)
    }

    /// The request id, unless this is a parse-error response.
    pub fn request_id(&self) -> Option<&RequestId> {
        self.0.as_ref()
    }
}

/// Exactly one of `result` or `error`, flattened into the response object
/// so the type system rules out carrying both.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResponsePayload {
    /// Success.
    Result {
        /// The method's result value.
        result: Value,
    },
    /// Failure.
    Error {
        /// The error object.
        error: JsonRpcError,
    },
}

/// A response: terminates a request with success or failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    /// Always `"2.0"`.
    pub jsonrpc: JsonRpcVersion,
    /// The id of the request being answered, null only for parse errors.
    pub id: ResponseId,
    /// Result or error, never both.
    #[serde(flatten)]
    pub payload: ResponsePayload,
}

impl JsonRpcResponse {
    /// Successful response for `id`.
    pub fn result(id: RequestId, result: Value) -> Self {
        Self {
            jsonrpc: JsonRpcVersion,
            id: ResponseId::of(id),
            payload: ResponsePayload::Result { result },
        }
    }

    /// Error response for `id`.
    pub fn error(id: RequestId, error: JsonRpcError) -> Self {
        Self {
            jsonrpc: JsonRpcVersion,
            id: ResponseId::of(id),
            payload: ResponsePayload::Error { error },
        }
    }

    /// Error response with a null id, for messages whose id could not be
    /// recovered.
    pub fn error_detached(error: JsonRpcError) -> Self {
        Self {
            jsonrpc: JsonRpcVersion,
            id: ResponseId::null(),
            payload: ResponsePayload::Error { error },
        }
    }

    /// The result value, if this is a success.
    pub fn ok(&self) -> Option<&Value> {
        match &self.payload {
            ResponsePayload::Result { result } => Some(result),
            ResponsePayload::Error { .. } => None,
        }
    }

    /// The error object, if this is a failure.
    pub fn err(&self) -> Option<&JsonRpcError> {
        match &self.payload {
            ResponsePayload::Result { .. } => None,
            ResponsePayload::Error { error } => Some(error),
        }
    }

    /// Whether this response carries a result.
    pub fn is_success(&self) -> bool {
        matches!(self.payload, ResponsePayload::Result { .. })
    }
}

/// Any single JSON-RPC value, or a batch of them.
///
/// Untagged: classification is by shape. Order matters — a request has both
/// `id` and `method` and must be tried before the notification (`method`
/// only) and the response (`id` plus `result`/`error`) arms.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum JsonRpcMessage {
    /// A request.
    Request(JsonRpcRequest),
    /// A notification.
    Notification(JsonRpcNotification),
    /// A response or error.
    Response(JsonRpcResponse),
    /// A batch, serialized as a JSON array.
    Batch(Vec<JsonRpcMessage>),
}

impl JsonRpcMessage {
    /// The method name, for requests and notifications.
    pub fn method(&self) -> Option<&str> {
        match self {
            Self::Request(r) => Some(&r.method),
            Self::Notification(n) => Some(&n.method),
            Self::Response(_) | Self::Batch(_) => None,
        }
    }

    /// Whether this message (or, for a batch, any member) is a request and
    /// therefore obligates the receiver to reply.
    pub fn expects_reply(&self) -> bool {
        match self {
            Self::Request(_) => true,
            Self::Notification(_) | Self::Response(_) => false,
            Self::Batch(items) => items.iter().any(JsonRpcMessage::expects_reply),
        }
    }

    /// Flatten into individual non-batch messages, preserving order.
    pub fn into_items(self) -> Vec<JsonRpcMessage> {
        match self {
            Self::Batch(items) => items
                .into_iter()
                .flat_map(JsonRpcMessage::into_items)
                .collect(),
            other => vec![other],
        }
    }
}

impl From<JsonRpcRequest> for JsonRpcMessage {
    fn from(r: JsonRpcRequest) -> Self {
        Self::Request(r)
    }
}

impl From<JsonRpcNotification> for JsonRpcMessage {
    fn from(n: JsonRpcNotification) -> Self {
        Self::Notification(n)
    }
}

impl From<JsonRpcResponse> for JsonRpcMessage {
    fn from(r: JsonRpcResponse) -> Self {
        Self::Response(r)
    }
}

/// Why a frame could not be turned into a [`JsonRpcMessage`].
///
/// The three classes map to distinct wire errors: `InvalidUtf8` and
/// `Parse` answer with `-32700`, `Shape` with `-32600`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    /// The byte stream is not UTF-8.
    #[error("frame is not valid UTF-8: {0}")]
    InvalidUtf8(String),
    /// The text is not JSON at all.
    #[error("frame is not valid JSON: {0}")]
    Parse(String),
    /// Valid JSON, but not a well-formed JSON-RPC 2.0 value.
    #[error("frame is not a JSON-RPC 2.0 message: {0}")]
    Shape(String),
}

/// Decode one frame of bytes into a message, classifying failures.
pub fn decode(bytes: &[u8]) -> Result<JsonRpcMessage, DecodeError> {
    let text = std::str::from_utf8(bytes).map_err(|e| DecodeError::InvalidUtf8(e.to_string()))?;
    decode_str(text)
}

/// Decode one frame of text into a message, classifying failures.
pub fn decode_str(text: &str) -> Result<JsonRpcMessage, DecodeError> {
    let value: Value =
        serde_json::from_str(text).map_err(|e| DecodeError::Parse(e.to_string()))?;
    serde_json::from_value(value).map_err(|e| DecodeError::Shape(e.to_string()))
}

/// Serialize a message to its canonical single-line wire form.
///
/// Serialization of the in-memory model is infallible in practice; the
/// `Result` only surfaces allocator-level failures from `serde_json`.
pub fn encode(message: &JsonRpcMessage) -> Result<String, serde_json::Error> {
    serde_json::to_string(message)
}

impl fmt::Display for JsonRpcMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Request(r) => write!(f, "request {} id={}", r.method, r.id),
            Self::Notification(n) => write!(f, "notification {}", n.method),
            Self::Response(r) => match (&r.id.0, r.is_success()) {
                (Some(id), true) => write!(f, "response id={id}"),
                (Some(id), false) => write!(f, "error id={id}"),
                (None, _) => write!(f, "error id=null"),
            },
            Self::Batch(items) => write!(f, "batch of {}", items.len()),
        }
    }
}
