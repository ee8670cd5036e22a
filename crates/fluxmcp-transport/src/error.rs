//! Transport error type.

use thiserror::Error;

/// Result alias for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;

/// Everything a transport can fail with.
#[derive(Debug, Clone, Error)]
#[non_exhaustive]
pub enum TransportError {
    /// Could not establish the underlying connection or process.
    #[error("connect failed: {0}")]
    ConnectFailed(String),

    /// The connection went away underneath us.
    #[error("connection lost: {0}")]
    ConnectionLost(String),

    /// A send did not reach the wire.
    #[error("send failed: {0}")]
    SendFailed(String),

    /// A frame could not be read.
    #[error("receive failed: {0}")]
    ReceiveFailed(String),

    /// A frame violated the wire protocol (bad UTF-8, bad JSON, bad shape,
    /// embedded newline). Recoverable: the session continues.
    #[error("framing error: {0}")]
    Framing(String),

    /// The peer answered with an HTTP status outside the protocol's
    /// expectations.
    #[error("unexpected HTTP status {status}: {detail}")]
    HttpStatus {
        /// The status code received.
        status: u16,
        /// Response detail, if any.
        detail: String,
    },

    /// The transport was used before `start` or after `stop`.
    #[error("transport not connected")]
    NotConnected,

    /// The transport was constructed with invalid options.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// An underlying I/O failure.
    #[error("io error: {0}")]
    Io(String),
}

impl From<std::io::Error> for TransportError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<serde_json::Error> for TransportError {
    fn from(err: serde_json::Error) -> Self {
        Self::Framing(err.to_string())
    }
}
