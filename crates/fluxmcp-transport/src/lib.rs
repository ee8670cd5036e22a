//! # fluxmcp-transport
//!
//! Transports for the MCP runtime. A [`Transport`] moves framed JSON-RPC
//! messages between peers and reports everything that happens through
//! callbacks installed before [`Transport::start`]:
//!
//! - [`stdio`]: newline-delimited JSON over the current process's
//!   stdin/stdout (server side) or a spawned child's pipes (client side).
//! - [`streamable`]: the streamable HTTP transport — POST plus SSE on one
//!   path, opaque session ids, and resumable event streams backed by an
//!   [`streamable::EventStore`].
//! - [`inmemory`]: a channel-backed pair of transports for tests.
//!
//! Transports own their connection resources exclusively; engines hold a
//! shared reference to the transport and never touch pipes or sockets
//! directly.

pub mod callbacks;
pub mod error;
pub mod inmemory;
pub mod message;
pub mod stdio;
pub mod streamable;
pub mod traits;

pub use callbacks::TransportCallbacks;
pub use error::{TransportError, TransportResult};
pub use message::{AuthInfo, SendOptions};
pub use traits::Transport;
