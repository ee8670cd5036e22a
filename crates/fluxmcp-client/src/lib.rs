//! # fluxmcp-client
//!
//! The client half of the MCP runtime: request correlation with
//! deadlines, progress-driven timeout resets, cancellation, the
//! handshake, typed operations over the full method surface, and
//! handlers for server-initiated requests (ping, sampling, roots).
//!
//! ```no_run
//! use std::sync::Arc;
//! use fluxmcp_client::{Client, ClientConfig, ClientHandlers};
//! use fluxmcp_transport::stdio::{StdioChildParams, StdioTransport};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let transport = Arc::new(StdioTransport::spawn(
//!     StdioChildParams::new("my-mcp-server").args(["--verbose"]),
//! ));
//! let client = Client::connect(
//!     transport,
//!     ClientConfig::default(),
//!     ClientHandlers::new(),
//!     None,
//! )
//! .await?;
//!
//! let init = client.initialize().await?;
//! println!("connected to {}", init.server_info.name);
//!
//! let tools = client.list_tools(None).await?;
//! for tool in tools.tools {
//!     println!("tool: {}", tool.name);
//! }
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod handlers;
pub mod pending;

pub use client::{Client, ClientConfig, ClientState, StateCallback};
pub use handlers::{ClientHandlers, SamplingHandler};
pub use pending::{PendingRequests, ProgressCallback, RequestOptions};
