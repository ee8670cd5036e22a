//! # fluxmcp-server
//!
//! The server half of the MCP runtime: a per-session protocol engine
//! (dispatch, lifecycle gate, cancellation, server-initiated requests),
//! the tool/prompt/resource registries with pagination and subscription
//! fan-out, and the optional bearer-token auth gate.
//!
//! ```no_run
//! use std::sync::Arc;
//! use fluxmcp_protocol::types::{CallToolResult, Tool};
//! use fluxmcp_server::{McpServer, ToolFn};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let server = McpServer::builder("calc", "1.0.0")
//!     .tool(
//!         Tool::new("add", "Add two integers", serde_json::json!({
//!             "type": "object",
//!             "properties": {"a": {"type": "integer"}, "b": {"type": "integer"}},
//!             "required": ["a", "b"],
//!         })),
//!         Arc::new(ToolFn(|args: Option<std::collections::HashMap<String, serde_json::Value>>| async move {
//!             let args = args.unwrap_or_default();
//!             let a = args.get("a").and_then(|v| v.as_i64()).unwrap_or(0);
//!             let b = args.get("b").and_then(|v| v.as_i64()).unwrap_or(0);
//!             Ok(CallToolResult::text((a + b).to_string()))
//!         })),
//!     )?
//!     .build();
//!
//! server.run_stdio().await?;
//! # Ok(())
//! # }
//! ```

pub mod auth_gate;
pub mod builder;
pub mod engine;
pub mod error;
pub mod handlers;
pub mod outbound;
pub mod registry;
pub mod server;

pub use auth_gate::AuthGate;
pub use builder::ServerBuilder;
pub use engine::{Lifecycle, ServerConfig, SessionEngine};
pub use error::{ServerError, ServerResult};
pub use registry::{
    CompletionHandler, PromptFn, PromptHandler, PromptRegistry, Registries, ResourceFn,
    ResourceHandler, ResourceRegistry, ToolFn, ToolHandler, ToolRegistry,
};
pub use server::McpServer;
