//! Root directories the client exposes to the server.

use serde::{Deserialize, Serialize};

/// One root the client grants the server access to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Root {
    /// Must be a `file://` URI.
    pub uri: String,
    /// Display name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Result of the server-initiated `roots/list` request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListRootsResult {
    /// All current roots.
    pub roots: Vec<Root>,
}
