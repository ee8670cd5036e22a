//! The tool registry.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use fluxmcp_protocol::types::{CallToolResult, ListToolsResult, Tool};
use fluxmcp_protocol::{McpError, McpResult};

use crate::error::{ServerError, ServerResult};

use super::pagination::paginate;

/// Host-provided tool implementation.
///
/// `cancel` fires when the peer cancels the carrying request; the handler
/// must wind down promptly — its return value is discarded after that.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    /// Execute the tool. Arguments have already passed schema validation.
    async fn call(
        &self,
        arguments: Option<HashMap<String, Value>>,
        cancel: CancellationToken,
    ) -> McpResult<CallToolResult>;
}

/// `name → (descriptor, handler)`, frozen while the server runs.
pub struct ToolRegistry {
    frozen: Arc<AtomicBool>,
    dirty: AtomicBool,
    entries: Mutex<Vec<(Tool, Arc<dyn ToolHandler>)>>,
}

impl ToolRegistry {
    pub(super) fn new(frozen: Arc<AtomicBool>) -> Self {
        Self {
            frozen,
            dirty: AtomicBool::new(false),
            entries: Mutex::new(Vec::new()),
        }
    }

    /// Register a tool. Fails while the server is running or when the
    /// name is taken.
    pub fn register(&self, tool: Tool, handler: Arc<dyn ToolHandler>) -> ServerResult<()> {
        if self.frozen.load(Ordering::SeqCst) {
            return Err(ServerError::RegistryFrozen);
        }
        let mut entries = self.entries.lock().expect("tool registry poisoned");
        if entries.iter().any(|(t, _)| t.name == tool.name) {
            return Err(ServerError::DuplicateRegistration(tool.name));
        }
        entries.push((tool, handler));
        self.dirty.store(true, Ordering::SeqCst);
        Ok(())
    }

    /// One page of descriptors.
    pub fn list(&self, cursor: Option<&str>, page_size: usize) -> McpResult<ListToolsResult> {
        let snapshot: Vec<Tool> = self
            .entries
            .lock()
            .expect("tool registry poisoned")
            .iter()
            .map(|(t, _)| t.clone())
            .collect();
        let (tools, next_cursor) = paginate(&snapshot, cursor, page_size)?;
        Ok(ListToolsResult { tools, next_cursor })
    }

    /// Descriptor and handler for `name`.
    pub fn get(&self, name: &str) -> Option<(Tool, Arc<dyn ToolHandler>)> {
        self.entries
            .lock()
            .expect("tool registry poisoned")
            .iter()
            .find(|(t, _)| t.name == name)
            .map(|(t, h)| (t.clone(), Arc::clone(h)))
    }

    /// Number of registered tools.
    pub fn len(&self) -> usize {
        self.entries.lock().expect("tool registry poisoned").len()
    }

    /// Whether nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Clear and return the dirty flag.
    pub fn take_dirty(&self) -> bool {
        self.dirty.swap(false, Ordering::SeqCst)
    }
}

/// Adapt a plain async closure into a [`ToolHandler`] that ignores
/// cancellation (fine for quick, non-blocking tools).
pub struct ToolFn<F>(pub F);

#[async_trait]
impl<F, Fut> ToolHandler for ToolFn<F>
where
    F: Fn(Option<HashMap<String, Value>>) -> Fut + Send + Sync,
    Fut: Future<Output = McpResult<CallToolResult>> + Send + 'static,
{
    async fn call(
        &self,
        arguments: Option<HashMap<String, Value>>,
        _cancel: CancellationToken,
    ) -> McpResult<CallToolResult> {
        (self.0)(arguments).await
    }
}

/// Convenience error for handlers rejecting their own arguments after
/// schema validation passed (e.g. semantic range checks).
pub fn tool_error(message: impl Into<String>) -> McpError {
    McpError::internal(message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn echo_tool() -> (Tool, Arc<dyn ToolHandler>) {
        (
            Tool::new("echo", "echoes", json!({"type": "object"})),
            Arc::new(ToolFn(|_args: Option<HashMap<String, Value>>| async {
                Ok(CallToolResult::text("ok"))
            })),
        )
    }

    fn registry() -> ToolRegistry {
        ToolRegistry::new(Arc::new(AtomicBool::new(false)))
    }

    #[test]
    fn register_and_get() {
        let reg = registry();
        let (tool, handler) = echo_tool();
        reg.register(tool, handler).unwrap();
        assert_eq!(reg.len(), 1);
        assert!(reg.get("echo").is_some());
        assert!(reg.get("missing").is_none());
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let reg = registry();
        let (tool, handler) = echo_tool();
        reg.register(tool.clone(), Arc::clone(&handler)).unwrap();
        let err = reg.register(tool, handler).unwrap_err();
        assert!(matches!(err, ServerError::DuplicateRegistration(name) if name == "echo"));
    }

    #[test]
    fn frozen_registry_refuses_registration() {
        let frozen = Arc::new(AtomicBool::new(false));
        let reg = ToolRegistry::new(Arc::clone(&frozen));
        frozen.store(true, Ordering::SeqCst);
        let (tool, handler) = echo_tool();
        assert!(matches!(
            reg.register(tool, handler),
            Err(ServerError::RegistryFrozen)
        ));
    }

    #[test]
    fn registration_marks_dirty_once() {
        let reg = registry();
        let (tool, handler) = echo_tool();
        reg.register(tool, handler).unwrap();
        assert!(reg.take_dirty());
        assert!(!reg.take_dirty());
    }

    #[test]
    fn list_paginates_in_registration_order() {
        let reg = registry();
        for i in 0..5 {
            reg.register(
                Tool::new(format!("tool-{i}"), "t", json!({"type": "object"})),
                Arc::new(ToolFn(|_args: Option<HashMap<String, Value>>| async {
                    Ok(CallToolResult::text("x"))
                })),
            )
            .unwrap();
        }
        let page = reg.list(None, 2).unwrap();
        assert_eq!(page.tools.len(), 2);
        assert_eq!(page.tools[0].name, "tool-0");
        let page2 = reg.list(page.next_cursor.as_deref(), 2).unwrap();
        assert_eq!(page2.tools[0].name, "tool-2");
    }
}
