//! Feature registries: tools, prompts, resources.
//!
//! All three share the same lifecycle contract: registration is allowed
//! only while the owning server is stopped, names are unique within a
//! registry, and any mutation marks the registry dirty so the matching
//! `list_changed` notification goes out when the server next starts.

mod pagination;
mod prompts;
mod resources;
mod tools;

pub use pagination::{DEFAULT_PAGE_SIZE, paginate};
pub use prompts::{PromptFn, PromptHandler, PromptRegistry};
pub use resources::{ResourceFn, ResourceHandler, ResourceRegistry, template_matches};
pub use tools::{ToolFn, ToolHandler, ToolRegistry};

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use fluxmcp_protocol::McpResult;
use fluxmcp_protocol::types::{CompleteParams, CompleteResult};

/// Host-provided argument completion.
#[async_trait]
pub trait CompletionHandler: Send + Sync {
    /// Produce candidates for a partially typed argument.
    async fn complete(&self, params: CompleteParams) -> McpResult<CompleteResult>;
}

/// Everything registrable on a server, shared by its sessions.
pub struct Registries {
    /// Tool surface.
    pub tools: ToolRegistry,
    /// Prompt surface.
    pub prompts: PromptRegistry,
    /// Resource surface.
    pub resources: ResourceRegistry,
    /// Optional completion handler.
    pub completion: std::sync::Mutex<Option<Arc<dyn CompletionHandler>>>,
    running: Arc<AtomicBool>,
}

impl Registries {
    /// Empty registries in the stopped state.
    pub fn new() -> Self {
        let frozen = Arc::new(AtomicBool::new(false));
        Self {
            tools: ToolRegistry::new(Arc::clone(&frozen)),
            prompts: PromptRegistry::new(Arc::clone(&frozen)),
            resources: ResourceRegistry::new(Arc::clone(&frozen)),
            completion: std::sync::Mutex::new(None),
            running: frozen,
        }
    }

    /// Whether the owning server is running (registries frozen).
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Freeze the registries for the running phase.
    pub fn freeze(&self) {
        self.running.store(true, Ordering::SeqCst);
    }

    /// Thaw after stop; registration becomes legal again.
    pub fn thaw(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    /// The completion handler, if one is set.
    pub fn completion_handler(&self) -> Option<Arc<dyn CompletionHandler>> {
        self.completion
            .lock()
            .expect("completion mutex poisoned")
            .clone()
    }
}

impl Default for Registries {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Registries {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registries")
            .field("tools", &self.tools.len())
            .field("prompts", &self.prompts.len())
            .field("resources", &self.resources.len())
            .field("running", &self.is_running())
            .finish()
    }
}
