//! Fluent construction of an [`McpServer`].

use std::sync::Arc;
use std::time::Duration;

use fluxmcp_auth::AuthProvider;
use fluxmcp_protocol::types::{Implementation, Prompt, Resource, ResourceTemplate, Tool};

use crate::auth_gate::AuthGate;
use crate::engine::{LifecycleCallback, ServerConfig};
use crate::error::ServerResult;
use crate::registry::{
    CompletionHandler, PromptHandler, Registries, ResourceHandler, ToolHandler,
};
use crate::server::McpServer;

/// Builder for [`McpServer`].
///
/// Registration happens here, before the server ever runs, which is the
/// only time the registries are writable.
pub struct ServerBuilder {
    config: ServerConfig,
    registries: Registries,
    auth_provider: Option<Arc<dyn AuthProvider>>,
    resource_metadata: Option<String>,
    on_lifecycle: Option<LifecycleCallback>,
}

impl ServerBuilder {
    /// Builder with default configuration.
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            config: ServerConfig {
                server_info: Implementation::new(name, version),
                ..Default::default()
            },
            registries: Registries::new(),
            auth_provider: None,
            resource_metadata: None,
            on_lifecycle: None,
        }
    }

    /// Usage hints returned from `initialize`.
    pub fn instructions(mut self, instructions: impl Into<String>) -> Self {
        self.config.instructions = Some(instructions.into());
        self
    }

    /// Page size for every `*/list` method.
    pub fn page_size(mut self, page_size: usize) -> Self {
        self.config.page_size = page_size.max(1);
        self
    }

    /// Deadline for server-initiated requests.
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout = timeout;
        self
    }

    /// Toggle the tool-argument validation cache. Validation behaves
    /// identically either way.
    pub fn schema_cache(mut self, enabled: bool) -> Self {
        self.config.schema_cache = enabled;
        self
    }

    /// Observe session life events.
    pub fn on_lifecycle<F>(mut self, callback: F) -> Self
    where
        F: Fn(crate::engine::Lifecycle) + Send + Sync + 'static,
    {
        self.on_lifecycle = Some(Arc::new(callback));
        self
    }

    /// Gate non-public methods behind `provider`.
    pub fn auth_provider(mut self, provider: Arc<dyn AuthProvider>) -> Self {
        self.auth_provider = Some(provider);
        self
    }

    /// Advertise a protected-resource metadata URL in auth challenges.
    pub fn resource_metadata(mut self, url: impl Into<String>) -> Self {
        self.resource_metadata = Some(url.into());
        self
    }

    /// Register a tool.
    pub fn tool(self, tool: Tool, handler: Arc<dyn ToolHandler>) -> ServerResult<Self> {
        self.registries.tools.register(tool, handler)?;
        Ok(self)
    }

    /// Register a prompt.
    pub fn prompt(self, prompt: Prompt, handler: Arc<dyn PromptHandler>) -> ServerResult<Self> {
        self.registries.prompts.register(prompt, handler)?;
        Ok(self)
    }

    /// Register a static resource.
    pub fn resource(
        self,
        resource: Resource,
        handler: Arc<dyn ResourceHandler>,
    ) -> ServerResult<Self> {
        self.registries.resources.register(resource, handler)?;
        Ok(self)
    }

    /// Register a resource template.
    pub fn resource_template(
        self,
        template: ResourceTemplate,
        handler: Arc<dyn ResourceHandler>,
    ) -> ServerResult<Self> {
        self.registries
            .resources
            .register_template(template, handler)?;
        Ok(self)
    }

    /// Set the completion handler.
    pub fn completion(self, handler: Arc<dyn CompletionHandler>) -> Self {
        *self
            .registries
            .completion
            .lock()
            .expect("completion mutex poisoned") = Some(handler);
        self
    }

    /// Finish construction.
    pub fn build(self) -> McpServer {
        let auth_gate = self.auth_provider.map(|provider| {
            let mut gate = AuthGate::new(provider);
            if let Some(metadata) = self.resource_metadata {
                gate = gate.with_resource_metadata(metadata);
            }
            Arc::new(gate)
        });
        McpServer::assemble(
            self.config,
            Arc::new(self.registries),
            auth_gate,
            self.on_lifecycle,
        )
    }
}
