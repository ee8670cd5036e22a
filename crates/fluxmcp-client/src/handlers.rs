//! Host-provided handlers for server-initiated traffic.

use async_trait::async_trait;
use std::sync::{Arc, Mutex};

use fluxmcp_protocol::McpResult;
use fluxmcp_protocol::types::{
    CreateMessageParams, CreateMessageResult, LoggingMessageParams, Root,
};
use tokio_util::sync::CancellationToken;

/// Handles `sampling/createMessage`: the server asks this client to run
/// an LLM completion. `cancel` fires if the server cancels the request.
#[async_trait]
pub trait SamplingHandler: Send + Sync {
    /// Run the completion.
    async fn create_message(
        &self,
        params: CreateMessageParams,
        cancel: CancellationToken,
    ) -> McpResult<CreateMessageResult>;
}

/// Observer for `notifications/message` log events.
pub type LogCallback = Arc<dyn Fn(LoggingMessageParams) + Send + Sync>;

/// Observer for `notifications/resources/updated` events.
pub type ResourceUpdatedCallback = Arc<dyn Fn(String) + Send + Sync>;

/// Observer for `notifications/*/list_changed` events; receives the
/// notification's method name.
pub type ListChangedCallback = Arc<dyn Fn(&str) + Send + Sync>;

/// Everything the host wires into a client.
#[derive(Default)]
pub struct ClientHandlers {
    /// Answers `sampling/createMessage`; absent means MethodNotFound.
    pub sampling: Option<Arc<dyn SamplingHandler>>,
    /// The roots exposed via `roots/list`.
    pub roots: Mutex<Vec<Root>>,
    /// Log event observer.
    pub on_log: Option<LogCallback>,
    /// Subscribed-resource change observer.
    pub on_resource_updated: Option<ResourceUpdatedCallback>,
    /// Registry churn observer.
    pub on_list_changed: Option<ListChangedCallback>,
}

impl ClientHandlers {
    /// No handlers; requests from the server are answered MethodNotFound
    /// and notifications are dropped.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the sampling handler.
    pub fn sampling(mut self, handler: Arc<dyn SamplingHandler>) -> Self {
        self.sampling = Some(handler);
        self
    }

    /// Set the initial root set.
    pub fn roots(self, roots: Vec<Root>) -> Self {
        *self.roots.lock().expect("roots poisoned") = roots;
        self
    }

    /// Observe server log notifications.
    pub fn on_log<F>(mut self, callback: F) -> Self
    where
        F: Fn(LoggingMessageParams) + Send + Sync + 'static,
    {
        self.on_log = Some(Arc::new(callback));
        self
    }

    /// Observe `notifications/resources/updated`.
    pub fn on_resource_updated<F>(mut self, callback: F) -> Self
    where
        F: Fn(String) + Send + Sync + 'static,
    {
        self.on_resource_updated = Some(Arc::new(callback));
        self
    }

    /// Observe registry churn notifications.
    pub fn on_list_changed<F>(mut self, callback: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.on_list_changed = Some(Arc::new(callback));
        self
    }
}

impl std::fmt::Debug for ClientHandlers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientHandlers")
            .field("sampling", &self.sampling.is_some())
            .field("roots", &self.roots.lock().expect("roots poisoned").len())
            .finish()
    }
}
