//! The prompt registry.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use fluxmcp_protocol::McpResult;
use fluxmcp_protocol::types::{GetPromptResult, ListPromptsResult, Prompt};

use crate::error::{ServerError, ServerResult};

use super::pagination::paginate;

/// Host-provided prompt renderer.
#[async_trait]
pub trait PromptHandler: Send + Sync {
    /// Render the prompt with the given argument values.
    async fn render(&self, arguments: Option<HashMap<String, String>>)
    -> McpResult<GetPromptResult>;
}

/// `name → (descriptor, handler)`, frozen while the server runs.
pub struct PromptRegistry {
    frozen: Arc<AtomicBool>,
    dirty: AtomicBool,
    entries: Mutex<Vec<(Prompt, Arc<dyn PromptHandler>)>>,
}

impl PromptRegistry {
    pub(super) fn new(frozen: Arc<AtomicBool>) -> Self {
        Self {
            frozen,
            dirty: AtomicBool::new(false),
            entries: Mutex::new(Vec::new()),
        }
    }

    /// Register a prompt. Fails while the server is running or when the
    /// name is taken.
    pub fn register(&self, prompt: Prompt, handler: Arc<dyn PromptHandler>) -> ServerResult<()> {
        if self.frozen.load(Ordering::SeqCst) {
            return Err(ServerError::RegistryFrozen);
        }
        let mut entries = self.entries.lock().expect("prompt registry poisoned");
        if entries.iter().any(|(p, _)| p.name == prompt.name) {
            return Err(ServerError::DuplicateRegistration(prompt.name));
        }
        entries.push((prompt, handler));
        self.dirty.store(true, Ordering::SeqCst);
        Ok(())
    }

    /// One page of descriptors.
    pub fn list(&self, cursor: Option<&str>, page_size: usize) -> McpResult<ListPromptsResult> {
        let snapshot: Vec<Prompt> = self
            .entries
            .lock()
            .expect("prompt registry poisoned")
            .iter()
            .map(|(p, _)| p.clone())
            .collect();
        let (prompts, next_cursor) = paginate(&snapshot, cursor, page_size)?;
        Ok(ListPromptsResult {
            prompts,
            next_cursor,
        })
    }

    /// Descriptor and handler for `name`.
    pub fn get(&self, name: &str) -> Option<(Prompt, Arc<dyn PromptHandler>)> {
        self.entries
            .lock()
            .expect("prompt registry poisoned")
            .iter()
            .find(|(p, _)| p.name == name)
            .map(|(p, h)| (p.clone(), Arc::clone(h)))
    }

    /// Number of registered prompts.
    pub fn len(&self) -> usize {
        self.entries.lock().expect("prompt registry poisoned").len()
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

/// Adapt an async closure into a [`PromptHandler`].
pub struct PromptFn<F>(pub F);

#[async_trait]
impl<F, Fut> PromptHandler for PromptFn<F>
where
    F: Fn(Option<HashMap<String, String>>) -> Fut + Send + Sync,
    Fut: Future<Output = McpResult<GetPromptResult>> + Send + 'static,
{
    async fn render(
        &self,
        arguments: Option<HashMap<String, String>>,
    ) -> McpResult<GetPromptResult> {
        (self.0)(arguments).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fluxmcp_protocol::types::{Content, PromptMessage, Role};
    use pretty_assertions::assert_eq;

    fn greeting() -> (Prompt, Arc<dyn PromptHandler>) {
        (
            Prompt {
                name: "greeting".into(),
                description: Some("a greeting".into()),
                arguments: None,
            },
            Arc::new(PromptFn(|_args: Option<HashMap<String, String>>| async {
                Ok(GetPromptResult {
                    description: None,
                    messages: vec![PromptMessage {
                        role: Role::User,
                        content: Content::text("hello"),
                    }],
                })
            })),
        )
    }

    #[test]
    fn register_list_get() {
        let reg = PromptRegistry::new(Arc::new(AtomicBool::new(false)));
        let (prompt, handler) = greeting();
        reg.register(prompt, handler).unwrap();

        let listed = reg.list(None, 10).unwrap();
        assert_eq!(listed.prompts.len(), 1);
        assert!(listed.next_cursor.is_none());
        assert!(reg.get("greeting").is_some());
    }
}
