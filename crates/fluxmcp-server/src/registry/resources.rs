//! The resource registry: static URIs plus URI templates.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use regex::Regex;

use fluxmcp_protocol::McpResult;
use fluxmcp_protocol::types::{
    ListResourceTemplatesResult, ListResourcesResult, ReadResourceResult, Resource,
    ResourceTemplate,
};

use crate::error::{ServerError, ServerResult};

use super::pagination::paginate;

/// Host-provided resource reader. Template handlers receive the concrete
/// URI that matched.
#[async_trait]
pub trait ResourceHandler: Send + Sync {
    /// Read the resource at `uri`.
    async fn read(&self, uri: &str) -> McpResult<ReadResourceResult>;
}

/// Whether `uri` matches an RFC 6570 level-1 template: literal segments
/// with `{variable}` placeholders, each matching one non-empty segment
/// free of `/`.
pub fn template_matches(template: &str, uri: &str) -> bool {
    let mut pattern = String::from("^");
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        pattern.push_str(&regex::escape(&rest[..open]));
        let Some(close) = rest[open..].find('}') else {
            // Unbalanced brace: treat the remainder literally.
            pattern.push_str(&regex::escape(&rest[open..]));
            rest = "";
            break;
        };
        pattern.push_str("([^/]+)");
        rest = &rest[open + close + 1..];
    }
    pattern.push_str(&regex::escape(rest));
    pattern.push('$');
    Regex::new(&pattern).is_ok_and(|re| re.is_match(uri))
}

/// `uri → (descriptor, handler)` plus `template → handler`, frozen while
/// the server runs.
pub struct ResourceRegistry {
    frozen: Arc<AtomicBool>,
    dirty: AtomicBool,
    statics: Mutex<Vec<(Resource, Arc<dyn ResourceHandler>)>>,
    templates: Mutex<Vec<(ResourceTemplate, Arc<dyn ResourceHandler>)>>,
}

impl ResourceRegistry {
    pub(super) fn new(frozen: Arc<AtomicBool>) -> Self {
        Self {
            frozen,
            dirty: AtomicBool::new(false),
            statics: Mutex::new(Vec::new()),
            templates: Mutex::new(Vec::new()),
        }
    }

    /// Register a static resource. Fails while the server is running or
    /// when the URI is taken.
    pub fn register(
        &self,
        resource: Resource,
        handler: Arc<dyn ResourceHandler>,
    ) -> ServerResult<()> {
        if self.frozen.load(Ordering::SeqCst) {
            return Err(ServerError::RegistryFrozen);
        }
        let mut statics = self.statics.lock().expect("resource registry poisoned");
        if statics.iter().any(|(r, _)| r.uri == resource.uri) {
            return Err(ServerError::DuplicateRegistration(resource.uri));
        }
        statics.push((resource, handler));
        self.dirty.store(true, Ordering::SeqCst);
        Ok(())
    }

    /// Register a template. Fails while the server is running or when the
    /// template is taken.
    pub fn register_template(
        &self,
        template: ResourceTemplate,
        handler: Arc<dyn ResourceHandler>,
    ) -> ServerResult<()> {
        if self.frozen.load(Ordering::SeqCst) {
            return Err(ServerError::RegistryFrozen);
        }
        let mut templates = self.templates.lock().expect("resource registry poisoned");
        if templates
            .iter()
            .any(|(t, _)| t.uri_template == template.uri_template)
        {
            return Err(ServerError::DuplicateRegistration(template.uri_template));
        }
        templates.push((template, handler));
        self.dirty.store(true, Ordering::SeqCst);
        Ok(())
    }

    /// One page of static descriptors.
    pub fn list(&self, cursor: Option<&str>, page_size: usize) -> McpResult<ListResourcesResult> {
        let snapshot: Vec<Resource> = self
            .statics
            .lock()
            .expect("resource registry poisoned")
            .iter()
            .map(|(r, _)| r.clone())
            .collect();
        let (resources, next_cursor) = paginate(&snapshot, cursor, page_size)?;
        Ok(ListResourcesResult {
            resources,
            next_cursor,
        })
    }

    /// One page of template descriptors.
    pub fn list_templates(
        &self,
        cursor: Option<&str>,
        page_size: usize,
    ) -> McpResult<ListResourceTemplatesResult> {
        let snapshot: Vec<ResourceTemplate> = self
            .templates
            .lock()
            .expect("resource registry poisoned")
            .iter()
            .map(|(t, _)| t.clone())
            .collect();
        let (resource_templates, next_cursor) = paginate(&snapshot, cursor, page_size)?;
        Ok(ListResourceTemplatesResult {
            resource_templates,
            next_cursor,
        })
    }

    /// The handler for `uri`: exact static match first, then the first
    /// matching template.
    pub fn resolve(&self, uri: &str) -> Option<Arc<dyn ResourceHandler>> {
        {
            let statics = self.statics.lock().expect("resource registry poisoned");
            if let Some((_, handler)) = statics.iter().find(|(r, _)| r.uri == uri) {
                return Some(Arc::clone(handler));
            }
        }
        let templates = self.templates.lock().expect("resource registry poisoned");
        templates
            .iter()
            .find(|(t, _)| template_matches(&t.uri_template, uri))
            .map(|(_, h)| Arc::clone(h))
    }

    /// Whether `uri` names a known resource; subscription requires this.
    pub fn exists(&self, uri: &str) -> bool {
        self.resolve(uri).is_some()
    }

    /// Number of static resources.
    pub fn len(&self) -> usize {
        self.statics.lock().expect("resource registry poisoned").len()
    }

    /// Whether both tables are empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
            && self
                .templates
                .lock()
                .expect("resource registry poisoned")
                .is_empty()
    }

    /// Clear and return the dirty flag.
    pub fn take_dirty(&self) -> bool {
        self.dirty.swap(false, Ordering::SeqCst)
    }
}

/// Adapt an async closure into a [`ResourceHandler`].
pub struct ResourceFn<F>(pub F);

#[async_trait]
impl<F, Fut> ResourceHandler for ResourceFn<F>
where
    F: Fn(String) -> Fut + Send + Sync,
    Fut: Future<Output = McpResult<ReadResourceResult>> + Send + 'static,
{
    async fn read(&self, uri: &str) -> McpResult<ReadResourceResult> {
        (self.0)(uri.to_string()).await
    }
}
