//! The `resources/*` surface: listing, reading, and subscriptions.

use serde_json::Value;
use tracing::debug;

use fluxmcp_protocol::types::{
    EmptyResult, ListResourcesParams, ReadResourceParams, SubscribeParams,
};
use fluxmcp_protocol::{McpError, McpResult};

use crate::engine::SessionEngine;

use super::{parse_params, to_value};

pub(super) fn list(engine: &SessionEngine, params: Option<Value>) -> McpResult<Value> {
    let params: ListResourcesParams = parse_params(params)?;
    let page = engine
        .registries
        .resources
        .list(params.cursor.as_deref(), engine.config.page_size)?;
    to_value(page)
}

pub(super) fn list_templates(engine: &SessionEngine, params: Option<Value>) -> McpResult<Value> {
    let params: ListResourcesParams = parse_params(params)?;
    let page = engine
        .registries
        .resources
        .list_templates(params.cursor.as_deref(), engine.config.page_size)?;
    to_value(page)
}

pub(super) async fn read(engine: &SessionEngine, params: Option<Value>) -> McpResult<Value> {
    let params: ReadResourceParams = parse_params(params)?;
    let Some(handler) = engine.registries.resources.resolve(&params.uri) else {
        return Err(McpError::invalid_params(format!(
            "unknown resource {:?}",
            params.uri
        )));
    };
    let result = handler.read(&params.uri).await?;
    to_value(result)
}

pub(super) fn subscribe(engine: &SessionEngine, params: Option<Value>) -> McpResult<Value> {
    let params: SubscribeParams = parse_params(params)?;
    // Subscription requires the resource to exist right now; templates
    // count, since a matching URI is readable.
    if !engine.registries.resources.exists(&params.uri) {
        return Err(McpError::invalid_params(format!(
            "cannot subscribe to unknown resource {:?}",
            params.uri
        )));
    }
    engine
        .subscriptions
        .lock()
        .expect("subscriptions poisoned")
        .insert(params.uri.clone());
    debug!(uri = %params.uri, "resource subscribed");
    to_value(EmptyResult::default())
}

pub(super) fn unsubscribe(engine: &SessionEngine, params: Option<Value>) -> McpResult<Value> {
    let params: SubscribeParams = parse_params(params)?;
    let removed = engine
        .subscriptions
        .lock()
        .expect("subscriptions poisoned")
        .remove(&params.uri);
    if removed {
        debug!(uri = %params.uri, "resource unsubscribed");
    }
    to_value(EmptyResult::default())
}
