//! Per-method request handlers.
//!
//! `dispatch` is the single entry the engine races against the request's
//! cancellation token. Every handler returns the raw result value; the
//! engine wraps it into the response and owns reply delivery.

mod completion;
mod logging;
mod prompts;
mod resources;
mod tools;

use std::sync::Arc;

use serde_json::Value;
use tokio_util::sync::CancellationToken;

use fluxmcp_protocol::jsonrpc::JsonRpcRequest;
use fluxmcp_protocol::{McpError, McpResult, methods};

use crate::engine::SessionEngine;

/// Route one request to its handler.
pub(crate) async fn dispatch(
    engine: Arc<SessionEngine>,
    request: JsonRpcRequest,
    cancel: CancellationToken,
) -> McpResult<Value> {
    let params = request.params;
    match request.method.as_str() {
        methods::PING => Ok(Value::Object(Default::default())),
        methods::TOOLS_LIST => tools::list(&engine, params),
        methods::TOOLS_CALL => tools::call(&engine, params, cancel).await,
        methods::PROMPTS_LIST => prompts::list(&engine, params),
        methods::PROMPTS_GET => prompts::get(&engine, params).await,
        methods::RESOURCES_LIST => resources::list(&engine, params),
        methods::RESOURCES_TEMPLATES_LIST => resources::list_templates(&engine, params),
        methods::RESOURCES_READ => resources::read(&engine, params).await,
        methods::RESOURCES_SUBSCRIBE => resources::subscribe(&engine, params),
        methods::RESOURCES_UNSUBSCRIBE => resources::unsubscribe(&engine, params),
        methods::LOGGING_SET_LEVEL => logging::set_level(&engine, params),
        methods::COMPLETION_COMPLETE => completion::complete(&engine, params).await,
        other => Err(McpError::method_not_found(other)),
    }
}

/// Deserialize params, treating a missing object as empty.
fn parse_params<T: serde::de::DeserializeOwned>(params: Option<Value>) -> McpResult<T> {
    let value = params.unwrap_or_else(|| Value::Object(Default::default()));
    serde_json::from_value(value).map_err(|e| McpError::invalid_params(e.to_string()))
}

fn to_value<T: serde::Serialize>(result: T) -> McpResult<Value> {
    Ok(serde_json::to_value(result)?)
}
