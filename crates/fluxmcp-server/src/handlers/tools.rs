//! `tools/list` and `tools/call`.

use serde_json::Value;
use tokio_util::sync::CancellationToken;

use fluxmcp_protocol::types::{CallToolParams, ListToolsParams};
use fluxmcp_protocol::{McpError, McpResult};

use crate::engine::SessionEngine;

use super::{parse_params, to_value};

pub(super) fn list(engine: &SessionEngine, params: Option<Value>) -> McpResult<Value> {
    let params: ListToolsParams = parse_params(params)?;
    let page = engine
        .registries
        .tools
        .list(params.cursor.as_deref(), engine.config.page_size)?;
    to_value(page)
}

pub(super) async fn call(
    engine: &SessionEngine,
    params: Option<Value>,
    cancel: CancellationToken,
) -> McpResult<Value> {
    let params: CallToolParams = parse_params(params)?;
    let Some((tool, handler)) = engine.registries.tools.get(&params.name) else {
        return Err(McpError::invalid_params(format!(
            "unknown tool {:?}",
            params.name
        )));
    };

    // Arguments are validated against the tool's declared schema before
    // the handler ever runs; the handler may assume shape correctness.
    let arguments_value = params
        .arguments
        .as_ref()
        .map(|args| serde_json::to_value(args))
        .transpose()?
        .unwrap_or_else(|| Value::Object(Default::default()));
    let validation = engine
        .schema_cache
        .validate(&arguments_value, &tool.input_schema);
    if !validation.valid {
        return Err(McpError::invalid_params(format!(
            "arguments for tool {:?} failed validation",
            params.name
        ))
        .with_data(serde_json::json!({ "errors": validation.to_error_data() })));
    }

    let result = handler.call(params.arguments, cancel).await?;
    to_value(result)
}
