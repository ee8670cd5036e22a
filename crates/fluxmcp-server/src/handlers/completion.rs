//! `completion/complete`.

use serde_json::Value;

use fluxmcp_protocol::types::CompleteParams;
use fluxmcp_protocol::{McpError, McpResult, methods};

use crate::engine::SessionEngine;

use super::{parse_params, to_value};

pub(super) async fn complete(engine: &SessionEngine, params: Option<Value>) -> McpResult<Value> {
    let Some(handler) = engine.registries.completion_handler() else {
        return Err(McpError::method_not_found(methods::COMPLETION_COMPLETE));
    };
    let params: CompleteParams = parse_params(params)?;
    let result = handler.complete(params).await?;
    to_value(result)
}
