//! `prompts/list` and `prompts/get`.

use serde_json::Value;

use fluxmcp_protocol::types::{GetPromptParams, ListPromptsParams};
use fluxmcp_protocol::{McpError, McpResult};

use crate::engine::SessionEngine;

use super::{parse_params, to_value};

pub(super) fn list(engine: &SessionEngine, params: Option<Value>) -> McpResult<Value> {
    let params: ListPromptsParams = parse_params(params)?;
    let page = engine
        .registries
        .prompts
        .list(params.cursor.as_deref(), engine.config.page_size)?;
    to_value(page)
}

pub(super) async fn get(engine: &SessionEngine, params: Option<Value>) -> McpResult<Value> {
    let params: GetPromptParams = parse_params(params)?;
    let Some((prompt, handler)) = engine.registries.prompts.get(&params.name) else {
        return Err(McpError::invalid_params(format!(
            "unknown prompt {:?}",
            params.name
        )));
    };

    // Declared-required arguments must all be present.
    if let Some(declared) = &prompt.arguments {
        let supplied = params.arguments.as_ref();
        for argument in declared.iter().filter(|a| a.required == Some(true)) {
            let present = supplied.is_some_and(|args| args.contains_key(&argument.name));
            if !present {
                return Err(McpError::invalid_params(format!(
                    "prompt {:?} requires argument {:?}",
                    params.name, argument.name
                )));
            }
        }
    }

    let result = handler.render(params.arguments).await?;
    to_value(result)
}
