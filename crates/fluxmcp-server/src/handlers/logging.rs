//! `logging/setLevel`.

use serde_json::Value;
use tracing::debug;

use fluxmcp_protocol::McpResult;
use fluxmcp_protocol::types::{EmptyResult, SetLevelParams};

use crate::engine::SessionEngine;

use super::{parse_params, to_value};

pub(super) fn set_level(engine: &SessionEngine, params: Option<Value>) -> McpResult<Value> {
    let params: SetLevelParams = parse_params(params)?;
    debug!(level = ?params.level, "log floor updated");
    *engine.log_floor.lock().expect("log floor poisoned") = Some(params.level);
    to_value(EmptyResult::default())
}
