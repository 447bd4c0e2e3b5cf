//! Built-in RPC methods.

use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::debug;

use studio_core::BridgeError;
use studio_core::tools::TOOL_NAMES;

use super::context::RpcContext;
use super::errors::RpcError;
use super::registry::{MethodHandler, MethodRegistry};

/// Register every built-in method.
pub fn register_all(registry: &mut MethodRegistry) {
    registry.register("ping", PingHandler);
    registry.register("tools/list", ListToolsHandler);
    registry.register("tools/call", CallToolHandler);
    registry.register("bridge/stats", StatsHandler);
}

fn text_content(text: impl Into<String>) -> Value {
    json!([{ "type": "text", "text": text.into() }])
}

/// Liveness check.
pub struct PingHandler;

#[async_trait]
impl MethodHandler for PingHandler {
    async fn handle(&self, _params: Option<Value>, _ctx: &RpcContext) -> Result<Value, RpcError> {
        Ok(json!({
            "pong": true,
            "timestamp": chrono::Utc::now().timestamp_millis(),
        }))
    }
}

/// Lists the known tools with their plugin-side names.
pub struct ListToolsHandler;

#[async_trait]
impl MethodHandler for ListToolsHandler {
    async fn handle(&self, _params: Option<Value>, _ctx: &RpcContext) -> Result<Value, RpcError> {
        let tools: Vec<Value> = TOOL_NAMES
            .iter()
            .map(|(name, studio)| json!({ "name": name, "studioName": studio }))
            .collect();
        Ok(json!({ "tools": tools }))
    }
}

/// Runs a tool through the command bridge and waits for the plugin's answer.
///
/// Params: `{ "name": string, "arguments"?: object }`. A failure reported by
/// the plugin is returned as tool content with `isError: true`; bridge
/// failures (timeout, validation, shutdown) are RPC errors.
pub struct CallToolHandler;

#[async_trait]
impl MethodHandler for CallToolHandler {
    async fn handle(&self, params: Option<Value>, ctx: &RpcContext) -> Result<Value, RpcError> {
        let params = params.ok_or_else(|| RpcError::invalid_params("params required"))?;
        let name = params
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| RpcError::invalid_params("Missing 'name'"))?;
        let arguments = params.get("arguments").cloned().unwrap_or(Value::Null);

        let pending = ctx.bridge.submit_command(name, arguments)?;
        debug!(tool = name, command_id = %pending.id(), "tool call submitted");

        match pending.await {
            Ok(text) => Ok(json!({ "content": text_content(text) })),
            Err(BridgeError::Remote { message }) => Ok(json!({
                "content": text_content(message),
                "isError": true,
            })),
            Err(err) => Err(err.into()),
        }
    }
}

/// Bridge and connection statistics.
pub struct StatsHandler;

#[async_trait]
impl MethodHandler for StatsHandler {
    async fn handle(&self, _params: Option<Value>, ctx: &RpcContext) -> Result<Value, RpcError> {
        Ok(json!({
            "bridge": ctx.bridge.stats(),
            "connections": ctx.connections.stats(),
            "uptimeSecs": ctx.server_start_time.elapsed().as_secs(),
        }))
    }
}
