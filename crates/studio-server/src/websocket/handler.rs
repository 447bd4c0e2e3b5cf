//! Push-socket message dispatch: parses a text frame as an [`RpcRequest`]
//! and routes it through the [`MethodRegistry`].

use tracing::{debug, error, instrument, warn};

use crate::rpc::context::RpcContext;
use crate::rpc::errors::RpcError;
use crate::rpc::registry::MethodRegistry;
use crate::rpc::types::{RpcRequest, RpcResponse};

/// Result of handling one inbound message.
pub struct HandleResult {
    /// Serialized JSON response to send back.
    pub response_json: String,
    /// The method that was called (empty if parsing failed).
    pub method: String,
    /// Typed response.
    pub response: RpcResponse,
}

fn serialize(response: &RpcResponse) -> String {
    serde_json::to_string(response).unwrap_or_else(|e| {
        error!(error = %e, "failed to serialize RPC response");
        String::new()
    })
}

/// Handle one inbound text message.
#[instrument(skip_all, fields(method))]
pub async fn handle_message(
    message: &str,
    registry: &MethodRegistry,
    ctx: &RpcContext,
) -> HandleResult {
    let request: RpcRequest = match serde_json::from_str(message) {
        Ok(r) => r,
        Err(e) => {
            warn!("invalid JSON received");
            let err = RpcError::invalid_params(format!("Invalid JSON: {e}"));
            let response = RpcResponse::rejected("unknown", &err);
            return HandleResult {
                response_json: serialize(&response),
                method: String::new(),
                response,
            };
        }
    };

    let method = request.method.clone();
    let _ = tracing::Span::current().record("method", method.as_str());
    debug!(method, id = %request.id, "dispatching RPC");

    let response = registry.dispatch(request, ctx).await;
    HandleResult {
        response_json: serialize(&response),
        method,
        response,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::errors::{INVALID_PARAMS, METHOD_NOT_FOUND};
    use crate::rpc::handlers::{register_all, test_helpers::make_test_context};

    fn registry() -> MethodRegistry {
        let mut reg = MethodRegistry::new();
        register_all(&mut reg);
        reg
    }

    #[tokio::test]
    async fn valid_request_dispatches() {
        let ctx = make_test_context();
        let result = handle_message(r#"{"id":"r1","method":"ping"}"#, &registry(), &ctx).await;
        assert!(result.response.success);
        assert_eq!(result.method, "ping");
        assert_eq!(result.response.id, "r1");
        let parsed: serde_json::Value = serde_json::from_str(&result.response_json).unwrap();
        assert_eq!(parsed["result"]["pong"], true);
    }

    #[tokio::test]
    async fn invalid_json_is_invalid_params() {
        let ctx = make_test_context();
        let result = handle_message("not json", &registry(), &ctx).await;
        assert!(!result.response.success);
        assert_eq!(result.response.id, "unknown");
        assert!(result.method.is_empty());
        assert_eq!(result.response.error.unwrap().code, INVALID_PARAMS);
    }

    #[tokio::test]
    async fn missing_method_field_is_invalid_params() {
        let ctx = make_test_context();
        let result = handle_message(r#"{"id":"r1"}"#, &registry(), &ctx).await;
        assert_eq!(result.response.error.unwrap().code, INVALID_PARAMS);
    }

    #[tokio::test]
    async fn unknown_method_is_reported() {
        let ctx = make_test_context();
        let result = handle_message(r#"{"id":"r9","method":"nope"}"#, &registry(), &ctx).await;
        assert_eq!(result.method, "nope");
        assert_eq!(result.response.id, "r9");
        assert_eq!(result.response.error.unwrap().code, METHOD_NOT_FOUND);
    }
}
