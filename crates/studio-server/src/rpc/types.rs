//! Request and response envelopes on the push socket.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::errors::RpcError;

/// `{id, method, params?}` sent by a push client.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RpcRequest {
    /// Client-chosen id, echoed back.
    pub id: String,
    /// e.g. `tools/call`.
    pub method: String,
    /// Method parameters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

/// Reply to one [`RpcRequest`]. Exactly one of `result` and `error` is set.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RpcResponse {
    /// Id of the request being answered.
    pub id: String,
    /// `true` iff `result` is set.
    pub success: bool,
    /// Handler output.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Failure detail.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcErrorBody>,
}

/// `{code, message}` carried by a failed [`RpcResponse`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcErrorBody {
    /// Stable code such as `METHOD_NOT_FOUND` or `TIMEOUT`.
    pub code: String,
    /// Human-readable detail.
    pub message: String,
}

impl From<&RpcError> for RpcErrorBody {
    fn from(err: &RpcError) -> Self {
        Self {
            code: err.code().to_owned(),
            message: err.to_string(),
        }
    }
}

impl RpcResponse {
    /// Successful reply.
    pub fn ok(id: impl Into<String>, result: Value) -> Self {
        Self {
            id: id.into(),
            success: true,
            result: Some(result),
            error: None,
        }
    }

    /// Failed reply.
    pub fn rejected(id: impl Into<String>, err: &RpcError) -> Self {
        Self {
            id: id.into(),
            success: false,
            result: None,
            error: Some(err.into()),
        }
    }

    /// Reply for a handler outcome.
    pub fn from_outcome(id: impl Into<String>, outcome: &Result<Value, RpcError>) -> Self {
        match outcome {
            Ok(result) => Self::ok(id, result.clone()),
            Err(err) => Self::rejected(id, err),
        }
    }
}
