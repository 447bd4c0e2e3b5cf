//! Failures a push-socket method can report.

use studio_core::BridgeError;

/// Params missing, malformed, or the frame was not JSON.
pub const INVALID_PARAMS: &str = "INVALID_PARAMS";
/// No method by that name.
pub const METHOD_NOT_FOUND: &str = "METHOD_NOT_FOUND";
/// The server failed to produce an answer in time.
pub const INTERNAL_ERROR: &str = "INTERNAL_ERROR";

/// Error returned by a [`MethodHandler`](super::MethodHandler) or the
/// dispatcher around it.
#[derive(Debug, thiserror::Error)]
pub enum RpcError {
    /// The request could not be used as sent.
    #[error("{message}")]
    InvalidParams {
        /// What is wrong.
        message: String,
    },

    /// No handler registered for `method`.
    #[error("Method '{method}' not found")]
    MethodNotFound {
        /// Method name as sent.
        method: String,
    },

    /// The handler ran past the dispatcher's bound.
    #[error("Handler for '{method}' timed out")]
    HandlerTimeout {
        /// Method name as sent.
        method: String,
    },

    /// A tool call failed inside the bridge; keeps the bridge's code.
    #[error(transparent)]
    Bridge(#[from] BridgeError),
}

impl RpcError {
    /// Wire code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidParams { .. } => INVALID_PARAMS,
            Self::MethodNotFound { .. } => METHOD_NOT_FOUND,
            Self::Bridge(err) => err.code(),
            Self::HandlerTimeout { .. } => INTERNAL_ERROR,
        }
    }

    /// Shorthand for [`RpcError::InvalidParams`].
    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::InvalidParams {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::types::RpcErrorBody;

    #[test]
    fn local_codes() {
        assert_eq!(RpcError::invalid_params("missing name").code(), INVALID_PARAMS);
        assert_eq!(
            RpcError::HandlerTimeout { method: "tools/call".into() }.to_string(),
            "Handler for 'tools/call' timed out"
        );
        assert_eq!(
            RpcError::HandlerTimeout { method: "tools/call".into() }.code(),
            INTERNAL_ERROR
        );
    }

    #[test]
    fn bridge_failures_pass_through() {
        let err = RpcError::from(BridgeError::Timeout { timeout_ms: 30_000 });
        let body = RpcErrorBody::from(&err);
        assert_eq!(body.code, "TIMEOUT");
        assert_eq!(body.message, "Studio command timeout (30000ms)");
    }
}
