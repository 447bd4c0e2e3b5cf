//! Method table for the push socket and bounded async dispatch.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use metrics::{counter, histogram};
use serde_json::Value;
use tracing::{debug, warn};

use studio_core::constants::{RPC_ERRORS_TOTAL, RPC_REQUEST_DURATION_SECONDS, RPC_REQUESTS_TOTAL};

use super::context::RpcContext;
use super::errors::RpcError;
use super::types::{RpcRequest, RpcResponse};

/// Upper bound on one handler run unless configured otherwise.
pub const DEFAULT_HANDLER_TIMEOUT: Duration = Duration::from_secs(60);

/// Requests slower than this are logged.
const SLOW_REQUEST: Duration = Duration::from_secs(5);

/// One RPC method.
#[async_trait]
pub trait MethodHandler: Send + Sync {
    /// Run the method.
    async fn handle(&self, params: Option<Value>, ctx: &RpcContext) -> Result<Value, RpcError>;
}

/// Method name to handler table.
pub struct MethodRegistry {
    handlers: BTreeMap<&'static str, Arc<dyn MethodHandler>>,
    handler_timeout: Duration,
}

impl MethodRegistry {
    /// Empty table with [`DEFAULT_HANDLER_TIMEOUT`].
    pub fn new() -> Self {
        Self {
            handlers: BTreeMap::new(),
            handler_timeout: DEFAULT_HANDLER_TIMEOUT,
        }
    }

    /// Bound every handler run by `timeout`.
    #[must_use]
    pub fn with_handler_timeout(mut self, timeout: Duration) -> Self {
        self.handler_timeout = timeout;
        self
    }

    /// Serve `method` with `handler`, replacing any previous handler.
    pub fn register(&mut self, method: &'static str, handler: impl MethodHandler + 'static) {
        if self.handlers.insert(method, Arc::new(handler)).is_some() {
            debug!(method, "RPC handler replaced");
        }
    }

    /// Run a request and wrap the outcome in a response envelope.
    pub async fn dispatch(&self, request: RpcRequest, ctx: &RpcContext) -> RpcResponse {
        let RpcRequest { id, method, params } = request;
        counter!(RPC_REQUESTS_TOTAL, "method" => method.clone()).increment(1);

        let started = Instant::now();
        let outcome = self.invoke(&method, params, ctx).await;
        let elapsed = started.elapsed();

        histogram!(RPC_REQUEST_DURATION_SECONDS, "method" => method.clone())
            .record(elapsed.as_secs_f64());
        if elapsed >= SLOW_REQUEST {
            warn!(method, elapsed_ms = elapsed.as_millis(), "slow RPC request");
        }

        if let Err(err) = &outcome {
            counter!(RPC_ERRORS_TOTAL, "method" => method, "error_type" => err.code()).increment(1);
        }
        RpcResponse::from_outcome(id, &outcome)
    }

    async fn invoke(
        &self,
        method: &str,
        params: Option<Value>,
        ctx: &RpcContext,
    ) -> Result<Value, RpcError> {
        let handler = self
            .handlers
            .get(method)
            .ok_or_else(|| RpcError::MethodNotFound {
                method: method.to_owned(),
            })?;

        if let Ok(outcome) = tokio::time::timeout(self.handler_timeout, handler.handle(params, ctx)).await {
            outcome
        } else {
            warn!(method, timeout = ?self.handler_timeout, "RPC handler timed out");
            Err(RpcError::HandlerTimeout {
                method: method.to_owned(),
            })
        }
    }

    /// Registered method names in lexical order.
    pub fn methods(&self) -> Vec<&'static str> {
        self.handlers.keys().copied().collect()
    }

    /// Whether `method` has a handler.
    pub fn has_method(&self, method: &str) -> bool {
        self.handlers.contains_key(method)
    }
}

impl Default for MethodRegistry {
    fn default() -> Self {
        Self::new()
    }
}
