//! Shared state handed to every RPC handler.

use std::sync::Arc;
use std::time::Instant;

use studio_bridge::CommandBridge;

use crate::connection::ConnectionRegistry;

/// Dependencies available to RPC handlers.
#[derive(Clone)]
pub struct RpcContext {
    /// The command bridge.
    pub bridge: Arc<CommandBridge>,
    /// Live push sessions.
    pub connections: Arc<ConnectionRegistry>,
    /// When the server started (for uptime).
    pub server_start_time: Instant,
}

impl RpcContext {
    /// Build a context over the given bridge and registry.
    pub fn new(bridge: Arc<CommandBridge>, connections: Arc<ConnectionRegistry>) -> Self {
        Self {
            bridge,
            connections,
            server_start_time: Instant::now(),
        }
    }
}
