//! Metric names shared across crates.
//!
//! Kept in one place so the bridge, the server and the dashboards agree on
//! spelling.

/// Commands submitted to the bridge (counter, labels: tool).
pub const BRIDGE_COMMANDS_SUBMITTED_TOTAL: &str = "bridge_commands_submitted_total";
/// Commands handed to the plugin by a poll (counter).
pub const BRIDGE_COMMANDS_DISPATCHED_TOTAL: &str = "bridge_commands_dispatched_total";
/// Commands settled, by outcome (counter, labels: outcome).
pub const BRIDGE_COMMANDS_SETTLED_TOTAL: &str = "bridge_commands_settled_total";
/// Responses that matched no live waiter (counter).
pub const BRIDGE_UNKNOWN_RESPONSES_TOTAL: &str = "bridge_unknown_responses_total";
/// Submit-to-settle latency (histogram).
pub const BRIDGE_COMMAND_DURATION_SECONDS: &str = "bridge_command_duration_seconds";
/// Commands waiting in the queue (gauge).
pub const BRIDGE_QUEUE_DEPTH: &str = "bridge_queue_depth";
/// Pollers currently parked on an empty queue (gauge).
pub const BRIDGE_POLLERS_WAITING: &str = "bridge_pollers_waiting";
/// WebSocket sessions registered (counter).
pub const WS_CONNECTIONS_TOTAL: &str = "ws_connections_total";
/// WebSocket sessions unregistered (counter).
pub const WS_DISCONNECTIONS_TOTAL: &str = "ws_disconnections_total";
/// Live WebSocket sessions (gauge).
pub const WS_CONNECTIONS_ACTIVE: &str = "ws_connections_active";
/// Forced session evictions (counter, labels: reason).
pub const WS_EVICTIONS_TOTAL: &str = "ws_evictions_total";
/// WebSocket session lifetime (histogram).
pub const WS_CONNECTION_DURATION_SECONDS: &str = "ws_connection_duration_seconds";
/// WebSocket RPC requests (counter, labels: method).
pub const RPC_REQUESTS_TOTAL: &str = "rpc_requests_total";
/// WebSocket RPC errors (counter, labels: method, error_type).
pub const RPC_ERRORS_TOTAL: &str = "rpc_errors_total";
/// WebSocket RPC duration (histogram, labels: method).
pub const RPC_REQUEST_DURATION_SECONDS: &str = "rpc_request_duration_seconds";
