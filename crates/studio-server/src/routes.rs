//! HTTP route handlers.

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::http::header::CONTENT_TYPE;
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, warn};

use studio_core::{BridgeError, ResponseAck, SessionId};

use crate::health::{self, HealthCounters, HealthResponse};
use crate::metrics;
use crate::server::AppState;
use crate::websocket::run_ws_session;

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(json!({ "error": message.into() }))).into_response()
}

/// HTTP status for a bridge failure surfaced to an HTTP caller.
pub fn bridge_error_status(err: &BridgeError) -> StatusCode {
    match err {
        BridgeError::Validation { .. } => StatusCode::BAD_REQUEST,
        BridgeError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
        BridgeError::Closed => StatusCode::SERVICE_UNAVAILABLE,
        BridgeError::Remote { .. }
        | BridgeError::UnknownCorrelation { .. }
        | BridgeError::Transport { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// GET /request: long-poll for the next command.
pub(crate) async fn poll_command(State(state): State<AppState>) -> Response {
    match state.bridge.poll().await {
        Some(command) => Json(command).into_response(),
        None => StatusCode::NO_CONTENT.into_response(),
    }
}

/// POST /response: deliver the plugin's result for a command.
pub(crate) async fn deliver_response(
    State(state): State<AppState>,
    body: Result<Json<Value>, JsonRejection>,
) -> Response {
    let Json(body) = match body {
        Ok(body) => body,
        Err(rejection) => {
            debug!(error = %rejection.body_text(), "rejected response body");
            return error_response(StatusCode::BAD_REQUEST, rejection.body_text());
        }
    };
    match state.bridge.deliver_value(&body) {
        Ok(outcome) => {
            debug!(?outcome, "response delivered");
            Json(ResponseAck::received()).into_response()
        }
        Err(err) => {
            warn!(error = %err, "invalid response payload");
            error_response(StatusCode::BAD_REQUEST, err.to_string())
        }
    }
}

/// Body of `POST /test-tool`.
#[derive(Debug, Deserialize)]
pub(crate) struct TestToolRequest {
    tool: String,
    #[serde(default)]
    args: Value,
}

/// POST /test-tool: run one tool through the bridge and wait for it.
pub(crate) async fn test_tool(
    State(state): State<AppState>,
    body: Result<Json<TestToolRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match body {
        Ok(body) => body,
        Err(rejection) => return error_response(StatusCode::BAD_REQUEST, rejection.body_text()),
    };

    let outcome = match state.bridge.submit_command(&request.tool, request.args) {
        Ok(pending) => pending.await,
        Err(err) => Err(err),
    };

    match outcome {
        Ok(text) => {
            let result = serde_json::from_str::<Value>(&text).unwrap_or(Value::String(text));
            Json(json!({ "success": true, "result": result })).into_response()
        }
        Err(err) => {
            let status = bridge_error_status(&err);
            (
                status,
                Json(json!({
                    "success": false,
                    "error": err.to_string(),
                    "code": err.code(),
                })),
            )
                .into_response()
        }
    }
}

/// GET /health
pub(crate) async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let counters = HealthCounters {
        connections: state.connections.len(),
        pending_commands: state.bridge.pending_count(),
        queued_commands: state.bridge.queue_len(),
    };
    Json(health::health_check(
        state.start_time,
        counters,
        state.config.poll_interval_ms,
    ))
}

/// GET /stats
pub(crate) async fn stats(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "bridge": state.bridge.stats(),
        "connections": state.connections.stats(),
        "uptimeSecs": state.start_time.elapsed().as_secs(),
    }))
}

/// GET /metrics
pub(crate) async fn prometheus(State(state): State<AppState>) -> Response {
    match &state.metrics {
        Some(handle) => (
            [(CONTENT_TYPE, "text/plain; version=0.0.4")],
            metrics::render(handle),
        )
            .into_response(),
        None => error_response(StatusCode::NOT_FOUND, "metrics recorder not installed"),
    }
}

/// Query string of `GET /ws`.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct WsQuery {
    #[serde(rename = "sessionId")]
    session_id: Option<String>,
}

/// GET /ws: upgrade to a push session.
pub(crate) async fn ws_upgrade(
    State(state): State<AppState>,
    Query(query): Query<WsQuery>,
    ws: WebSocketUpgrade,
) -> Response {
    let session_id = query
        .session_id
        .filter(|id| !id.trim().is_empty())
        .map(SessionId::from)
        .unwrap_or_default();

    // A resume replaces a live session, so it never grows the count.
    if state.connections.len() >= state.config.max_connections
        && !state.connections.contains(&session_id)
    {
        warn!(
            max = state.config.max_connections,
            "rejecting push session, connection limit reached"
        );
        return error_response(StatusCode::SERVICE_UNAVAILABLE, "too many connections");
    }

    let AppState {
        methods, rpc, config, ..
    } = state;
    ws.max_message_size(config.max_message_size)
        .on_upgrade(move |socket| run_ws_session(socket, session_id, methods, rpc, config))
}
