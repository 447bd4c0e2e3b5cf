//! Push-socket lifecycle: one connected client from upgrade through
//! disconnect.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tracing::{debug, info, instrument, warn};

use studio_core::SessionId;

use crate::config::ServerConfig;
use crate::connection::{ClientSession, Outbound, spawn_heartbeat};
use crate::rpc::context::RpcContext;
use crate::rpc::registry::MethodRegistry;

use super::handler::handle_message;

/// How long the writer gets to flush its close frame on exit.
const WRITER_DRAIN: Duration = Duration::from_secs(1);

/// Event sent as the first frame of every session.
pub fn connection_established(session_id: &SessionId, resumed: bool) -> Value {
    json!({
        "type": "connection.established",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "data": {
            "sessionId": session_id,
            "resumed": resumed,
        },
    })
}

/// Run a push session for a connected client.
///
/// 1. Registers the session and sends `connection.established`
/// 2. Starts the heartbeat and the outbound writer
/// 3. Dispatches inbound text (or UTF-8 binary) frames as RPC requests,
///    each timed through the connection registry
/// 4. Releases the session on disconnect or forced close
#[instrument(skip_all, fields(session_id = %session_id))]
pub async fn run_ws_session(
    ws: WebSocket,
    session_id: SessionId,
    methods: Arc<MethodRegistry>,
    ctx: Arc<RpcContext>,
    config: Arc<ServerConfig>,
) {
    let (mut ws_tx, mut ws_rx) = ws.split();
    let connections = Arc::clone(&ctx.connections);

    let (tx, mut rx) = mpsc::channel::<Outbound>(config.outbound_buffer.max(1));
    let session = Arc::new(ClientSession::new(session_id.clone(), tx));
    let resumed = connections.register(Arc::clone(&session));

    if let Ok(hello) = serde_json::to_string(&connection_established(&session_id, resumed)) {
        if ws_tx.send(Message::Text(hello.into())).await.is_err() {
            let _ = connections.release(&session);
            return;
        }
    }

    let heartbeat = spawn_heartbeat(
        Arc::clone(&connections),
        Arc::clone(&session),
        config.heartbeat_interval(),
        config.max_missed_heartbeats,
    );

    let close = session.close_token();
    let mut writer = tokio::spawn(async move {
        loop {
            tokio::select! {
                frame = rx.recv() => {
                    let message = match frame {
                        Some(Outbound::Text(text)) => Message::Text(String::from(text.as_str()).into()),
                        Some(Outbound::Ping) => Message::Ping(Vec::new().into()),
                        None => break,
                    };
                    if ws_tx.send(message).await.is_err() {
                        break;
                    }
                }
                () = close.cancelled() => {
                    let _ = ws_tx.send(Message::Close(None)).await;
                    break;
                }
            }
        }
    });

    loop {
        let next = tokio::select! {
            next = ws_rx.next() => next,
            () = session.closed() => break,
        };
        let Some(Ok(message)) = next else { break };

        let text = match message {
            Message::Text(text) => Some(text.as_str().to_owned()),
            Message::Binary(data) => match String::from_utf8(data.to_vec()) {
                Ok(text) => Some(text),
                Err(_) => {
                    info!(len = data.len(), "received non-UTF8 binary frame");
                    None
                }
            },
            Message::Ping(_) | Message::Pong(_) => {
                session.reset_heartbeats();
                None
            }
            Message::Close(_) => {
                info!("client sent close frame");
                break;
            }
        };
        let Some(text) = text else { continue };

        let _ = connections.touch(session.id());
        let timer_key = connections.request_key(session.id());
        let methods = Arc::clone(&methods);
        let ctx = Arc::clone(&ctx);
        let session = Arc::clone(&session);
        // Requests run concurrently; a slow tools/call must not block pings.
        let _ = tokio::spawn(async move {
            ctx.connections.start_request_timer(&timer_key);
            let result = handle_message(&text, &methods, &ctx).await;
            let _ = ctx.connections.end_request_timer(&timer_key);
            if !session.send(Arc::new(result.response_json)) {
                debug!(method = %result.method, "response not delivered, session closed or full");
            }
        });
    }

    let _ = connections.release(&session);
    session.terminate("client disconnected");
    heartbeat.abort();
    if tokio::time::timeout(WRITER_DRAIN, &mut writer).await.is_err() {
        warn!("outbound writer did not finish, aborting");
        writer.abort();
    }
    info!(
        reason = session.close_reason().as_deref().unwrap_or("unknown"),
        dropped_frames = session.drop_count(),
        "session ended"
    );
}

#[cfg(test)]
mod tests {
    // Socket-level behaviour is covered by tests/integration.rs.
    use super::*;

    #[test]
    fn established_message_has_required_fields() {
        let msg = connection_established(&SessionId::from("s1"), false);
        assert_eq!(msg["type"], "connection.established");
        assert_eq!(msg["data"]["sessionId"], "s1");
        assert_eq!(msg["data"]["resumed"], false);
        assert!(msg["timestamp"].is_string());
    }
}
