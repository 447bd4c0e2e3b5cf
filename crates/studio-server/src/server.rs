//! `StudioServer`: axum HTTP + WebSocket front end for the command bridge.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use metrics_exporter_prometheus::PrometheusHandle;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use studio_bridge::CommandBridge;

use crate::config::ServerConfig;
use crate::connection::{ConnectionRegistry, run_idle_sweeper};
use crate::routes;
use crate::rpc::context::RpcContext;
use crate::rpc::handlers::register_all;
use crate::rpc::registry::MethodRegistry;
use crate::shutdown::ShutdownCoordinator;

/// Slack between the bridge's command deadline and the RPC handler bound,
/// so a tool call times out through the bridge rather than the dispatcher.
const HANDLER_TIMEOUT_SLACK: Duration = Duration::from_secs(5);

/// Shared state accessible from axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// The command bridge.
    pub bridge: Arc<CommandBridge>,
    /// Live push sessions.
    pub connections: Arc<ConnectionRegistry>,
    /// RPC methods served on the push socket.
    pub methods: Arc<MethodRegistry>,
    /// Context handed to RPC handlers.
    pub rpc: Arc<RpcContext>,
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// Prometheus handle, when a recorder is installed.
    pub metrics: Option<PrometheusHandle>,
    /// When the server started.
    pub start_time: Instant,
}

/// The bridge server.
pub struct StudioServer {
    config: Arc<ServerConfig>,
    bridge: Arc<CommandBridge>,
    connections: Arc<ConnectionRegistry>,
    methods: Arc<MethodRegistry>,
    shutdown: Arc<ShutdownCoordinator>,
    metrics: Option<PrometheusHandle>,
    start_time: Instant,
}

impl StudioServer {
    /// Create a server over `bridge` with the built-in RPC methods.
    pub fn new(config: ServerConfig, bridge: Arc<CommandBridge>) -> Self {
        let handler_timeout = bridge.config().command_timeout + HANDLER_TIMEOUT_SLACK;
        let mut methods = MethodRegistry::new().with_handler_timeout(handler_timeout);
        register_all(&mut methods);
        Self {
            config: Arc::new(config),
            bridge,
            connections: Arc::new(ConnectionRegistry::new()),
            methods: Arc::new(methods),
            shutdown: Arc::new(ShutdownCoordinator::new()),
            metrics: None,
            start_time: Instant::now(),
        }
    }

    /// Serve `/metrics` from `handle`.
    #[must_use]
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }

    fn state(&self) -> AppState {
        let rpc = RpcContext {
            bridge: Arc::clone(&self.bridge),
            connections: Arc::clone(&self.connections),
            server_start_time: self.start_time,
        };
        AppState {
            bridge: Arc::clone(&self.bridge),
            connections: Arc::clone(&self.connections),
            methods: Arc::clone(&self.methods),
            rpc: Arc::new(rpc),
            config: Arc::clone(&self.config),
            metrics: self.metrics.clone(),
            start_time: self.start_time,
        }
    }

    /// Build the axum router with all routes.
    pub fn router(&self) -> Router {
        Router::new()
            .route("/request", get(routes::poll_command))
            .route("/response", post(routes::deliver_response))
            .route("/test-tool", post(routes::test_tool))
            .route("/health", get(routes::health))
            .route("/stats", get(routes::stats))
            .route("/metrics", get(routes::prometheus))
            .route("/ws", get(routes::ws_upgrade))
            .with_state(self.state())
            .layer(DefaultBodyLimit::max(self.config.max_body_bytes))
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive())
    }

    /// Server configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// The command bridge.
    pub fn bridge(&self) -> &Arc<CommandBridge> {
        &self.bridge
    }

    /// The connection registry.
    pub fn connections(&self) -> &Arc<ConnectionRegistry> {
        &self.connections
    }

    /// The RPC method registry.
    pub fn methods(&self) -> &Arc<MethodRegistry> {
        &self.methods
    }

    /// The shutdown coordinator.
    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.shutdown
    }

    /// Bind the configured address and start serving in the background,
    /// together with the idle sweeper.
    pub async fn listen(self) -> std::io::Result<ServerHandle> {
        let listener = TcpListener::bind(self.config.bind_addr()).await?;
        let local_addr = listener.local_addr()?;
        let router = self.router();

        let token = self.shutdown.token();
        let http = tokio::spawn(async move {
            let serve = axum::serve(listener, router)
                .with_graceful_shutdown(async move { token.cancelled().await });
            if let Err(e) = serve.await {
                error!(error = %e, "HTTP server failed");
            }
        });

        let sweeper = tokio::spawn(run_idle_sweeper(
            Arc::clone(&self.connections),
            self.config.idle_sweep_interval(),
            self.config.idle_threshold(),
            self.config.idle_grace(),
            self.shutdown.token(),
        ));
        self.shutdown.track("http", http);
        self.shutdown.track("idle_sweeper", sweeper);

        info!(%local_addr, "studio bridge server listening");
        Ok(ServerHandle {
            local_addr,
            bridge: self.bridge,
            connections: self.connections,
            shutdown: self.shutdown,
        })
    }
}

/// Handle to a running server.
pub struct ServerHandle {
    local_addr: SocketAddr,
    bridge: Arc<CommandBridge>,
    connections: Arc<ConnectionRegistry>,
    shutdown: Arc<ShutdownCoordinator>,
}

impl ServerHandle {
    /// Address the server is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// `http://` base URL of the server.
    pub fn url(&self) -> String {
        format!("http://{}", self.local_addr)
    }

    /// The connection registry.
    pub fn connections(&self) -> &Arc<ConnectionRegistry> {
        &self.connections
    }

    /// Stop the server: fail pending commands, release parked pollers,
    /// close every push session, then drain background tasks.
    pub async fn shutdown(self, timeout: Option<Duration>) {
        info!("shutting down studio bridge server");
        self.bridge.close();
        self.connections.cleanup();
        let report = self.shutdown.drain(timeout).await;
        info!(
            finished = report.finished.len(),
            aborted = report.aborted.len(),
            "server stopped"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode, header};
    use serde_json::{Value, json};
    use studio_bridge::BridgeConfig;
    use tower::ServiceExt;

    fn make_server_with(config: BridgeConfig) -> StudioServer {
        StudioServer::new(ServerConfig::default(), Arc::new(CommandBridge::new(config)))
    }

    fn make_server() -> StudioServer {
        make_server_with(BridgeConfig::default())
    }

    async fn body_json(resp: axum::response::Response) -> Value {
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn post_json(uri: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_owned()))
            .unwrap()
    }

    #[tokio::test]
    async fn health_endpoint_returns_ok() {
        let server = make_server();
        let resp = server.router().oneshot(get("/health")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let parsed = body_json(resp).await;
        assert_eq!(parsed["status"], "ok");
        assert_eq!(parsed["connections"], 0);
        assert_eq!(parsed["pending_commands"], 0);
        assert_eq!(parsed["poll_interval_ms"], 1000);
    }

    #[tokio::test]
    async fn poll_returns_queued_command() {
        let server = make_server();
        let pending = server
            .bridge()
            .submit_command("RunCode", json!({"command": "print(1)"}))
            .unwrap();

        let resp = server.router().oneshot(get("/request")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let command = body_json(resp).await;
        assert_eq!(command["id"], pending.id().as_str());
        assert_eq!(command["tool"], "RunCode");
        assert_eq!(command["args"]["command"], "print(1)");
        assert!(command["timestamp"].is_number());
    }

    #[tokio::test(start_paused = true)]
    async fn empty_poll_returns_no_content_after_window() {
        let server = make_server();
        let start = tokio::time::Instant::now();
        let resp = server.router().oneshot(get("/request")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NO_CONTENT);
        assert_eq!(start.elapsed(), Duration::from_secs(15));
    }

    #[tokio::test]
    async fn response_resolves_pending_command() {
        let server = make_server();
        let pending = server.bridge().submit_command("RunCode", json!({})).unwrap();
        let body = json!({"id": pending.id(), "success": true, "result": "1"}).to_string();

        let resp = server
            .router()
            .oneshot(post_json("/response", &body))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(body_json(resp).await, json!({"status": "received"}));
        assert_eq!(pending.await.unwrap(), "1");
    }

    #[tokio::test]
    async fn response_for_unknown_id_is_acknowledged() {
        let server = make_server();
        let body = json!({"id": "never-issued", "success": true, "result": "x"}).to_string();
        let resp = server
            .router()
            .oneshot(post_json("/response", &body))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(server.bridge().stats().unknown_responses, 1);
    }

    #[tokio::test]
    async fn malformed_response_is_bad_request() {
        let server = make_server();

        let resp = server
            .router()
            .oneshot(post_json("/response", "{not json"))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert!(body_json(resp).await["error"].is_string());

        let resp = server
            .router()
            .oneshot(post_json("/response", r#"{"success": true}"#))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let err = body_json(resp).await;
        assert!(err["error"].as_str().unwrap().contains("id"));
    }

    #[tokio::test]
    async fn test_tool_round_trip_parses_json_result() {
        let server = make_server();
        let bridge = Arc::clone(server.bridge());
        let plugin = tokio::spawn(async move {
            let command = bridge.poll_for_command(Duration::from_secs(5)).await.unwrap();
            assert_eq!(command.tool, "GetWorkspace");
            let response = studio_core::StudioResponse::ok(command.id, r#"{"children":3}"#);
            let _ = bridge.deliver_response(response);
        });

        let resp = server
            .router()
            .oneshot(post_json("/test-tool", r#"{"tool":"get_workspace","args":{"maxDepth":2}}"#))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = body_json(resp).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["result"]["children"], 3);
        plugin.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_tool_timeout_is_gateway_timeout() {
        let server = make_server_with(BridgeConfig {
            command_timeout: Duration::from_millis(100),
            ..BridgeConfig::default()
        });
        let resp = server
            .router()
            .oneshot(post_json("/test-tool", r#"{"tool":"RunCode"}"#))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::GATEWAY_TIMEOUT);
        let body = body_json(resp).await;
        assert_eq!(body["success"], false);
        assert!(body["error"].as_str().unwrap().contains("100"));
    }

    #[tokio::test]
    async fn test_tool_rejects_bad_args() {
        let server = make_server();
        let resp = server
            .router()
            .oneshot(post_json("/test-tool", r#"{"tool":"RunCode","args":"nope"}"#))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(resp).await["code"], "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn stats_endpoint_reports_both_sides() {
        let server = make_server();
        let resp = server.router().oneshot(get("/stats")).await.unwrap();
        let body = body_json(resp).await;
        assert_eq!(body["bridge"]["submitted"], 0);
        assert_eq!(body["connections"]["current"], 0);
    }

    #[tokio::test]
    async fn metrics_endpoint_requires_recorder() {
        let server = make_server();
        let resp = server.router().oneshot(get("/metrics")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);

        let handle = metrics_exporter_prometheus::PrometheusBuilder::new()
            .build_recorder()
            .handle();
        let server = make_server().with_metrics(handle);
        let resp = server.router().oneshot(get("/metrics")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn ws_without_upgrade_is_rejected() {
        let server = make_server();
        let resp = server.router().oneshot(get("/ws")).await.unwrap();
        assert!(resp.status().is_client_error());
    }

    #[tokio::test]
    async fn unknown_route_returns_404() {
        let server = make_server();
        let resp = server.router().oneshot(get("/nonexistent")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn builtin_methods_registered() {
        let server = make_server();
        assert!(server.methods().has_method("tools/call"));
        assert!(server.methods().has_method("ping"));
        assert!(!server.shutdown().is_triggered());
    }
}
