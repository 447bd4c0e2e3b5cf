//! # studio-server
//!
//! Axum HTTP + WebSocket front end for the Studio command bridge.
//!
//! - Long-poll endpoints for the plugin: `GET /request`, `POST /response`
//! - `POST /test-tool` to drive one tool call by hand
//! - Push sessions on `GET /ws` with heartbeat, idle sweep and lifecycle stats
//! - `/health`, `/stats` and Prometheus `/metrics`
//! - Graceful shutdown via `tokio::signal` + `CancellationToken`

#![deny(unsafe_code)]

pub mod config;
pub mod connection;
pub mod health;
pub mod metrics;
pub mod routes;
pub mod rpc;
pub mod server;
pub mod shutdown;
pub mod websocket;

pub use config::ServerConfig;
pub use server::{AppState, ServerHandle, StudioServer};
pub use shutdown::{DrainReport, ShutdownCoordinator, StopSignal, shutdown_signal};
