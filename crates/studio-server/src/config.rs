//! Server configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use studio_settings::StudioSettings;

/// Configuration for the Studio bridge server.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind (default `"127.0.0.1"`).
    pub host: String,
    /// Port to bind (default `0` for auto-assign).
    pub port: u16,
    /// Maximum concurrent push sessions.
    pub max_connections: usize,
    /// Maximum HTTP request body size in bytes.
    pub max_body_bytes: usize,
    /// Max WebSocket message size in bytes.
    pub max_message_size: usize,
    /// Outbound frames buffered per session before frames are dropped.
    pub outbound_buffer: usize,
    /// Heartbeat interval in milliseconds.
    pub heartbeat_interval_ms: u64,
    /// Unanswered heartbeats tolerated before eviction.
    pub max_missed_heartbeats: u32,
    /// Idle sweep interval in milliseconds.
    pub idle_sweep_interval_ms: u64,
    /// Inactivity before a session is flagged, in milliseconds.
    pub idle_threshold_ms: u64,
    /// Grace period between flagging and eviction, in milliseconds.
    pub idle_grace_ms: u64,
    /// Poll cadence hint advertised to the plugin, in milliseconds.
    pub poll_interval_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 0,
            max_connections: 50,
            max_body_bytes: 10 * 1024 * 1024,
            max_message_size: 16 * 1024 * 1024,
            outbound_buffer: 1024,
            heartbeat_interval_ms: 30_000,
            max_missed_heartbeats: 3,
            idle_sweep_interval_ms: 30_000,
            idle_threshold_ms: 300_000,
            idle_grace_ms: 60_000,
            poll_interval_ms: 1_000,
        }
    }
}

impl ServerConfig {
    /// Derive the server configuration from loaded settings.
    pub fn from_settings(settings: &StudioSettings) -> Self {
        let server = &settings.server;
        let conn = &settings.connections;
        Self {
            host: server.host.clone(),
            port: server.port,
            max_connections: conn.max_connections,
            max_body_bytes: server.max_body_bytes,
            max_message_size: conn.max_message_size,
            heartbeat_interval_ms: conn.heartbeat_interval_ms,
            max_missed_heartbeats: conn.max_missed_heartbeats,
            idle_sweep_interval_ms: conn.idle_sweep_interval_ms,
            idle_threshold_ms: conn.idle_threshold_ms,
            idle_grace_ms: conn.idle_grace_ms,
            poll_interval_ms: settings.timeouts.poll_interval_ms,
            ..Self::default()
        }
    }

    /// Heartbeat interval.
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    /// Idle sweep interval.
    pub fn idle_sweep_interval(&self) -> Duration {
        Duration::from_millis(self.idle_sweep_interval_ms)
    }

    /// Idle threshold.
    pub fn idle_threshold(&self) -> Duration {
        Duration::from_millis(self.idle_threshold_ms)
    }

    /// Idle grace period.
    pub fn idle_grace(&self) -> Duration {
        Duration::from_millis(self.idle_grace_ms)
    }

    /// `host:port` bind address.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.host, "127.0.0.1");
        assert_eq!(cfg.port, 0);
        assert_eq!(cfg.max_connections, 50);
        assert_eq!(cfg.max_missed_heartbeats, 3);
        assert_eq!(cfg.heartbeat_interval(), Duration::from_secs(30));
        assert_eq!(cfg.idle_threshold(), Duration::from_secs(300));
        assert_eq!(cfg.idle_grace(), Duration::from_secs(60));
    }

    #[test]
    fn from_settings_copies_fields() {
        let mut settings = StudioSettings::default();
        settings.server.host = "0.0.0.0".into();
        settings.server.port = 8080;
        settings.connections.max_connections = 5;
        settings.connections.heartbeat_interval_ms = 10_000;
        settings.connections.max_missed_heartbeats = 7;
        settings.timeouts.poll_interval_ms = 250;

        let cfg = ServerConfig::from_settings(&settings);
        assert_eq!(cfg.bind_addr(), "0.0.0.0:8080");
        assert_eq!(cfg.max_connections, 5);
        assert_eq!(cfg.heartbeat_interval(), Duration::from_secs(10));
        assert_eq!(cfg.max_missed_heartbeats, 7);
        assert_eq!(cfg.poll_interval_ms, 250);
        assert_eq!(cfg.outbound_buffer, 1024);
    }

    #[test]
    fn serde_roundtrip() {
        let cfg = ServerConfig::default();
        let json = serde_json::to_string(&cfg).unwrap();
        let back: ServerConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.host, cfg.host);
        assert_eq!(back.idle_grace_ms, cfg.idle_grace_ms);
    }
}
