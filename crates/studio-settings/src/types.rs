//! Settings types.
//!
//! All structs deserialize with `camelCase` keys and fall back to compiled
//! defaults for any missing field, so a settings file only needs the values
//! it changes.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use studio_core::logging::LogFormat;

use crate::errors::{Result, SettingsError};

/// Root settings object.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StudioSettings {
    /// HTTP listener settings.
    pub server: ServerSettings,
    /// Command bridge timeouts.
    pub timeouts: TimeoutSettings,
    /// Push-session lifecycle settings.
    pub connections: ConnectionSettings,
    /// Logging settings.
    pub logging: LoggingSettings,
}

impl StudioSettings {
    /// Reject settings the server cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(SettingsError::invalid("server.port", "must be between 1 and 65535"));
        }
        if self.server.host.trim().is_empty() {
            return Err(SettingsError::invalid("server.host", "cannot be empty"));
        }
        if self.timeouts.command_timeout_ms < 1000 {
            return Err(SettingsError::invalid(
                "timeouts.commandTimeoutMs",
                format!("{}ms is too short, min 1000ms", self.timeouts.command_timeout_ms),
            ));
        }
        if self.timeouts.poll_timeout_ms == 0 {
            return Err(SettingsError::invalid("timeouts.pollTimeoutMs", "must be positive"));
        }
        if self.connections.heartbeat_interval_ms == 0 {
            return Err(SettingsError::invalid("connections.heartbeatIntervalMs", "must be positive"));
        }
        if self.connections.idle_sweep_interval_ms == 0 {
            return Err(SettingsError::invalid("connections.idleSweepIntervalMs", "must be positive"));
        }
        if self.connections.max_missed_heartbeats == 0 {
            return Err(SettingsError::invalid("connections.maxMissedHeartbeats", "must be at least 1"));
        }
        Ok(())
    }

    /// URL the plugin should poll.
    pub fn server_url(&self) -> String {
        format!("http://{}:{}", self.server.public_host, self.server.port)
    }
}

/// HTTP listener settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    /// Listen port.
    pub port: u16,
    /// Host name advertised to the plugin.
    pub public_host: String,
    /// Maximum accepted request body, bytes.
    pub max_body_bytes: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            public_host: "localhost".to_string(),
            max_body_bytes: 10 * 1024 * 1024,
        }
    }
}

/// Command bridge timeouts.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TimeoutSettings {
    /// How long a submitted command waits for its response.
    pub command_timeout_ms: u64,
    /// How long a `GET /request` poll is held open when the queue is empty.
    pub poll_timeout_ms: u64,
    /// Delay the plugin waits between polls. Advertised only.
    pub poll_interval_ms: u64,
}

impl Default for TimeoutSettings {
    fn default() -> Self {
        Self {
            command_timeout_ms: 30_000,
            poll_timeout_ms: 15_000,
            poll_interval_ms: 1_000,
        }
    }
}

impl TimeoutSettings {
    /// Command deadline.
    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout_ms)
    }

    /// Long-poll window.
    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms)
    }
}

/// Push-session lifecycle settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConnectionSettings {
    /// Interval between heartbeat rounds.
    pub heartbeat_interval_ms: u64,
    /// Consecutive unanswered heartbeats tolerated before eviction.
    pub max_missed_heartbeats: u32,
    /// Interval between idle sweeps.
    pub idle_sweep_interval_ms: u64,
    /// Inactivity after which a session is flagged idle.
    pub idle_threshold_ms: u64,
    /// Grace period between idle flag and forced eviction.
    pub idle_grace_ms: u64,
    /// Maximum concurrent push sessions.
    pub max_connections: usize,
    /// Maximum accepted WebSocket message size, bytes.
    pub max_message_size: usize,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            heartbeat_interval_ms: 30_000,
            max_missed_heartbeats: 3,
            idle_sweep_interval_ms: 30_000,
            idle_threshold_ms: 300_000,
            idle_grace_ms: 60_000,
            max_connections: 50,
            max_message_size: 16 * 1024 * 1024,
        }
    }
}

impl ConnectionSettings {
    /// Heartbeat round interval.
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
}

/// Logging settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default level filter (overridden by `RUST_LOG`).
    pub level: String,
    /// Output format.
    pub format: LogFormat,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Compact,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn defaults() {
        let s = StudioSettings::default();
        assert_eq!(s.server.port, 3000);
        assert_eq!(s.server.host, "0.0.0.0");
        assert_eq!(s.timeouts.command_timeout_ms, 30_000);
        assert_eq!(s.timeouts.poll_timeout_ms, 15_000);
        assert_eq!(s.timeouts.poll_interval_ms, 1_000);
        assert_eq!(s.connections.heartbeat_interval_ms, 30_000);
        assert_eq!(s.connections.max_missed_heartbeats, 3);
        assert_eq!(s.connections.idle_sweep_interval_ms, 30_000);
        assert_eq!(s.connections.idle_threshold_ms, 300_000);
        assert_eq!(s.connections.idle_grace_ms, 60_000);
        assert_eq!(s.logging.level, "info");
        assert_eq!(s.logging.format, LogFormat::Compact);
    }

    #[test]
    fn defaults_are_valid() {
        assert!(StudioSettings::default().validate().is_ok());
    }

    #[test]
    fn duration_accessors() {
        let s = StudioSettings::default();
        assert_eq!(s.timeouts.command_timeout(), Duration::from_secs(30));
        assert_eq!(s.timeouts.poll_timeout(), Duration::from_secs(15));
        assert_eq!(s.connections.heartbeat_interval(), Duration::from_secs(30));
        assert_eq!(s.connections.idle_threshold(), Duration::from_secs(300));
        assert_eq!(s.connections.idle_grace(), Duration::from_secs(60));
        assert_eq!(s.connections.idle_sweep_interval(), Duration::from_secs(30));
    }

    #[test]
    fn server_url_uses_public_host() {
        let mut s = StudioSettings::default();
        assert_eq!(s.server_url(), "http://localhost:3000");
        s.server.public_host = "studio.local".into();
        s.server.port = 4000;
        assert_eq!(s.server_url(), "http://studio.local:4000");
    }

    #[test]
    fn rejects_zero_port() {
        let mut s = StudioSettings::default();
        s.server.port = 0;
        assert_matches!(s.validate(), Err(SettingsError::Invalid { field: "server.port", .. }));
    }

    #[test]
    fn rejects_empty_host() {
        let mut s = StudioSettings::default();
        s.server.host = "  ".into();
        assert_matches!(s.validate(), Err(SettingsError::Invalid { field: "server.host", .. }));
    }

    #[test]
    fn rejects_short_command_timeout() {
        let mut s = StudioSettings::default();
        s.timeouts.command_timeout_ms = 999;
        assert_matches!(
            s.validate(),
            Err(SettingsError::Invalid { reason, .. }) if reason.contains("min 1000ms")
        );
        s.timeouts.command_timeout_ms = 1000;
        assert!(s.validate().is_ok());
    }

    #[test]
    fn rejects_zero_heartbeat_threshold() {
        let mut s = StudioSettings::default();
        s.connections.max_missed_heartbeats = 0;
        assert_matches!(
            s.validate(),
            Err(SettingsError::Invalid { field: "connections.maxMissedHeartbeats", .. })
        );
    }

    #[test]
    fn rejects_zero_intervals() {
        let mut s = StudioSettings::default();
        s.connections.idle_sweep_interval_ms = 0;
        assert!(s.validate().is_err());

        let mut s = StudioSettings::default();
        s.timeouts.poll_timeout_ms = 0;
        assert!(s.validate().is_err());
    }

    #[test]
    fn serializes_camel_case() {
        let value = serde_json::to_value(StudioSettings::default()).unwrap();
        assert_eq!(value["timeouts"]["commandTimeoutMs"], 30_000);
        assert_eq!(value["connections"]["maxMissedHeartbeats"], 3);
        assert_eq!(value["server"]["publicHost"], "localhost");
        assert_eq!(value["logging"]["format"], "compact");
    }

    #[test]
    fn partial_json_fills_defaults() {
        let s: StudioSettings =
            serde_json::from_str(r#"{"server": {"port": 4100}}"#).unwrap();
        assert_eq!(s.server.port, 4100);
        assert_eq!(s.server.host, "0.0.0.0");
        assert_eq!(s.timeouts.command_timeout_ms, 30_000);
    }
}
