//! `/health` endpoint body.

use serde::Serialize;
use std::time::Instant;

/// Health check response body.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Always `"ok"` when the server is running.
    pub status: String,
    /// Wall-clock time of the check (RFC 3339).
    pub timestamp: String,
    /// Seconds since the server started.
    pub uptime_secs: u64,
    /// Live push sessions.
    pub connections: usize,
    /// Commands awaiting a response.
    pub pending_commands: usize,
    /// Commands not yet pulled by the plugin.
    pub queued_commands: usize,
    /// Suggested delay between plugin polls, in milliseconds.
    pub poll_interval_ms: u64,
}

/// Live counters reported by `/health`.
#[derive(Debug, Clone, Copy, Default)]
pub struct HealthCounters {
    /// Live push sessions.
    pub connections: usize,
    /// Commands awaiting a response.
    pub pending_commands: usize,
    /// Commands not yet pulled.
    pub queued_commands: usize,
}

/// Build a health response from live counters.
pub fn health_check(start_time: Instant, counters: HealthCounters, poll_interval_ms: u64) -> HealthResponse {
    HealthResponse {
        status: "ok".into(),
        timestamp: chrono::Utc::now().to_rfc3339(),
        uptime_secs: start_time.elapsed().as_secs(),
        connections: counters.connections,
        pending_commands: counters.pending_commands,
        queued_commands: counters.queued_commands,
        poll_interval_ms,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_is_ok() {
        let resp = health_check(Instant::now(), HealthCounters::default(), 1000);
        assert_eq!(resp.status, "ok");
        assert!(resp.uptime_secs < 2);
    }

    #[test]
    fn uptime_increases() {
        let start = Instant::now()
            .checked_sub(std::time::Duration::from_secs(60))
            .unwrap();
        let resp = health_check(start, HealthCounters::default(), 1000);
        assert!(resp.uptime_secs >= 59);
    }

    #[test]
    fn serialization() {
        let counters = HealthCounters {
            connections: 2,
            pending_commands: 3,
            queued_commands: 1,
        };
        let resp = health_check(Instant::now(), counters, 500);
        let parsed = serde_json::to_value(&resp).unwrap();
        assert_eq!(parsed["status"], "ok");
        assert_eq!(parsed["connections"], 2);
        assert_eq!(parsed["pending_commands"], 3);
        assert_eq!(parsed["queued_commands"], 1);
        assert_eq!(parsed["poll_interval_ms"], 500);
        assert!(parsed["timestamp"].is_string());
    }
}
