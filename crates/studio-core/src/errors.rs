//! Error taxonomy for the command bridge.
//!
//! Every failure the bridge can surface is a [`BridgeError`] variant. Each
//! variant has a stable machine-readable [`code`](BridgeError::code) used on
//! the wire and as a metrics label.

use thiserror::Error;

/// Message used when the plugin reports failure without saying why.
pub const UNKNOWN_REMOTE_ERROR: &str = "Unknown error";

/// Errors produced by the command bridge and its transports.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BridgeError {
    /// A command or response payload was malformed. Rejected before touching
    /// the queue or the waiter table.
    #[error("invalid payload: {message}")]
    Validation {
        /// What was wrong with the payload.
        message: String,
    },

    /// No response arrived before the command's deadline.
    #[error("Studio command timeout ({timeout_ms}ms)")]
    Timeout {
        /// The deadline that elapsed, in milliseconds.
        timeout_ms: u64,
    },

    /// The plugin executed the command and reported a failure.
    #[error("{message}")]
    Remote {
        /// Error text delivered by the plugin.
        message: String,
    },

    /// A response arrived for an id with no live waiter.
    #[error("no pending command with id {id}")]
    UnknownCorrelation {
        /// The unmatched correlation id.
        id: String,
    },

    /// A push session's transport failed or was forcibly closed.
    #[error("session {session_id} transport failure: {reason}")]
    Transport {
        /// Affected session.
        session_id: String,
        /// Why the transport was terminated.
        reason: String,
    },

    /// The bridge shut down while the command was pending.
    #[error("command bridge is closed")]
    Closed,
}

impl BridgeError {
    /// Build a [`BridgeError::Validation`].
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Build a [`BridgeError::Remote`], substituting a generic message when
    /// the plugin sent none.
    pub fn remote(message: Option<String>) -> Self {
        let message = message
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| UNKNOWN_REMOTE_ERROR.to_owned());
        Self::Remote { message }
    }

    /// Machine-readable error code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "VALIDATION_ERROR",
            Self::Timeout { .. } => "TIMEOUT",
            Self::Remote { .. } => "REMOTE_ERROR",
            Self::UnknownCorrelation { .. } => "UNKNOWN_CORRELATION",
            Self::Transport { .. } => "TRANSPORT_ERROR",
            Self::Closed => "BRIDGE_CLOSED",
        }
    }

    /// Whether this is a deadline expiry.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
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
    fn timeout_message_mentions_duration() {
        let err = BridgeError::Timeout { timeout_ms: 100 };
        assert_eq!(err.to_string(), "Studio command timeout (100ms)");
        assert!(err.is_timeout());
    }

    #[test]
    fn remote_defaults_message() {
        assert_eq!(BridgeError::remote(None).to_string(), "Unknown error");
        assert_eq!(
            BridgeError::remote(Some(String::new())).to_string(),
            "Unknown error"
        );
        assert_matches!(
            BridgeError::remote(Some("boom".into())),
            BridgeError::Remote { message } if message == "boom"
        );
    }

    #[test]
    fn validation_display() {
        let err = BridgeError::validation("missing id");
        assert_eq!(err.to_string(), "invalid payload: missing id");
        assert!(!err.is_timeout());
    }

    #[test]
    fn codes_are_distinct() {
        let all = [
            BridgeError::validation("x"),
            BridgeError::Timeout { timeout_ms: 1 },
            BridgeError::remote(None),
            BridgeError::UnknownCorrelation { id: "x".into() },
            BridgeError::Transport {
                session_id: "s".into(),
                reason: "r".into(),
            },
            BridgeError::Closed,
        ];
        let codes: std::collections::HashSet<_> = all.iter().map(BridgeError::code).collect();
        assert_eq!(codes.len(), all.len());
    }

    #[test]
    fn transport_display_names_session() {
        let err = BridgeError::Transport {
            session_id: "sess-1".into(),
            reason: "heartbeat timeout".into(),
        };
        assert!(err.to_string().contains("sess-1"));
        assert!(err.to_string().contains("heartbeat timeout"));
    }
}
