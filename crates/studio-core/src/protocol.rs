//! Wire types exchanged with the Studio plugin.
//!
//! The plugin pulls [`StudioCommand`]s from `GET /request` and posts a
//! [`StudioResponse`] to `POST /response` once it has executed one. The
//! response body is validated field by field so a malformed post is rejected
//! with a precise message instead of a generic deserialization error.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::BridgeError;
use crate::ids::CommandId;

/// A unit of work handed to the plugin.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StudioCommand {
    /// Correlation token echoed back in the response.
    pub id: CommandId,
    /// Plugin-side tool name (PascalCase).
    pub tool: String,
    /// Tool arguments, passed through untouched.
    pub args: Value,
    /// Creation time, Unix milliseconds.
    pub timestamp: i64,
}

impl StudioCommand {
    /// Create a command with a fresh id stamped with the current time.
    pub fn new(tool: impl Into<String>, args: Value) -> Self {
        Self {
            id: CommandId::new(),
            tool: tool.into(),
            args,
            timestamp: chrono::Utc::now().timestamp_millis(),
        }
    }
}

/// The plugin's answer to a [`StudioCommand`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StudioResponse {
    /// Id of the command being answered.
    pub id: CommandId,
    /// Whether the command succeeded.
    pub success: bool,
    /// Result text on success.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    /// Error text on failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// When the plugin produced the response, Unix milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
}

impl StudioResponse {
    /// A successful response carrying `result`.
    pub fn ok(id: CommandId, result: impl Into<String>) -> Self {
        Self {
            id,
            success: true,
            result: Some(result.into()),
            error: None,
            timestamp: Some(chrono::Utc::now().timestamp_millis()),
        }
    }

    /// A failed response carrying `error`.
    pub fn failed(id: CommandId, error: impl Into<String>) -> Self {
        Self {
            id,
            success: false,
            result: None,
            error: Some(error.into()),
            timestamp: Some(chrono::Utc::now().timestamp_millis()),
        }
    }

    /// Validate an untyped JSON body.
    ///
    /// Non-string `result` values are accepted and kept as compact JSON text,
    /// since plugins sometimes post structured results directly.
    pub fn from_value(value: &Value) -> Result<Self, BridgeError> {
        let Some(body) = value.as_object() else {
            return Err(BridgeError::validation("response body must be a JSON object"));
        };

        let id = match body.get("id") {
            Some(Value::String(id)) if !id.is_empty() => CommandId::from(id.as_str()),
            Some(Value::String(_)) => return Err(BridgeError::validation("'id' must not be empty")),
            Some(_) => return Err(BridgeError::validation("'id' must be a string")),
            None => return Err(BridgeError::validation("missing required field 'id'")),
        };

        let success = match body.get("success") {
            Some(Value::Bool(b)) => *b,
            Some(_) => return Err(BridgeError::validation("'success' must be a boolean")),
            None => return Err(BridgeError::validation("missing required field 'success'")),
        };

        let result = match body.get("result") {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) => Some(s.clone()),
            Some(other) => Some(other.to_string()),
        };

        let error = match body.get("error") {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) => Some(s.clone()),
            Some(_) => return Err(BridgeError::validation("'error' must be a string")),
        };

        let timestamp = match body.get("timestamp") {
            None | Some(Value::Null) => None,
            Some(Value::Number(n)) => n.as_i64().or_else(|| n.as_f64().map(millis_from_f64)),
            Some(_) => return Err(BridgeError::validation("'timestamp' must be a number")),
        };

        Ok(Self {
            id,
            success,
            result,
            error,
            timestamp,
        })
    }

    /// Turn the response into the value a waiting caller receives.
    pub fn into_outcome(self) -> Result<String, BridgeError> {
        if self.success {
            Ok(self.result.unwrap_or_default())
        } else {
            Err(BridgeError::remote(self.error))
        }
    }
}

#[allow(clippy::cast_possible_truncation)]
fn millis_from_f64(value: f64) -> i64 {
    value as i64
}

/// Acknowledgement returned for every well-formed response post.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseAck {
    /// Always `"received"`.
    pub status: String,
}

impl ResponseAck {
    /// The standard acknowledgement.
    pub fn received() -> Self {
        Self {
            status: "received".into(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
