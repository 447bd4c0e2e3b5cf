//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`StudioSettings::default()`]
//! 2. If the settings file exists, deep-merge its values over defaults
//! 3. Apply environment variable overrides (highest priority)
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::{Result, SettingsError};
use crate::types::StudioSettings;

/// Env var naming an explicit settings file.
pub const SETTINGS_PATH_ENV: &str = "STUDIO_MCP_SETTINGS";

/// Resolve the settings file path.
///
/// `STUDIO_MCP_SETTINGS` wins; otherwise `~/.studio-mcp/settings.json`.
pub fn settings_path() -> PathBuf {
    if let Ok(explicit) = std::env::var(SETTINGS_PATH_ENV) {
        if !explicit.is_empty() {
            return PathBuf::from(explicit);
        }
    }
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".studio-mcp").join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<StudioSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// A missing file yields defaults. A file with invalid JSON is an error.
pub fn load_settings_from_path(path: &Path) -> Result<StudioSettings> {
    let mut settings = load_file_layer(path)?;
    apply_env_overrides(&mut settings);
    Ok(settings)
}

fn load_file_layer(path: &Path) -> Result<StudioSettings> {
    let parse_error = |source| SettingsError::Parse {
        path: path.to_owned(),
        source,
    };
    let defaults = serde_json::to_value(StudioSettings::default()).map_err(parse_error)?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path).map_err(|source| SettingsError::Read {
            path: path.to_owned(),
            source,
        })?;
        let user: Value = serde_json::from_str(&content).map_err(parse_error)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    serde_json::from_value(merged).map_err(parse_error)
}

/// Recursive deep merge of two JSON values.
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = if let Some(target_val) = target_map.remove(&key) {
                    deep_merge(target_val, source_val)
                } else {
                    source_val
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply process environment overrides.
pub fn apply_env_overrides(settings: &mut StudioSettings) {
    apply_overrides(settings, |name| std::env::var(name).ok());
}

/// Apply overrides from an arbitrary variable source.
///
/// Integers must parse and fall within range. Invalid values are logged and
/// ignored, leaving the file/default value in place.
pub fn apply_overrides<F>(settings: &mut StudioSettings, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let env = EnvReader { lookup };

    // ── Server ──────────────────────────────────────────────────────
    if let Some(v) = env.u16("STUDIO_MCP_PORT", 1, 65535) {
        settings.server.port = v;
    }
    if let Some(v) = env.string("STUDIO_MCP_HOST") {
        settings.server.host = v;
    }
    if let Some(v) = env.string("STUDIO_MCP_PUBLIC_HOST") {
        settings.server.public_host = v;
    }

    // ── Timeouts ────────────────────────────────────────────────────
    if let Some(v) = env.u64("STUDIO_MCP_COMMAND_TIMEOUT_MS", 1000, 3_600_000) {
        settings.timeouts.command_timeout_ms = v;
    }
    if let Some(v) = env.u64("STUDIO_MCP_POLL_TIMEOUT_MS", 1, 600_000) {
        settings.timeouts.poll_timeout_ms = v;
    }
    if let Some(v) = env.u64("STUDIO_MCP_POLL_INTERVAL_MS", 1, 600_000) {
        settings.timeouts.poll_interval_ms = v;
    }

    // ── Connections ─────────────────────────────────────────────────
    if let Some(v) = env.u64("STUDIO_MCP_HEARTBEAT_INTERVAL_MS", 100, 600_000) {
        settings.connections.heartbeat_interval_ms = v;
    }
    if let Some(v) = env
        .u64("STUDIO_MCP_MAX_MISSED_HEARTBEATS", 1, 100)
        .and_then(|v| u32::try_from(v).ok())
    {
        settings.connections.max_missed_heartbeats = v;
    }
    if let Some(v) = env.u64("STUDIO_MCP_IDLE_SWEEP_INTERVAL_MS", 100, 3_600_000) {
        settings.connections.idle_sweep_interval_ms = v;
    }
    if let Some(v) = env.u64("STUDIO_MCP_IDLE_THRESHOLD_MS", 1000, 86_400_000) {
        settings.connections.idle_threshold_ms = v;
    }
    if let Some(v) = env.u64("STUDIO_MCP_IDLE_GRACE_MS", 0, 3_600_000) {
        settings.connections.idle_grace_ms = v;
    }
    if let Some(v) = env.usize("STUDIO_MCP_MAX_CONNECTIONS", 1, 100_000) {
        settings.connections.max_connections = v;
    }

    // ── Logging ─────────────────────────────────────────────────────
    if let Some(v) = env.string("LOG_LEVEL") {
        settings.logging.level = v;
    }
    if let Some(v) = env.string("LOG_FORMAT") {
        match v.parse() {
            Ok(format) => settings.logging.format = format,
            Err(e) => warn!(key = "LOG_FORMAT", value = %v, error = %e, "invalid env var, ignoring"),
        }
    }
}

// ── Pure parsing functions ──────────────────────────────────────────────────

/// Parse a string as a `u16` within a range.
pub fn parse_u16_range(val: &str, min: u16, max: u16) -> Option<u16> {
    let n: u16 = val.trim().parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `u64` within a range.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.trim().parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `usize` within a range.
pub fn parse_usize_range(val: &str, min: usize, max: usize) -> Option<usize> {
    let n: usize = val.trim().parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

// ── Variable readers ────────────────────────────────────────────────────────

struct EnvReader<F> {
    lookup: F,
}

impl<F> EnvReader<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn string(&self, name: &str) -> Option<String> {
        (self.lookup)(name).filter(|v| !v.is_empty())
    }

    fn u16(&self, name: &str, min: u16, max: u16) -> Option<u16> {
        let val = self.string(name)?;
        let result = parse_u16_range(&val, min, max);
        if result.is_none() {
            warn!(key = name, value = %val, "invalid u16 env var, ignoring");
        }
        result
    }

    fn u64(&self, name: &str, min: u64, max: u64) -> Option<u64> {
        let val = self.string(name)?;
        let result = parse_u64_range(&val, min, max);
        if result.is_none() {
            warn!(key = name, value = %val, "invalid u64 env var, ignoring");
        }
        result
    }

    fn usize(&self, name: &str, min: usize, max: usize) -> Option<usize> {
        let val = self.string(name)?;
        let result = parse_usize_range(&val, min, max);
        if result.is_none() {
            warn!(key = name, value = %val, "invalid usize env var, ignoring");
        }
        result
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
