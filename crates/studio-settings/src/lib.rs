//! # studio-settings
//!
//! Configuration for the Studio command bridge server.
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`StudioSettings::default()`]
//! 2. **Settings file**: `~/.studio-mcp/settings.json`, or the path named by
//!    `STUDIO_MCP_SETTINGS` (deep-merged over defaults)
//! 3. **Environment variables**: `STUDIO_MCP_*`, `LOG_LEVEL`, `LOG_FORMAT`
//!
//! Loaded settings should be checked with [`StudioSettings::validate`] before
//! the server starts.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{
    apply_env_overrides, apply_overrides, deep_merge, load_settings, load_settings_from_path,
    settings_path,
};
pub use types::*;
