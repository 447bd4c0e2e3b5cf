//! # studio-mcp
//!
//! Studio command bridge server binary: loads settings, wires the bridge
//! into the HTTP/WebSocket server and runs until SIGINT/SIGTERM.

#![deny(unsafe_code)]

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};

use studio_bridge::{BridgeConfig, CommandBridge};
use studio_core::logging::{LogFormat, init_subscriber};
use studio_server::{ServerConfig, StudioServer, metrics, shutdown_signal};
use studio_settings::{StudioSettings, load_settings_from_path, settings_path};

/// Studio command bridge server.
#[derive(Parser, Debug)]
#[command(name = "studio-mcp", about = "Bridge between tool callers and a polling Studio plugin")]
struct Cli {
    /// Host to bind (overrides settings).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind (overrides settings).
    #[arg(long)]
    port: Option<u16>,

    /// Settings file (defaults to `$STUDIO_MCP_SETTINGS`, then `~/.studio-mcp/settings.json`).
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Log level or `EnvFilter` directive (overrides settings).
    #[arg(long)]
    log_level: Option<String>,

    /// Log format: `compact` or `json` (overrides settings).
    #[arg(long)]
    log_format: Option<LogFormat>,
}

impl Cli {
    /// Apply command-line overrides on top of file and env settings.
    fn apply(&self, settings: &mut StudioSettings) {
        if let Some(host) = &self.host {
            settings.server.host.clone_from(host);
        }
        if let Some(port) = self.port {
            settings.server.port = port;
        }
        if let Some(level) = &self.log_level {
            settings.logging.level.clone_from(level);
        }
        if let Some(format) = self.log_format {
            settings.logging.format = format;
        }
    }
}

fn bridge_config(settings: &StudioSettings) -> BridgeConfig {
    BridgeConfig {
        command_timeout: settings.timeouts.command_timeout(),
        poll_timeout: settings.timeouts.poll_timeout(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let path = cli.settings.clone().unwrap_or_else(settings_path);
    let mut settings = load_settings_from_path(&path)
        .with_context(|| format!("Failed to load settings from {}", path.display()))?;
    cli.apply(&mut settings);
    settings.validate().context("Invalid settings")?;

    init_subscriber(&settings.logging.level, settings.logging.format);
    info!(path = %path.display(), "settings loaded");

    let bridge = Arc::new(CommandBridge::new(bridge_config(&settings)));
    let mut server = StudioServer::new(ServerConfig::from_settings(&settings), bridge);
    match metrics::install_recorder() {
        Ok(handle) => server = server.with_metrics(handle),
        Err(e) => warn!(error = %e, "metrics recorder unavailable, /metrics disabled"),
    }

    let handle = server
        .listen()
        .await
        .with_context(|| format!("Failed to bind {}:{}", settings.server.host, settings.server.port))?;
    info!(
        listen = %handle.local_addr(),
        plugin_url = %settings.server_url(),
        "ready for the Studio plugin"
    );

    let signal = shutdown_signal().await;
    info!(?signal, "shutdown requested");
    handle.shutdown(None).await;
    Ok(())
}
