//! # relay
//!
//! Relay binary: loads settings, starts the HTTP/WebSocket server and waits
//! for a termination signal.

#![deny(unsafe_code)]

use anyhow::{Context, Result};
use clap::Parser;
use relay_server::shutdown::wait_for_signal;
use relay_server::RelayServer;
use relay_settings::RelaySettings;
use tracing::info;

/// Notehub webhook relay.
#[derive(Parser, Debug)]
#[command(name = "relay", about = "Relay Notehub webhooks to WebSocket viewers")]
struct Cli {
    /// Host to bind (overrides settings).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind, 0 for auto-assign (overrides settings and `PORT`).
    #[arg(long)]
    port: Option<u16>,

    /// Directory with the viewer pages (overrides settings).
    #[arg(long)]
    static_dir: Option<String>,
}

impl Cli {
    fn apply(self, settings: &mut RelaySettings) {
        if let Some(host) = self.host {
            settings.server.host = host;
        }
        if let Some(port) = self.port {
            settings.server.port = port;
        }
        if let Some(dir) = self.static_dir {
            settings.server.static_dir = dir;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenv::dotenv();
    let cli = Cli::parse();

    let mut settings = relay_settings::load_settings().context("Failed to load settings")?;
    cli.apply(&mut settings);
    relay_telemetry::init_logging(&settings.logging);

    if settings.backend.api_token.is_empty() {
        tracing::warn!("API_TOKEN is not set; device proxy calls will be rejected upstream");
    }

    let server = RelayServer::new(settings).context("Failed to build server")?;
    let (addr, serve) = server.listen().await.context("Failed to bind listener")?;
    info!(%addr, "listening");

    wait_for_signal().await;
    server.shutdown(serve).await;
    Ok(())
}
