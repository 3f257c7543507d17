//! Bridge agent — entry point.
//!
//! ```text
//! adbridge-agent                     Run with defaults / adbridge.toml
//! adbridge-agent --config <path>     Load a custom config TOML
//! adbridge-agent --gen-config        Write default config to stdout
//! adbridge-agent --listen <addr>     Override the listen address
//! adbridge-agent --adb-path <path>   Override the adb binary
//! ```

mod config;
mod server;

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use adbridge_core::hub::EventHub;
use adbridge_core::stream::StreamEngine;

use crate::config::AgentConfig;
use crate::server::AgentServer;

// ── CLI ──────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "adbridge-agent", about = "Device automation bridge agent")]
struct Cli {
    /// Path to configuration TOML file.
    #[arg(short, long, default_value = "adbridge.toml")]
    config: PathBuf,

    /// Print the default configuration to stdout and exit.
    #[arg(long)]
    gen_config: bool,

    /// Listen address override, e.g. 0.0.0.0:3002.
    #[arg(long)]
    listen: Option<String>,

    /// Path to the adb binary (defaults to auto-detection).
    #[arg(long)]
    adb_path: Option<PathBuf>,
}

// ── Main ─────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // --gen-config: dump defaults and exit.
    if cli.gen_config {
        let text = toml::to_string_pretty(&AgentConfig::default())?;
        println!("{text}");
        return Ok(());
    }

    // Load config, then apply CLI overrides.
    let mut config = AgentConfig::load(&cli.config);
    if let Some(listen) = cli.listen {
        config.network.listen_addr = listen;
    }
    if let Some(path) = cli.adb_path {
        config.adb.path = path.display().to_string();
    }

    // Init tracing.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("adbridge-agent v{}", env!("CARGO_PKG_VERSION"));
    info!("listen address: {}", config.network.listen_addr);
    info!("target FPS: {}", config.stream.fps);

    let gateway = config.gateway()?;
    let hub = Arc::new(EventHub::new(gateway.clone()));
    let engine = StreamEngine::new(gateway, config.to_stream_config());
    let server = AgentServer::new(config.network.listen_addr.clone(), hub, engine);

    tokio::select! {
        result = server.run() => result?,
        _ = tokio::signal::ctrl_c() => {
            info!("Ctrl-C received — shutting down");
        }
    }

    Ok(())
}
