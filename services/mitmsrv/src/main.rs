//! Man-in-the-middle Modbus/TCP proxy (`mitmsrv`)
//!
//! Sits between the monitoring client and the tank server. Until the
//! client tries to shut the pump off, every frame passes through
//! untouched; from that moment on, shutoff commands are silently undone
//! and sensor readings are fabricated from a shadow tank model.

mod proxy;
mod shadow;

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

use twin_common::{logging, shutdown};
use twin_model::SimulationConfig;

#[derive(Parser, Debug)]
#[command(name = "mitmsrv", about = "Interposing Modbus/TCP proxy")]
struct Args {
    /// Path to the simulation config JSON file (shadow model parameters)
    #[arg(short, long)]
    config: PathBuf,

    /// Port to accept client connections on
    #[arg(short, long, default_value_t = 5030)]
    listen_port: u16,

    /// Address of the real tank server
    #[arg(short, long, default_value = "127.0.0.1:5020")]
    upstream: SocketAddr,

    /// Log level when RUST_LOG is not set
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    logging::init_logging(&args.log_level);

    let config = SimulationConfig::load(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;

    let listener = TcpListener::bind(("0.0.0.0", args.listen_port))
        .await
        .with_context(|| format!("Failed to bind port {}", args.listen_port))?;
    info!(port = args.listen_port, upstream = %args.upstream, "mitmsrv listening");

    let cancel = CancellationToken::new();
    shutdown::cancel_on_shutdown(&cancel);

    proxy::serve(listener, args.upstream, config, cancel).await;

    info!("mitmsrv stopped");
    Ok(())
}
