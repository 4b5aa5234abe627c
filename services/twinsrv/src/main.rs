//! Digital-twin tank server (`twinsrv`)
//!
//! Serves an HCl dosing tank simulation over Modbus/TCP: one command
//! coil, one pump-state discrete input, two concentration registers.
//! A background task advances the chemistry once per configured tick.

mod updater;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use parking_lot::RwLock;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

use twin_common::{logging, shutdown};
use twin_model::{ConfigWatcher, SimulationConfig, TankModel};
use twin_protocol::DataStore;

#[derive(Parser, Debug)]
#[command(name = "twinsrv", about = "Digital-twin tank Modbus/TCP server")]
struct Args {
    /// Path to the simulation config JSON file
    #[arg(short, long)]
    config: PathBuf,

    /// Override the listen port from the config file
    #[arg(short, long)]
    port: Option<u16>,

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
    let port = args.port.unwrap_or(config.port);

    let model = TankModel::from_config(&config);
    let store = Arc::new(RwLock::new(DataStore::new(
        model.coils(),
        model.inputs(),
        model.registers(),
    )));

    let listener = TcpListener::bind(("0.0.0.0", port))
        .await
        .with_context(|| format!("Failed to bind port {port}"))?;
    info!(port, "twinsrv listening");

    let cancel = CancellationToken::new();
    shutdown::cancel_on_shutdown(&cancel);

    let watcher = ConfigWatcher::new(args.config.clone(), config);
    let updater = tokio::spawn(updater::run(store.clone(), watcher, cancel.clone()));

    twin_protocol::serve(listener, store, cancel.clone()).await;
    updater.await.context("Simulation task panicked")?;

    info!("twinsrv stopped");
    Ok(())
}
