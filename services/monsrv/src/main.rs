//! Monitoring client (`monsrv`)
//!
//! Polls the tank over Modbus/TCP, runs the readings against a local
//! predictive tank model, records a pH time series, and eventually
//! commands the HCl pump off. A sustained disagreement between readings
//! and predictions stops the loop: something between us and the plant
//! is lying.

mod poll;
mod recorder;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::info;

use twin_common::{logging, shutdown};
use twin_model::{SimulationConfig, StatefulDetector, StatelessDetector};

use poll::PollSettings;

#[derive(Parser, Debug)]
#[command(name = "monsrv", about = "Tank monitoring and control client")]
struct Args {
    /// Path to the simulation config JSON file (prediction parameters)
    #[arg(short, long)]
    config: PathBuf,

    /// Address of the tank server (or the proxy standing in for it)
    #[arg(short, long, default_value = "127.0.0.1:5030")]
    address: String,

    #[arg(short, long, default_value_t = 1)]
    unit_id: u8,

    /// CSV file the pH time series is appended to
    #[arg(short, long, default_value = "tank_data.csv")]
    output: PathBuf,

    /// Polls before the pump shutoff command is first sent
    #[arg(long, default_value_t = 10)]
    shutoff_after: u64,

    /// Single-sample alarm threshold on the H+ register
    #[arg(long, default_value_t = 50)]
    stateless_threshold: i64,

    /// Accumulated-residual alarm threshold on the H+ register
    #[arg(long, default_value_t = 100)]
    stateful_threshold: i64,

    /// Residual leak per poll
    #[arg(long, default_value_t = 10)]
    delta: i64,

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

    let cancel = CancellationToken::new();
    shutdown::cancel_on_shutdown(&cancel);

    let settings = PollSettings {
        address: args.address,
        unit_id: args.unit_id,
        interval: Duration::from_secs_f64(config.update),
        shutoff_after: args.shutoff_after,
    };

    poll::run(
        settings,
        config,
        StatelessDetector::new(args.stateless_threshold),
        StatefulDetector::new(args.stateful_threshold, args.delta),
        &args.output,
        cancel,
    )
    .await?;

    info!("monsrv stopped");
    Ok(())
}
