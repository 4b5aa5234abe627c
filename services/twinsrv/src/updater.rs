//! Periodic simulation task running beside the Modbus server.

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use twin_model::{ConfigWatcher, TankModel};
use twin_protocol::SharedStore;

/// Advances the tank once per tick and publishes the result.
///
/// Each tick re-reads the config file (keeping the previous values if
/// the reload fails), copies the client's command coil out of the
/// datastore, steps the model, and writes coils, inputs and registers
/// back in one atomic swap so clients never observe a half-applied tick.
pub async fn run(store: SharedStore, mut watcher: ConfigWatcher, cancel: CancellationToken) {
    info!("Simulation task started");

    loop {
        let tick = watcher.current().update;
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(Duration::from_secs_f64(tick)) => {},
        }

        let config = watcher.reload().clone();
        apply_tick(&store, &config);
    }

    info!("Simulation task stopped");
}

fn apply_tick(store: &SharedStore, config: &twin_model::SimulationConfig) {
    let mut guard = store.write();

    let mut model = TankModel::from_observed(
        &guard.read_registers(0, 2).unwrap_or_default(),
        &guard.read_coils(0, 1).unwrap_or_default(),
        &guard.read_discrete_inputs(0, 1).unwrap_or_default(),
    );
    model.step(config);

    debug!(
        h = model.h_concentration(),
        hcl = model.hcl_concentration(),
        pump = model.pump_state(),
        "Tank tick"
    );

    guard.publish(&model.coils(), &model.inputs(), &model.registers());
}
