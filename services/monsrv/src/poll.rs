//! Polling loop: observe the tank, predict it, compare, and command.

use std::path::Path;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use twin_model::{
    ph_from_h_concentration, SimulationConfig, StatefulDetector, StatelessDetector, TankModel,
};
use twin_protocol::ModbusTcpClient;

use crate::recorder::{Recorder, Sample};

/// One round of coil, input and register reads.
#[derive(Debug, Clone)]
pub struct Observation {
    pub coils: Vec<bool>,
    pub inputs: Vec<bool>,
    pub registers: Vec<u16>,
}

impl Observation {
    fn h_concentration(&self) -> i64 {
        i64::from(self.registers.first().copied().unwrap_or(0))
    }

    fn pump_on(&self) -> bool {
        self.inputs.first().copied().unwrap_or(false)
    }
}

/// What one poll concluded.
#[derive(Debug, Clone, Copy, Default)]
pub struct Assessment {
    pub stateless_alarm: bool,
    pub stateful_alarm: bool,
    /// True when the operator's shutoff command should go out this poll.
    pub send_shutoff: bool,
}

/// Detector state plus the client's own predictive tank model.
///
/// The model is re-anchored to each observation, so the prediction for
/// poll N+1 is one tick ahead of what poll N saw. Against an honest
/// server in lockstep the residual is zero; once the proxy starts
/// fabricating readings, fabrication and reality drift apart.
pub struct Monitor {
    config: SimulationConfig,
    stateless: StatelessDetector,
    stateful: StatefulDetector,
    predicted_h: Option<i64>,
    polls: u64,
    shutoff_after: u64,
}

impl Monitor {
    pub fn new(
        config: SimulationConfig,
        stateless: StatelessDetector,
        stateful: StatefulDetector,
        shutoff_after: u64,
    ) -> Self {
        Self {
            config,
            stateless,
            stateful,
            predicted_h: None,
            polls: 0,
            shutoff_after,
        }
    }

    pub fn assess(&mut self, observation: &Observation) -> Assessment {
        self.polls += 1;
        let actual_h = observation.h_concentration();

        let mut assessment = Assessment::default();
        if let Some(predicted_h) = self.predicted_h {
            assessment.stateless_alarm = self.stateless.detect(actual_h, predicted_h);
            assessment.stateful_alarm = self.stateful.detect(actual_h, predicted_h);
        }

        // Re-anchor the predictive model to what was just observed.
        let model = TankModel::from_observed(
            &observation.registers,
            &observation.coils,
            &observation.inputs,
        );
        self.predicted_h = Some(model.predict_next(&self.config).0);

        assessment.send_shutoff = self.polls >= self.shutoff_after && observation.pump_on();
        assessment
    }

    pub fn deviation(&self) -> i64 {
        self.stateful.deviation()
    }
}

pub struct PollSettings {
    pub address: String,
    pub unit_id: u8,
    pub interval: Duration,
    pub shutoff_after: u64,
}

/// Runs the monitoring loop until a stateful alarm, a transport error,
/// or cancellation.
pub async fn run(
    settings: PollSettings,
    config: SimulationConfig,
    stateless: StatelessDetector,
    stateful: StatefulDetector,
    csv_path: &Path,
    cancel: CancellationToken,
) -> anyhow::Result<()> {
    let mut client = ModbusTcpClient::connect(settings.address.as_str(), settings.unit_id).await?;
    info!(address = %settings.address, "Connected to tank server");

    let mut monitor = Monitor::new(config, stateless, stateful, settings.shutoff_after);
    let mut recorder = Recorder::open(csv_path)?;
    let start = Instant::now();

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(settings.interval) => {},
        }

        let observation = Observation {
            coils: client.read_coils(0, 1).await?,
            inputs: client.read_discrete_inputs(0, 1).await?,
            registers: client.read_holding_registers(0, 2).await?,
        };

        let ph = ph_from_h_concentration(observation.h_concentration()).unwrap_or(f64::NAN);
        recorder.record(&Sample {
            time_s: start.elapsed().as_secs_f64(),
            actual_ph: ph,
            pump_state: observation.pump_on(),
        })?;

        let assessment = monitor.assess(&observation);
        if assessment.stateless_alarm {
            warn!(ph, "Reading disagrees with prediction");
        }
        if assessment.stateful_alarm {
            error!(
                deviation = monitor.deviation(),
                "Sustained deviation from physical model, stopping"
            );
            break;
        }
        if assessment.send_shutoff {
            let ack = client.write_coil(0, false).await?;
            info!(?ack, "Sent pump shutoff command");
        }
    }

    client.close().await?;
    Ok(())
}
