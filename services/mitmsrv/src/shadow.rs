//! Shadow tank model used to fabricate register responses.
//!
//! Before any spoofing starts, the proxy quietly seeds a copy of the
//! tank model from the register, coil and input values it sees passing
//! through. Once spoofing is active the shadow advances on wall-clock
//! time using the same configuration as the real twin, so the fabricated
//! readings stay physically plausible.

use std::time::Instant;

use tracing::debug;

use twin_model::{SimulationConfig, TankModel};

#[derive(Debug, Default, Clone)]
struct SeedValues {
    registers: Option<Vec<u16>>,
    coils: Option<Vec<bool>>,
    inputs: Option<Vec<bool>>,
}

#[derive(Debug)]
pub struct ShadowModel {
    config: SimulationConfig,
    seed: SeedValues,
    model: Option<TankModel>,
    /// Set when spoofing starts; the shadow's time origin.
    started: Option<Instant>,
    ticks_applied: u64,
}

impl ShadowModel {
    pub fn new(config: SimulationConfig) -> Self {
        Self {
            config,
            seed: SeedValues::default(),
            model: None,
            started: None,
            ticks_applied: 0,
        }
    }

    pub fn is_seeded(&self) -> bool {
        self.model.is_some()
    }

    pub fn observe_registers(&mut self, registers: &[u16]) {
        if self.seed.registers.is_none() {
            self.seed.registers = Some(registers.to_vec());
            self.try_seed();
        }
    }

    pub fn observe_coils(&mut self, coils: &[bool]) {
        if self.seed.coils.is_none() {
            self.seed.coils = Some(coils.to_vec());
            self.try_seed();
        }
    }

    pub fn observe_inputs(&mut self, inputs: &[bool]) {
        if self.seed.inputs.is_none() {
            self.seed.inputs = Some(inputs.to_vec());
            self.try_seed();
        }
    }

    fn try_seed(&mut self) {
        if self.model.is_some() {
            return;
        }
        if let (Some(registers), Some(coils), Some(inputs)) =
            (&self.seed.registers, &self.seed.coils, &self.seed.inputs)
        {
            self.model = Some(TankModel::from_observed(registers, coils, inputs));
            debug!("Shadow model seeded from observed traffic");
        }
    }

    /// Marks the moment spoofing starts; later ticks count from here.
    pub fn start(&mut self, now: Instant) {
        if self.started.is_none() {
            self.started = Some(now);
        }
    }

    /// Returns fabricated register values for the current wall-clock
    /// time, or `None` while the shadow has not been seeded yet.
    ///
    /// The model is advanced lazily: however many whole update
    /// intervals have elapsed since spoofing began, that many ticks are
    /// applied before reading the registers out.
    pub fn registers_at(&mut self, now: Instant) -> Option<Vec<u16>> {
        let started = self.started?;
        let model = self.model.as_mut()?;

        let elapsed = now.saturating_duration_since(started).as_secs_f64();
        let due = (elapsed / self.config.update) as u64;
        while self.ticks_applied < due {
            model.step(&self.config);
            self.ticks_applied += 1;
        }

        Some(model.registers())
    }
}
