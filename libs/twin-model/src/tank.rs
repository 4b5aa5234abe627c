//! Chemistry of the HCl dosing tank.
//!
//! State advances with difference equations that truncate to integers
//! at each stage, so two model instances seeded identically and stepped
//! the same number of times stay bit-for-bit in agreement. That is what
//! lets a monitoring client run its own copy of the model and compare
//! predictions against the plant.

use crate::config::SimulationConfig;

/// Index of the pump command coil.
pub const COIL_CMD: usize = 0;
/// Index of the discrete input mirroring the actual pump state.
pub const INPUT_HCL: usize = 0;
/// Index of the H+ concentration register.
pub const REG_H_CONCENTRATION: usize = 0;
/// Index of the HCl concentration register.
pub const REG_HCL_CONCENTRATION: usize = 1;

pub const COIL_COUNT: usize = 1;
pub const INPUT_COUNT: usize = 1;
pub const REGISTER_COUNT: usize = 2;

/// H+ concentration of neutral water, mol/L scaled by 10^11.
pub const H_BASELINE: f64 = 10000.0;

/// Exponent of the fixed-point scale the registers use.
pub const SCALE_EXP: i32 = 11;

/// Tank state as exposed over Modbus: one command coil, one pump-state
/// discrete input, two concentration registers.
///
/// Concentrations are held as i64 internally; they are clamped into the
/// u16 register range only at the wire boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TankModel {
    coils: [bool; COIL_COUNT],
    inputs: [bool; INPUT_COUNT],
    registers: [i64; REGISTER_COUNT],
}

impl TankModel {
    pub fn new(h_concentration: i64, hcl_concentration: i64) -> Self {
        Self {
            coils: [true; COIL_COUNT],
            inputs: [true; INPUT_COUNT],
            registers: [h_concentration, hcl_concentration],
        }
    }

    /// Initial state for a fresh run: pump commanded on, concentrations
    /// from the config file.
    pub fn from_config(config: &SimulationConfig) -> Self {
        Self::new(config.h_concentration, config.hcl_concentration)
    }

    /// Seeds a model from register/coil/input values read off the wire.
    pub fn from_observed(registers: &[u16], coils: &[bool], inputs: &[bool]) -> Self {
        let mut model = Self::new(
            registers.first().copied().unwrap_or(0) as i64,
            registers.get(1).copied().unwrap_or(0) as i64,
        );
        model.coils[COIL_CMD] = coils.first().copied().unwrap_or(false);
        model.inputs[INPUT_HCL] = inputs.first().copied().unwrap_or(false);
        model
    }

    pub fn pump_command(&self) -> bool {
        self.coils[COIL_CMD]
    }

    pub fn set_pump_command(&mut self, on: bool) {
        self.coils[COIL_CMD] = on;
    }

    pub fn pump_state(&self) -> bool {
        self.inputs[INPUT_HCL]
    }

    pub fn h_concentration(&self) -> i64 {
        self.registers[REG_H_CONCENTRATION]
    }

    pub fn hcl_concentration(&self) -> i64 {
        self.registers[REG_HCL_CONCENTRATION]
    }

    pub fn coils(&self) -> Vec<bool> {
        self.coils.to_vec()
    }

    pub fn inputs(&self) -> Vec<bool> {
        self.inputs.to_vec()
    }

    /// Registers clamped into the u16 range for publication.
    pub fn registers(&self) -> Vec<u16> {
        self.registers
            .iter()
            .map(|&r| r.clamp(0, i64::from(u16::MAX)) as u16)
            .collect()
    }

    /// Advances the tank by one tick of `update` seconds.
    ///
    /// The pump state tracks the command coil; while the pump runs, HCl
    /// flows in at `input_rate`. Dissociation converts HCl to H+ and
    /// dilution pulls H+ toward the neutral baseline and HCl toward zero.
    /// Each stage truncates toward zero, in this exact order.
    pub fn step(&mut self, config: &SimulationConfig) {
        let tick = config.update;
        let dissociation = config.dissociation_rate * tick;
        let dilution = config.dilution_rate * tick;

        self.inputs[INPUT_HCL] = self.coils[COIL_CMD];

        let mut h = self.registers[REG_H_CONCENTRATION];
        let mut hcl = self.registers[REG_HCL_CONCENTRATION];

        if self.inputs[INPUT_HCL] {
            hcl += trunc(config.input_rate * tick);
        }

        h += trunc(dissociation * hcl as f64);
        hcl = trunc((1.0 - dissociation) * hcl as f64);

        h = trunc((1.0 - dilution) * h as f64 + dilution * H_BASELINE);
        hcl = trunc((1.0 - dilution) * hcl as f64);

        self.registers[REG_H_CONCENTRATION] = h.max(0);
        self.registers[REG_HCL_CONCENTRATION] = hcl.max(0);
    }

    /// Computes the concentrations one tick ahead without mutating the
    /// model. Identical arithmetic to [`step`](Self::step).
    pub fn predict_next(&self, config: &SimulationConfig) -> (i64, i64) {
        let mut next = self.clone();
        next.step(config);
        (next.h_concentration(), next.hcl_concentration())
    }
}

/// Truncates toward zero, matching integer conversion of each stage.
fn trunc(value: f64) -> i64 {
    value.trunc() as i64
}

/// pH from a H+ concentration register value (mol/L scaled by 10^11).
///
/// Returns `None` for non-positive concentrations, where the logarithm
/// is undefined.
pub fn ph_from_h_concentration(h: i64) -> Option<f64> {
    if h <= 0 {
        return None;
    }
    Some(f64::from(SCALE_EXP) - (h as f64).log10())
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;

    fn config(input_rate: f64, dilution_rate: f64, update: f64) -> SimulationConfig {
        SimulationConfig {
            input_rate,
            dilution_rate,
            update,
            ph: 7.0,
            hcl: 1,
            h_concentration: 10000,
            hcl_concentration: 0,
            port: 5020,
            dissociation_rate: 0.2,
        }
    }

    #[test]
    fn test_step_pump_on_known_values() {
        let cfg = config(2.0, 0.1, 1.0);
        let mut tank = TankModel::new(10000, 0);

        tank.step(&cfg);
        // hcl: 0 + 2 = 2; h: 10000 + trunc(0.4) = 10000; hcl: trunc(1.6) = 1
        // h: trunc(0.9*10000 + 0.1*10000) = 10000; hcl: trunc(0.9) = 0
        assert_eq!(tank.h_concentration(), 10000);
        assert_eq!(tank.hcl_concentration(), 0);
        assert!(tank.pump_state());
    }

    #[test]
    fn test_step_from_empty_tank_known_sequence() {
        let cfg = config(2.0, 0.1, 1.0);
        let mut tank = TankModel::new(0, 0);

        let mut seen = Vec::new();
        for _ in 0..3 {
            tank.step(&cfg);
            seen.push(tank.h_concentration());
        }
        // Each value falls out of stage-wise truncation of the
        // difference equations; any rounding change breaks this.
        assert_eq!(seen, vec![1000, 1900, 2710]);
        assert_eq!(tank.hcl_concentration(), 0);
    }

    #[test]
    fn test_step_pump_off_adds_no_hcl() {
        let cfg = config(100.0, 0.1, 1.0);
        let mut tank = TankModel::new(10000, 0);
        tank.set_pump_command(false);

        tank.step(&cfg);
        assert_eq!(tank.hcl_concentration(), 0);
        assert_eq!(tank.h_concentration(), 10000);
        assert!(!tank.pump_state());
    }

    #[test]
    fn test_pump_state_follows_command_each_tick() {
        let cfg = config(2.0, 0.1, 1.0);
        let mut tank = TankModel::new(10000, 0);
        tank.set_pump_command(false);
        tank.step(&cfg);
        assert!(!tank.pump_state());

        tank.set_pump_command(true);
        tank.step(&cfg);
        assert!(tank.pump_state());
    }

    #[test]
    fn test_predict_matches_step() {
        let cfg = config(50.0, 0.1, 1.0);
        let mut tank = TankModel::new(10000, 123);

        for _ in 0..20 {
            let predicted = tank.predict_next(&cfg);
            tank.step(&cfg);
            assert_eq!(
                predicted,
                (tank.h_concentration(), tank.hcl_concentration())
            );
        }
    }

    #[test]
    fn test_two_models_stay_in_lockstep() {
        let cfg = config(7.5, 0.05, 1.0);
        let mut plant = TankModel::new(10000, 0);
        let mut shadow = plant.clone();

        for _ in 0..100 {
            plant.step(&cfg);
            shadow.step(&cfg);
            assert_eq!(plant, shadow);
        }
    }

    #[test]
    fn test_dilution_pulls_h_toward_baseline() {
        let cfg = config(1.0, 0.5, 1.0);
        let mut tank = TankModel::new(40000, 0);
        tank.set_pump_command(false);

        for _ in 0..50 {
            tank.step(&cfg);
        }
        assert_eq!(tank.h_concentration(), 10000);
    }

    #[test]
    fn test_concentrations_never_negative() {
        let cfg = config(1.0, 0.9, 1.0);
        let mut tank = TankModel::new(0, 0);
        tank.set_pump_command(false);

        for _ in 0..10 {
            tank.step(&cfg);
            assert!(tank.h_concentration() >= 0);
            assert!(tank.hcl_concentration() >= 0);
        }
    }

    #[test]
    fn test_register_clamp_to_wire_range() {
        let tank = TankModel::new(200_000, -5);
        assert_eq!(tank.registers(), vec![u16::MAX, 0]);
    }

    #[test]
    fn test_ph_from_h_concentration() {
        let ph = ph_from_h_concentration(10000).unwrap();
        assert!((ph - 7.0).abs() < 1e-9);
        assert!(ph_from_h_concentration(0).is_none());
        let acidic = ph_from_h_concentration(100_000).unwrap();
        assert!((acidic - 6.0).abs() < 1e-9);
    }

    #[test]
    fn test_from_observed_round_trip() {
        let cfg = config(3.0, 0.1, 1.0);
        let mut plant = TankModel::new(10000, 40);
        plant.step(&cfg);

        let shadow = TankModel::from_observed(&plant.registers(), &plant.coils(), &plant.inputs());
        assert_eq!(shadow, plant);
    }
}
