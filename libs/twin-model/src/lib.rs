//! Digital-twin model of the HCl dosing tank.
//!
//! Holds the simulation config, the deterministic tank difference
//! equations, and the anomaly detectors that compare live plant
//! readings against model predictions.

pub mod config;
pub mod detector;
pub mod error;
pub mod tank;

pub use config::{ConfigWatcher, SimulationConfig};
pub use detector::{StatefulDetector, StatelessDetector};
pub use error::{ModelError, Result};
pub use tank::{ph_from_h_concentration, TankModel};
