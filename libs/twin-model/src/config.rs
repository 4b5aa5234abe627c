//! Simulation configuration.
//!
//! Loaded from a JSON file plus `TWIN_`-prefixed environment overrides.
//! The updater re-reads the file every tick so rates and the pump
//! override can be changed while the server runs; a reload that fails
//! validation keeps the previous values.

use std::path::{Path, PathBuf};

use figment::{
    providers::{Env, Format, Json},
    Figment,
};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{ModelError, Result};

/// Fraction of the HCl concentration that dissociates per second.
pub const DEFAULT_DISSOCIATION_RATE: f64 = 0.2;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Rate of HCl entering the tank while the pump runs.
    #[serde(rename = "inputRate")]
    pub input_rate: f64,

    /// Rate of fresh water entering the tank.
    #[serde(rename = "dilutionRate")]
    pub dilution_rate: f64,

    /// Seconds between simulation ticks.
    #[serde(default = "default_update")]
    pub update: f64,

    /// Initial pH of the water.
    #[serde(rename = "pH", default = "default_ph")]
    pub ph: f64,

    /// Pump override from the config file, 0 = off, 1 = on.
    #[serde(rename = "HCl", default)]
    pub hcl: u8,

    /// Initial H+ concentration, mol/L scaled by 10^11.
    #[serde(rename = "hConcentration", default)]
    pub h_concentration: i64,

    /// Initial HCl concentration, mol/L scaled by 10^11.
    #[serde(rename = "hclConcentration", default)]
    pub hcl_concentration: i64,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(rename = "dissociationRate", default = "default_dissociation_rate")]
    pub dissociation_rate: f64,
}

fn default_update() -> f64 {
    1.0
}

fn default_ph() -> f64 {
    7.0
}

fn default_port() -> u16 {
    5020
}

fn default_dissociation_rate() -> f64 {
    DEFAULT_DISSOCIATION_RATE
}

impl SimulationConfig {
    /// Loads and validates the config from `path`, with `TWIN_*`
    /// environment variables taking precedence over the file.
    pub fn load(path: &Path) -> Result<Self> {
        let config: SimulationConfig = Figment::new()
            .merge(Json::file(path))
            .merge(Env::prefixed("TWIN_"))
            .extract()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.input_rate <= 0.0 {
            return Err(ModelError::ConfigInvalid(
                "inputRate should be positive".into(),
            ));
        }
        if self.dilution_rate <= 0.0 {
            return Err(ModelError::ConfigInvalid(
                "dilutionRate should be positive".into(),
            ));
        }
        if !(self.update > 0.0 && self.update < 10.0) {
            return Err(ModelError::ConfigInvalid(
                "update should be positive and less than 10 seconds".into(),
            ));
        }
        if !(0.0..=14.0).contains(&self.ph) {
            return Err(ModelError::ConfigInvalid(
                "water pH should be in [0, 14]".into(),
            ));
        }
        if self.hcl > 1 {
            return Err(ModelError::ConfigInvalid(
                "HCl pump can either be 0 or 1".into(),
            ));
        }
        if !(self.port == 502 || (5000 < self.port && self.port < 10000)) {
            return Err(ModelError::ConfigInvalid(
                "port should either be 502 or in (5000,10000)".into(),
            ));
        }
        Ok(())
    }
}

/// Re-reads the config each tick, falling back to the last good values
/// when the file is missing or fails validation.
#[derive(Debug)]
pub struct ConfigWatcher {
    path: PathBuf,
    current: SimulationConfig,
}

impl ConfigWatcher {
    pub fn new(path: PathBuf, initial: SimulationConfig) -> Self {
        Self {
            path,
            current: initial,
        }
    }

    pub fn current(&self) -> &SimulationConfig {
        &self.current
    }

    /// Attempts a reload; on any error the previous config stays active.
    pub fn reload(&mut self) -> &SimulationConfig {
        match SimulationConfig::load(&self.path) {
            Ok(config) => self.current = config,
            Err(err) => {
                warn!(path = %self.path.display(), %err, "Config reload failed, keeping previous values");
            }
        }
        &self.current
    }
}
