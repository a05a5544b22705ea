//! Simulation settings
//!
//! Everything besides the body count and table size: the ranges the initial
//! layout is drawn from and the mover timing. Stored as JSON; missing fields
//! fall back to the defaults in [`crate::consts`].

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::consts::*;
use crate::error::{SimError, SimResult};
use crate::sim::MoverTiming;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationSettings {
    // === Initial layout ===
    /// Smallest body radius
    pub min_radius: f64,
    /// Largest body radius (clamped to half the shorter table side)
    pub max_radius: f64,
    /// Slowest initial speed (units per second)
    pub min_speed: f64,
    /// Fastest initial speed (units per second)
    pub max_speed: f64,
    /// Position draws per body before accepting an overlap
    pub placement_attempts: u32,
    /// Layout seed; random (and logged) when absent
    pub seed: Option<u64>,

    // === Movers ===
    pub mover: MoverTiming,
}

impl Default for SimulationSettings {
    fn default() -> Self {
        Self {
            min_radius: DEFAULT_MIN_RADIUS,
            max_radius: DEFAULT_MAX_RADIUS,
            min_speed: DEFAULT_MIN_SPEED,
            max_speed: DEFAULT_MAX_SPEED,
            placement_attempts: DEFAULT_PLACEMENT_ATTEMPTS,
            seed: None,
            mover: MoverTiming::default(),
        }
    }
}

impl SimulationSettings {
    /// Same settings with a fixed layout seed
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn validate(&self) -> SimResult<()> {
        if !self.min_radius.is_finite() || self.min_radius <= 0.0 {
            return Err(SimError::invalid(format!(
                "min_radius must be finite and positive, got {}",
                self.min_radius
            )));
        }
        if !self.max_radius.is_finite() || self.max_radius < self.min_radius {
            return Err(SimError::invalid(format!(
                "max_radius must be finite and at least min_radius ({}), got {}",
                self.min_radius, self.max_radius
            )));
        }
        if !self.min_speed.is_finite() || self.min_speed < 0.0 {
            return Err(SimError::invalid(format!(
                "min_speed must be finite and non-negative, got {}",
                self.min_speed
            )));
        }
        if !self.max_speed.is_finite() || self.max_speed < self.min_speed {
            return Err(SimError::invalid(format!(
                "max_speed must be finite and at least min_speed ({}), got {}",
                self.min_speed, self.max_speed
            )));
        }
        if self.placement_attempts == 0 {
            return Err(SimError::invalid("placement_attempts must be at least 1"));
        }
        self.mover.validate()
    }

    /// Parse and validate settings from JSON
    pub fn from_json(json: &str) -> SimResult<Self> {
        let settings: Self = serde_json::from_str(json)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Load settings from a JSON file
    pub fn load(path: impl AsRef<Path>) -> SimResult<Self> {
        let path = path.as_ref();
        let json = fs::read_to_string(path)?;
        let settings = Self::from_json(&json)?;
        log::info!("Loaded settings from {}", path.display());
        Ok(settings)
    }

    /// Write settings as pretty JSON
    pub fn save(&self, path: impl AsRef<Path>) -> SimResult<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path.as_ref(), json)?;
        log::debug!("Settings saved to {}", path.as_ref().display());
        Ok(())
    }
}
