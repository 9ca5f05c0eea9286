//! config.rs
//! Engine configuration: explicit, serde-loadable, no process-wide state.

use serde::Deserialize;
use std::{fs, path::Path};

use thiserror::Error;

/// Everything one idle-shutdown run needs to know. All durations in seconds.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Power below which the appliance counts as idle, in Watts.
    pub power_threshold: f64,
    /// Longest acceptable request round-trip for an idle-qualifying sample.
    pub duration_threshold: f64,
    /// Longest acceptable staleness for an idle-qualifying sample.
    pub latency_threshold: f64,
    /// Consecutive measurement cycles that must qualify before switching off.
    pub idle_cycles: usize,
    /// Length of the device's measurement cycle.
    pub cycle_length: f64,
    /// Offset search precision: the search stops narrowing at 10^-digits.
    pub precision_digits: i32,
    /// Latency the offset search aims for from the start.
    pub ideal_latency: f64,
    /// Pause between wake-up reads while waiting for a fresh record.
    pub acquire_interval: f64,
    /// Read budget for the wake-up phase before giving up.
    pub acquire_max_attempts: u32,
    /// Optional ceiling on the whole run.
    pub max_runtime: Option<f64>,
    /// Go through all the motions but never send the off command.
    pub dry_run: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            power_threshold: 5.0,
            duration_threshold: 0.9,
            latency_threshold: 2.5,
            idle_cycles: 2,
            cycle_length: 10.0,
            precision_digits: 1,
            ideal_latency: 0.5,
            acquire_interval: 2.0,
            acquire_max_attempts: 30,
            max_runtime: None,
            dry_run: false,
        }
    }
}

impl EngineConfig {
    /// Finest step the offset search will narrow down to.
    pub fn precision_floor(&self) -> f64 {
        10f64.powi(-self.precision_digits)
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("cannot parse config file: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Loads an [`EngineConfig`] from a JSON file; absent keys keep their
/// defaults.
pub fn load_from_json(path: &Path) -> Result<EngineConfig, ConfigError> {
    let text = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&text)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = EngineConfig::default();
        assert_eq!(config.idle_cycles, 2);
        assert!((config.precision_floor() - 0.1).abs() < 1e-12);
        assert!(!config.dry_run);
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config: EngineConfig =
            serde_json::from_str(r#"{"power_threshold": 8.5, "dry_run": true}"#).unwrap();
        assert!((config.power_threshold - 8.5).abs() < 1e-12);
        assert!(config.dry_run);
        assert!((config.cycle_length - 10.0).abs() < 1e-12);
    }
}
