//! Device seams: what the engine needs from a metering plug, and nothing else.
//!
//! The wire protocol, session handling and device discovery live behind these
//! two traits. The in-tree implementation is the simulator; a real transport
//! plugs in the same way.

pub mod record;
pub mod simulator;

pub use record::PowerRecord;
pub use simulator::{MeterConfig, SimulatedPlug, simulated_home};

use std::time::SystemTime;

use thiserror::Error;

/// Failures surfaced by a device implementation.
///
/// `Transient` means the tick is lost but the run continues; the other two
/// end the run.
#[derive(Debug, Clone, Error)]
pub enum DeviceError {
    #[error("device unreachable: {0}")]
    Unavailable(String),
    #[error("session rejected by device")]
    Unauthorized,
    #[error("transient read failure: {0}")]
    Transient(String),
}

impl DeviceError {
    pub fn is_transient(&self) -> bool {
        matches!(self, DeviceError::Transient(_))
    }
}

/// Latest raw measurement as the meter reports it.
#[derive(Debug, Clone, Copy)]
pub struct PowerStats {
    /// Most recent value on the measurement grid, in hundredths of a Watt.
    pub latest_centiwatts: u32,
    /// Production timestamp of that value, whole seconds.
    pub recorded_at: SystemTime,
}

/// Read side of a metering plug.
pub trait PowerMeter: Send + Sync {
    fn fetch_power_stats(&self) -> Result<PowerStats, DeviceError>;

    /// Fetches the latest measurement and brackets it with local timestamps.
    fn latest_power_record(&self) -> Result<PowerRecord, DeviceError> {
        let requested_at = SystemTime::now();
        let stats = self.fetch_power_stats()?;
        let responded_at = SystemTime::now();
        Ok(PowerRecord::new(
            f64::from(stats.latest_centiwatts) / 100.0,
            stats.recorded_at,
            requested_at,
            responded_at,
        ))
    }
}

/// Switch side of a metering plug.
pub trait PowerSwitch: Send + Sync {
    /// Current relay state: `true` is on.
    fn switch_state(&self) -> Result<bool, DeviceError>;

    /// Sets the relay and returns the state the device reports afterwards.
    fn set_switch(&self, on: bool) -> Result<bool, DeviceError>;
}
