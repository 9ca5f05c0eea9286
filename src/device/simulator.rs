//! simulator.rs
//! In-tree stand-in for a metering plug and the appliance behind it.
//!
//! Reproduces the quirks the engine has to cope with: a sticky three-state
//! appliance load, a measurement grid that only refreshes the reported value
//! every cycle, whole-second production timestamps, a sleep mode that re-bases
//! the cycle at a random sub-second phase, and skew-normal transport latency.

use parking_lot::Mutex;
use rand::Rng;
use statrs::distribution::{ContinuousCDF, Normal};
use std::{
    fmt, thread,
    time::{Duration, SystemTime},
};

use crate::device::{DeviceError, PowerMeter, PowerStats, PowerSwitch};
use crate::utils::clock::{nudge, seconds_between, truncate_to_seconds};

/// Power consumption states of the simulated appliance, in the spirit of an
/// espresso machine that pulses its heater between shots.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplianceState {
    Idle,
    Mid,
    High,
}

impl ApplianceState {
    const ALL: [ApplianceState; 3] = [
        ApplianceState::Idle,
        ApplianceState::Mid,
        ApplianceState::High,
    ];

    /// Draw range in hundredths of a Watt.
    fn range_centiwatts(self) -> (u32, u32) {
        match self {
            ApplianceState::Idle => (300, 350),        //  3.0 to  3.5 W
            ApplianceState::Mid => (40_000, 85_000),   //  400 to  850 W
            ApplianceState::High => (125_000, 135_000), // 1250 to 1350 W
        }
    }

    /// Probability of staying in the state on the next measurement.
    fn stickiness(self) -> f64 {
        match self {
            ApplianceState::Idle => 0.7,
            ApplianceState::Mid => 0.2,
            ApplianceState::High => 0.6,
        }
    }

    /// Relative weight when a new state is drawn.
    fn weight(self) -> f64 {
        match self {
            ApplianceState::Idle => 0.4,
            ApplianceState::Mid => 0.3,
            ApplianceState::High => 0.3,
        }
    }
}

/// Sticky Markov chain over the appliance states.
#[derive(Debug)]
pub struct AppliancePower {
    state: ApplianceState,
}

impl AppliancePower {
    pub fn new() -> Self {
        // A freshly watched appliance is usually mid-task.
        Self {
            state: ApplianceState::High,
        }
    }

    pub fn current_centiwatts(&mut self) -> u32 {
        let mut rng = rand::rng();
        if rng.random::<f64>() > self.state.stickiness() {
            self.state = Self::pick_state(&mut rng);
        }
        let (lo, hi) = self.state.range_centiwatts();
        rng.random_range(lo..=hi)
    }

    fn pick_state(rng: &mut impl Rng) -> ApplianceState {
        let total: f64 = ApplianceState::ALL.iter().map(|s| s.weight()).sum();
        let mut roll = rng.random::<f64>() * total;
        for state in ApplianceState::ALL {
            roll -= state.weight();
            if roll <= 0.0 {
                return state;
            }
        }
        ApplianceState::High
    }
}

impl Default for AppliancePower {
    fn default() -> Self {
        Self::new()
    }
}

/// Tunables of the simulated meter. The defaults mirror the real device; tests
/// shrink the grid and the latency so runs finish quickly.
#[derive(Debug, Clone)]
pub struct MeterConfig {
    /// Length of the measurement cycle in seconds.
    pub grid_length_s: f64,
    /// Idle time after which the meter falls asleep and forgets its phase.
    pub awake_window_s: f64,
    /// Skew-normal shape of the two-way transport latency.
    pub latency_shape: f64,
    /// Skew-normal location (seconds).
    pub latency_loc_s: f64,
    /// Skew-normal scale (seconds).
    pub latency_scale_s: f64,
    /// Report production timestamps truncated to whole seconds.
    pub report_whole_seconds: bool,
}

impl Default for MeterConfig {
    fn default() -> Self {
        Self {
            grid_length_s: 10.0,
            awake_window_s: 300.0,
            latency_shape: 5.0,
            latency_loc_s: 0.74,
            latency_scale_s: 0.1,
            report_whole_seconds: true,
        }
    }
}

#[derive(Debug)]
struct MeterInner {
    appliance: AppliancePower,
    /// Production timestamp of the value currently on offer, full precision.
    produced_at: SystemTime,
    latest_centiwatts: u32,
    last_request: SystemTime,
}

/// The measurement mechanism of the plug: grid-quantized values, coarse
/// timestamps, sleep mode, transport latency.
#[derive(Debug)]
pub struct MeterSimulator {
    config: MeterConfig,
    inner: Mutex<MeterInner>,
}

impl MeterSimulator {
    pub fn new(config: MeterConfig) -> Self {
        let now = SystemTime::now();
        let mut appliance = AppliancePower::new();
        let latest = appliance.current_centiwatts();
        let inner = MeterInner {
            appliance,
            produced_at: Self::random_phase_base(now),
            latest_centiwatts: latest,
            last_request: now,
        };
        Self {
            config,
            inner: Mutex::new(inner),
        }
    }

    /// A cycle base shortly in the past with a random sub-second phase, as the
    /// device picks one whenever it wakes up.
    fn random_phase_base(now: SystemTime) -> SystemTime {
        let micros: u64 = rand::rng().random_range(0..1_000_000);
        truncate_to_seconds(nudge(now, -1.0)) + Duration::from_micros(micros)
    }

    fn two_way_latency(&self) -> f64 {
        skew_normal_sample(
            self.config.latency_shape,
            self.config.latency_loc_s,
            self.config.latency_scale_s,
        )
        .max(0.0)
    }

    /// One request against the meter: wake up, advance the grid, answer after
    /// a transport delay on each leg.
    pub fn fetch(&self) -> PowerStats {
        thread::sleep(Duration::from_secs_f64(self.two_way_latency() / 2.0));

        let stats = {
            let mut inner = self.inner.lock();
            let now = SystemTime::now();
            if seconds_between(inner.last_request, now) > self.config.awake_window_s {
                // Slept in the meantime; the old phase is gone.
                inner.produced_at = Self::random_phase_base(now);
                inner.latest_centiwatts = inner.appliance.current_centiwatts();
            }
            inner.last_request = now;

            let grid = Duration::from_secs_f64(self.config.grid_length_s);
            while inner.produced_at + grid <= now {
                inner.produced_at += grid;
                inner.latest_centiwatts = inner.appliance.current_centiwatts();
            }

            let recorded_at = if self.config.report_whole_seconds {
                truncate_to_seconds(inner.produced_at)
            } else {
                inner.produced_at
            };
            PowerStats {
                latest_centiwatts: inner.latest_centiwatts,
                recorded_at,
            }
        };

        thread::sleep(Duration::from_secs_f64(self.two_way_latency() / 2.0));
        stats
    }
}

/// Skew-normal sample via the convolution identity
/// `loc + scale * (delta*|z0| + sqrt(1-delta^2)*z1)`.
fn skew_normal_sample(shape: f64, loc: f64, scale: f64) -> f64 {
    let Ok(unit) = Normal::new(0.0, 1.0) else {
        return loc;
    };
    let mut rng = rand::rng();
    let u0 = rng.random::<f64>().clamp(f64::EPSILON, 1.0 - f64::EPSILON);
    let u1 = rng.random::<f64>().clamp(f64::EPSILON, 1.0 - f64::EPSILON);
    let z0 = unit.inverse_cdf(u0);
    let z1 = unit.inverse_cdf(u1);
    let delta = shape / (1.0 + shape * shape).sqrt();
    loc + scale * (delta * z0.abs() + (1.0 - delta * delta).sqrt() * z1)
}

/// A switchable plug wired to a simulated meter.
#[derive(Debug)]
pub struct SimulatedPlug {
    pub name: String,
    pub model: String,
    pub identifier: String,
    switch_on: Mutex<bool>,
    meter: MeterSimulator,
}

impl SimulatedPlug {
    pub fn new(name: &str, identifier: &str, config: MeterConfig) -> Self {
        Self {
            name: name.to_string(),
            model: "SB4D Smart Plug Simulator".to_string(),
            identifier: identifier.to_string(),
            switch_on: Mutex::new(true),
            meter: MeterSimulator::new(config),
        }
    }
}

impl fmt::Display for SimulatedPlug {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}, AIN: {})", self.name, self.model, self.identifier)
    }
}

impl PowerMeter for SimulatedPlug {
    fn fetch_power_stats(&self) -> Result<PowerStats, DeviceError> {
        Ok(self.meter.fetch())
    }
}

impl PowerSwitch for SimulatedPlug {
    fn switch_state(&self) -> Result<bool, DeviceError> {
        Ok(*self.switch_on.lock())
    }

    fn set_switch(&self, on: bool) -> Result<bool, DeviceError> {
        *self.switch_on.lock() = on;
        Ok(on)
    }
}

/// The demo household: a couple of named plugs on one meter configuration.
pub fn simulated_home(config: MeterConfig) -> Vec<SimulatedPlug> {
    vec![
        SimulatedPlug::new("Espresso Machine", "11657 0240123", config.clone()),
        SimulatedPlug::new("Workshop Heater", "11657 0587342", config),
    ]
}
