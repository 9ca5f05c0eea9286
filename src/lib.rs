//! # idleplug
//!
//! Waits for the appliance behind a smart metering plug to be verifiably idle,
//! then switches the plug off — once.
//!
//! The awkward part is the meter itself: it refreshes its power reading only
//! every few seconds on a hidden internal cycle and reports the production
//! timestamp coarsely, so naive polling sees stale values with unpredictable
//! latency. The engine first wakes the meter up, then walks a request-timing
//! offset onto the measurement cycle until readings arrive fresh, and only
//! trusts an idle decision made from consecutive fresh cycles.
//!
//! The device transport stays behind the [`device::PowerMeter`] and
//! [`device::PowerSwitch`] seams; the crate ships a simulator with the same
//! quirks as the real hardware.

pub mod device;
pub mod engine;
pub mod utils;
