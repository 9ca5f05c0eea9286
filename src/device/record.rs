//! record.rs
//! One immutable power measurement per poll, with its timing metrics.

use std::time::SystemTime;

use crate::utils::clock::seconds_between;

/// A single power read-out together with the timestamps needed to judge how
/// fresh it is.
///
/// `recorded_at` is the device's own production timestamp. The device only
/// refreshes its value once per measurement cycle and reports the timestamp
/// with whole-second resolution, so two polls close together may carry the
/// identical record.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PowerRecord {
    /// Measured power in Watts.
    pub power_w: f64,
    /// Device-side production timestamp of the value (coarse).
    pub recorded_at: SystemTime,
    /// Local clock just before the request went out.
    pub requested_at: SystemTime,
    /// Local clock just after the response arrived.
    pub responded_at: SystemTime,
}

impl PowerRecord {
    pub fn new(
        power_w: f64,
        recorded_at: SystemTime,
        requested_at: SystemTime,
        responded_at: SystemTime,
    ) -> Self {
        debug_assert!(responded_at >= requested_at, "response before request");
        Self {
            power_w,
            recorded_at,
            requested_at,
            responded_at,
        }
    }

    /// Round-trip time of the request, in seconds. Never negative.
    pub fn duration_s(&self) -> f64 {
        seconds_between(self.requested_at, self.responded_at)
    }

    /// Staleness of the value as observed: time from its production tick to
    /// the local receipt of the response. Small negative values can occur
    /// under clock skew and are treated as unreliable, not as errors.
    pub fn latency_s(&self) -> f64 {
        seconds_between(self.recorded_at, self.responded_at)
    }

    /// Where in the cycle the request landed: production tick minus request
    /// time.
    pub fn cycle_offset_s(&self) -> f64 {
        seconds_between(self.requested_at, self.recorded_at)
    }
}
