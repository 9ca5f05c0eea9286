//! phase.rs
//! Offset search that locks the request schedule onto the device's hidden
//! measurement cycle.
//!
//! The device refreshes its value once per cycle but reports the production
//! timestamp truncated to whole seconds, so after re-basing on a reported
//! timestamp the unknown remainder of the phase is at most the one-second
//! reporting granularity. The tracker walks a request offset across that
//! window: requests landing just before a tick show a latency of almost a full
//! cycle ("too early"), requests landing just after show a small one. A
//! bracket plus halving step narrows the boundary until the configured
//! precision floor is reached; anything outside both expected latency bands is
//! noise and only restarts the local walk.

use std::time::SystemTime;

use crate::device::PowerRecord;
use crate::utils::clock::nudge;

/// Resolution of the reported production timestamps. The offset search only
/// ever has to cover this window, not the whole cycle.
const REPORT_GRANULARITY: f64 = 1.0;

/// Tolerated negative latency before a sample stops counting as "just before
/// the tick" and becomes noise. Clock skew, not grid dependent.
const CLOCK_SKEW_TOLERANCE: f64 = 0.5;

/// Margin added to the observed minimum once the search has settled.
const LATENCY_MARGIN: f64 = 0.25;

/// What a single observed latency means for the search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LatencyClass {
    /// Request went out just before the production tick; move the offset later.
    TooEarly,
    /// Fresh sample with bounded staleness; edge the offset earlier.
    Acceptable,
    /// Aliasing, device hiccup or multi-cycle skip; restart the local walk.
    Anomalous,
}

/// Mutable state of the cycle synchronization for one polling run.
#[derive(Debug, Clone)]
pub struct CycleTracker {
    cycle_length: f64,
    base_time: SystemTime,
    offset: f64,
    lower_bound: f64,
    step: f64,
    precision_floor: f64,
    min_latency: f64,
    latency_threshold: f64,
}

impl CycleTracker {
    /// Starts a synchronization run from the first reliable record.
    pub fn new(
        first: &PowerRecord,
        cycle_length: f64,
        precision_digits: i32,
        ideal_latency: f64,
    ) -> Self {
        let first_latency = first.latency_s();
        Self {
            cycle_length,
            base_time: first.recorded_at,
            offset: 0.0,
            // One reporting granularity below every reachable offset.
            lower_bound: -REPORT_GRANULARITY,
            step: REPORT_GRANULARITY / 4.0,
            precision_floor: 10f64.powi(-precision_digits),
            min_latency: if first_latency >= 0.0 {
                first_latency
            } else {
                f64::INFINITY
            },
            latency_threshold: ideal_latency,
        }
    }

    /// The tick the next request should aim for: the first schedule slot after
    /// `now`.
    pub fn next_request_time(&self, now: SystemTime) -> SystemTime {
        let mut exec = self.base_time;
        while exec < now {
            exec = nudge(exec, self.cycle_length);
        }
        exec
    }

    fn classify(&self, latency: f64) -> LatencyClass {
        let upper_tail =
            latency > 0.9 * self.cycle_length && latency < 1.25 * self.cycle_length;
        let skewed_just_before = (-CLOCK_SKEW_TOLERANCE..0.0).contains(&latency);
        if upper_tail || skewed_just_before {
            LatencyClass::TooEarly
        } else if (0.0..0.25 * self.cycle_length).contains(&latency) {
            LatencyClass::Acceptable
        } else {
            LatencyClass::Anomalous
        }
    }

    /// Feeds one observed record into the search and re-bases the schedule on
    /// its production timestamp.
    pub fn observe(&mut self, record: &PowerRecord) -> LatencyClass {
        let latency = record.latency_s();
        if latency >= 0.0 && latency < self.min_latency {
            self.min_latency = latency;
        }

        let class = self.classify(latency);
        match class {
            LatencyClass::TooEarly => {
                self.lower_bound = self.lower_bound.max(self.offset);
                self.offset += self.step;
            }
            LatencyClass::Acceptable => {
                // Offsets move on a dyadic grid, so the equality is exact.
                let bracket_tight = (self.offset - self.step) == self.lower_bound;
                if self.step > self.precision_floor && bracket_tight {
                    self.step /= 2.0;
                }
                if self.offset - self.step > self.lower_bound {
                    self.offset -= self.step;
                }
            }
            LatencyClass::Anomalous => {
                self.offset = 0.0;
            }
        }

        if self.converged() {
            self.latency_threshold = self.min_latency + LATENCY_MARGIN;
        }
        self.base_time = nudge(record.recorded_at, self.offset);
        class
    }

    /// The search stops narrowing once the step is at the precision floor;
    /// the schedule keeps re-basing every tick regardless.
    pub fn converged(&self) -> bool {
        self.step <= self.precision_floor
    }

    pub fn base_time(&self) -> SystemTime {
        self.base_time
    }

    pub fn offset(&self) -> f64 {
        self.offset
    }

    pub fn lower_bound(&self) -> f64 {
        self.lower_bound
    }

    pub fn step(&self) -> f64 {
        self.step
    }

    pub fn min_latency(&self) -> f64 {
        self.min_latency
    }

    /// Staleness bound the rest of the run should hold samples to. Starts at
    /// the caller's ideal and tracks the observed minimum after convergence.
    pub fn latency_threshold(&self) -> f64 {
        self.latency_threshold
    }
}
