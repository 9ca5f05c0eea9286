//! debounce.rs
//! Turning noisy power read-outs into a single confident idle decision.
//!
//! One low reading proves nothing: an appliance with irregular duty cycles
//! (a heater between pulses) looks idle between bursts. Only a run of
//! consecutive measurement cycles, each reported fresh and within bounds,
//! counts. Polling faster than the device measures must not inflate that run,
//! so a record is admitted only when its production timestamp moved.

use std::{collections::VecDeque, time::SystemTime};

use crate::device::PowerRecord;

/// Window of the last K cycle-distinct records; fires exactly once.
///
/// Power and duration bounds are fixed for the run. The latency bound is
/// passed per observation because the cycle synchronization tightens it as it
/// learns the attainable minimum; each record is judged against the bound in
/// force when it arrived.
#[derive(Debug)]
pub struct IdleMonitor {
    required: usize,
    power_threshold: f64,
    duration_threshold: f64,
    /// Qualification verdicts of the admitted records, oldest first.
    window: VecDeque<bool>,
    last_admitted: Option<SystemTime>,
    fired: bool,
}

impl IdleMonitor {
    pub fn new(required: usize, power_threshold: f64, duration_threshold: f64) -> Self {
        debug_assert!(required >= 1, "at least one idle cycle is required");
        Self {
            required: required.max(1),
            power_threshold,
            duration_threshold,
            window: VecDeque::with_capacity(required.max(1)),
            last_admitted: None,
            fired: false,
        }
    }

    /// Feeds one record; returns `true` exactly once, when the window fills
    /// with qualifying cycle-distinct records.
    pub fn observe(&mut self, record: &PowerRecord, latency_bound: f64) -> bool {
        if self.fired {
            return false;
        }
        if self.last_admitted == Some(record.recorded_at) {
            // Same measurement cycle seen again; not a new data point.
            return false;
        }
        self.last_admitted = Some(record.recorded_at);

        let qualified = record.power_w < self.power_threshold
            && record.duration_s() < self.duration_threshold
            && (0.0..latency_bound).contains(&record.latency_s());
        self.window.push_back(qualified);
        if self.window.len() > self.required {
            self.window.pop_front();
        }

        if self.window.len() == self.required && self.window.iter().all(|q| *q) {
            self.fired = true;
            return true;
        }
        false
    }

    /// Number of cycle-distinct records currently in the window.
    pub fn admitted(&self) -> usize {
        self.window.len()
    }

    pub fn fired(&self) -> bool {
        self.fired
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, UNIX_EPOCH};

    const LATENCY_BOUND: f64 = 2.5;

    fn record(cycle: u64, power_w: f64) -> PowerRecord {
        let recorded = UNIX_EPOCH + Duration::from_secs(1_000 + 10 * cycle);
        let requested = recorded + Duration::from_millis(400);
        PowerRecord::new(
            power_w,
            recorded,
            requested,
            requested + Duration::from_millis(300),
        )
    }

    fn monitor() -> IdleMonitor {
        IdleMonitor::new(2, 5.0, 0.9)
    }

    #[test]
    fn fires_after_k_consecutive_idle_cycles() {
        let mut monitor = monitor();
        assert!(!monitor.observe(&record(1, 2.0), LATENCY_BOUND));
        assert!(monitor.observe(&record(2, 2.0), LATENCY_BOUND));
        assert!(monitor.fired());
    }

    #[test]
    fn fewer_than_k_admitted_never_fires() {
        let mut monitor = monitor();
        assert!(!monitor.observe(&record(1, 0.0), LATENCY_BOUND));
        assert_eq!(monitor.admitted(), 1);
    }

    #[test]
    fn repeated_cycle_is_not_double_counted() {
        let mut monitor = monitor();
        assert!(!monitor.observe(&record(1, 2.0), LATENCY_BOUND));
        // Same production timestamp polled again: must not complete the run.
        assert!(!monitor.observe(&record(1, 2.0), LATENCY_BOUND));
        assert_eq!(monitor.admitted(), 1);
        assert!(monitor.observe(&record(2, 2.0), LATENCY_BOUND));
    }

    #[test]
    fn a_burst_resets_the_run() {
        let mut monitor = monitor();
        assert!(!monitor.observe(&record(1, 2.0), LATENCY_BOUND));
        assert!(!monitor.observe(&record(2, 80.0), LATENCY_BOUND));
        assert!(!monitor.observe(&record(3, 2.0), LATENCY_BOUND));
        // Window is [80.0, 2.0] above, then [2.0, 2.0]:
        assert!(monitor.observe(&record(4, 2.0), LATENCY_BOUND));
    }

    #[test]
    fn slow_responses_block_the_decision() {
        let mut monitor = monitor();
        let recorded = UNIX_EPOCH + Duration::from_secs(1_010);
        let requested = recorded + Duration::from_millis(100);
        let slow = PowerRecord::new(
            2.0,
            recorded,
            requested,
            requested + Duration::from_millis(1_500),
        );
        assert!(!monitor.observe(&record(0, 2.0), LATENCY_BOUND));
        assert!(!monitor.observe(&slow, LATENCY_BOUND));
        assert!(!monitor.fired());
    }

    #[test]
    fn stale_latency_blocks_the_decision() {
        let mut monitor = monitor();
        let recorded = UNIX_EPOCH + Duration::from_secs(1_010);
        let requested = recorded + Duration::from_secs(9);
        let stale = PowerRecord::new(
            2.0,
            recorded,
            requested,
            requested + Duration::from_millis(300),
        );
        assert!(!monitor.observe(&record(0, 2.0), LATENCY_BOUND));
        assert!(!monitor.observe(&stale, LATENCY_BOUND));
        assert!(!monitor.fired());
    }

    #[test]
    fn a_tightened_bound_rejects_what_a_loose_one_accepted() {
        let mut monitor = monitor();
        // 0.7 s of staleness passes at 2.5 s but not at 0.5 s.
        assert!(!monitor.observe(&record(1, 2.0), LATENCY_BOUND));
        assert!(!monitor.observe(&record(2, 2.0), 0.5));
        assert!(!monitor.fired());
        // The rejection sits in the window until two clean cycles follow it.
        assert!(!monitor.observe(&record(3, 2.0), LATENCY_BOUND));
        assert!(monitor.observe(&record(4, 2.0), LATENCY_BOUND));
    }

    #[test]
    fn fires_only_once() {
        let mut monitor = monitor();
        monitor.observe(&record(1, 2.0), LATENCY_BOUND);
        assert!(monitor.observe(&record(2, 2.0), LATENCY_BOUND));
        assert!(!monitor.observe(&record(3, 2.0), LATENCY_BOUND));
        assert!(!monitor.observe(&record(4, 2.0), LATENCY_BOUND));
    }
}
