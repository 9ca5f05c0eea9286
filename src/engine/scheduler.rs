//! scheduler.rs
//! The polling loop: wake the meter, lock onto its measurement cycle, debounce
//! idleness, switch off once.
//!
//! One remote read per iteration, then sleep until the next schedule slot.
//! Everything mutable (tracker, window, record log) is owned by this loop;
//! the device behind the trait seams may be shared across runs for different
//! plugs.

use log::{debug, info, warn};
use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::{Duration, Instant, SystemTime},
};

use thiserror::Error;

use crate::device::{DeviceError, PowerMeter, PowerRecord, PowerSwitch};
use crate::engine::{
    acquire::{AcquireResult, acquire_reliable_record},
    actuator::{OneShotSwitch, SwitchOffOutcome},
    config::EngineConfig,
    debounce::IdleMonitor,
    phase::{CycleTracker, LatencyClass},
    status::{StatusEvent, StatusSink},
};
use crate::utils::clock::sleep_until;

/// Which budget ran out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutReason {
    /// The meter never produced a fresh record during wake-up.
    StaleRead,
    /// The configured ceiling on the whole run passed.
    RunCeiling,
}

impl TimeoutReason {
    pub fn as_str(self) -> &'static str {
        match self {
            TimeoutReason::StaleRead => "stale read",
            TimeoutReason::RunCeiling => "run ceiling",
        }
    }
}

/// How a run ended, when it ended without a device failure.
#[derive(Debug)]
pub enum Outcome {
    /// Idle confirmed and the off command (or its dry-run stand-in)
    /// succeeded; carries every record observed along the way.
    Switched(Vec<PowerRecord>),
    /// The plug was off before any polling started.
    AlreadyOff,
    /// Another actor switched the plug off mid-run; no command was sent.
    ExternallyOff,
    Cancelled,
    TimedOut(TimeoutReason),
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("device failure: {0}")]
    Device(#[from] DeviceError),
    /// The off command itself failed. The relay is left on, so the caller may
    /// safely start a whole new run; the command is never retried here.
    #[error("switch-off command failed: {0}")]
    Actuation(DeviceError),
}

#[derive(Debug, Clone, Copy)]
enum RunPhase {
    Synchronizing,
    Monitoring,
}

/// One idle-shutdown run against one plug.
pub struct IdleShutdown<'a, D: PowerMeter + PowerSwitch> {
    device: &'a D,
    config: EngineConfig,
    status: StatusSink,
    cancel: Arc<AtomicBool>,
}

impl<'a, D: PowerMeter + PowerSwitch> IdleShutdown<'a, D> {
    pub fn new(
        device: &'a D,
        config: EngineConfig,
        status: StatusSink,
        cancel: Arc<AtomicBool>,
    ) -> Self {
        Self {
            device,
            config,
            status,
            cancel,
        }
    }

    pub fn run(&self) -> Result<Outcome, EngineError> {
        let deadline = self
            .config
            .max_runtime
            .map(|s| Instant::now() + Duration::from_secs_f64(s));

        if self.cancelled() {
            return self.finish_cancelled();
        }

        if !self.device.switch_state()? {
            info!("switch is already off; nothing to do");
            self.status.emit(StatusEvent::AlreadyOff);
            return Ok(Outcome::AlreadyOff);
        }

        debug!("waking the meter for a first fresh record");
        let first = match acquire_reliable_record(
            self.device,
            Duration::from_secs_f64(self.config.acquire_interval),
            self.config.acquire_max_attempts,
            &self.cancel,
            &self.status,
        )? {
            AcquireResult::Fresh(record) => record,
            AcquireResult::StaleTimeout => {
                warn!("meter kept reporting the same record; giving up");
                self.status.emit(StatusEvent::TimedOut {
                    reason: TimeoutReason::StaleRead.as_str(),
                });
                return Ok(Outcome::TimedOut(TimeoutReason::StaleRead));
            }
            AcquireResult::Cancelled => return self.finish_cancelled(),
        };

        let mut records = vec![first];
        let mut tracker = CycleTracker::new(
            &first,
            self.config.cycle_length,
            self.config.precision_digits,
            self.config.ideal_latency,
        );
        let mut monitor = IdleMonitor::new(
            self.config.idle_cycles,
            self.config.power_threshold,
            self.config.duration_threshold,
        );
        let mut actuator = OneShotSwitch::new(self.device, self.config.dry_run);
        let mut phase = RunPhase::Synchronizing;

        self.emit_sample(&first);
        // Idleness is judged from the very first record on; synchronization
        // quality only decides which samples can qualify.
        if monitor.observe(&first, self.latency_bound(&tracker)) {
            self.status.emit(StatusEvent::IdleConfirmed);
            return self.actuate(&mut actuator, records);
        }

        loop {
            if self.cancelled() {
                return self.finish_cancelled();
            }
            if let Some(deadline) = deadline {
                if Instant::now() >= deadline {
                    info!("run ceiling reached before an idle decision");
                    self.status.emit(StatusEvent::TimedOut {
                        reason: TimeoutReason::RunCeiling.as_str(),
                    });
                    return Ok(Outcome::TimedOut(TimeoutReason::RunCeiling));
                }
            }

            let target = tracker.next_request_time(SystemTime::now());
            if !sleep_until(target, &self.cancel) {
                return self.finish_cancelled();
            }

            let record = match self.device.latest_power_record() {
                Ok(record) => record,
                Err(err) if err.is_transient() => {
                    debug!("tick lost to a transient read failure: {err}");
                    continue;
                }
                Err(err) => return Err(EngineError::Device(err)),
            };
            records.push(record);
            self.emit_sample(&record);

            let was_converged = tracker.converged();
            let class = tracker.observe(&record);
            self.status.emit(StatusEvent::PhaseAdjusted {
                offset_s: tracker.offset(),
                step_s: tracker.step(),
                lower_bound_s: tracker.lower_bound(),
                latency_threshold_s: tracker.latency_threshold(),
            });
            if class == LatencyClass::Anomalous {
                debug!(
                    "anomalous latency {:.2} s; restarting the offset walk",
                    record.latency_s()
                );
            }
            if !was_converged && tracker.converged() {
                phase = RunPhase::Monitoring;
                info!(
                    "request schedule settled; minimal latency {:.2} s",
                    tracker.min_latency()
                );
                self.status.emit(StatusEvent::SearchSettled {
                    min_latency_s: tracker.min_latency(),
                });
            }
            debug!(
                "{:?}: {} records, idle window {}/{}",
                phase,
                records.len(),
                monitor.admitted(),
                self.config.idle_cycles
            );

            if monitor.observe(&record, self.latency_bound(&tracker)) {
                self.status.emit(StatusEvent::IdleConfirmed);
                return self.actuate(&mut actuator, records);
            }
        }
    }

    fn cancelled(&self) -> bool {
        self.cancel.load(Ordering::Acquire)
    }

    /// Staleness bound an idle-qualifying sample must beat right now: the
    /// configured ceiling, tightened by whatever the offset search has learned.
    fn latency_bound(&self, tracker: &CycleTracker) -> f64 {
        self.config.latency_threshold.min(tracker.latency_threshold())
    }

    fn finish_cancelled(&self) -> Result<Outcome, EngineError> {
        info!("run cancelled; the relay was left untouched");
        self.status.emit(StatusEvent::Cancelled);
        Ok(Outcome::Cancelled)
    }

    fn emit_sample(&self, record: &PowerRecord) {
        self.status.emit(StatusEvent::SampleObserved {
            power_w: record.power_w,
            latency_s: record.latency_s(),
            duration_s: record.duration_s(),
        });
    }

    fn actuate(
        &self,
        actuator: &mut OneShotSwitch<'_, D>,
        records: Vec<PowerRecord>,
    ) -> Result<Outcome, EngineError> {
        match actuator.switch_off() {
            Ok(SwitchOffOutcome::AlreadyOff) => {
                info!("plug was switched off externally mid-run");
                self.status.emit(StatusEvent::ExternallyOff);
                Ok(Outcome::ExternallyOff)
            }
            Ok(outcome) => {
                let dry_run = outcome == SwitchOffOutcome::DryRun;
                self.status.emit(StatusEvent::SwitchedOff { dry_run });
                Ok(Outcome::Switched(records))
            }
            Err(err) => Err(EngineError::Actuation(err)),
        }
    }
}
