//! acquire.rs
//! Waking the meter up: the first response after a quiet period is usually a
//! stale, cached record. Only a changed production timestamp proves the meter
//! is reporting live again.

use log::debug;
use std::{
    sync::atomic::{AtomicBool, Ordering},
    time::{Duration, SystemTime},
};

use crate::device::{DeviceError, PowerMeter, PowerRecord};
use crate::engine::status::{StatusEvent, StatusSink};
use crate::utils::clock::sleep_for;

/// How a reliable-record acquisition ended.
#[derive(Debug)]
pub enum AcquireResult {
    /// A record whose production timestamp moved against the first read.
    Fresh(PowerRecord),
    /// The timestamp never advanced within the read budget.
    StaleTimeout,
    Cancelled,
}

/// Polls until the production timestamp changes, then returns that record.
///
/// The first successful read is re-checked immediately; after that, reads are
/// spaced `interval` apart. Transient errors burn an attempt and keep going;
/// any other device error is fatal.
pub fn acquire_reliable_record<M: PowerMeter + ?Sized>(
    meter: &M,
    interval: Duration,
    max_attempts: u32,
    cancel: &AtomicBool,
    status: &StatusSink,
) -> Result<AcquireResult, DeviceError> {
    let mut reference: Option<SystemTime> = None;

    for attempt in 1..=max_attempts {
        if cancel.load(Ordering::Acquire) {
            return Ok(AcquireResult::Cancelled);
        }
        status.emit(StatusEvent::Acquiring { attempt });

        let mut just_initialized = false;
        match meter.latest_power_record() {
            Ok(record) => match reference {
                None => {
                    reference = Some(record.recorded_at);
                    just_initialized = true;
                }
                Some(seen) if record.recorded_at != seen => {
                    return Ok(AcquireResult::Fresh(record));
                }
                Some(_) => debug!("read {attempt}: record still stale"),
            },
            Err(err) if err.is_transient() => {
                debug!("read {attempt} failed transiently: {err}");
            }
            Err(err) => return Err(err),
        }

        if !just_initialized && !sleep_for(interval, cancel) {
            return Ok(AcquireResult::Cancelled);
        }
    }

    Ok(AcquireResult::StaleTimeout)
}
