//! clock.rs
//! Signed wall-clock arithmetic and cancellable precision sleeps.
//!
//! Device timestamps come from a remote clock and may sit slightly ahead of or
//! behind the local one, so differences must be representable as negative
//! seconds. `Instant` cannot do that; everything here works on `SystemTime`.

use spin_sleep::{SpinSleeper, SpinStrategy};
use std::{
    sync::atomic::{AtomicBool, Ordering},
    time::{Duration, SystemTime, UNIX_EPOCH},
};

/// Granularity of the cancellation check inside a long sleep.
const CANCEL_POLL: Duration = Duration::from_millis(100);

/// Signed difference `later - earlier` in seconds.
pub fn seconds_between(earlier: SystemTime, later: SystemTime) -> f64 {
    match later.duration_since(earlier) {
        Ok(d) => d.as_secs_f64(),
        Err(e) => -e.duration().as_secs_f64(),
    }
}

/// Shifts a timestamp by a signed number of seconds.
pub fn nudge(timestamp: SystemTime, seconds: f64) -> SystemTime {
    if seconds >= 0.0 {
        timestamp + Duration::from_secs_f64(seconds)
    } else {
        timestamp - Duration::from_secs_f64(-seconds)
    }
}

/// Drops the sub-second part of a timestamp, the way coarse device clocks
/// report their production times.
pub fn truncate_to_seconds(timestamp: SystemTime) -> SystemTime {
    match timestamp.duration_since(UNIX_EPOCH) {
        Ok(d) => UNIX_EPOCH + Duration::from_secs(d.as_secs()),
        Err(_) => timestamp,
    }
}

/// Microseconds since the Unix epoch, for CSV rows.
pub fn epoch_micros(timestamp: SystemTime) -> u64 {
    match timestamp.duration_since(UNIX_EPOCH) {
        Ok(d) => d.as_micros() as u64,
        Err(_) => 0,
    }
}

/// Sleeps until `deadline`, waking early if `cancel` is raised.
///
/// Coarse 100 ms chunks carry the bulk of the wait so the cancel flag is seen
/// promptly; the final chunk goes through a `SpinSleeper` for sub-millisecond
/// wake-up accuracy. Returns `false` when the sleep was cancelled.
pub fn sleep_until(deadline: SystemTime, cancel: &AtomicBool) -> bool {
    let sleeper = SpinSleeper::new(100_000).with_spin_strategy(SpinStrategy::YieldThread);
    loop {
        if cancel.load(Ordering::Acquire) {
            return false;
        }
        let remaining = match deadline.duration_since(SystemTime::now()) {
            Ok(d) => d,
            Err(_) => return true,
        };
        if remaining <= CANCEL_POLL {
            sleeper.sleep(remaining);
            return !cancel.load(Ordering::Acquire);
        }
        sleeper.sleep(CANCEL_POLL);
    }
}

/// Sleeps for `duration` with the same cancellation behavior as [`sleep_until`].
pub fn sleep_for(duration: Duration, cancel: &AtomicBool) -> bool {
    sleep_until(SystemTime::now() + duration, cancel)
}
