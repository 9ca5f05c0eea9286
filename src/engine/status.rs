//! status.rs
//! Structured progress events, pushed non-blockingly to whoever listens.

use crossbeam::channel::Sender;

/// Progress of an idle-shutdown run, one event per noteworthy step.
#[derive(Debug, Clone)]
pub enum StatusEvent {
    AlreadyOff,
    Acquiring { attempt: u32 },
    SampleObserved { power_w: f64, latency_s: f64, duration_s: f64 },
    PhaseAdjusted {
        offset_s: f64,
        step_s: f64,
        lower_bound_s: f64,
        latency_threshold_s: f64,
    },
    SearchSettled { min_latency_s: f64 },
    IdleConfirmed,
    SwitchedOff { dry_run: bool },
    ExternallyOff,
    Cancelled,
    TimedOut { reason: &'static str },
}

/// Non-blocking event sink. A full channel drops the event rather than stall
/// the polling loop; an absent sink discards everything.
#[derive(Clone, Default)]
pub struct StatusSink {
    tx: Option<Sender<StatusEvent>>,
}

impl StatusSink {
    pub fn new(tx: Sender<StatusEvent>) -> Self {
        Self { tx: Some(tx) }
    }

    pub fn disabled() -> Self {
        Self { tx: None }
    }

    pub fn emit(&self, event: StatusEvent) {
        if let Some(tx) = &self.tx {
            let _ = tx.try_send(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam::channel::bounded;

    #[test]
    fn full_channel_drops_instead_of_blocking() {
        let (tx, rx) = bounded(1);
        let sink = StatusSink::new(tx);
        sink.emit(StatusEvent::AlreadyOff);
        sink.emit(StatusEvent::IdleConfirmed);
        assert!(matches!(rx.try_recv(), Ok(StatusEvent::AlreadyOff)));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn disabled_sink_is_a_no_op() {
        StatusSink::disabled().emit(StatusEvent::IdleConfirmed);
    }
}
