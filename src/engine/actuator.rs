//! actuator.rs
//! The one destructive step of a run, guarded so it happens at most once.

use log::info;

use crate::device::{DeviceError, PowerSwitch};

/// What the switch-off attempt found and did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwitchOffOutcome {
    /// The off command went out and the device confirmed.
    SwitchedOff,
    /// Dry run: the device qualified but was left untouched.
    DryRun,
    /// Someone else already switched it off; no command sent.
    AlreadyOff,
}

/// One-shot wrapper around the relay. A second call within the same run is a
/// programming error; it is asserted in debug builds and answered with the
/// first call's result otherwise.
pub struct OneShotSwitch<'a, S: PowerSwitch + ?Sized> {
    switch: &'a S,
    dry_run: bool,
    completed: Option<SwitchOffOutcome>,
}

impl<'a, S: PowerSwitch + ?Sized> OneShotSwitch<'a, S> {
    pub fn new(switch: &'a S, dry_run: bool) -> Self {
        Self {
            switch,
            dry_run,
            completed: None,
        }
    }

    pub fn switch_off(&mut self) -> Result<SwitchOffOutcome, DeviceError> {
        if let Some(done) = self.completed {
            debug_assert!(false, "switch_off called twice within one run");
            return Ok(done);
        }

        let outcome = if !self.switch.switch_state()? {
            SwitchOffOutcome::AlreadyOff
        } else if self.dry_run {
            info!("dry run: leaving the relay on");
            SwitchOffOutcome::DryRun
        } else {
            self.switch.set_switch(false)?;
            SwitchOffOutcome::SwitchedOff
        };
        self.completed = Some(outcome);
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    struct FakeSwitch {
        on: Mutex<bool>,
        set_calls: Mutex<Vec<bool>>,
    }

    impl FakeSwitch {
        fn new(on: bool) -> Self {
            Self {
                on: Mutex::new(on),
                set_calls: Mutex::new(Vec::new()),
            }
        }
    }

    impl PowerSwitch for FakeSwitch {
        fn switch_state(&self) -> Result<bool, DeviceError> {
            Ok(*self.on.lock())
        }

        fn set_switch(&self, on: bool) -> Result<bool, DeviceError> {
            *self.on.lock() = on;
            self.set_calls.lock().push(on);
            Ok(on)
        }
    }

    #[test]
    fn switches_the_relay_off() {
        let switch = FakeSwitch::new(true);
        let mut actuator = OneShotSwitch::new(&switch, false);
        assert_eq!(actuator.switch_off().unwrap(), SwitchOffOutcome::SwitchedOff);
        assert_eq!(*switch.set_calls.lock(), vec![false]);
    }

    #[test]
    fn dry_run_leaves_the_relay_alone() {
        let switch = FakeSwitch::new(true);
        let mut actuator = OneShotSwitch::new(&switch, true);
        assert_eq!(actuator.switch_off().unwrap(), SwitchOffOutcome::DryRun);
        assert!(switch.set_calls.lock().is_empty());
        assert!(*switch.on.lock());
    }

    #[test]
    fn externally_switched_off_sends_no_command() {
        let switch = FakeSwitch::new(false);
        let mut actuator = OneShotSwitch::new(&switch, false);
        assert_eq!(actuator.switch_off().unwrap(), SwitchOffOutcome::AlreadyOff);
        assert!(switch.set_calls.lock().is_empty());
    }
}
