//! Temperature acquisition cycle.
//!
//! ```text
//! Idle ─underflow─► PoweringSensor ─delay─► AwaitingTransferDone
//!  ▲                                              │ transfer-done
//!  │                                              ▼
//!  └──transfer-done── Reading ◄──delay── AwaitingConversion
//! ```
//!
//! `PoweringSensor` covers the settle time after the rail is switched on,
//! i.e. the wait for the bus device to become ready. A high-power vote is
//! held only while an I²C transfer is outstanding. A bus fault, or a
//! connection close, drops the vote, switches the sensor off and returns
//! to `Idle`.

use crate::action::{self, Action, Actions, Delay};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AcquisitionState {
    Idle,
    /// Sensor powered, settle delay running.
    PoweringSensor,
    /// Measure command on the bus.
    AwaitingTransferDone,
    /// Conversion delay running.
    AwaitingConversion,
    /// Result read on the bus.
    Reading,
}

impl AcquisitionState {
    fn bus_busy(self) -> bool {
        matches!(
            self,
            AcquisitionState::AwaitingTransferDone | AcquisitionState::Reading
        )
    }
}

pub struct Acquisition {
    state: AcquisitionState,
}

impl Acquisition {
    pub const fn new() -> Self {
        Self {
            state: AcquisitionState::Idle,
        }
    }

    pub fn state(&self) -> AcquisitionState {
        self.state
    }

    fn enter(&mut self, next: AcquisitionState) {
        trace!("acquisition: {} -> {}", self.state, next);
        self.state = next;
    }

    /// Periodic timer: start a cycle if none is running.
    pub fn on_timer_underflow(&mut self, out: &mut Actions) {
        if self.state != AcquisitionState::Idle {
            debug!("acquisition: tick skipped, still {}", self.state);
            return;
        }
        action::push(out, Action::SensorPower(true));
        action::push(out, Action::StartDelay(Delay::Settle));
        self.enter(AcquisitionState::PoweringSensor);
    }

    pub fn on_delay_elapsed(&mut self, out: &mut Actions) {
        match self.state {
            AcquisitionState::PoweringSensor => {
                action::push(out, Action::HighPower(true));
                action::push(out, Action::StartMeasurement);
                self.enter(AcquisitionState::AwaitingTransferDone);
            }
            AcquisitionState::AwaitingConversion => {
                action::push(out, Action::HighPower(true));
                action::push(out, Action::StartRead);
                self.enter(AcquisitionState::Reading);
            }
            _ => trace!("acquisition: stray delay in {}", self.state),
        }
    }

    /// Bus transfer finished. Returns true when the result bytes are ready
    /// to be collected.
    pub fn on_transfer_done(&mut self, out: &mut Actions) -> bool {
        match self.state {
            AcquisitionState::AwaitingTransferDone => {
                action::push(out, Action::HighPower(false));
                action::push(out, Action::StartDelay(Delay::Conversion));
                self.enter(AcquisitionState::AwaitingConversion);
                false
            }
            AcquisitionState::Reading => {
                action::push(out, Action::HighPower(false));
                action::push(out, Action::SensorPower(false));
                self.enter(AcquisitionState::Idle);
                true
            }
            _ => {
                trace!("acquisition: stray transfer-done in {}", self.state);
                false
            }
        }
    }

    pub fn on_bus_fault(&mut self, out: &mut Actions) {
        if !self.state.bus_busy() {
            return;
        }
        warn!("acquisition: bus fault in {}, aborting cycle", self.state);
        self.abort(out);
    }

    /// Abandon any cycle in progress.
    pub fn abort(&mut self, out: &mut Actions) {
        if self.state == AcquisitionState::Idle {
            return;
        }
        if self.state.bus_busy() {
            action::push(out, Action::HighPower(false));
        }
        action::push(out, Action::SensorPower(false));
        self.enter(AcquisitionState::Idle);
    }
}

impl Default for Acquisition {
    fn default() -> Self {
        Self::new()
    }
}
