//! Side effects requested by the state machines.
//!
//! Transition methods never touch hardware. They push [`Action`]s into a
//! bounded [`Actions`] list and the node hands each one to the platform
//! once the transition is complete.

use heapless::Vec;

use crate::ble::PeerAddress;
use crate::config::{SENSOR_CONVERSION_US, SENSOR_SETTLE_MS};
use crate::delivery::Quantity;
use crate::ui::{Line, Row};

/// Effects produced by one dispatch step.
pub type Actions = Vec<Action, 12>;

/// One-shot delays; expiry raises `Signal::DelayElapsed`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Delay {
    /// Sensor power-up settle time.
    Settle,
    /// Temperature conversion time.
    Conversion,
}

impl Delay {
    pub const fn as_micros(self) -> u64 {
        match self {
            Delay::Settle => SENSOR_SETTLE_MS * 1_000,
            Delay::Conversion => SENSOR_CONVERSION_US,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Action {
    // Link lifecycle
    StartAdvertising,
    StartScanning,
    StopScanning,
    Connect(PeerAddress),
    /// Forget every stored bond so the next connection pairs afresh.
    DeleteBondings,
    /// Accept the numeric comparison shown to the user.
    ConfirmPasskey,
    AcceptBonding,
    /// Ask the peer to encrypt the link.
    IncreaseSecurity,

    // Attribute discovery (peer role)
    DiscoverService(Quantity),
    DiscoverCharacteristic(Quantity),
    SetSubscription { quantity: Quantity, enabled: bool },
    ReadValue(Quantity),

    // Temperature sensor
    SensorPower(bool),
    /// Hold (`true`) or drop (`false`) one high-power vote for a bus
    /// transaction.
    HighPower(bool),
    StartDelay(Delay),
    /// Write the measure command; completion raises transfer-done.
    StartMeasurement,
    /// Read the two result bytes; completion raises transfer-done.
    StartRead,

    // Display
    Render(Row, Line),
}

/// Queue `action`, logging instead of failing when the list is full.
pub(crate) fn push(out: &mut Actions, action: Action) {
    if out.push(action).is_err() {
        warn!("action list full, dropping effect");
    }
}

/// Queue a display update.
pub(crate) fn render(out: &mut Actions, row: Row, text: &str) {
    push(out, Action::Render(row, crate::ui::line(text)));
}
