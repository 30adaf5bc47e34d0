//! GPIO button input with async debouncing.
//!
//! Two physical buttons (active-low with internal pull-up):
//!   - A (PB0) - passkey confirmation, gesture hold
//!   - B (PB1) - value read, gesture click
//!
//! Each button runs its own loop and raises a press signal on the falling
//! edge and a release signal on the rising edge, both debounced.

use embassy_nrf::gpio::{AnyPin, Input, Pull};
use embassy_time::{Duration, Timer};

use crate::config::BUTTON_DEBOUNCE_MS;
use crate::events::Signal;
use crate::AGGREGATOR;

/// Press and release signals of one button.
#[derive(Clone, Copy)]
pub struct ButtonSignals {
    pub pressed: Signal,
    pub released: Signal,
}

pub const BUTTON_A: ButtonSignals = ButtonSignals {
    pressed: Signal::ButtonAPressed,
    released: Signal::ButtonAReleased,
};

pub const BUTTON_B: ButtonSignals = ButtonSignals {
    pressed: Signal::ButtonBPressed,
    released: Signal::ButtonBReleased,
};

pub async fn button_task(pin: AnyPin, signals: ButtonSignals) -> ! {
    let mut btn = Input::new(pin, Pull::Up);
    let debounce = Duration::from_millis(BUTTON_DEBOUNCE_MS);

    loop {
        btn.wait_for_falling_edge().await;
        Timer::after(debounce).await;
        if btn.is_high() {
            continue;
        }
        trace!("button: {}", signals.pressed);
        AGGREGATOR.raise(signals.pressed);

        btn.wait_for_high().await;
        Timer::after(debounce).await;
        trace!("button: {}", signals.released);
        AGGREGATOR.raise(signals.released);
    }
}
