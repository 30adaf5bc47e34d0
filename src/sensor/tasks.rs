//! Firmware tasks behind the acquisition cycle and the flex sensor.
//!
//! None of these decide anything. They perform one hardware step when
//! asked and raise the matching signal when it is done:
//!
//! - `ticker_task` - periodic `TimerUnderflow`
//! - `delay_task` - one-shot `DelayElapsed`
//! - `bus_task` - Si7021 transfers, `TransferDone` or `BusFault`
//! - `flex_task` - tilt interrupt, flex sample, `FlexLevel*`

use core::cell::Cell;

use embassy_nrf::gpio::Input;
use embassy_nrf::saadc::Saadc;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::channel::Channel;
use embassy_sync::signal::Signal as SyncSignal;
use embassy_time::{Duration, Ticker, Timer};
use embedded_hal_async::i2c::I2c;

use super::posture::{sample_to_millivolts, FlexAngle};
use super::si7021::Si7021;
use crate::action::Delay;
use crate::config::{BUTTON_DEBOUNCE_MS, SAMPLE_PERIOD_MS};
use crate::events::Signal;
use crate::AGGREGATOR;

/// Bus transfers of one acquisition cycle.
#[derive(Clone, Copy, defmt::Format)]
pub enum Transfer {
    Measure,
    Read,
}

pub static TRANSFERS: Channel<CriticalSectionRawMutex, Transfer, 2> = Channel::new();

pub static DELAYS: SyncSignal<CriticalSectionRawMutex, Delay> = SyncSignal::new();

/// Result of the last completed read, collected by the platform.
static LAST_CODE: Mutex<CriticalSectionRawMutex, Cell<Option<u16>>> = Mutex::new(Cell::new(None));

pub fn take_code() -> Option<u16> {
    LAST_CODE.lock(|c| c.take())
}

pub async fn ticker_task() -> ! {
    let mut ticker = Ticker::every(Duration::from_millis(SAMPLE_PERIOD_MS));
    loop {
        ticker.next().await;
        AGGREGATOR.raise(Signal::TimerUnderflow);
    }
}

/// A new request replaces one still running.
pub async fn delay_task() -> ! {
    let mut next = DELAYS.wait().await;
    loop {
        let expired = Timer::after(Duration::from_micros(next.as_micros()));
        match embassy_futures::select::select(expired, DELAYS.wait()).await {
            embassy_futures::select::Either::First(()) => {
                AGGREGATOR.raise(Signal::DelayElapsed);
                next = DELAYS.wait().await;
            }
            embassy_futures::select::Either::Second(replacement) => {
                trace!("sensor: {} replaces running delay", replacement);
                next = replacement;
            }
        }
    }
}

pub async fn bus_task<I2C: I2c>(mut sensor: Si7021<I2C>) -> ! {
    loop {
        let transfer = TRANSFERS.receive().await;
        let result = match transfer {
            Transfer::Measure => sensor.start_measurement().await,
            Transfer::Read => sensor.read_code().await.map(|code| {
                LAST_CODE.lock(|c| c.set(Some(code)));
            }),
        };
        match result {
            Ok(()) => AGGREGATOR.raise(Signal::TransferDone),
            Err(e) => {
                warn!("sensor: {} transfer failed ({})", transfer, e);
                AGGREGATOR.raise(Signal::BusFault);
            }
        }
    }
}

/// Sample the flex sensor on every tilt edge.
pub async fn flex_task(mut tilt: Input<'static>, mut adc: Saadc<'static, 1>) -> ! {
    adc.calibrate().await;
    loop {
        tilt.wait_for_any_edge().await;
        Timer::after(Duration::from_millis(BUTTON_DEBOUNCE_MS)).await;

        let mut buf = [0i16; 1];
        adc.sample(&mut buf).await;
        let mv = sample_to_millivolts(buf[0]);
        let angle = FlexAngle::from_millivolts(mv);
        debug!("sensor: flex {} mV -> {} deg", mv, angle.degrees());
        AGGREGATOR.raise(angle.signal());
    }
}
