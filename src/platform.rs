//! nRF52840 implementation of [`Platform`].
//!
//! Every action becomes either a direct register-level effect (sensor
//! rail, HFCLK vote, display row) or a non-blocking request to the task
//! that owns the hardware. Nothing here awaits, so the dispatch step
//! always runs to completion.

use embassy_nrf::gpio::Output;
use nrf_softdevice::raw;

use crate::action::Action;
use crate::ble::link::{self, LinkRequest};
use crate::ble::server::SensorServer;
use crate::ble::PeerAddress;
use crate::delivery::ReportEntry;
use crate::error::{Error, LinkError};
use crate::node::Platform;
use crate::power::{PowerManager, PowerState};
use crate::sensor::tasks::{self, Transfer};
use crate::ui::display;

pub struct NrfPlatform {
    sensor_enable: Output<'static>,
    power: PowerManager,
    /// Present in the sensor role only.
    server: Option<&'static SensorServer>,
}

impl NrfPlatform {
    pub fn new(sensor_enable: Output<'static>, server: Option<&'static SensorServer>) -> Self {
        Self {
            sensor_enable,
            power: PowerManager::new(),
            server,
        }
    }

    fn vote(&mut self, on: bool) {
        let change = if on {
            self.power.acquire()
        } else {
            self.power.release()
        };
        // SAFETY: plain SoftDevice clock calls, valid once it is enabled.
        let ret = match change {
            Some(PowerState::HighPower) => unsafe { raw::sd_clock_hfclk_request() },
            Some(PowerState::LowPower) => unsafe { raw::sd_clock_hfclk_release() },
            None => 0,
        };
        if ret != 0 {
            warn!("platform: HFCLK vote failed ({})", ret);
        }
    }
}

impl Platform for NrfPlatform {
    fn transmit(&mut self, entry: &ReportEntry) -> Result<(), LinkError> {
        let server = self.server.ok_or(LinkError::NotPermitted)?;
        let conn = link::connection().ok_or(LinkError::NotConnected)?;
        server.indicate(&conn, entry)?;
        link::arm();
        Ok(())
    }

    fn perform(&mut self, action: Action) -> Result<(), Error> {
        if let Some(request) = LinkRequest::from_action(&action) {
            return link::REQUESTS.try_send(request).map_err(|_| Error::Busy);
        }

        match action {
            Action::SensorPower(true) => self.sensor_enable.set_high(),
            Action::SensorPower(false) => self.sensor_enable.set_low(),
            Action::HighPower(on) => self.vote(on),
            Action::StartDelay(delay) => tasks::DELAYS.signal(delay),
            Action::StartMeasurement => {
                tasks::TRANSFERS
                    .try_send(Transfer::Measure)
                    .map_err(|_| Error::Busy)?;
            }
            Action::StartRead => {
                tasks::TRANSFERS
                    .try_send(Transfer::Read)
                    .map_err(|_| Error::Busy)?;
            }
            Action::Render(row, text) => display::set_row(row, &text),
            other => debug!("platform: {} has no effect here", other),
        }
        Ok(())
    }

    fn sensor_code(&mut self) -> Option<u16> {
        tasks::take_code()
    }

    fn connected_peer(&mut self) -> Option<PeerAddress> {
        link::peer()
    }
}
