//! Sensor-role GATT server and advertising.
//!
//! Four indicated report characteristics:
//!
//! | Service                  | Characteristic          | Value            |
//! |--------------------------|-------------------------|------------------|
//! | Health Thermometer 1809  | Temperature 2A1C        | 5-byte float     |
//! | Flex (custom)            | Flex angle (custom)     | degrees, 1 byte  |
//! | Tilt (custom)            | Tilt count (custom)     | count, 1 byte    |
//! | Button (custom)          | Button state (custom)   | 0/1, encrypted   |
//!
//! Reading the button state needs an encrypted link, so an unpaired peer
//! gets an insufficient-encryption error and has to raise security first.
//!
//! CCCD writes become `SubscriptionChanged` events, indication
//! confirmations raise `Acknowledged`.

use embassy_futures::select::{select, Either};
use nrf_softdevice::ble::gatt_server::{self, RegisterError, WriteOp};
use nrf_softdevice::ble::{peripheral, Connection};
use nrf_softdevice::{raw, Softdevice};

use super::{link, security};
use super::link::LinkRequest;
use crate::config::{
    ADV_INTERVAL, CONN_INTERVAL_MAX, CONN_INTERVAL_MIN, DEVICE_NAME, SLAVE_LATENCY, SUP_TIMEOUT,
};
use crate::delivery::{Quantity, ReportEntry};
use crate::error::LinkError;
use crate::events::{Event, Signal};
use crate::AGGREGATOR;

#[nrf_softdevice::gatt_service(uuid = "1809")]
pub struct ThermometerService {
    #[characteristic(uuid = "2a1c", indicate)]
    temperature: [u8; 5],
}

#[nrf_softdevice::gatt_service(uuid = "39b6b0dc-6ee2-4e77-a665-75d0b64649a3")]
pub struct FlexService {
    #[characteristic(uuid = "b1082442-5cb6-4d30-9d8c-12094979f6be", read, indicate)]
    angle: u8,
}

#[nrf_softdevice::gatt_service(uuid = "aa6321f1-ee79-4f7c-833f-0f6bfcdc0d32")]
pub struct TiltService {
    #[characteristic(uuid = "5bb27a07-3455-4576-bfb6-f7ae4e45aca9", read, indicate)]
    count: u8,
}

#[nrf_softdevice::gatt_service(uuid = "4c5b3e2a-7f61-4d0e-9a83-2f6b1c0d5e71")]
pub struct ButtonService {
    #[characteristic(uuid = "e2b8c0f4-3a19-4c57-8d6e-91a0f7b3c2d4", read, indicate, security = "JustWorks")]
    state: u8,
}

#[nrf_softdevice::gatt_server]
pub struct Reports {
    pub thermometer: ThermometerService,
    pub flex: FlexService,
    pub tilt: TiltService,
    pub button: ButtonService,
}

/// The registered server plus the link-layer callbacks the generated
/// server does not surface.
pub struct SensorServer {
    reports: Reports,
}

impl SensorServer {
    pub fn new(sd: &mut Softdevice) -> Result<Self, RegisterError> {
        Ok(Self {
            reports: Reports::new(sd)?,
        })
    }

    /// Indicate one report. Readable characteristics also get the new
    /// value stored so a read returns the latest report.
    pub fn indicate(&self, conn: &Connection, entry: &ReportEntry) -> Result<(), LinkError> {
        let quantity = Quantity::from_attribute(entry.target).ok_or(LinkError::NotPermitted)?;
        let result = match quantity {
            Quantity::Temperature => {
                self.reports.thermometer.temperature_indicate(conn, &entry.payload)
            }
            Quantity::FlexAngle => {
                let value = entry.payload[0];
                let _ = self.reports.flex.angle_set(&value);
                self.reports.flex.angle_indicate(conn, &value)
            }
            Quantity::TiltCount => {
                let value = entry.payload[0];
                let _ = self.reports.tilt.count_set(&value);
                self.reports.tilt.count_indicate(conn, &value)
            }
            Quantity::ButtonState => {
                let value = entry.payload[0];
                let _ = self.reports.button.state_set(&value);
                self.reports.button.state_indicate(conn, &value)
            }
        };
        result.map_err(|e| match e {
            gatt_server::IndicateValueError::Disconnected => LinkError::NotConnected,
            gatt_server::IndicateValueError::Raw(raw) => LinkError::Raw(raw as u32),
        })
    }

    fn on_event(&self, event: ReportsEvent) {
        let (quantity, enabled) = match event {
            ReportsEvent::Thermometer(ThermometerServiceEvent::TemperatureCccdWrite {
                indications,
            }) => (Quantity::Temperature, indications),
            ReportsEvent::Flex(FlexServiceEvent::AngleCccdWrite { indications }) => {
                (Quantity::FlexAngle, indications)
            }
            ReportsEvent::Tilt(TiltServiceEvent::CountCccdWrite { indications }) => {
                (Quantity::TiltCount, indications)
            }
            ReportsEvent::Button(ButtonServiceEvent::StateCccdWrite { indications }) => {
                (Quantity::ButtonState, indications)
            }
        };
        link::post(Event::SubscriptionChanged { quantity, enabled });
    }
}

impl gatt_server::Server for SensorServer {
    type Event = ReportsEvent;

    fn on_write(
        &self,
        conn: &Connection,
        handle: u16,
        op: WriteOp,
        offset: usize,
        data: &[u8],
    ) -> Option<Self::Event> {
        self.reports.on_write(conn, handle, op, offset, data)
    }

    fn on_indicate_confirm(&self, _conn: &Connection, handle: u16) {
        trace!("server: indication confirmed on {}", handle);
        link::acknowledged();
    }

    fn on_timeout(&self, _conn: &Connection) {
        warn!("server: GATT timeout");
        AGGREGATOR.raise(Signal::SendTimeout);
    }
}

/// Advertising payload: flags, complete name, Health Thermometer UUID.
fn advertising_data() -> heapless::Vec<u8, 31> {
    let mut data = heapless::Vec::new();
    let _ = data.extend_from_slice(&[0x02, 0x01, raw::BLE_GAP_ADV_FLAGS_LE_ONLY_GENERAL_DISC_MODE as u8]);
    let _ = data.push(DEVICE_NAME.len() as u8 + 1);
    let _ = data.push(0x09);
    let _ = data.extend_from_slice(DEVICE_NAME.as_bytes());
    let _ = data.extend_from_slice(&[0x03, 0x03, 0x09, 0x18]);
    data
}

/// Handle requests that make sense on an open sensor-role connection.
fn on_request(conn: &Connection, request: LinkRequest) {
    let result = match request {
        LinkRequest::ConfirmPasskey => security::confirm_passkey(conn),
        LinkRequest::IncreaseSecurity => security::increase_security(conn),
        LinkRequest::DeleteBondings => {
            security::bonder().clear();
            Ok(())
        }
        // The bond is accepted in `can_bond`.
        LinkRequest::AcceptBonding => Ok(()),
        other => {
            debug!("server: {} ignored while connected", other);
            Ok(())
        }
    };
    if let Err(e) = result {
        warn!("server: {} failed ({})", request, e);
    }
}

/// Advertise when asked, serve one connection at a time.
pub async fn server_task(sd: &'static Softdevice, server: &'static SensorServer) -> ! {
    let adv_data = advertising_data();
    let config = peripheral::Config {
        interval: ADV_INTERVAL,
        ..Default::default()
    };

    loop {
        match link::REQUESTS.receive().await {
            LinkRequest::Advertise => {}
            LinkRequest::DeleteBondings => {
                security::bonder().clear();
                continue;
            }
            other => {
                debug!("server: {} ignored while idle", other);
                continue;
            }
        }

        info!("server: advertising as {}", DEVICE_NAME);
        let adv = peripheral::ConnectableAdvertisement::ScannableUndirected {
            adv_data: &adv_data,
            scan_data: &[],
        };
        let conn = match peripheral::advertise_pairable(sd, adv, &config, security::bonder()).await {
            Ok(conn) => conn,
            Err(e) => {
                warn!("server: advertising failed ({})", e);
                AGGREGATOR.raise(Signal::ConnectionClosed);
                continue;
            }
        };

        let params = raw::ble_gap_conn_params_t {
            min_conn_interval: CONN_INTERVAL_MIN,
            max_conn_interval: CONN_INTERVAL_MAX,
            slave_latency: SLAVE_LATENCY,
            conn_sup_timeout: SUP_TIMEOUT,
        };
        if conn.set_conn_params(params).is_err() {
            debug!("server: connection parameter update refused");
        }

        link::opened(&conn);

        let serve = gatt_server::run(&conn, server, |event| server.on_event(event));
        let requests = async {
            loop {
                let request = link::REQUESTS.receive().await;
                on_request(&conn, request);
            }
        };
        if let Either::First(_) = select(serve, requests).await {
            info!("server: disconnected");
        }
        link::closed();
    }
}
