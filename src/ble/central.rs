//! Peer-role scanner, connection and GATT client.
//!
//! The central task owns the radio in the peer role. It performs exactly
//! the request it is given and reports the outcome as events:
//!
//! 1. **Scan** - every connectable advertisement is posted; the control
//!    plane decides whether to connect.
//! 2. **Connect** - whitelisted connect with the shared bond table.
//! 3. **Discovery** - service and characteristic requests map onto the
//!    SoftDevice's per-service discovery; the result is kept for the
//!    subscription and read requests that follow.
//! 4. **Indications** - one listener per connection posts received values,
//!    also while a request is running.

use core::cell::RefCell;

use embassy_futures::select::{select, Either};
use nrf_softdevice::ble::gatt_client::{self, Client, DiscoverError, HvxType, ReadError, WriteError};
use nrf_softdevice::ble::{central, Connection, GattError};
use nrf_softdevice::{raw, Softdevice};

use super::link::{self, LinkRequest};
use super::security;
use crate::config::{
    CONN_INTERVAL_MAX, CONN_INTERVAL_MIN, SCAN_INTERVAL, SCAN_WINDOW, SLAVE_LATENCY, SUP_TIMEOUT,
};
use crate::delivery::Quantity;
use crate::events::{Event, Payload, ProcedureError};

#[nrf_softdevice::gatt_client(uuid = "1809")]
pub struct ThermometerClient {
    #[characteristic(uuid = "2a1c", indicate)]
    temperature: [u8; 5],
}

#[nrf_softdevice::gatt_client(uuid = "39b6b0dc-6ee2-4e77-a665-75d0b64649a3")]
pub struct FlexClient {
    #[characteristic(uuid = "b1082442-5cb6-4d30-9d8c-12094979f6be", read, indicate)]
    angle: u8,
}

#[nrf_softdevice::gatt_client(uuid = "aa6321f1-ee79-4f7c-833f-0f6bfcdc0d32")]
pub struct TiltClient {
    #[characteristic(uuid = "5bb27a07-3455-4576-bfb6-f7ae4e45aca9", read, indicate)]
    count: u8,
}

/// Discovered clients of one connection.
///
/// Also acts as the indication listener for all of them at once; it is
/// never discovered itself. Slots are filled while the listener runs, so
/// they sit behind `RefCell`s that are only borrowed mutably between
/// awaits.
#[derive(Default)]
pub struct PeerClients {
    thermometer: RefCell<Option<ThermometerClient>>,
    flex: RefCell<Option<FlexClient>>,
    tilt: RefCell<Option<TiltClient>>,
}

pub enum PeerValue {
    Thermometer(ThermometerClientEvent),
    Flex(FlexClientEvent),
    Tilt(TiltClientEvent),
}

impl Client for PeerClients {
    type Event = PeerValue;

    fn on_hvx(
        &self,
        conn: &Connection,
        type_: HvxType,
        handle: u16,
        data: &[u8],
    ) -> Option<Self::Event> {
        if let Some(e) = self
            .flex
            .borrow()
            .as_ref()
            .and_then(|c| c.on_hvx(conn, type_, handle, data))
        {
            return Some(PeerValue::Flex(e));
        }
        if let Some(e) = self
            .tilt
            .borrow()
            .as_ref()
            .and_then(|c| c.on_hvx(conn, type_, handle, data))
        {
            return Some(PeerValue::Tilt(e));
        }
        self.thermometer
            .borrow()
            .as_ref()
            .and_then(|c| c.on_hvx(conn, type_, handle, data))
            .map(PeerValue::Thermometer)
    }

    fn uuid() -> nrf_softdevice::ble::Uuid {
        <FlexClient as Client>::uuid()
    }

    fn new_undiscovered(_conn: Connection) -> Self {
        Self::default()
    }

    fn discovered_characteristic(
        &mut self,
        _characteristic: &gatt_client::Characteristic,
        _descriptors: &[gatt_client::Descriptor],
    ) {
    }

    fn discovery_complete(&mut self) -> Result<(), DiscoverError> {
        Ok(())
    }
}

impl PeerClients {
    fn is_discovered(&self, quantity: Quantity) -> bool {
        match quantity {
            Quantity::Temperature => self.thermometer.borrow().is_some(),
            Quantity::FlexAngle => self.flex.borrow().is_some(),
            Quantity::TiltCount => self.tilt.borrow().is_some(),
            Quantity::ButtonState => false,
        }
    }

    async fn discover(&self, conn: &Connection, quantity: Quantity) -> Result<(), ProcedureError> {
        match quantity {
            Quantity::Temperature => {
                let client = gatt_client::discover(conn).await.map_err(discover_error)?;
                self.thermometer.replace(Some(client));
            }
            Quantity::FlexAngle => {
                let client = gatt_client::discover(conn).await.map_err(discover_error)?;
                self.flex.replace(Some(client));
            }
            Quantity::TiltCount => {
                let client = gatt_client::discover(conn).await.map_err(discover_error)?;
                self.tilt.replace(Some(client));
            }
            Quantity::ButtonState => return Err(ProcedureError::NotFound),
        }
        Ok(())
    }

    async fn subscribe(&self, quantity: Quantity, enabled: bool) -> Result<(), ProcedureError> {
        let result = match quantity {
            Quantity::Temperature => match self.thermometer.borrow().as_ref() {
                Some(c) => c.temperature_cccd_write(enabled).await,
                None => return Err(ProcedureError::NotFound),
            },
            Quantity::FlexAngle => match self.flex.borrow().as_ref() {
                Some(c) => c.angle_cccd_write(enabled).await,
                None => return Err(ProcedureError::NotFound),
            },
            Quantity::TiltCount => match self.tilt.borrow().as_ref() {
                Some(c) => c.count_cccd_write(enabled).await,
                None => return Err(ProcedureError::NotFound),
            },
            Quantity::ButtonState => return Err(ProcedureError::NotFound),
        };
        result.map_err(write_error)
    }

    async fn read(&self, quantity: Quantity) -> Result<Payload, ProcedureError> {
        let byte = match quantity {
            Quantity::FlexAngle => match self.flex.borrow().as_ref() {
                Some(c) => c.angle_read().await,
                None => return Err(ProcedureError::NotFound),
            },
            Quantity::TiltCount => match self.tilt.borrow().as_ref() {
                Some(c) => c.count_read().await,
                None => return Err(ProcedureError::NotFound),
            },
            Quantity::Temperature | Quantity::ButtonState => return Err(ProcedureError::NotFound),
        };
        let byte = byte.map_err(read_error)?;
        Payload::from_slice(&[byte]).map_err(|_| ProcedureError::Failed(0))
    }
}

fn gatt_error(e: GattError) -> ProcedureError {
    if e == GattError::ATTERR_INSUF_ENCRYPTION || e == GattError::ATTERR_INSUF_AUTHENTICATION {
        ProcedureError::InsufficientEncryption
    } else {
        ProcedureError::Failed(e.to_u16())
    }
}

fn discover_error(e: DiscoverError) -> ProcedureError {
    match e {
        DiscoverError::ServiceNotFound => ProcedureError::NotFound,
        DiscoverError::Gatt(g) => gatt_error(g),
        _ => ProcedureError::Failed(0),
    }
}

fn write_error(e: WriteError) -> ProcedureError {
    match e {
        WriteError::Gatt(g) => gatt_error(g),
        _ => ProcedureError::Failed(0),
    }
}

fn read_error(e: ReadError) -> ProcedureError {
    match e {
        ReadError::Gatt(g) => gatt_error(g),
        _ => ProcedureError::Failed(0),
    }
}

fn value_event(value: PeerValue) -> Option<Event> {
    let (quantity, bytes): (Quantity, &[u8]) = match &value {
        PeerValue::Flex(FlexClientEvent::AngleNotification(v)) => {
            (Quantity::FlexAngle, core::slice::from_ref(v))
        }
        PeerValue::Tilt(TiltClientEvent::CountNotification(v)) => {
            (Quantity::TiltCount, core::slice::from_ref(v))
        }
        PeerValue::Thermometer(ThermometerClientEvent::TemperatureNotification(v)) => {
            (Quantity::Temperature, &v[..])
        }
    };
    let value = Payload::from_slice(bytes).ok()?;
    Some(Event::ValueReceived { quantity, value })
}

async fn run_request(conn: &Connection, clients: &PeerClients, request: LinkRequest) {
    let completed = |result| link::post(Event::ProcedureCompleted(result));
    match request {
        LinkRequest::DiscoverService(q) => {
            let result = clients.discover(conn, q).await;
            if result.is_ok() {
                link::post(Event::ServiceFound(q));
            }
            completed(result);
        }
        LinkRequest::DiscoverCharacteristic(q) => {
            // Characteristics arrive with their service.
            if clients.is_discovered(q) {
                link::post(Event::CharacteristicFound(q));
                completed(Ok(()));
            } else {
                completed(Err(ProcedureError::NotFound));
            }
        }
        LinkRequest::SetSubscription { quantity, enabled } => {
            completed(clients.subscribe(quantity, enabled).await);
        }
        LinkRequest::Read(q) => match clients.read(q).await {
            Ok(value) => link::post(Event::ValueReceived { quantity: q, value }),
            Err(e) => warn!("central: read of {} failed ({})", q, e),
        },
        LinkRequest::ConfirmPasskey => {
            if let Err(e) = security::confirm_passkey(conn) {
                warn!("central: passkey confirmation failed ({})", e);
            }
        }
        LinkRequest::IncreaseSecurity => {
            if let Err(e) = security::increase_security(conn) {
                warn!("central: security request failed ({})", e);
            }
        }
        LinkRequest::DeleteBondings => security::bonder().clear(),
        LinkRequest::AcceptBonding => {}
        other => debug!("central: {} ignored while connected", other),
    }
}

/// Serve one connection until it drops. The indication listener stays
/// up for the whole connection; requests run alongside it one at a time.
async fn serve(conn: Connection) {
    let clients = PeerClients::default();
    let listen = gatt_client::run(&conn, &clients, |value| {
        if let Some(event) = value_event(value) {
            link::post(event);
        }
    });
    let requests = async {
        loop {
            let request = link::REQUESTS.receive().await;
            run_request(&conn, &clients, request).await;
        }
    };
    select(listen, requests).await;
}

/// Scan until a request arrives; every connectable report is posted.
async fn scan(sd: &Softdevice) -> LinkRequest {
    let config = central::ScanConfig {
        interval: SCAN_INTERVAL,
        window: SCAN_WINDOW,
        ..Default::default()
    };
    let scanning = central::scan(sd, &config, |params| {
        let connectable = params.type_.connectable() != 0;
        let address = link::from_address(&nrf_softdevice::ble::Address::from_raw(params.peer_addr));
        if connectable {
            link::post(Event::AdvertisementSeen {
                address,
                connectable,
            });
        }
        None::<()>
    });
    match select(scanning, link::REQUESTS.receive()).await {
        Either::First(_) => {
            warn!("central: scan ended");
            LinkRequest::StopScan
        }
        Either::Second(request) => request,
    }
}

pub async fn central_task(sd: &'static Softdevice) -> ! {
    let mut pending: Option<LinkRequest> = None;
    loop {
        let request = match pending.take() {
            Some(r) => r,
            None => link::REQUESTS.receive().await,
        };

        match request {
            LinkRequest::Scan => {
                info!("central: scanning");
                pending = Some(scan(sd).await);
            }
            LinkRequest::StopScan => debug!("central: scan stopped"),
            LinkRequest::DeleteBondings => security::bonder().clear(),
            LinkRequest::Connect(peer) => {
                let address = link::to_address(peer);
                let whitelist = [&address];
                let config = central::ConnectConfig {
                    scan_config: central::ScanConfig {
                        whitelist: Some(&whitelist),
                        ..Default::default()
                    },
                    conn_params: raw::ble_gap_conn_params_t {
                        min_conn_interval: CONN_INTERVAL_MIN,
                        max_conn_interval: CONN_INTERVAL_MAX,
                        slave_latency: SLAVE_LATENCY,
                        conn_sup_timeout: SUP_TIMEOUT,
                    },
                    ..Default::default()
                };
                let conn = match central::connect_with_security(sd, &config, security::bonder()).await {
                    Ok(conn) => conn,
                    Err(e) => {
                        warn!("central: connect failed ({})", e);
                        link::closed();
                        continue;
                    }
                };
                link::opened(&conn);
                serve(conn).await;
                info!("central: disconnected");
                link::closed();
            }
            other => debug!("central: {} ignored while idle", other),
        }
    }
}
