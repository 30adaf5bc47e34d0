//! Shared link plumbing between the dispatch task and the SoftDevice tasks.
//!
//! - [`REQUESTS`] carries link actions from the control plane to whichever
//!   role task (server or central) owns the radio.
//! - [`CONNECTION`] holds the open connection so the platform can indicate
//!   reports without waiting on the role task.
//! - [`opened`] and [`closed`] both travel as signal bits, so one fetched
//!   batch always sees them in connection order.
//! - [`ack_watchdog_task`] raises `SendTimeout` when an indication is not
//!   confirmed in time.

use core::cell::{Cell, RefCell};

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::channel::Channel;
use embassy_sync::signal::Signal as SyncSignal;
use embassy_time::{with_timeout, Duration};
use nrf_softdevice::ble::{Address, AddressType, Connection};

use super::{AddressKind, PeerAddress};
use crate::action::Action;
use crate::config::INDICATION_TIMEOUT_SECS;
use crate::delivery::Quantity;
use crate::events::{Event, Signal};
use crate::AGGREGATOR;

/// Radio work requested by the control plane.
#[derive(Clone, Copy, Debug, PartialEq, Eq, defmt::Format)]
pub enum LinkRequest {
    Advertise,
    Scan,
    StopScan,
    Connect(PeerAddress),
    DeleteBondings,
    ConfirmPasskey,
    AcceptBonding,
    IncreaseSecurity,
    DiscoverService(Quantity),
    DiscoverCharacteristic(Quantity),
    SetSubscription { quantity: Quantity, enabled: bool },
    Read(Quantity),
}

impl LinkRequest {
    /// The radio request behind `action`, if it is one.
    pub fn from_action(action: &Action) -> Option<Self> {
        let request = match *action {
            Action::StartAdvertising => LinkRequest::Advertise,
            Action::StartScanning => LinkRequest::Scan,
            Action::StopScanning => LinkRequest::StopScan,
            Action::Connect(address) => LinkRequest::Connect(address),
            Action::DeleteBondings => LinkRequest::DeleteBondings,
            Action::ConfirmPasskey => LinkRequest::ConfirmPasskey,
            Action::AcceptBonding => LinkRequest::AcceptBonding,
            Action::IncreaseSecurity => LinkRequest::IncreaseSecurity,
            Action::DiscoverService(q) => LinkRequest::DiscoverService(q),
            Action::DiscoverCharacteristic(q) => LinkRequest::DiscoverCharacteristic(q),
            Action::SetSubscription { quantity, enabled } => {
                LinkRequest::SetSubscription { quantity, enabled }
            }
            Action::ReadValue(q) => LinkRequest::Read(q),
            _ => return None,
        };
        Some(request)
    }
}

/// Link requests, consumed by the active role task.
pub static REQUESTS: Channel<CriticalSectionRawMutex, LinkRequest, 8> = Channel::new();

/// Payload events from the SoftDevice tasks to the dispatch task.
pub static EVENTS: Channel<CriticalSectionRawMutex, Event, 8> = Channel::new();

/// The open connection, if any.
pub static CONNECTION: Mutex<CriticalSectionRawMutex, RefCell<Option<Connection>>> =
    Mutex::new(RefCell::new(None));

/// Address of the last connection opened. Kept after the close so a
/// batch holding both signals can still name the peer.
static PEER: Mutex<CriticalSectionRawMutex, Cell<Option<PeerAddress>>> =
    Mutex::new(Cell::new(None));

pub fn set_connection(conn: Option<Connection>) {
    CONNECTION.lock(|c| *c.borrow_mut() = conn);
}

pub fn connection() -> Option<Connection> {
    CONNECTION.lock(|c| c.borrow().clone())
}

pub fn peer() -> Option<PeerAddress> {
    PEER.lock(|p| p.get())
}

/// Connection established: publish it and let the control plane know.
pub fn opened(conn: &Connection) {
    let peer = from_address(&conn.peer_address());
    PEER.lock(|p| p.set(Some(peer)));
    set_connection(Some(conn.clone()));
    AGGREGATOR.raise(Signal::ConnectionOpened);
}

/// Post an event from a synchronous SoftDevice callback.
pub fn post(event: Event) {
    if EVENTS.try_send(event).is_err() {
        warn!("link: event channel full, dropping event");
    }
}

/// Connection ended: forget it and let the control plane reset.
pub fn closed() {
    set_connection(None);
    WATCHDOG.signal(Watch::Disarm);
    AGGREGATOR.raise(Signal::ConnectionClosed);
}

pub fn to_address(peer: PeerAddress) -> Address {
    let kind = match peer.kind {
        AddressKind::Public => AddressType::Public,
        AddressKind::RandomStatic => AddressType::RandomStatic,
    };
    Address::new(kind, peer.bytes)
}

pub fn from_address(address: &Address) -> PeerAddress {
    let kind = match address.address_type() {
        AddressType::Public => AddressKind::Public,
        _ => AddressKind::RandomStatic,
    };
    PeerAddress {
        kind,
        bytes: address.bytes(),
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Indication watchdog
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Clone, Copy, defmt::Format)]
pub enum Watch {
    Arm,
    Disarm,
}

static WATCHDOG: SyncSignal<CriticalSectionRawMutex, Watch> = SyncSignal::new();

/// An indication went out; start waiting for its confirmation.
pub fn arm() {
    WATCHDOG.signal(Watch::Arm);
}

/// The confirmation arrived.
pub fn acknowledged() {
    WATCHDOG.signal(Watch::Disarm);
    AGGREGATOR.raise(Signal::Acknowledged);
}

/// Raise `SendTimeout` when an armed indication stays unconfirmed for
/// [`INDICATION_TIMEOUT_SECS`].
pub async fn ack_watchdog_task() -> ! {
    let window = Duration::from_secs(INDICATION_TIMEOUT_SECS);
    loop {
        if let Watch::Disarm = WATCHDOG.wait().await {
            continue;
        }
        // Re-arming restarts the window, disarming ends it.
        loop {
            match with_timeout(window, WATCHDOG.wait()).await {
                Ok(Watch::Arm) => continue,
                Ok(Watch::Disarm) => break,
                Err(_) => {
                    warn!("link: indication not confirmed in {} s", INDICATION_TIMEOUT_SECS);
                    AGGREGATOR.raise(Signal::SendTimeout);
                    break;
                }
            }
        }
    }
}
