//! Pairing security: passkey display, bonding and the bond table.
//!
//! Both roles pair with display/yes-no capabilities. The passkey is handed
//! to the control plane for display; the user's confirmation comes back as
//! a [`LinkRequest::ConfirmPasskey`](super::link::LinkRequest) and is
//! answered on the live connection.

use core::cell::RefCell;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;
use heapless::Vec;
use nrf_softdevice::ble::security::{IoCapabilities, SecurityHandler};
use nrf_softdevice::ble::{
    Connection, EncryptError, EncryptionInfo, IdentityKey, MasterId, SecurityMode,
};
use nrf_softdevice::raw;

use super::link;
use crate::error::LinkError;
use crate::events::{Event, Passkey, Signal};
use crate::AGGREGATOR;

/// Bonds kept in RAM. Fresh-bonding nodes clear them on every close.
const MAX_BONDS: usize = 4;

struct PeerBond {
    master_id: MasterId,
    key: EncryptionInfo,
    peer_id: IdentityKey,
}

/// Bond table shared by the SoftDevice callbacks and the role tasks.
pub struct Bonder {
    peers: Mutex<CriticalSectionRawMutex, RefCell<Vec<PeerBond, MAX_BONDS>>>,
}

impl Bonder {
    const fn new() -> Self {
        Self {
            peers: Mutex::new(RefCell::new(Vec::new())),
        }
    }

    /// Forget every bond.
    pub fn clear(&self) {
        let dropped = self.peers.lock(|p| {
            let mut peers = p.borrow_mut();
            let n = peers.len();
            peers.clear();
            n
        });
        debug!("security: {} bonds deleted", dropped);
    }
}

impl SecurityHandler for Bonder {
    fn io_capabilities(&self) -> IoCapabilities {
        IoCapabilities::DisplayYesNo
    }

    fn can_bond(&self, _conn: &Connection) -> bool {
        link::post(Event::BondingRequested);
        true
    }

    fn display_passkey(&self, passkey: &[u8; 6]) {
        match Passkey::from_ascii(passkey) {
            Some(key) => link::post(Event::PasskeyDisplay(key)),
            None => warn!("security: malformed passkey"),
        }
    }

    fn on_bonded(
        &self,
        _conn: &Connection,
        master_id: MasterId,
        key: EncryptionInfo,
        peer_id: IdentityKey,
    ) {
        self.peers.lock(|p| {
            let mut peers = p.borrow_mut();
            if let Some(existing) = peers.iter_mut().find(|p| p.master_id == master_id) {
                existing.key = key;
                existing.peer_id = peer_id;
            } else {
                if peers.is_full() {
                    peers.remove(0);
                }
                let _ = peers.push(PeerBond {
                    master_id,
                    key,
                    peer_id,
                });
            }
        });
        info!("security: bonded");
        AGGREGATOR.raise(Signal::Bonded);
    }

    fn get_key(&self, _conn: &Connection, master_id: MasterId) -> Option<EncryptionInfo> {
        self.peers.lock(|p| {
            p.borrow()
                .iter()
                .find_map(|p| (p.master_id == master_id).then_some(p.key))
        })
    }

    fn get_peripheral_key(&self, conn: &Connection) -> Option<(MasterId, EncryptionInfo)> {
        self.peers.lock(|p| {
            p.borrow().iter().find_map(|p| {
                p.peer_id
                    .is_match(conn.peer_address())
                    .then_some((p.master_id, p.key))
            })
        })
    }

    fn on_security_update(&self, _conn: &Connection, mode: SecurityMode) {
        info!("security: mode now {}", mode);
        if let SecurityMode::NoAccess | SecurityMode::Open = mode {
            AGGREGATOR.raise(Signal::BondingFailed);
        }
    }
}

static BONDER: Bonder = Bonder::new();

/// The node's only bond table.
pub fn bonder() -> &'static Bonder {
    &BONDER
}

/// Accept the numeric comparison shown on both screens.
pub fn confirm_passkey(conn: &Connection) -> Result<(), LinkError> {
    let handle = conn.handle().ok_or(LinkError::NotConnected)?;
    // SAFETY: a null key accepts the pending comparison on `handle`.
    let ret = unsafe {
        raw::sd_ble_gap_auth_key_reply(
            handle,
            raw::BLE_GAP_AUTH_KEY_TYPE_PASSKEY as u8,
            core::ptr::null(),
        )
    };
    match ret {
        0 => Ok(()),
        err => Err(LinkError::Raw(err)),
    }
}

/// Encrypt with a stored key, or start pairing when there is none.
pub fn increase_security(conn: &Connection) -> Result<(), LinkError> {
    match conn.encrypt() {
        Ok(()) => Ok(()),
        Err(EncryptError::PeerKeysNotFound) => {
            conn.request_pairing().map_err(|_| LinkError::NotPermitted)
        }
        Err(EncryptError::Disconnected) => Err(LinkError::NotConnected),
        Err(_) => Err(LinkError::Busy),
    }
}
