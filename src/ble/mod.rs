//! Bluetooth Low Energy subsystem.
//!
//! The portable part decides *what* the link should do:
//!
//! 1. **Pairing** - advertising/scanning, connect, passkey confirmation and
//!    bonding; owns the [`Session`] that gates report transmission.
//! 2. **Discovery** - peer-role walk over the sensor's services and
//!    characteristics, ending with indications enabled.
//!
//! The embedded part drives the Nordic SoftDevice S140:
//!
//! 3. **Server** - sensor-role GATT server, advertising and indications.
//! 4. **Central** - peer-role scanner, connection and GATT client.
//! 5. **Security** - passkey display/confirmation and bond bookkeeping.
//!
//! SoftDevice callbacks never call into the control plane directly; they
//! raise signals or post events to the dispatch task.

pub mod discovery;
pub mod pairing;

#[cfg(feature = "embedded")]
pub mod central;
#[cfg(feature = "embedded")]
pub mod link;
#[cfg(feature = "embedded")]
pub mod security;
#[cfg(feature = "embedded")]
pub mod server;

use crate::delivery::Quantity;

/// Kind of a 48-bit device address.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AddressKind {
    Public,
    RandomStatic,
}

/// Device address, least significant byte first.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PeerAddress {
    pub kind: AddressKind,
    pub bytes: [u8; 6],
}

impl PeerAddress {
    pub const fn public(bytes: [u8; 6]) -> Self {
        Self {
            kind: AddressKind::Public,
            bytes,
        }
    }
}

/// Per-connection link state.
///
/// Created on connection-opened and reset on connection-closed; the
/// subscription flags only mean something while the connection is open.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Session {
    pub connection_open: bool,
    pub bonded: bool,
    subscribed: [bool; Quantity::COUNT],
    pub peer: Option<PeerAddress>,
}

impl Session {
    pub fn open(peer: PeerAddress) -> Self {
        Self {
            connection_open: true,
            peer: Some(peer),
            ..Self::default()
        }
    }

    pub fn is_subscribed(&self, quantity: Quantity) -> bool {
        self.subscribed[quantity.index()]
    }

    pub(crate) fn set_subscribed(&mut self, quantity: Quantity, enabled: bool) {
        self.subscribed[quantity.index()] = enabled;
    }

    /// A report for `quantity` may be sent only on an open, bonded link
    /// whose peer enabled indications for it.
    pub fn may_transmit(&self, quantity: Quantity) -> bool {
        self.connection_open && self.bonded && self.is_subscribed(quantity)
    }
}
