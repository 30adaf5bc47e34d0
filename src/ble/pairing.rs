//! Pairing / authorization lifecycle.
//!
//! ```text
//!  Unbonded ──boot──► Advertising ──opened──► ConnectedUnbonded
//!                         ▲                      │ passkey
//!                         │                      ▼
//!                         │              AwaitingConfirmation ── A pressed ─► confirm
//!                         │                 │ bonded      │ failed
//!                         │                 ▼             ▼
//!                         └──── closed ── Bonded    BondingFailed
//! ```
//!
//! CCCD writes that arrive while the passkey is on screen are held and
//! applied when the link bonds.
//!
//! "Advertising" means advertising in the sensor role and scanning in
//! the peer role. Every close returns there, optionally after forgetting
//! all bonds so the next connection pairs afresh.

use super::{PeerAddress, Session};
use crate::action::{self, Action, Actions};
use crate::config::{NodeConfig, Role};
use crate::delivery::Quantity;
use crate::events::Passkey;
use crate::ui::{line_fmt, Row};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PairingState {
    Unbonded,
    /// Advertising (sensor role) or scanning (peer role).
    Advertising,
    ConnectedUnbonded,
    AwaitingConfirmation,
    Bonded,
    BondingFailed,
}

pub struct Pairing {
    state: PairingState,
    session: Session,
    role: Role,
    peer_filter: PeerAddress,
    fresh_bonding: bool,
    /// A passkey is on screen and button A has not confirmed it yet.
    confirmation_pending: bool,
    /// CCCD writes received while pairing, applied once bonded.
    deferred: [Option<bool>; Quantity::COUNT],
}

impl Pairing {
    pub fn new(config: &NodeConfig) -> Self {
        Self {
            state: PairingState::Unbonded,
            session: Session::default(),
            role: config.role,
            peer_filter: config.peer_address,
            fresh_bonding: config.fresh_bonding,
            confirmation_pending: false,
            deferred: [None; Quantity::COUNT],
        }
    }

    pub fn state(&self) -> PairingState {
        self.state
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    fn set_state(&mut self, next: PairingState) {
        if self.state != next {
            debug!("pairing: {} -> {}", self.state, next);
            self.state = next;
        }
    }

    fn seek(&mut self, out: &mut Actions) {
        if self.fresh_bonding {
            action::push(out, Action::DeleteBondings);
        }
        match self.role {
            Role::Sensor => {
                action::push(out, Action::StartAdvertising);
                action::render(out, Row::Status, "Advertising");
            }
            Role::Peer => {
                action::push(out, Action::StartScanning);
                action::render(out, Row::Status, "Discovering");
            }
        }
        self.set_state(PairingState::Advertising);
    }

    pub fn on_boot(&mut self, out: &mut Actions) {
        info!("pairing: boot as {}", self.role);
        self.seek(out);
    }

    /// Scan report (peer role). Connects to the configured address only.
    pub fn on_advertisement(&mut self, address: PeerAddress, connectable: bool, out: &mut Actions) {
        if self.role != Role::Peer || self.state != PairingState::Advertising {
            return;
        }
        if address != self.peer_filter || !connectable {
            trace!("pairing: ignoring advertiser {}", address);
            return;
        }
        info!("pairing: found sensor node, connecting");
        action::push(out, Action::StopScanning);
        action::push(out, Action::Connect(address));
    }

    pub fn on_connection_opened(&mut self, peer: PeerAddress, out: &mut Actions) {
        info!("pairing: connection opened to {}", peer);
        self.session = Session::open(peer);
        self.confirmation_pending = false;
        self.deferred = [None; Quantity::COUNT];
        self.set_state(PairingState::ConnectedUnbonded);
        action::render(out, Row::Status, "Connected");
    }

    pub fn on_passkey(&mut self, passkey: Passkey, out: &mut Actions) {
        if !self.session.connection_open {
            warn!("pairing: passkey without a connection");
            return;
        }
        self.confirmation_pending = true;
        self.set_state(PairingState::AwaitingConfirmation);
        action::push(
            out,
            Action::Render(Row::Passkey, line_fmt(format_args!("Passkey {:06}", passkey.0))),
        );
        action::render(out, Row::Prompt, "Confirm with PB0");
    }

    /// Button A. Returns true when the press confirmed a passkey.
    pub fn on_button_a(&mut self, out: &mut Actions) -> bool {
        if self.state != PairingState::AwaitingConfirmation || !self.confirmation_pending {
            return false;
        }
        info!("pairing: passkey confirmed");
        self.confirmation_pending = false;
        action::push(out, Action::ConfirmPasskey);
        action::render(out, Row::Prompt, "");
        true
    }

    pub fn on_bonding_requested(&mut self, out: &mut Actions) {
        action::push(out, Action::AcceptBonding);
    }

    pub fn on_bonded(&mut self, out: &mut Actions) {
        if !self.session.connection_open {
            warn!("pairing: bonded without a connection");
            return;
        }
        self.session.bonded = true;
        self.confirmation_pending = false;
        self.set_state(PairingState::Bonded);
        for quantity in Quantity::ALL {
            if let Some(enabled) = self.deferred[quantity.index()].take() {
                info!("pairing: {} indications {} after bonding", quantity, enabled);
                self.session.set_subscribed(quantity, enabled);
            }
        }
        action::render(out, Row::Status, "Bonded");
        action::render(out, Row::Passkey, "");
        action::render(out, Row::Prompt, "");
    }

    pub fn on_bonding_failed(&mut self, out: &mut Actions) {
        warn!("pairing: bonding failed");
        self.session.bonded = false;
        self.confirmation_pending = false;
        self.deferred = [None; Quantity::COUNT];
        self.set_state(PairingState::BondingFailed);
        action::render(out, Row::Status, "Bonding Failed");
        action::render(out, Row::Passkey, "");
        action::render(out, Row::Prompt, "");
    }

    /// Peer wrote a CCCD. Accepted only while connected unbonded or
    /// bonded; a write that arrives while the passkey awaits confirmation
    /// takes effect on bonding. Returns whether the flag changed now.
    pub fn on_subscription(&mut self, quantity: Quantity, enabled: bool) -> bool {
        if self.state == PairingState::AwaitingConfirmation {
            debug!("pairing: {} subscription held until bonded", quantity);
            self.deferred[quantity.index()] = Some(enabled);
            return false;
        }
        if !matches!(
            self.state,
            PairingState::ConnectedUnbonded | PairingState::Bonded
        ) {
            debug!("pairing: subscription change ignored in {}", self.state);
            return false;
        }
        if self.session.is_subscribed(quantity) == enabled {
            return false;
        }
        info!("pairing: {} indications {}", quantity, enabled);
        self.session.set_subscribed(quantity, enabled);
        true
    }

    pub fn on_connection_closed(&mut self, out: &mut Actions) {
        info!("pairing: connection closed");
        self.session = Session::default();
        self.confirmation_pending = false;
        self.deferred = [None; Quantity::COUNT];
        action::render(out, Row::Passkey, "");
        action::render(out, Row::Prompt, "");
        self.seek(out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PEER: PeerAddress = PeerAddress::public([0xC5, 0x6A, 0x2B, 0x57, 0x0B, 0x00]);

    fn sensor() -> Pairing {
        Pairing::new(&NodeConfig::for_role(Role::Sensor))
    }

    fn has(out: &Actions, action: &Action) -> bool {
        out.iter().any(|a| a == action)
    }

    #[test]
    fn boot_forgets_bonds_and_advertises() {
        let mut p = sensor();
        let mut out = Actions::new();
        p.on_boot(&mut out);
        assert_eq!(p.state(), PairingState::Advertising);
        assert_eq!(out[0], Action::DeleteBondings);
        assert!(has(&out, &Action::StartAdvertising));
    }

    #[test]
    fn boot_keeps_bonds_without_fresh_bonding() {
        let mut config = NodeConfig::for_role(Role::Sensor);
        config.fresh_bonding = false;
        let mut p = Pairing::new(&config);
        let mut out = Actions::new();
        p.on_boot(&mut out);
        assert!(!has(&out, &Action::DeleteBondings));
    }

    #[test]
    fn passkey_flow_reaches_bonded() {
        let mut p = sensor();
        let mut out = Actions::new();
        p.on_boot(&mut out);
        p.on_connection_opened(PEER, &mut out);
        assert_eq!(p.state(), PairingState::ConnectedUnbonded);

        out.clear();
        p.on_passkey(Passkey(123_456), &mut out);
        assert_eq!(p.state(), PairingState::AwaitingConfirmation);
        assert!(out.iter().any(|a| matches!(
            a,
            Action::Render(Row::Passkey, text) if text.as_str() == "Passkey 123456"
        )));

        out.clear();
        assert!(p.on_button_a(&mut out));
        assert!(has(&out, &Action::ConfirmPasskey));
        // A second press does not confirm again.
        assert!(!p.on_button_a(&mut out));

        p.on_bonded(&mut out);
        assert_eq!(p.state(), PairingState::Bonded);
        assert!(p.session().bonded);
    }

    #[test]
    fn button_a_outside_confirmation_is_not_consumed() {
        let mut p = sensor();
        let mut out = Actions::new();
        p.on_boot(&mut out);
        p.on_connection_opened(PEER, &mut out);
        out.clear();
        assert!(!p.on_button_a(&mut out));
        assert!(out.is_empty());
    }

    #[test]
    fn bonding_failure_then_close_returns_to_advertising() {
        let mut p = sensor();
        let mut out = Actions::new();
        p.on_boot(&mut out);
        p.on_connection_opened(PEER, &mut out);
        p.on_passkey(Passkey(1), &mut out);
        p.on_bonding_failed(&mut out);
        assert_eq!(p.state(), PairingState::BondingFailed);
        assert!(!p.session().bonded);

        out.clear();
        p.on_connection_closed(&mut out);
        assert_eq!(p.state(), PairingState::Advertising);
        assert!(has(&out, &Action::DeleteBondings));
        assert!(has(&out, &Action::StartAdvertising));
        assert!(!p.session().connection_open);
    }

    #[test]
    fn subscription_only_accepted_while_connected() {
        let mut p = sensor();
        let mut out = Actions::new();
        p.on_boot(&mut out);
        assert!(!p.on_subscription(Quantity::FlexAngle, true));

        p.on_connection_opened(PEER, &mut out);
        assert!(p.on_subscription(Quantity::FlexAngle, true));
        assert!(!p.on_subscription(Quantity::FlexAngle, true));

        p.on_passkey(Passkey(1), &mut out);
        assert!(!p.on_subscription(Quantity::TiltCount, true));
        assert!(!p.session().is_subscribed(Quantity::TiltCount));

        p.on_bonded(&mut out);
        assert!(p.on_subscription(Quantity::Temperature, true));
        assert!(p.session().may_transmit(Quantity::FlexAngle));
        assert!(p.session().may_transmit(Quantity::TiltCount));
        assert!(p.session().may_transmit(Quantity::Temperature));
    }

    #[test]
    fn writes_during_confirmation_apply_on_bonding() {
        let mut p = sensor();
        let mut out = Actions::new();
        p.on_boot(&mut out);
        p.on_connection_opened(PEER, &mut out);
        p.on_passkey(Passkey(7), &mut out);
        p.on_subscription(Quantity::FlexAngle, true);
        p.on_subscription(Quantity::ButtonState, true);
        p.on_subscription(Quantity::ButtonState, false);
        p.on_button_a(&mut out);

        p.on_bonded(&mut out);
        assert!(p.session().may_transmit(Quantity::FlexAngle));
        assert!(!p.session().is_subscribed(Quantity::ButtonState));
    }

    #[test]
    fn writes_during_failed_pairing_are_forgotten() {
        let mut p = sensor();
        let mut out = Actions::new();
        p.on_boot(&mut out);
        p.on_connection_opened(PEER, &mut out);
        p.on_passkey(Passkey(7), &mut out);
        p.on_subscription(Quantity::FlexAngle, true);
        p.on_bonding_failed(&mut out);
        p.on_connection_closed(&mut out);

        p.on_connection_opened(PEER, &mut out);
        p.on_passkey(Passkey(8), &mut out);
        p.on_bonded(&mut out);
        assert!(!p.session().is_subscribed(Quantity::FlexAngle));
    }

    #[test]
    fn close_clears_subscriptions() {
        let mut p = sensor();
        let mut out = Actions::new();
        p.on_boot(&mut out);
        p.on_connection_opened(PEER, &mut out);
        p.on_subscription(Quantity::Temperature, true);
        p.on_connection_closed(&mut out);
        assert!(!p.session().is_subscribed(Quantity::Temperature));
    }

    #[test]
    fn peer_role_scans_and_filters_advertisers() {
        let mut p = Pairing::new(&NodeConfig::for_role(Role::Peer));
        let mut out = Actions::new();
        p.on_boot(&mut out);
        assert!(has(&out, &Action::StartScanning));

        out.clear();
        let stranger = PeerAddress::public([1, 1, 1, 1, 1, 1]);
        p.on_advertisement(stranger, true, &mut out);
        p.on_advertisement(PEER, false, &mut out);
        assert!(out.is_empty());

        p.on_advertisement(PEER, true, &mut out);
        assert_eq!(out.as_slice(), &[Action::StopScanning, Action::Connect(PEER)]);
    }

    #[test]
    fn sensor_role_ignores_advertisements() {
        let mut p = sensor();
        let mut out = Actions::new();
        p.on_boot(&mut out);
        out.clear();
        p.on_advertisement(PEER, true, &mut out);
        assert!(out.is_empty());
    }
}
