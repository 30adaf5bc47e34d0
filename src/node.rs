//! The control plane.
//!
//! [`Node`] owns every state machine and the delivery gate. The dispatch
//! task feeds it signal batches ([`Node::dispatch`]) and payload events
//! ([`Node::handle`]); each step routes the input to the machine that owns
//! it, collects the requested effects and executes them through the
//! [`Platform`].
//!
//! Role split:
//! - **Sensor** - acquisition cycle, posture tracking and report delivery.
//! - **Peer** - attribute discovery, value display and the indication
//!   gesture.
//!
//! Pairing and connection-closed handling are shared.

use crate::action::{self, Action, Actions};
use crate::ble::discovery::{Discovery, DiscoveryStage, WalkStatus};
use crate::ble::pairing::{Pairing, PairingState};
use crate::ble::{PeerAddress, Session};
use crate::config::{NodeConfig, Role, DEVICE_NAME, QUEUE_CAPACITY};
use crate::delivery::gate::{GateState, InFlightGate, ReportLink};
use crate::delivery::payload::Measurement;
use crate::delivery::queue::QueueStatus;
use crate::delivery::{Quantity, ReportEntry};
use crate::error::{Error, LinkError};
use crate::events::{Event, Signal, SignalSet};
use crate::sensor::acquisition::{Acquisition, AcquisitionState};
use crate::sensor::posture::{FlexAngle, Posture, PostureTracker};
use crate::sensor::si7021;
use crate::ui::gesture::{ButtonEdge, GestureSequencer, GestureStage};
use crate::ui::{line_fmt, Line, Row};

/// Hardware and stack operations the control plane relies on.
pub trait Platform {
    /// Hand one report to the link. Must not block; the confirmation
    /// arrives later as `Signal::Acknowledged`.
    fn transmit(&mut self, entry: &ReportEntry) -> Result<(), LinkError>;

    /// Carry out a side effect. Completions come back as signals or events.
    fn perform(&mut self, action: Action) -> Result<(), Error>;

    /// Result code of the last completed sensor read, if any.
    fn sensor_code(&mut self) -> Option<u16>;

    /// Address of the most recently opened connection.
    fn connected_peer(&mut self) -> Option<PeerAddress>;
}

/// Link view handed to the gate: refuses to send unless the session
/// allows reports for the entry's quantity.
struct GatedLink<'a, P> {
    platform: &'a mut P,
    session: &'a Session,
}

impl<P: Platform> ReportLink for GatedLink<'_, P> {
    fn transmit(&mut self, entry: &ReportEntry) -> Result<(), LinkError> {
        if !self.session.connection_open {
            return Err(LinkError::NotConnected);
        }
        let permitted =
            Quantity::from_attribute(entry.target).is_some_and(|q| self.session.may_transmit(q));
        if !permitted {
            return Err(LinkError::NotPermitted);
        }
        self.platform.transmit(entry)
    }
}

pub struct Node<P> {
    config: NodeConfig,
    platform: P,
    pairing: Pairing,
    discovery: Discovery,
    acquisition: Acquisition,
    gesture: GestureSequencer,
    posture: PostureTracker,
    gate: InFlightGate<QUEUE_CAPACITY>,
    /// Button A is down; button B then starts a gesture instead of a read.
    button_a_held: bool,
}

impl<P: Platform> Node<P> {
    pub fn new(config: NodeConfig, platform: P) -> Self {
        Self {
            pairing: Pairing::new(&config),
            discovery: Discovery::new(config.discovery_plan),
            acquisition: Acquisition::new(),
            gesture: GestureSequencer::new(),
            posture: PostureTracker::new(),
            gate: InFlightGate::new(config.slot_policy, config.retry_policy),
            button_a_held: false,
            config,
            platform,
        }
    }

    // ═══════════════════════════════════════════════════════════════════
    // Inspection
    // ═══════════════════════════════════════════════════════════════════

    pub fn role(&self) -> Role {
        self.config.role
    }

    pub fn platform(&self) -> &P {
        &self.platform
    }

    pub fn platform_mut(&mut self) -> &mut P {
        &mut self.platform
    }

    pub fn pairing_state(&self) -> PairingState {
        self.pairing.state()
    }

    pub fn session(&self) -> &Session {
        self.pairing.session()
    }

    pub fn gate_state(&self) -> GateState {
        self.gate.state()
    }

    pub fn queue_depth(&self) -> usize {
        self.gate.depth()
    }

    pub fn queue_status(&self) -> QueueStatus {
        self.gate.queue_status()
    }

    pub fn discovery_stage(&self) -> DiscoveryStage {
        self.discovery.stage()
    }

    pub fn discovery_status(&self) -> WalkStatus {
        self.discovery.status()
    }

    pub fn acquisition_state(&self) -> AcquisitionState {
        self.acquisition.state()
    }

    pub fn gesture_stage(&self) -> GestureStage {
        self.gesture.stage()
    }

    /// Indication mode selected with the gesture (peer role).
    pub fn indications_enabled(&self) -> bool {
        self.gesture.mode()
    }

    pub fn tilt_count(&self) -> u8 {
        self.posture.tilt_count()
    }

    // ═══════════════════════════════════════════════════════════════════
    // Dispatch
    // ═══════════════════════════════════════════════════════════════════

    /// Start advertising or scanning.
    pub fn boot(&mut self) {
        self.handle(Event::Booted);
    }

    /// Process one fetched signal batch to completion, in dispatch order.
    pub fn dispatch(&mut self, signals: SignalSet) {
        for signal in signals.iter() {
            self.on_signal(signal);
        }
    }

    pub fn on_signal(&mut self, signal: Signal) {
        let mut out = Actions::new();
        let sensor = self.config.role == Role::Sensor;
        let peer = self.config.role == Role::Peer;

        match signal {
            Signal::ConnectionOpened => match self.platform.connected_peer() {
                Some(address) => {
                    self.pairing.on_connection_opened(address, &mut out);
                    if peer {
                        self.discovery.start(&mut out);
                    }
                }
                None => warn!("node: connection opened without a peer address"),
            },
            Signal::Acknowledged => {
                let mut link = GatedLink {
                    platform: &mut self.platform,
                    session: self.pairing.session(),
                };
                self.gate.on_acknowledged(&mut link);
            }
            Signal::SendTimeout => self.gate.on_send_timeout(),
            Signal::Bonded => {
                self.pairing.on_bonded(&mut out);
                if peer {
                    self.discovery.on_bonded(&mut out);
                }
            }
            Signal::BondingFailed => self.pairing.on_bonding_failed(&mut out),

            Signal::TimerUnderflow if sensor => self.acquisition.on_timer_underflow(&mut out),
            Signal::DelayElapsed if sensor => self.acquisition.on_delay_elapsed(&mut out),
            Signal::TransferDone if sensor => {
                if self.acquisition.on_transfer_done(&mut out) {
                    self.on_temperature_ready(&mut out);
                }
            }
            Signal::BusFault if sensor => self.acquisition.on_bus_fault(&mut out),

            Signal::ButtonAPressed => {
                self.button_a_held = true;
                let confirmed = self.pairing.on_button_a(&mut out);
                if sensor {
                    self.on_button_state(true, &mut out);
                } else if !confirmed {
                    self.on_gesture_edge(ButtonEdge::PressA, &mut out);
                }
            }
            Signal::ButtonBPressed => {
                if peer {
                    if !self.button_a_held {
                        for quantity in self.discovery.readable() {
                            action::push(&mut out, Action::ReadValue(quantity));
                        }
                    }
                    self.on_gesture_edge(ButtonEdge::PressB, &mut out);
                }
            }
            Signal::ButtonBReleased => {
                if peer {
                    self.on_gesture_edge(ButtonEdge::ReleaseB, &mut out);
                }
            }
            Signal::ButtonAReleased => {
                self.button_a_held = false;
                if sensor {
                    self.on_button_state(false, &mut out);
                } else {
                    self.on_gesture_edge(ButtonEdge::ReleaseA, &mut out);
                }
            }

            Signal::FlexLevel0 | Signal::FlexLevel45 | Signal::FlexLevel90 if sensor => {
                if let Some(angle) = FlexAngle::from_signal(signal) {
                    self.on_flex(angle, &mut out);
                }
            }

            Signal::ConnectionClosed => {
                self.pairing.on_connection_closed(&mut out);
                self.gate.on_connection_closed();
                self.discovery.on_connection_closed();
                self.acquisition.abort(&mut out);
                self.gesture.reset();
            }

            _ => trace!("node: {} not handled as {}", signal, self.config.role),
        }

        self.execute(out);
    }

    /// Process one payload event.
    pub fn handle(&mut self, event: Event) {
        let mut out = Actions::new();
        let peer = self.config.role == Role::Peer;

        match event {
            Event::Booted => {
                let role = match self.config.role {
                    Role::Sensor => "sensor",
                    Role::Peer => "peer",
                };
                action::push(
                    &mut out,
                    Action::Render(Row::Name, line_fmt(format_args!("{} {}", DEVICE_NAME, role))),
                );
                self.pairing.on_boot(&mut out);
            }
            Event::AdvertisementSeen {
                address,
                connectable,
            } => self.pairing.on_advertisement(address, connectable, &mut out),
            Event::PasskeyDisplay(passkey) => self.pairing.on_passkey(passkey, &mut out),
            Event::BondingRequested => self.pairing.on_bonding_requested(&mut out),
            Event::SubscriptionChanged { quantity, enabled } => {
                if self.pairing.on_subscription(quantity, enabled) && !enabled {
                    let purged = self.gate.purge(quantity.attribute());
                    if purged > 0 {
                        debug!("node: purged {} queued {} reports", purged, quantity);
                    }
                }
            }
            Event::ServiceFound(quantity) if peer => self.discovery.on_service_found(quantity),
            Event::CharacteristicFound(quantity) if peer => {
                self.discovery.on_characteristic_found(quantity)
            }
            Event::ProcedureCompleted(result) if peer => {
                self.discovery.on_procedure_completed(result, &mut out)
            }
            Event::ValueReceived { quantity, value } if peer => {
                self.on_value_received(quantity, &value, &mut out)
            }
            other => trace!("node: {} not handled as {}", other, self.config.role),
        }

        self.execute(out);
    }

    // ═══════════════════════════════════════════════════════════════════
    // Handlers
    // ═══════════════════════════════════════════════════════════════════

    fn on_temperature_ready(&mut self, out: &mut Actions) {
        let Some(code) = self.platform.sensor_code() else {
            warn!("node: read finished without a result");
            return;
        };
        let milli = si7021::raw_to_millicelsius(code);
        debug!("node: temperature {} milli-degrees C", milli);
        action::push(out, Action::Render(Row::Temperature, temperature_line(milli)));

        let encoded = Measurement::millicelsius(milli).encode();
        match ReportEntry::new(Quantity::Temperature.attribute(), &encoded) {
            Ok(entry) => self.submit(Quantity::Temperature, entry),
            Err(e) => warn!("node: temperature report rejected ({})", e),
        }
    }

    fn on_flex(&mut self, angle: FlexAngle, out: &mut Actions) {
        let count = self.posture.record(angle);
        let degrees = angle.degrees();
        action::push(
            out,
            Action::Render(Row::FlexAngle, line_fmt(format_args!("Flex Angle:{}Deg", degrees))),
        );
        action::push(
            out,
            Action::Render(Row::TiltCount, line_fmt(format_args!("Tilt Count:{}", count))),
        );
        self.submit(Quantity::FlexAngle, ReportEntry::byte(Quantity::FlexAngle, degrees));
        self.submit(Quantity::TiltCount, ReportEntry::byte(Quantity::TiltCount, count));
    }

    /// Button A edge in the sensor role: shown locally, reported once the
    /// link is bonded and the peer subscribed.
    fn on_button_state(&mut self, pressed: bool, out: &mut Actions) {
        action::render(
            out,
            Row::Button,
            if pressed { "Button Pressed" } else { "Button Released" },
        );
        self.submit(
            Quantity::ButtonState,
            ReportEntry::byte(Quantity::ButtonState, u8::from(pressed)),
        );
    }

    fn on_value_received(&mut self, quantity: Quantity, value: &[u8], out: &mut Actions) {
        match quantity {
            Quantity::FlexAngle => {
                let Some(&degrees) = value.first() else { return };
                action::push(
                    out,
                    Action::Render(Row::FlexAngle, line_fmt(format_args!("Flex Angle:{}Deg", degrees))),
                );
                action::render(out, Row::Posture, Posture::from_degrees(degrees).label());
            }
            Quantity::TiltCount => {
                let Some(&count) = value.first() else { return };
                action::push(
                    out,
                    Action::Render(Row::TiltCount, line_fmt(format_args!("Tilt Count:{}", count))),
                );
            }
            Quantity::ButtonState => {
                let Some(&state) = value.first() else { return };
                action::render(
                    out,
                    Row::Button,
                    if state != 0 { "Button Pressed" } else { "Button Released" },
                );
            }
            Quantity::Temperature => {
                let Some(measurement) = Measurement::decode(value) else {
                    warn!("node: short temperature value");
                    return;
                };
                action::push(
                    out,
                    Action::Render(Row::Temperature, temperature_line(measurement.scaled(-3))),
                );
            }
        }
    }

    fn on_gesture_edge(&mut self, edge: ButtonEdge, out: &mut Actions) {
        if let Some(enabled) = self.gesture.on_edge(edge) {
            info!("node: indications {}", enabled);
            action::render(
                out,
                Row::Prompt,
                if enabled { "Indications ON" } else { "Indications OFF" },
            );
            self.discovery.set_indications(enabled, out);
        }
    }

    /// Offer a report to the gate if the peer currently accepts it.
    fn submit(&mut self, quantity: Quantity, entry: ReportEntry) {
        if !self.pairing.session().may_transmit(quantity) {
            trace!("node: {} report dropped, not subscribed", quantity);
            return;
        }
        let mut link = GatedLink {
            platform: &mut self.platform,
            session: self.pairing.session(),
        };
        match self.gate.submit(entry, &mut link) {
            Ok(admission) => trace!("node: {} report {}", quantity, admission),
            Err(e) => warn!("node: {} report dropped ({})", quantity, e),
        }
    }

    fn execute(&mut self, out: Actions) {
        for effect in out {
            if let Err(e) = self.platform.perform(effect) {
                warn!("node: effect failed ({})", e);
            }
        }
    }
}

/// `Temp: 23.4C`, truncated to tenths.
pub fn temperature_line(milli: i32) -> Line {
    let sign = if milli < 0 { "-" } else { "" };
    let abs = milli.unsigned_abs();
    line_fmt(format_args!("Temp: {}{}.{}C", sign, abs / 1_000, (abs % 1_000) / 100))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn temperature_line_positive_and_negative() {
        assert_eq!(temperature_line(23_436).as_str(), "Temp: 23.4C");
        assert_eq!(temperature_line(-2_920).as_str(), "Temp: -2.9C");
        assert_eq!(temperature_line(-450).as_str(), "Temp: -0.4C");
        assert_eq!(temperature_line(0).as_str(), "Temp: 0.0C");
    }
}
