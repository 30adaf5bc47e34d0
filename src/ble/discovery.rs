//! Peer-role attribute discovery.
//!
//! For each quantity in the plan the walk runs
//! `DiscoverService → DiscoverCharacteristic → EnableSubscription`, then
//! moves to the next quantity and finally rests in `SteadyState`.
//!
//! Exactly one request is outstanding at a time. The cursor moves one
//! stage per successful procedure-completed, and the request for the new
//! stage is issued in the same step. A close rewinds the walk to the
//! first stage.
//!
//! Failures:
//! - insufficient encryption asks the link to raise security and re-issues
//!   the same request once bonded;
//! - anything else re-issues the same request up to
//!   [`DISCOVERY_RETRY_LIMIT`] times, then the walk parks until the next
//!   connection.

use crate::action::{self, Action, Actions};
use crate::config::DISCOVERY_RETRY_LIMIT;
use crate::delivery::Quantity;
use crate::events::ProcedureError;

/// Where the walk is, as seen from outside.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DiscoveryStage {
    DiscoverService(Quantity),
    DiscoverCharacteristic(Quantity),
    EnableSubscription(Quantity),
    SteadyState,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
enum Step {
    Service,
    Characteristic,
    Subscription,
}

/// What the walk is waiting for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum WalkStatus {
    /// No connection yet, or the connection closed.
    NotStarted,
    /// A request is outstanding.
    Awaiting,
    /// Security upgrade requested; the current request is re-issued on bond.
    AwaitingSecurity,
    /// Retries exhausted; waiting for a reconnect.
    Parked,
    /// All quantities subscribed.
    Done,
}

pub struct Discovery {
    plan: &'static [Quantity],
    index: usize,
    step: Step,
    status: WalkStatus,
    /// The matching service/characteristic was reported for this step.
    found: bool,
    retries: u8,
    /// Value written to each CCCD.
    indications: bool,
    ready: [bool; Quantity::COUNT],
}

impl Discovery {
    pub fn new(plan: &'static [Quantity]) -> Self {
        Self {
            plan,
            index: 0,
            step: Step::Service,
            status: WalkStatus::NotStarted,
            found: false,
            retries: 0,
            indications: true,
            ready: [false; Quantity::COUNT],
        }
    }

    pub fn stage(&self) -> DiscoveryStage {
        match self.plan.get(self.index) {
            None => DiscoveryStage::SteadyState,
            Some(&q) => match self.step {
                Step::Service => DiscoveryStage::DiscoverService(q),
                Step::Characteristic => DiscoveryStage::DiscoverCharacteristic(q),
                Step::Subscription => DiscoveryStage::EnableSubscription(q),
            },
        }
    }

    pub fn status(&self) -> WalkStatus {
        self.status
    }

    /// Quantities whose characteristic handle is known, so they can be read.
    pub fn readable(&self) -> impl Iterator<Item = Quantity> + '_ {
        self.plan.iter().copied().filter(|q| self.ready[q.index()])
    }

    fn issue(&self, out: &mut Actions) {
        let request = match self.stage() {
            DiscoveryStage::DiscoverService(q) => Action::DiscoverService(q),
            DiscoveryStage::DiscoverCharacteristic(q) => Action::DiscoverCharacteristic(q),
            DiscoveryStage::EnableSubscription(q) => Action::SetSubscription {
                quantity: q,
                enabled: self.indications,
            },
            DiscoveryStage::SteadyState => return,
        };
        trace!("discovery: issuing {}", request);
        action::push(out, request);
    }

    /// Connection opened: begin the walk at the first stage.
    pub fn start(&mut self, out: &mut Actions) {
        self.rewind();
        if self.plan.is_empty() {
            self.status = WalkStatus::Done;
            return;
        }
        self.status = WalkStatus::Awaiting;
        self.issue(out);
    }

    /// A discovered service matched `quantity`.
    pub fn on_service_found(&mut self, quantity: Quantity) {
        if self.stage() == DiscoveryStage::DiscoverService(quantity) {
            self.found = true;
        }
    }

    /// A discovered characteristic matched `quantity`.
    pub fn on_characteristic_found(&mut self, quantity: Quantity) {
        if self.stage() == DiscoveryStage::DiscoverCharacteristic(quantity) {
            self.found = true;
        }
    }

    pub fn on_procedure_completed(
        &mut self,
        result: Result<(), ProcedureError>,
        out: &mut Actions,
    ) {
        if self.status != WalkStatus::Awaiting {
            trace!("discovery: completion ignored while {}", self.status);
            return;
        }

        let result = match (result, self.step) {
            (Ok(()), Step::Service | Step::Characteristic) if !self.found => {
                Err(ProcedureError::NotFound)
            }
            (r, _) => r,
        };

        match result {
            Ok(()) => self.advance(out),
            Err(ProcedureError::InsufficientEncryption) => {
                info!("discovery: link not encrypted, raising security");
                self.status = WalkStatus::AwaitingSecurity;
                action::push(out, Action::IncreaseSecurity);
            }
            Err(e) => {
                self.retries += 1;
                if self.retries <= DISCOVERY_RETRY_LIMIT {
                    warn!(
                        "discovery: {} failed ({}), retry {}",
                        self.stage(),
                        e,
                        self.retries
                    );
                    self.found = false;
                    self.issue(out);
                } else {
                    warn!("discovery: {} failed ({}), parking until reconnect", self.stage(), e);
                    self.status = WalkStatus::Parked;
                }
            }
        }
    }

    fn advance(&mut self, out: &mut Actions) {
        let finished = self.stage();
        self.found = false;
        self.retries = 0;
        match self.step {
            Step::Service => self.step = Step::Characteristic,
            Step::Characteristic => {
                if let Some(q) = self.plan.get(self.index) {
                    self.ready[q.index()] = true;
                }
                self.step = Step::Subscription;
            }
            Step::Subscription => {
                self.index += 1;
                self.step = Step::Service;
            }
        }
        debug!("discovery: {} done, now {}", finished, self.stage());

        if self.stage() == DiscoveryStage::SteadyState {
            info!("discovery: complete");
            self.status = WalkStatus::Done;
        } else {
            self.issue(out);
        }
    }

    /// The link became bonded.
    pub fn on_bonded(&mut self, out: &mut Actions) {
        if self.status == WalkStatus::AwaitingSecurity {
            self.status = WalkStatus::Awaiting;
            self.found = false;
            self.issue(out);
        }
    }

    /// Record the indication mode; in steady state apply it to every
    /// subscribed quantity right away.
    pub fn set_indications(&mut self, enabled: bool, out: &mut Actions) {
        self.indications = enabled;
        if self.status == WalkStatus::Done {
            for &quantity in self.plan {
                action::push(out, Action::SetSubscription { quantity, enabled });
            }
        }
    }

    pub fn on_connection_closed(&mut self) {
        self.rewind();
    }

    fn rewind(&mut self) {
        self.index = 0;
        self.step = Step::Service;
        self.status = WalkStatus::NotStarted;
        self.found = false;
        self.retries = 0;
        self.ready = [false; Quantity::COUNT];
    }
}
