//! At-most-one-in-flight admission for outbound reports.
//!
//! ```text
//!             submit, queue empty, tx ok
//!   ┌──────┐ ─────────────────────────────► ┌──────────┐
//!   │ Idle │                                │ InFlight │
//!   └──────┘ ◄───────────────────────────── └──────────┘
//!             ack / timeout / close
//! ```
//!
//! A report never overtakes one that is already queued. Each
//! acknowledgment releases the gate and sends the next queued entry in the
//! same step.

use super::queue::{DeliveryQueue, QueueStatus, SlotPolicy};
use super::{AttributeId, ReportEntry};
use crate::error::{Error, LinkError};

/// Synchronous transmit of one report to the connected peer.
pub trait ReportLink {
    fn transmit(&mut self, entry: &ReportEntry) -> Result<(), LinkError>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum GateState {
    Idle,
    InFlight,
}

/// What happens to a dequeued entry whose transmit fails.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RetryPolicy {
    /// Put it back at the head of the queue; it goes out on the next pump.
    #[default]
    Requeue,
    /// Log and drop it.
    Drop,
}

/// Outcome of [`InFlightGate::submit`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Admission {
    /// Transmitted now; the gate is in flight.
    Sent,
    /// Waiting in the queue.
    Queued,
}

pub struct InFlightGate<const N: usize> {
    state: GateState,
    queue: DeliveryQueue<N>,
    retry: RetryPolicy,
}

impl<const N: usize> InFlightGate<N> {
    pub fn new(slots: SlotPolicy, retry: RetryPolicy) -> Self {
        Self {
            state: GateState::Idle,
            queue: DeliveryQueue::new(slots),
            retry,
        }
    }

    pub fn state(&self) -> GateState {
        self.state
    }

    pub fn is_in_flight(&self) -> bool {
        self.state == GateState::InFlight
    }

    pub fn depth(&self) -> usize {
        self.queue.depth()
    }

    pub fn queue_status(&self) -> QueueStatus {
        self.queue.status()
    }

    /// Offer a new report.
    ///
    /// Sent straight away only when nothing is in flight and nothing is
    /// queued; otherwise it joins the tail. A queue left non-empty by an
    /// earlier transmit failure is pumped after the new entry is queued.
    pub fn submit(
        &mut self,
        entry: ReportEntry,
        link: &mut impl ReportLink,
    ) -> Result<Admission, Error> {
        if !entry.is_valid() {
            return Err(Error::InvalidReport);
        }

        if self.state == GateState::Idle && self.queue.is_empty() {
            match link.transmit(&entry) {
                Ok(()) => {
                    self.state = GateState::InFlight;
                    debug!("gate: sent {} now in flight", entry.target);
                    return Ok(Admission::Sent);
                }
                Err(e) => {
                    warn!("gate: transmit failed ({}), queueing", e);
                }
            }
            self.queue.try_enqueue(entry)?;
            return Ok(Admission::Queued);
        }

        self.queue.try_enqueue(entry)?;
        if self.state == GateState::Idle {
            self.pump(link);
        }
        // The entry just queued sits behind at least one other, so it is
        // still waiting even if the pump sent the head.
        Ok(Admission::Queued)
    }

    /// The peer confirmed the report in flight. Sends the next queued
    /// entry, if any; returns whether one went out.
    pub fn on_acknowledged(&mut self, link: &mut impl ReportLink) -> bool {
        if self.state == GateState::Idle {
            debug!("gate: acknowledgment while idle");
        }
        self.state = GateState::Idle;
        self.pump(link)
    }

    /// The confirmation never arrived. The report is given up and nothing
    /// is sent in this step.
    pub fn on_send_timeout(&mut self) {
        if self.state == GateState::InFlight {
            warn!("gate: indication timed out, {} queued", self.queue.depth());
        }
        self.state = GateState::Idle;
    }

    /// Drop everything; queued reports belong to the closed connection.
    pub fn on_connection_closed(&mut self) {
        let dropped = self.queue.depth();
        if dropped > 0 {
            info!("gate: connection closed, discarding {} reports", dropped);
        }
        self.state = GateState::Idle;
        self.queue.clear();
    }

    /// Remove queued reports addressed to `target`.
    pub fn purge(&mut self, target: AttributeId) -> usize {
        self.queue.retain(|e| e.target != target)
    }

    fn pump(&mut self, link: &mut impl ReportLink) -> bool {
        if self.state == GateState::InFlight {
            return false;
        }
        let Some(entry) = self.queue.try_dequeue() else {
            return false;
        };

        match link.transmit(&entry) {
            Ok(()) => {
                self.state = GateState::InFlight;
                trace!("gate: drained {}, {} left", entry.target, self.queue.depth());
                true
            }
            Err(e) => {
                match self.retry {
                    RetryPolicy::Requeue => {
                        warn!("gate: transmit failed ({}), keeping entry at head", e);
                        // The dequeue above freed a slot, so this cannot fail.
                        let _ = self.queue.requeue_front(entry);
                    }
                    RetryPolicy::Drop => {
                        warn!("gate: transmit failed ({}), dropping entry", e);
                    }
                }
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use heapless::Vec;

    /// Link double that records transmits and fails on demand.
    struct FakeLink {
        sent: Vec<u8, 32>,
        fail_next: usize,
    }

    impl FakeLink {
        fn new() -> Self {
            Self {
                sent: Vec::new(),
                fail_next: 0,
            }
        }
    }

    impl ReportLink for FakeLink {
        fn transmit(&mut self, entry: &ReportEntry) -> Result<(), LinkError> {
            if self.fail_next > 0 {
                self.fail_next -= 1;
                return Err(LinkError::Busy);
            }
            let _ = self.sent.push(entry.payload[0]);
            Ok(())
        }
    }

    fn entry(tag: u8) -> ReportEntry {
        ReportEntry::new(AttributeId(2), &[tag]).unwrap()
    }

    fn gate() -> InFlightGate<16> {
        InFlightGate::new(SlotPolicy::ReserveOne, RetryPolicy::Requeue)
    }

    #[test]
    fn idle_and_empty_transmits_immediately() {
        let mut g = gate();
        let mut link = FakeLink::new();

        assert_eq!(g.submit(entry(1), &mut link), Ok(Admission::Sent));
        assert_eq!(g.state(), GateState::InFlight);
        assert_eq!(link.sent.as_slice(), &[1]);
        assert_eq!(g.depth(), 0);
    }

    #[test]
    fn in_flight_queues_then_ack_drains_one() {
        let mut g = gate();
        let mut link = FakeLink::new();

        g.submit(entry(1), &mut link).unwrap();
        assert_eq!(g.submit(entry(2), &mut link), Ok(Admission::Queued));
        assert_eq!(g.submit(entry(3), &mut link), Ok(Admission::Queued));
        assert_eq!(link.sent.as_slice(), &[1]);

        assert!(g.on_acknowledged(&mut link));
        assert_eq!(link.sent.as_slice(), &[1, 2]);
        assert_eq!(g.depth(), 1);
        assert!(g.is_in_flight());

        assert!(g.on_acknowledged(&mut link));
        assert!(!g.on_acknowledged(&mut link));
        assert_eq!(link.sent.as_slice(), &[1, 2, 3]);
        assert_eq!(g.state(), GateState::Idle);
    }

    #[test]
    fn burst_of_twenty_keeps_fifteen_and_drains_in_order() {
        let mut g = gate();
        let mut link = FakeLink::new();

        let mut rejected = 0;
        for tag in 0..20 {
            if g.submit(entry(tag), &mut link) == Err(Error::QueueFull) {
                rejected += 1;
            }
        }
        // One in flight, fifteen queued, the rest dropped.
        assert_eq!(g.depth(), 15);
        assert_eq!(rejected, 4);

        while g.on_acknowledged(&mut link) {}
        let expected: Vec<u8, 32> = (0..16).collect();
        assert_eq!(link.sent, expected);
    }

    #[test]
    fn failed_immediate_transmit_queues_and_stays_idle() {
        let mut g = gate();
        let mut link = FakeLink::new();
        link.fail_next = 1;

        assert_eq!(g.submit(entry(1), &mut link), Ok(Admission::Queued));
        assert_eq!(g.state(), GateState::Idle);
        assert_eq!(g.depth(), 1);
    }

    #[test]
    fn next_submit_pumps_a_stalled_queue_without_reordering() {
        let mut g = gate();
        let mut link = FakeLink::new();
        link.fail_next = 1;
        g.submit(entry(1), &mut link).unwrap();

        assert_eq!(g.submit(entry(2), &mut link), Ok(Admission::Queued));
        assert_eq!(link.sent.as_slice(), &[1]);
        assert!(g.is_in_flight());

        g.on_acknowledged(&mut link);
        assert_eq!(link.sent.as_slice(), &[1, 2]);
    }

    #[test]
    fn requeue_policy_keeps_entry_at_head_after_drain_failure() {
        let mut g = gate();
        let mut link = FakeLink::new();
        g.submit(entry(1), &mut link).unwrap();
        g.submit(entry(2), &mut link).unwrap();
        g.submit(entry(3), &mut link).unwrap();

        link.fail_next = 1;
        assert!(!g.on_acknowledged(&mut link));
        assert_eq!(g.state(), GateState::Idle);
        assert_eq!(g.depth(), 2);

        // Spurious ack or the next producer event retries the head.
        assert!(g.on_acknowledged(&mut link));
        assert_eq!(link.sent.as_slice(), &[1, 2]);
    }

    #[test]
    fn drop_policy_discards_entry_after_drain_failure() {
        let mut g: InFlightGate<16> = InFlightGate::new(SlotPolicy::ReserveOne, RetryPolicy::Drop);
        let mut link = FakeLink::new();
        g.submit(entry(1), &mut link).unwrap();
        g.submit(entry(2), &mut link).unwrap();
        g.submit(entry(3), &mut link).unwrap();

        link.fail_next = 1;
        assert!(!g.on_acknowledged(&mut link));
        assert_eq!(g.depth(), 1);

        assert!(g.on_acknowledged(&mut link));
        assert_eq!(link.sent.as_slice(), &[1, 3]);
    }

    #[test]
    fn timeout_goes_idle_without_sending() {
        let mut g = gate();
        let mut link = FakeLink::new();
        g.submit(entry(1), &mut link).unwrap();
        g.submit(entry(2), &mut link).unwrap();

        g.on_send_timeout();
        assert_eq!(g.state(), GateState::Idle);
        assert_eq!(link.sent.as_slice(), &[1]);
        assert_eq!(g.depth(), 1);
    }

    #[test]
    fn connection_closed_clears_queue() {
        let mut g = gate();
        let mut link = FakeLink::new();
        for tag in 0..5 {
            g.submit(entry(tag), &mut link).unwrap();
        }

        g.on_connection_closed();
        assert_eq!(g.state(), GateState::Idle);
        assert_eq!(g.depth(), 0);
        assert!(g.queue_status().empty);

        assert_eq!(g.submit(entry(9), &mut link), Ok(Admission::Sent));
    }

    #[test]
    fn invalid_entry_is_rejected_without_state_change() {
        let mut g = gate();
        let mut link = FakeLink::new();
        let bad = ReportEntry {
            len: 0,
            ..entry(1)
        };
        assert_eq!(g.submit(bad, &mut link), Err(Error::InvalidReport));
        assert!(link.sent.is_empty());
        assert_eq!(g.state(), GateState::Idle);
    }

    #[test]
    fn purge_removes_only_target() {
        let mut g = gate();
        let mut link = FakeLink::new();
        g.submit(entry(1), &mut link).unwrap();
        g.submit(ReportEntry::new(AttributeId(5), &[2]).unwrap(), &mut link)
            .unwrap();
        g.submit(entry(3), &mut link).unwrap();

        assert_eq!(g.purge(AttributeId(2)), 1);
        assert_eq!(g.depth(), 1);
    }

    #[test]
    fn never_more_than_one_in_flight() {
        let mut g = gate();
        let mut link = FakeLink::new();
        let mut outstanding = 0;
        for tag in 0..40u8 {
            if let Ok(Admission::Sent) = g.submit(entry(tag), &mut link) {
                outstanding += 1;
            }
            assert!(outstanding <= 1);
            if tag % 3 == 0 {
                outstanding = 0;
                if g.on_acknowledged(&mut link) {
                    outstanding = 1;
                }
            }
            assert!(outstanding <= 1);
        }
    }
}
