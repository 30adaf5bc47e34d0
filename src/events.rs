//! Event aggregation between interrupt context and the dispatch loop.
//!
//! Two paths feed the dispatch loop:
//!
//! - **Signals** - payload-free bits raised from interrupt handlers and
//!   stack callbacks through [`EventAggregator::raise`]. Raising never
//!   blocks; a signal raised several times before the next fetch is seen
//!   once.
//! - **Events** - stack notifications that carry data (passkey,
//!   discovered attribute, received value). They travel through a
//!   bounded channel owned by the firmware and are handed to the node one
//!   at a time.
//!
//! The dispatch loop drains the pending signal set with
//! [`EventAggregator::fetch_and_clear`] and processes every bit of the
//! batch before it waits again.

use core::sync::atomic::{AtomicU32, Ordering};

use heapless::Vec;

use crate::ble::PeerAddress;
use crate::config::MAX_REPORT_LEN;
use crate::delivery::Quantity;

/// Payload-free event kinds.
///
/// Declaration order is dispatch order within one batch:
/// - connection-opened first, connection-closed last, so a link that came
///   and went before the batch was fetched ends in the reset state;
/// - link completions before producers, so freshly produced reports can go
///   straight out;
/// - bus completions before the sample tick, so a tick that lands with the
///   final read starts the next cycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum Signal {
    ConnectionOpened,
    Acknowledged,
    SendTimeout,
    Bonded,
    BondingFailed,
    TransferDone,
    BusFault,
    DelayElapsed,
    TimerUnderflow,
    ButtonAPressed,
    ButtonBPressed,
    ButtonBReleased,
    ButtonAReleased,
    FlexLevel0,
    FlexLevel45,
    FlexLevel90,
    ConnectionClosed,
}

impl Signal {
    /// Every signal, in dispatch order.
    pub const ALL: [Signal; 17] = [
        Signal::ConnectionOpened,
        Signal::Acknowledged,
        Signal::SendTimeout,
        Signal::Bonded,
        Signal::BondingFailed,
        Signal::TransferDone,
        Signal::BusFault,
        Signal::DelayElapsed,
        Signal::TimerUnderflow,
        Signal::ButtonAPressed,
        Signal::ButtonBPressed,
        Signal::ButtonBReleased,
        Signal::ButtonAReleased,
        Signal::FlexLevel0,
        Signal::FlexLevel45,
        Signal::FlexLevel90,
        Signal::ConnectionClosed,
    ];

    const fn mask(self) -> u32 {
        1 << self as u8
    }
}

/// A batch of pending signals.
#[derive(Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SignalSet(u32);

impl SignalSet {
    pub const fn empty() -> Self {
        Self(0)
    }

    pub fn insert(&mut self, signal: Signal) {
        self.0 |= signal.mask();
    }

    pub fn contains(&self, signal: Signal) -> bool {
        self.0 & signal.mask() != 0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn len(&self) -> usize {
        self.0.count_ones() as usize
    }

    /// Signals in the batch, in dispatch order.
    pub fn iter(self) -> impl Iterator<Item = Signal> {
        Signal::ALL.into_iter().filter(move |s| self.contains(*s))
    }
}

impl FromIterator<Signal> for SignalSet {
    fn from_iter<I: IntoIterator<Item = Signal>>(iter: I) -> Self {
        let mut set = SignalSet::empty();
        for signal in iter {
            set.insert(signal);
        }
        set
    }
}

impl core::fmt::Debug for SignalSet {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

/// Interrupt-safe pending-signal set.
///
/// Lives in a `static`; interrupt handlers and SoftDevice callbacks call
/// [`raise`](Self::raise), the dispatch task is the only consumer.
pub struct EventAggregator {
    pending: AtomicU32,
    #[cfg(feature = "embedded")]
    waker: embassy_sync::waitqueue::AtomicWaker,
}

impl EventAggregator {
    pub const fn new() -> Self {
        Self {
            pending: AtomicU32::new(0),
            #[cfg(feature = "embedded")]
            waker: embassy_sync::waitqueue::AtomicWaker::new(),
        }
    }

    /// Mark `signal` pending. Safe from any interrupt priority.
    pub fn raise(&self, signal: Signal) {
        self.pending.fetch_or(signal.mask(), Ordering::AcqRel);
        #[cfg(feature = "embedded")]
        self.waker.wake();
    }

    /// Take the whole pending set, leaving it empty.
    pub fn fetch_and_clear(&self) -> SignalSet {
        SignalSet(self.pending.swap(0, Ordering::AcqRel))
    }

    /// Sleep until at least one signal is pending, then take the set.
    #[cfg(feature = "embedded")]
    pub async fn wait(&self) -> SignalSet {
        core::future::poll_fn(|cx| {
            self.waker.register(cx.waker());
            let set = self.fetch_and_clear();
            if set.is_empty() {
                core::task::Poll::Pending
            } else {
                core::task::Poll::Ready(set)
            }
        })
        .await
    }
}

impl Default for EventAggregator {
    fn default() -> Self {
        Self::new()
    }
}

/// Six-digit pairing passkey shown to the user for confirmation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Passkey(pub u32);

impl Passkey {
    /// Parse the ASCII digits the stack hands out.
    pub fn from_ascii(digits: &[u8; 6]) -> Option<Self> {
        digits.iter().try_fold(0u32, |acc, d| {
            d.is_ascii_digit().then(|| acc * 10 + u32::from(d - b'0'))
        })
        .map(Passkey)
    }
}

/// Why a GATT procedure did not succeed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ProcedureError {
    /// The peer requires an encrypted link for this attribute.
    InsufficientEncryption,
    /// The requested service or characteristic does not exist.
    NotFound,
    /// Any other ATT / stack status.
    Failed(u16),
}

/// Value bytes read from or indicated by the sensor node.
pub type Payload = Vec<u8, MAX_REPORT_LEN>;

/// Stack notifications that carry data.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Event {
    /// The stack is up; start advertising or scanning.
    Booted,
    /// Scan report (peer role).
    AdvertisementSeen { address: PeerAddress, connectable: bool },
    /// Numeric comparison: show `passkey` and wait for local confirmation.
    PasskeyDisplay(Passkey),
    /// The stack asks whether to accept a bonding attempt.
    BondingRequested,
    /// The peer wrote the CCCD of `quantity` (sensor role).
    SubscriptionChanged { quantity: Quantity, enabled: bool },
    /// A discovered service matched `quantity` (peer role).
    ServiceFound(Quantity),
    /// A discovered characteristic matched `quantity` (peer role).
    CharacteristicFound(Quantity),
    /// The outstanding GATT procedure finished.
    ProcedureCompleted(Result<(), ProcedureError>),
    /// Indication or read response from the sensor node (peer role).
    ValueReceived { quantity: Quantity, value: Payload },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fetch_returns_raised_signals_and_clears() {
        let agg = EventAggregator::new();
        agg.raise(Signal::TimerUnderflow);
        agg.raise(Signal::Acknowledged);

        let set = agg.fetch_and_clear();
        assert!(set.contains(Signal::TimerUnderflow));
        assert!(set.contains(Signal::Acknowledged));
        assert_eq!(set.len(), 2);

        assert!(agg.fetch_and_clear().is_empty());
    }

    #[test]
    fn repeated_raise_coalesces() {
        let agg = EventAggregator::new();
        for _ in 0..5 {
            agg.raise(Signal::ButtonAPressed);
        }
        assert_eq!(agg.fetch_and_clear().len(), 1);
    }

    #[test]
    fn iteration_follows_dispatch_order_with_close_last() {
        let set: SignalSet = [
            Signal::ConnectionClosed,
            Signal::FlexLevel45,
            Signal::Acknowledged,
            Signal::TimerUnderflow,
        ]
        .into_iter()
        .collect();

        let mut order = set.iter();
        assert_eq!(order.next(), Some(Signal::Acknowledged));
        assert_eq!(order.next(), Some(Signal::TimerUnderflow));
        assert_eq!(order.next(), Some(Signal::FlexLevel45));
        assert_eq!(order.next(), Some(Signal::ConnectionClosed));
        assert_eq!(order.next(), None);
    }

    #[test]
    fn open_precedes_close_in_one_batch() {
        let set: SignalSet = [Signal::ConnectionClosed, Signal::ConnectionOpened]
            .into_iter()
            .collect();
        let order: heapless::Vec<Signal, 2> = set.iter().collect();
        assert_eq!(
            order.as_slice(),
            &[Signal::ConnectionOpened, Signal::ConnectionClosed]
        );
    }

    #[test]
    fn bus_completion_precedes_sample_tick() {
        let set: SignalSet = [Signal::TimerUnderflow, Signal::BusFault, Signal::TransferDone]
            .into_iter()
            .collect();
        let order: heapless::Vec<Signal, 3> = set.iter().collect();
        assert_eq!(
            order.as_slice(),
            &[Signal::TransferDone, Signal::BusFault, Signal::TimerUnderflow]
        );
    }

    #[test]
    fn gesture_edges_iterate_in_gesture_order() {
        let set: SignalSet = [
            Signal::ButtonAReleased,
            Signal::ButtonBReleased,
            Signal::ButtonBPressed,
            Signal::ButtonAPressed,
        ]
        .into_iter()
        .collect();
        let order: heapless::Vec<Signal, 4> = set.iter().collect();
        assert_eq!(
            order.as_slice(),
            &[
                Signal::ButtonAPressed,
                Signal::ButtonBPressed,
                Signal::ButtonBReleased,
                Signal::ButtonAReleased
            ]
        );
    }

    #[test]
    fn all_signals_have_distinct_bits() {
        let set: SignalSet = Signal::ALL.into_iter().collect();
        assert_eq!(set.len(), Signal::ALL.len());
    }

    #[test]
    fn passkey_from_ascii() {
        assert_eq!(Passkey::from_ascii(b"012345"), Some(Passkey(12_345)));
        assert_eq!(Passkey::from_ascii(b"999999"), Some(Passkey(999_999)));
        assert_eq!(Passkey::from_ascii(b"12a456"), None);
    }
}
